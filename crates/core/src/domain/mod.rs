pub mod conversation;
pub mod product;
pub mod seller;
