//! Rules that every catalog mutation passes through before reaching storage.

pub mod outcome;
pub mod validation;
