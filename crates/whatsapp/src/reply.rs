pub const MAX_REPLY_CHARS: usize = 4096;
pub const TRUNCATION_MARKER: &str = "... (message truncated)";

pub const UNSUPPORTED_MESSAGE_REPLY: &str = "Sorry, I can only process text and images for now.";
pub const TURN_FAILURE_REPLY: &str = catalogbot_core::errors::RETRY_LATER_MESSAGE;
pub const IMAGE_FAILURE_NOTE: &str = "[Note: Image upload failed, but I'll help you anyway]";

/// Caps a reply at [`MAX_REPLY_CHARS`] characters, marker included. Counts
/// chars rather than bytes so multi-byte text is never split.
pub fn truncate_reply(text: &str) -> String {
    if text.chars().count() <= MAX_REPLY_CHARS {
        return text.to_string();
    }

    let keep = MAX_REPLY_CHARS - TRUNCATION_MARKER.chars().count();
    let mut truncated = text.chars().take(keep).collect::<String>();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
