//! What each channel can render.

use dbot_core::{Attachment, Message};
use serde_json::json;

/// Content type of the quick-reply keyboard attachment.
pub const KEYBOARD_CONTENT_TYPE: &str = "application/vnd.microsoft.keyboard";

/// Largest number of buttons `channel_id` shows on a keyboard; 0 when it has none.
pub fn max_buttons(channel_id: &str) -> usize {
    match channel_id.to_ascii_lowercase().as_str() {
        "facebook" => 10,
        "kik" => 20,
        "slack" | "telegram" | "emulator" | "directline" | "webchat" => 100,
        _ => 0,
    }
}

/// True when `channel_id` can show a keyboard with `button_count` buttons.
pub fn supports_keyboards(channel_id: &str, button_count: usize) -> bool {
    button_count <= max_buttons(channel_id)
}

/// Keyboard of "im back" buttons, each posting its own title as the reply.
pub fn keyboard(text: impl Into<String>, options: &[String]) -> Message {
    let buttons: Vec<_> = options
        .iter()
        .map(|o| json!({ "type": "imBack", "title": o, "value": o }))
        .collect();
    Message::text(text).with_attachment(Attachment {
        content_type: KEYBOARD_CONTENT_TYPE.to_string(),
        content: Some(json!({ "buttons": buttons })),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyboard_limits() {
        assert!(supports_keyboards("facebook", 10));
        assert!(!supports_keyboards("facebook", 11));
        assert!(supports_keyboards("Telegram", 3));
        assert!(!supports_keyboards("console", 1));
    }

    #[test]
    fn test_keyboard_buttons() {
        let msg = keyboard("Pick", &["Red".to_string(), "Blue".to_string()]);
        let content = msg.attachments[0].content.as_ref().unwrap();
        assert_eq!(content["buttons"][1]["value"], "Blue");
        assert_eq!(msg.attachments[0].content_type, KEYBOARD_CONTENT_TYPE);
    }
}
