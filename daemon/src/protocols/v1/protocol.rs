use log::debug;
use mcpanel_protocol::v1::action::ActionRequest;

/// Parses one inbound text frame. Malformed frames and unknown actions are
/// dropped.
pub fn parse_action(raw: &str) -> Option<ActionRequest> {
    match ActionRequest::from_text(raw) {
        Ok(action) => Some(action),
        Err(err) => {
            debug!("dropped inbound message: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_and_malformed_are_dropped() {
        assert_eq!(parse_action(r#"{"action":"start"}"#), Some(ActionRequest::Start {}));
        assert_eq!(parse_action(r#"{"action":"format_disk"}"#), None);
        assert_eq!(parse_action(r#"{"command":"list"}"#), None);
        assert_eq!(parse_action("not json"), None);
        assert_eq!(parse_action(r#"{"action":"command"}"#), None);
    }
}
