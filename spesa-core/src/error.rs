//! Error payloads returned by the Spesa backend.

use serde_json::Value;
use thiserror::Error;

/// Separator used when several field messages are folded into one line.
pub const FIELD_MESSAGE_SEPARATOR: &str = "; ";

/// A non-2xx response, with its body normalized to one display message.
///
/// The backend reports failures either as a single string (`message`, `msg`,
/// `error`) or as a list of field-level validation errors (`errors: [{msg}]`,
/// or `message: [..]`). Both shapes collapse into `message`; the individual
/// field messages are kept in `field_messages` when there were any.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("HTTP {status}: {message}")]
pub struct ApiFailure {
    pub status: u16,
    pub message: String,
    pub field_messages: Vec<String>,
}

impl ApiFailure {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            field_messages: Vec::new(),
        }
    }

    /// Normalize a raw response body.
    ///
    /// JSON bodies go through [`ApiFailure::from_json`]; anything else is used
    /// verbatim, or replaced by a generic message when empty.
    pub fn from_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => Self::from_json(status, &value),
            Err(_) => {
                let text = body.trim();
                if text.is_empty() {
                    Self::new(status, fallback_message(status))
                } else {
                    Self::new(status, text)
                }
            }
        }
    }

    /// Normalize a JSON error body.
    pub fn from_json(status: u16, body: &Value) -> Self {
        let field_messages = field_messages(body);
        if !field_messages.is_empty() {
            return Self {
                status,
                message: field_messages.join(FIELD_MESSAGE_SEPARATOR),
                field_messages,
            };
        }

        let message = ["message", "msg", "error"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .or_else(|| body.as_str().map(str::to_string))
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| fallback_message(status));

        Self::new(status, message)
    }

    /// A 4xx failure carrying per-field messages.
    pub fn is_validation(&self) -> bool {
        (400..500).contains(&self.status) && !self.field_messages.is_empty()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401 || self.status == 403
    }
}

fn fallback_message(status: u16) -> String {
    format!("Request failed with status {}", status)
}

fn field_messages(body: &Value) -> Vec<String> {
    let list = body
        .get("errors")
        .and_then(Value::as_array)
        .or_else(|| body.get("message").and_then(Value::as_array))
        .or_else(|| body.as_array());

    list.map(|items| {
        items
            .iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text.clone()),
                Value::Object(_) => ["msg", "message"]
                    .iter()
                    .find_map(|key| item.get(*key).and_then(Value::as_str))
                    .map(str::to_string),
                _ => None,
            })
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_message_is_extracted() {
        let failure = ApiFailure::from_json(400, &json!({"message": "Invalid name"}));
        assert_eq!(failure.message, "Invalid name");
        assert!(!failure.is_validation());
    }

    #[test]
    fn msg_key_is_accepted() {
        let failure = ApiFailure::from_json(404, &json!({"msg": "Item not found"}));
        assert_eq!(failure.message, "Item not found");
    }

    #[test]
    fn field_errors_are_concatenated() {
        let failure = ApiFailure::from_json(
            422,
            &json!({"errors": [
                {"msg": "Name is required", "param": "name"},
                {"msg": "Phone number is invalid", "param": "phoneNumber"}
            ]}),
        );
        assert!(failure.is_validation());
        assert_eq!(failure.field_messages.len(), 2);
        assert_eq!(
            failure.message,
            "Name is required; Phone number is invalid"
        );
    }

    #[test]
    fn message_array_counts_as_field_errors() {
        let failure = ApiFailure::from_json(400, &json!({"message": ["a", "b"]}));
        assert_eq!(failure.message, "a; b");
    }

    #[test]
    fn raw_text_body_is_kept() {
        let failure = ApiFailure::from_body(502, "Bad Gateway");
        assert_eq!(failure.message, "Bad Gateway");
    }

    #[test]
    fn empty_body_gets_generic_message() {
        let failure = ApiFailure::from_body(500, "");
        assert_eq!(failure.message, "Request failed with status 500");
        let failure = ApiFailure::from_json(500, &json!({}));
        assert_eq!(failure.message, "Request failed with status 500");
    }

    #[test]
    fn display_includes_status() {
        let failure = ApiFailure::new(400, "Invalid name");
        assert_eq!(failure.to_string(), "HTTP 400: Invalid name");
    }
}
