//! Read-only conversation accessor

use chrono::DateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use super::error::HostError;

/// One message of the conversation as the host stores it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message text
    #[serde(default, alias = "message", alias = "content", alias = "text", deserialize_with = "text_or_null")]
    pub mes: String,

    /// Authored by the user rather than the assistant
    #[serde(default, deserialize_with = "flag")]
    pub is_user: bool,

    /// Generation start, epoch milliseconds
    #[serde(default, deserialize_with = "timestamp_ms")]
    pub gen_started: Option<i64>,

    /// Generation end, epoch milliseconds
    #[serde(default, deserialize_with = "timestamp_ms")]
    pub gen_finished: Option<i64>,

    /// 0-based index of the displayed alternate response
    #[serde(default)]
    pub swipe_id: Option<u32>,
}

impl ChatMessage {
    /// Assistant message with the given text
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            mes: text.into(),
            ..Default::default()
        }
    }

    /// User message with the given text
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            mes: text.into(),
            is_user: true,
            ..Default::default()
        }
    }

    /// Set generation timestamps (epoch milliseconds)
    pub fn with_timing(mut self, started: i64, finished: i64) -> Self {
        self.gen_started = Some(started);
        self.gen_finished = Some(finished);
        self
    }

    /// Set the 0-based swipe id
    pub fn with_swipe_id(mut self, swipe_id: u32) -> Self {
        self.swipe_id = Some(swipe_id);
        self
    }

    /// Parse one message record as the host stores it
    pub fn from_record(record: &Value) -> Result<Self, HostError> {
        Self::deserialize(record).map_err(|e| HostError::Malformed(format!("chat message: {}", e)))
    }

    /// Parse the newest message of a host chat array
    ///
    /// An empty array has no last message; anything but an array is malformed.
    pub fn last_in_chat(chat: &Value) -> Result<Option<Self>, HostError> {
        debug!("ChatMessage::last_in_chat: called");
        let Some(messages) = chat.as_array() else {
            return Err(HostError::Malformed("chat is not an array".to_string()));
        };
        messages.last().map(Self::from_record).transpose()
    }

    /// Text with leading and trailing whitespace (and byte-order marks) removed
    pub fn trimmed_text(&self) -> &str {
        self.mes.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}')
    }

    /// Generation time in milliseconds, when both timestamps are known
    pub fn generation_time_ms(&self) -> Option<i64> {
        match (self.gen_started, self.gen_finished) {
            (Some(started), Some(finished)) => Some(finished - started),
            _ => None,
        }
    }
}

/// Read access to the host's current conversation
pub trait Conversation: Send + Sync {
    /// The newest message, if the conversation has any
    fn last_message(&self) -> Result<Option<ChatMessage>, HostError>;

    /// 1-based index of the alternate response shown for the last message
    fn current_swipe_index(&self) -> Result<Option<i64>, HostError> {
        debug!("Conversation::current_swipe_index: deriving from last message");
        Ok(self
            .last_message()?
            .and_then(|message| message.swipe_id)
            .map(|swipe_id| i64::from(swipe_id) + 1))
    }
}

fn text_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts `true`/`false` as well as the numeric 1/0 some host versions store
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    })
}

/// Accepts epoch milliseconds or an RFC 3339 string; anything else reads as absent
fn timestamp_ms<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.timestamp_millis())
            .ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedConversation(Option<ChatMessage>);

    impl Conversation for FixedConversation {
        fn last_message(&self) -> Result<Option<ChatMessage>, HostError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_deserialize_host_message() {
        let json = r#"{
            "name": "Assistant",
            "is_user": false,
            "mes": "  Hello there  ",
            "gen_started": "2024-05-01T10:00:00.000Z",
            "gen_finished": "2024-05-01T10:00:04.500Z",
            "swipe_id": 2
        }"#;

        let message: ChatMessage = serde_json::from_str(json).unwrap();

        assert!(!message.is_user);
        assert_eq!(message.trimmed_text(), "Hello there");
        assert_eq!(message.generation_time_ms(), Some(4500));
        assert_eq!(message.swipe_id, Some(2));
    }

    #[test]
    fn test_deserialize_loose_fields() {
        let json = r#"{ "is_user": 1, "content": "hi", "gen_started": 1000, "gen_finished": "not a date" }"#;

        let message: ChatMessage = serde_json::from_str(json).unwrap();

        assert!(message.is_user);
        assert_eq!(message.mes, "hi");
        assert_eq!(message.gen_started, Some(1000));
        assert_eq!(message.gen_finished, None);
        assert_eq!(message.generation_time_ms(), None);
    }

    #[test]
    fn test_deserialize_null_text() {
        let message: ChatMessage = serde_json::from_str(r#"{ "mes": null }"#).unwrap();
        assert_eq!(message.mes, "");
        assert!(!message.is_user);
    }

    #[test]
    fn test_trimmed_text_strips_byte_order_marks() {
        assert_eq!(ChatMessage::assistant("\u{feff}").trimmed_text(), "");
        assert_eq!(ChatMessage::assistant("\u{feff} hi \n\u{feff}").trimmed_text(), "hi");
        assert_eq!(ChatMessage::assistant("a\u{feff}b").trimmed_text(), "a\u{feff}b");
    }

    #[test]
    fn test_last_in_chat() {
        let chat = serde_json::json!([
            { "is_user": true, "mes": "Hello?" },
            { "is_user": false, "mes": "Hi!", "swipe_id": 1 }
        ]);

        let message = ChatMessage::last_in_chat(&chat).unwrap().unwrap();
        assert_eq!(message.mes, "Hi!");
        assert_eq!(message.swipe_id, Some(1));

        assert_eq!(ChatMessage::last_in_chat(&serde_json::json!([])).unwrap(), None);
    }

    #[test]
    fn test_last_in_chat_reports_malformed_records() {
        let err = ChatMessage::last_in_chat(&serde_json::json!({ "mes": "x" })).unwrap_err();
        assert!(matches!(err, HostError::Malformed(_)));

        let err = ChatMessage::last_in_chat(&serde_json::json!([{ "swipe_id": "two" }])).unwrap_err();
        assert!(matches!(err, HostError::Malformed(_)));
    }

    #[test]
    fn test_generation_time_can_be_negative() {
        let message = ChatMessage::assistant("x").with_timing(5000, 1000);
        assert_eq!(message.generation_time_ms(), Some(-4000));
    }

    #[test]
    fn test_default_swipe_index_is_one_based() {
        let conversation = FixedConversation(Some(ChatMessage::assistant("x").with_swipe_id(0)));
        assert_eq!(conversation.current_swipe_index().unwrap(), Some(1));

        let conversation = FixedConversation(Some(ChatMessage::assistant("x")));
        assert_eq!(conversation.current_swipe_index().unwrap(), None);

        let conversation = FixedConversation(None);
        assert_eq!(conversation.current_swipe_index().unwrap(), None);
    }
}
