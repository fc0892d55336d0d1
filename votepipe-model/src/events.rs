use crate::snapshot::AggregateSnapshot;

/// Greeting pushed to every viewer as soon as it subscribes.
pub const WELCOME_TEXT: &str = "Welcome!";

/// Named event pushed to live result viewers.
///
/// On the wire each event is `{"event": <name>, "data": <payload>}`. The
/// `scores` payload is the snapshot mapping encoded as a JSON string, so
/// viewers parse it a second time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerEvent {
    Welcome { text: String },
    Scores(AggregateSnapshot),
}

impl ViewerEvent {
    pub fn welcome() -> Self {
        ViewerEvent::Welcome {
            text: WELCOME_TEXT.to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ViewerEvent::Welcome { .. } => "message",
            ViewerEvent::Scores(_) => "scores",
        }
    }
}

#[cfg(feature = "serde")]
impl ViewerEvent {
    pub fn to_json(&self) -> crate::Result<String> {
        let data = match self {
            ViewerEvent::Welcome { text } => serde_json::json!({ "text": text }),
            ViewerEvent::Scores(snapshot) => {
                serde_json::Value::String(serde_json::to_string(snapshot)?)
            }
        };
        Ok(serde_json::json!({ "event": self.name(), "data": data }).to_string())
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;
    use crate::Choice;

    #[test]
    fn scores_payload_is_json_encoded_mapping() {
        let event = ViewerEvent::Scores(AggregateSnapshot::from_counts([
            (Choice::A, 2),
            (Choice::B, 1),
        ]));
        let value: serde_json::Value =
            serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["event"], "scores");
        assert_eq!(value["data"], r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn welcome_is_a_message_event() {
        let value: serde_json::Value =
            serde_json::from_str(&ViewerEvent::welcome().to_json().unwrap())
                .unwrap();
        assert_eq!(value["event"], "message");
        assert_eq!(value["data"]["text"], WELCOME_TEXT);
    }
}
