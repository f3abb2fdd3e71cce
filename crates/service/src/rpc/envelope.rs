use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use common::topics::reply_topic;

/// Identifies one outstanding call so its reply can be matched unambiguously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Structured error carried by a reply instead of a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub code: u16,
    pub message: String,
}

impl ErrorBody {
    pub fn new(kind: impl Into<String>, code: u16, message: impl Into<String>) -> Self {
        Self { kind: kind.into(), code, message: message.into() }
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.kind, self.code, self.message)
    }
}

/// Unit moved by a transport: a request, an event or a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Envelope {
    /// Request expecting a correlated reply on `<topic>.reply`.
    pub fn request(topic: &str, correlation_id: CorrelationId, payload: Value) -> Self {
        Self {
            topic: topic.to_string(),
            correlation_id: Some(correlation_id),
            reply_to: Some(reply_topic(topic)),
            payload,
            error: None,
        }
    }

    /// One-way message; nobody is expected to answer.
    pub fn event(topic: &str, payload: Value) -> Self {
        Self {
            topic: topic.to_string(),
            correlation_id: None,
            reply_to: None,
            payload,
            error: None,
        }
    }

    /// Where a reply to this envelope goes.
    pub fn reply_destination(&self) -> String {
        self.reply_to.clone().unwrap_or_else(|| reply_topic(&self.topic))
    }

    pub fn reply_ok(&self, payload: Value) -> Self {
        Self {
            topic: self.reply_destination(),
            correlation_id: self.correlation_id,
            reply_to: None,
            payload,
            error: None,
        }
    }

    pub fn reply_err(&self, body: ErrorBody) -> Self {
        Self {
            topic: self.reply_destination(),
            correlation_id: self.correlation_id,
            reply_to: None,
            payload: Value::Null,
            error: Some(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reply_keeps_correlation_and_targets_reply_topic() {
        let cid = CorrelationId::new();
        let req = Envelope::request("user.create", cid, json!({"email": "a@x.com"}));
        let reply = req.reply_ok(json!({"id": "u1"}));
        assert_eq!(reply.topic, "user.create.reply");
        assert_eq!(reply.correlation_id, Some(cid));
        assert!(reply.error.is_none());

        let failed = req.reply_err(ErrorBody::new("not_found", 1003, "user not found"));
        assert_eq!(failed.payload, Value::Null);
        assert_eq!(failed.error.unwrap().kind, "not_found");
    }

    #[test]
    fn events_have_no_correlation_on_the_wire() {
        let ev = Envelope::event("mail.send", json!({"code": "0423"}));
        let wire = serde_json::to_value(&ev).unwrap();
        assert!(wire.get("correlation_id").is_none());
        assert!(wire.get("reply_to").is_none());
        assert_eq!(ev.reply_destination(), "mail.send.reply");
    }
}
