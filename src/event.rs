//! Raw event records as returned by the Data Source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two event streams the engine evaluates. They carry the same row
/// shape but different success semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    Transaction,
    BioAuth,
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stream::Transaction => write!(f, "transaction"),
            Stream::BioAuth => write!(f, "bio_auth"),
        }
    }
}

/// One raw pipeline event: a transaction attempt or an authentication
/// attempt. Produced by the Data Source, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    /// Client (agent) identifier, used for distinct-count metrics.
    pub client_id: Option<String>,
    pub aggregator: Option<String>,
    pub state: Option<String>,
    pub trans_type: Option<String>,
    pub amount: Option<f64>,
    pub response_code: Option<String>,
    pub response_message: Option<String>,
}

/// Categorical dimensions an event can be sliced along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Aggregator,
    State,
    TransType,
}

impl RawEvent {
    /// The event's value for a dimension, if present.
    pub fn dimension(&self, dimension: Dimension) -> Option<&str> {
        match dimension {
            Dimension::Aggregator => self.aggregator.as_deref(),
            Dimension::State => self.state.as_deref(),
            Dimension::TransType => self.trans_type.as_deref(),
        }
    }
}

/// Success predicate for a stream, supplied by the caller rather than
/// hard-coded in the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessRule {
    /// Result message equals the given string, case-insensitively.
    MessageEquals(String),
    /// Response code equals the given string exactly.
    CodeEquals(String),
}

impl SuccessRule {
    /// The conventional rule for each stream: transactions succeed when the
    /// result message reads `success`, authentications when the response
    /// code is `00`.
    pub fn for_stream(stream: Stream) -> Self {
        match stream {
            Stream::Transaction => SuccessRule::MessageEquals("success".to_string()),
            Stream::BioAuth => SuccessRule::CodeEquals("00".to_string()),
        }
    }

    pub fn matches(&self, event: &RawEvent) -> bool {
        match self {
            SuccessRule::MessageEquals(expected) => event
                .response_message
                .as_deref()
                .is_some_and(|m| m.eq_ignore_ascii_case(expected)),
            SuccessRule::CodeEquals(expected) => {
                event.response_code.as_deref() == Some(expected.as_str())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(message: Option<&str>, code: Option<&str>) -> RawEvent {
        RawEvent {
            timestamp: Utc::now(),
            request_id: "r1".to_string(),
            client_id: None,
            aggregator: None,
            state: None,
            trans_type: None,
            amount: None,
            response_code: code.map(str::to_string),
            response_message: message.map(str::to_string),
        }
    }

    #[test]
    fn test_message_rule_is_case_insensitive() {
        let rule = SuccessRule::for_stream(Stream::Transaction);
        assert!(rule.matches(&event(Some("SUCCESS"), None)));
        assert!(rule.matches(&event(Some("Success"), None)));
        assert!(!rule.matches(&event(Some("FAILED"), None)));
        assert!(!rule.matches(&event(None, None)));
    }

    #[test]
    fn test_code_rule_is_exact() {
        let rule = SuccessRule::for_stream(Stream::BioAuth);
        assert!(rule.matches(&event(None, Some("00"))));
        assert!(!rule.matches(&event(None, Some("0"))));
        assert!(!rule.matches(&event(None, Some("91"))));
        assert!(!rule.matches(&event(None, None)));
    }
}
