use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A signed record as published to relays.
/// Only `kind` and `tags` are interpreted here; the envelope fields are
/// carried through untouched (signature checks happen upstream).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerListRecord {
    #[serde(default)]
    pub id: String,

    /// Author public key (hex)
    pub pubkey: String,

    /// Unix timestamp in seconds
    #[serde(default)]
    pub created_at: i64,

    pub kind: u32,

    /// Raw tag arrays. Kept as JSON values so one malformed tag does not
    /// reject the whole record.
    #[serde(default)]
    pub tags: Vec<Value>,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub sig: String,
}

impl ServerListRecord {
    /// Build an unsigned record from string tags
    pub fn new(pubkey: impl Into<String>, kind: u32, tags: Vec<Vec<String>>) -> Self {
        Self {
            id: String::new(),
            pubkey: pubkey.into(),
            created_at: Utc::now().timestamp(),
            kind,
            tags: tags
                .into_iter()
                .map(|tag| Value::Array(tag.into_iter().map(Value::String).collect()))
                .collect(),
            content: String::new(),
            sig: String::new(),
        }
    }
}

/// Observed state of one storage server, as reported over the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub url: String,

    /// Optional display label from the server-list record
    pub name: Option<String>,

    pub last_success: Option<DateTime<Utc>>,

    pub last_failure: Option<DateTime<Utc>>,

    pub consecutive_failures: u32,

    pub available: bool,

    /// Derived ranking score in [0, 1]
    pub health_score: f64,
}

/// Terminal status of a content resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Success,
    NotFound,
    /// Reserved; per-server network failures currently surface as `NotFound`
    NetworkError,
    Timeout,
    /// Reserved; authorization is not distinguished yet
    Unauthorized,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_malformed_tags() {
        let json = r#"{
            "pubkey": "abc",
            "kind": 10063,
            "tags": [["server", "https://a.example.com"], "not-a-list", [1, 2]]
        }"#;

        let record: ServerListRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.kind, 10063);
        assert_eq!(record.tags.len(), 3);
        assert!(record.sig.is_empty());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ResolutionStatus::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
    }
}
