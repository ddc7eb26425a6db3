use anyhow::{bail, Context, Result};
use serde_json::Value;
use url::Url;
use shared::protocol::TAG_SERVER;
use shared::types::ServerListRecord;
use super::record::ServerRecord;

/// Parse and check a server URL: http(s) scheme and a non-empty host.
pub fn validate_server_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("Malformed server URL: {}", raw))?;
    if !is_valid_server_url(&url) {
        bail!("Server URL must be http(s) with a host: {}", raw);
    }
    Ok(url)
}

pub fn is_valid_server_url(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
        && url.host_str().map_or(false, |host| !host.is_empty())
}

/// Collect the `["server", <url>, <name?>]` tags of a record, in source order.
/// Malformed tags are skipped; they never reject the rest of the record.
pub fn parse_server_tags(record: &ServerListRecord) -> Vec<ServerRecord> {
    record
        .tags
        .iter()
        .filter_map(parse_server_tag)
        .collect()
}

fn parse_server_tag(tag: &Value) -> Option<ServerRecord> {
    let fields = tag.as_array()?;
    if fields.first().and_then(Value::as_str) != Some(TAG_SERVER) {
        return None;
    }

    let Some(raw_url) = fields.get(1).and_then(Value::as_str) else {
        tracing::debug!("Skipping server tag without a URL: {}", tag);
        return None;
    };

    let url = match validate_server_url(raw_url) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!("Skipping server tag: {:#}", e);
            return None;
        }
    };

    let name = fields
        .get(2)
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    Some(ServerRecord::new(url, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::protocol::SERVER_LIST_KIND;

    fn record_with(tags: Vec<Value>) -> ServerListRecord {
        ServerListRecord {
            id: String::new(),
            pubkey: "npub-test".to_string(),
            created_at: 0,
            kind: SERVER_LIST_KIND,
            tags,
            content: String::new(),
            sig: String::new(),
        }
    }

    #[test]
    fn test_parse_valid_server_list() {
        let record = record_with(vec![
            json!(["server", "https://server1.example.com", "Server 1"]),
            json!(["server", "https://server2.example.com"]),
            json!(["server", "https://server3.example.com", "Server 3"]),
        ]);

        let servers = parse_server_tags(&record);
        assert_eq!(servers.len(), 3);
        assert_eq!(servers[0].url.as_str(), "https://server1.example.com/");
        assert_eq!(servers[0].name.as_deref(), Some("Server 1"));
        assert_eq!(servers[1].url.as_str(), "https://server2.example.com/");
        assert!(servers[1].name.is_none());
        assert_eq!(servers[2].name.as_deref(), Some("Server 3"));
    }

    #[test]
    fn test_skips_malformed_tags() {
        let record = record_with(vec![
            json!(["server", "not a url"]),
            json!(["server", "ftp://files.example.com"]),
            json!(["server"]),
            json!(["server", 42]),
            json!(["relay", "wss://relay.example.com"]),
            json!("server"),
            json!([]),
            json!(["server", "https://valid.example.com", 7]),
            json!(["server", "file:///etc/passwd"]),
        ]);

        let servers = parse_server_tags(&record);
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].url.as_str(), "https://valid.example.com/");
        assert!(servers[0].name.is_none());
    }

    #[test]
    fn test_validate_server_url() {
        assert!(validate_server_url("https://blossom.example.com").is_ok());
        assert!(validate_server_url("http://127.0.0.1:3000/blobs").is_ok());
        assert!(validate_server_url("wss://relay.example.com").is_err());
        assert!(validate_server_url("mailto:someone@example.com").is_err());
        assert!(validate_server_url("").is_err());
    }
}
