use async_trait::async_trait;
use anyhow::Result;
use shared::types::ServerListRecord;

/// Source of users' server-list records.
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Latest server-list record published by `pubkey`, if any relay has one
    async fn fetch_server_list(&self, pubkey: &str) -> Result<Option<ServerListRecord>>;
}

/// Relay client for deployments without relay connectivity. Never finds a
/// record, so lookups fall back to the configured default servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticRelayClient;

#[async_trait]
impl RelayClient for StaticRelayClient {
    async fn fetch_server_list(&self, pubkey: &str) -> Result<Option<ServerListRecord>> {
        tracing::info!("No relay configured, using default servers for {}", pubkey);
        Ok(None)
    }
}
