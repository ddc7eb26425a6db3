use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use anyhow::{anyhow, Context, Result};
use shared::types::ServerListRecord;
use crate::directory::parse::validate_server_url;
use crate::directory::record::ServerRecord;
use crate::directory::{ServerDirectory, ServerRef};
use crate::relay::RelayClient;

/// Delay of the placeholder server health probe
const HEALTH_PROBE_DELAY: Duration = Duration::from_millis(100);

/// Commands sent to the directory task
pub enum DirectoryCommand {
    CachedServers(String, oneshot::Sender<Option<Vec<ServerRecord>>>),
    DefaultServers(oneshot::Sender<Vec<ServerRecord>>),
    UpdateServerList(String, ServerListRecord, oneshot::Sender<usize>),
    BestServers {
        pubkey: String,
        max_count: usize,
        reply: oneshot::Sender<Vec<ServerRef>>,
    },
    /// Health updates carry no reply; senders never wait on them
    RecordSuccess(ServerRef),
    RecordFailure(ServerRef),
    Sweep(oneshot::Sender<usize>),
    ClearCache(oneshot::Sender<()>),
    Shutdown,
}

/// Handle to the task that owns the [`ServerDirectory`].
/// Every read and health update is a message, so the directory has exactly
/// one writer.
#[derive(Clone)]
pub struct DirectoryHandle {
    tx: mpsc::Sender<DirectoryCommand>,
    relay: Arc<dyn RelayClient>,
}

impl DirectoryHandle {
    /// Spawn the directory task. Must be called from within a tokio runtime.
    pub fn spawn(mut directory: ServerDirectory, relay: Arc<dyn RelayClient>) -> Self {
        let (tx, mut rx) = mpsc::channel::<DirectoryCommand>(256);

        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    DirectoryCommand::CachedServers(pubkey, reply) => {
                        let _ = reply.send(directory.cached_servers(&pubkey, Instant::now()));
                    }
                    DirectoryCommand::DefaultServers(reply) => {
                        let _ = reply.send(directory.default_servers());
                    }
                    DirectoryCommand::UpdateServerList(pubkey, record, reply) => {
                        let count = directory.update_server_list(&pubkey, &record, Instant::now());
                        let _ = reply.send(count);
                    }
                    DirectoryCommand::BestServers { pubkey, max_count, reply } => {
                        let _ = reply.send(directory.best_servers(&pubkey, max_count, Instant::now()));
                    }
                    DirectoryCommand::RecordSuccess(server) => {
                        if !directory.record_success(&server, Instant::now()) {
                            tracing::debug!("Dropped success for stale reference to {}", server.url);
                        }
                    }
                    DirectoryCommand::RecordFailure(server) => {
                        if !directory.record_failure(&server, Instant::now()) {
                            tracing::debug!("Dropped failure for stale reference to {}", server.url);
                        }
                    }
                    DirectoryCommand::Sweep(reply) => {
                        let removed = directory.sweep(Instant::now());
                        if removed > 0 {
                            tracing::debug!("Swept {} expired server lists", removed);
                        }
                        let _ = reply.send(removed);
                    }
                    DirectoryCommand::ClearCache(reply) => {
                        directory.clear();
                        let _ = reply.send(());
                    }
                    DirectoryCommand::Shutdown => {
                        tracing::info!("Directory task shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx, relay }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> DirectoryCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| anyhow!("Directory task is not running"))?;
        rx.await.context("Directory task dropped the request")
    }

    async fn notify(&self, cmd: DirectoryCommand) -> Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| anyhow!("Directory task is not running"))
    }

    /// Copies of a user's servers. On a cache miss the relay client is asked
    /// for a fresh record; without one the default servers are returned.
    pub async fn user_servers(&self, pubkey: &str) -> Result<Vec<ServerRecord>> {
        let key = pubkey.to_string();
        if let Some(servers) = self
            .request(|reply| DirectoryCommand::CachedServers(key, reply))
            .await?
        {
            return Ok(servers);
        }

        match self.relay.fetch_server_list(pubkey).await {
            Ok(Some(record)) => {
                if self.update_server_list(pubkey, record).await? > 0 {
                    let key = pubkey.to_string();
                    if let Some(servers) = self
                        .request(|reply| DirectoryCommand::CachedServers(key, reply))
                        .await?
                    {
                        return Ok(servers);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Failed to fetch server list for {}: {:#}", pubkey, e);
            }
        }

        self.request(DirectoryCommand::DefaultServers).await
    }

    /// Store a server-list record for a user. Returns the number of servers kept.
    pub async fn update_server_list(&self, pubkey: &str, record: ServerListRecord) -> Result<usize> {
        let key = pubkey.to_string();
        self.request(|reply| DirectoryCommand::UpdateServerList(key, record, reply))
            .await
    }

    /// Best servers for a user, as references for health updates
    pub async fn best_servers(&self, pubkey: &str, max_count: usize) -> Result<Vec<ServerRef>> {
        let pubkey = pubkey.to_string();
        self.request(|reply| DirectoryCommand::BestServers {
            pubkey,
            max_count,
            reply,
        })
        .await
    }

    /// Queue a success for `server`. Applied before any later request, but
    /// the caller does not wait for it.
    pub async fn record_success(&self, server: ServerRef) -> Result<()> {
        self.notify(DirectoryCommand::RecordSuccess(server)).await
    }

    /// Queue a failure for `server`, see [`Self::record_success`]
    pub async fn record_failure(&self, server: ServerRef) -> Result<()> {
        self.notify(DirectoryCommand::RecordFailure(server)).await
    }

    /// Drop expired server lists. Returns the number removed.
    pub async fn sweep(&self) -> Result<usize> {
        self.request(DirectoryCommand::Sweep).await
    }

    pub async fn clear_cache(&self) -> Result<()> {
        self.request(DirectoryCommand::ClearCache).await
    }

    /// Health probe for a single server.
    ///
    /// Placeholder: invalid URLs are unhealthy, everything else reports
    /// healthy after a short simulated delay. No request is made.
    pub async fn check_server_health(&self, server_url: &str) -> bool {
        if let Err(e) = validate_server_url(server_url) {
            tracing::debug!("Health check rejected: {:#}", e);
            return false;
        }
        tokio::time::sleep(HEALTH_PROBE_DELAY).await;
        true
    }

    /// Stop the directory task
    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(DirectoryCommand::Shutdown)
            .await
            .map_err(|_| anyhow!("Directory task is not running"))?;
        Ok(())
    }
}

/// Periodic sweep of expired server lists, independent of lookups
pub async fn run(
    directory: DirectoryHandle,
    sweep_interval: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let mut sweep_interval = tokio::time::interval(sweep_interval);

    loop {
        tokio::select! {
            _ = sweep_interval.tick() => {
                if let Err(e) = directory.sweep().await {
                    tracing::error!("Failed to sweep server lists: {}", e);
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Directory sweeper shutting down");
                break;
            }
        }
    }

    Ok(())
}
