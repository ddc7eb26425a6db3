use std::sync::Arc;
use std::time::Duration;
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::time::Instant;
use url::Url;
use shared::types::ResolutionStatus;
use crate::config::ResolverConfig;
use crate::directory::ServerRef;
use crate::directory_manager::DirectoryHandle;
use crate::transport::{resource_url, Transport};

/// Terminal result of [`ContentResolver::resolve`]
#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    pub status: ResolutionStatus,
    pub content: Bytes,
    pub mime_type: String,
    /// Server that served the content
    pub resolved_url: Option<Url>,
    pub duration: Duration,
    pub error_message: String,
}

impl ResolutionOutcome {
    fn failed(status: ResolutionStatus, message: &str, duration: Duration) -> Self {
        Self {
            status,
            content: Bytes::new(),
            mime_type: String::new(),
            resolved_url: None,
            duration,
            error_message: message.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResolutionStatus::Success
    }
}

/// Result of mirroring one blob. Every server tried appears in exactly one
/// of the two lists.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadOutcome {
    pub succeeded: Vec<Url>,
    pub failed: Vec<UploadFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadFailure {
    pub url: Url,
    pub error: String,
}

/// Finds content on a user's servers and mirrors uploads to them.
pub struct ContentResolver {
    config: ResolverConfig,
    directory: DirectoryHandle,
    transport: Arc<dyn Transport>,
}

impl ContentResolver {
    pub fn new(config: ResolverConfig, directory: DirectoryHandle, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            directory,
            transport,
        }
    }

    /// Fetch `hash` from the user's servers, best first, one at a time.
    ///
    /// The candidate list is taken once up front. Timeouts are only checked
    /// between attempts: an attempt slower than `server_timeout` counts as a
    /// failure once it returns, and no new attempt starts after
    /// `total_timeout`. A transport call that never returns is not interrupted.
    pub async fn resolve(&self, pubkey: &str, hash: &str) -> Result<ResolutionOutcome> {
        let started = Instant::now();
        let server_timeout = self.config.server_timeout();
        let total_timeout = self.config.total_timeout();

        let servers = self
            .directory
            .best_servers(pubkey, self.config.max_servers_to_try)
            .await?;

        if servers.is_empty() {
            tracing::warn!("No servers available for user {}", pubkey);
            return Ok(ResolutionOutcome::failed(
                ResolutionStatus::NotFound,
                "No servers configured",
                started.elapsed(),
            ));
        }

        tracing::info!(
            "Resolving content {} for user {} using {} servers",
            hash,
            pubkey,
            servers.len()
        );

        let mut remaining = servers.into_iter();
        loop {
            let elapsed = started.elapsed();
            if elapsed >= total_timeout {
                tracing::warn!("Content resolution timed out after {:?}", elapsed);
                return Ok(ResolutionOutcome::failed(
                    ResolutionStatus::Timeout,
                    "Resolution timed out",
                    elapsed,
                ));
            }

            let Some(server) = remaining.next() else {
                tracing::warn!("Content {} not found on any server", hash);
                return Ok(ResolutionOutcome::failed(
                    ResolutionStatus::NotFound,
                    "Content not found on any server",
                    elapsed,
                ));
            };

            tracing::info!("Trying server {} for content {}", server.url, hash);
            let attempt_started = Instant::now();
            let result = self.transport.fetch(&server.url, hash).await;
            let attempt = attempt_started.elapsed();

            let result = match result {
                Ok(_) if attempt >= server_timeout => Err(anyhow!(
                    "server took {:?}, limit is {:?}",
                    attempt,
                    server_timeout
                )),
                other => other,
            };

            match result {
                Ok(blob) => {
                    tracing::info!("Content {} resolved from {}", hash, server.url);
                    let resolved_url = server.url.clone();
                    self.record_health(server, true).await;
                    return Ok(ResolutionOutcome {
                        status: ResolutionStatus::Success,
                        content: blob.content,
                        mime_type: blob.mime_type,
                        resolved_url: Some(resolved_url),
                        duration: started.elapsed(),
                        error_message: String::new(),
                    });
                }
                Err(e) => {
                    tracing::warn!("Server {} failed: {:#}", server.url, e);
                    self.record_health(server, false).await;
                }
            }
        }
    }

    /// Mirror a blob to every available server of the user, keeping at most
    /// `max_concurrent_requests` uploads in flight. Returns once every
    /// server has answered.
    pub async fn upload(
        &self,
        pubkey: &str,
        hash: &str,
        content: Bytes,
        mime_type: &str,
    ) -> Result<UploadOutcome> {
        let servers = self.directory.best_servers(pubkey, usize::MAX).await?;
        let mut outcome = UploadOutcome::default();

        if servers.is_empty() {
            tracing::warn!("No servers available for upload by {}", pubkey);
            return Ok(outcome);
        }

        tracing::info!("Uploading content {} to {} servers", hash, servers.len());

        let mut queue = servers.into_iter();
        let mut in_flight = FuturesUnordered::new();
        for server in queue.by_ref().take(self.config.max_concurrent_requests) {
            in_flight.push(self.upload_to_server(server, hash, content.clone(), mime_type));
        }

        while let Some((server, result)) = in_flight.next().await {
            if let Some(next) = queue.next() {
                in_flight.push(self.upload_to_server(next, hash, content.clone(), mime_type));
            }

            match result {
                Ok(()) => {
                    tracing::info!("Upload successful to {}", server.url);
                    outcome.succeeded.push(server.url.clone());
                    self.record_health(server, true).await;
                }
                Err(e) => {
                    tracing::warn!("Upload failed to {}: {:#}", server.url, e);
                    outcome.failed.push(UploadFailure {
                        url: server.url.clone(),
                        error: format!("{:#}", e),
                    });
                    self.record_health(server, false).await;
                }
            }
        }

        tracing::info!(
            "Upload complete: {} successes, {} failures",
            outcome.succeeded.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }

    /// Health bookkeeping never decides the outcome of a call
    async fn record_health(&self, server: ServerRef, success: bool) {
        let url = server.url.clone();
        let recorded = if success {
            self.directory.record_success(server).await
        } else {
            self.directory.record_failure(server).await
        };
        if let Err(e) = recorded {
            tracing::warn!("Failed to record health for {}: {:#}", url, e);
        }
    }

    async fn upload_to_server(
        &self,
        server: ServerRef,
        hash: &str,
        content: Bytes,
        mime_type: &str,
    ) -> (ServerRef, Result<()>) {
        tracing::debug!("Uploading {} to {}", hash, server.url);
        let result = self.transport.upload(&server.url, hash, content, mime_type).await;
        (server, result)
    }

    /// Where `hash` can be fetched from, if anywhere.
    ///
    /// Only the top-ranked server is probed, so content held solely by a
    /// lower-ranked server is reported missing.
    pub async fn check_content_exists(&self, pubkey: &str, hash: &str) -> Result<Option<Url>> {
        let Some(server) = self.directory.best_servers(pubkey, 1).await?.into_iter().next() else {
            return Ok(None);
        };

        match self.transport.exists(&server.url, hash).await {
            Ok(true) => Ok(Some(resource_url(&server.url, hash)?)),
            Ok(false) => Ok(None),
            Err(e) => {
                tracing::warn!("Existence check on {} failed: {:#}", server.url, e);
                Ok(None)
            }
        }
    }
}
