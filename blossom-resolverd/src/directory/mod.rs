pub mod parse;
pub mod record;

use std::collections::HashMap;
use std::time::Duration;
use anyhow::{Context, Result};
use tokio::time::Instant;
use url::Url;
use shared::protocol::SERVER_LIST_KIND;
use shared::types::ServerListRecord;
use crate::config::DirectoryConfig;
use self::parse::{parse_server_tags, validate_server_url};
use self::record::ServerRecord;

pub use self::record::UNAVAILABLE_AFTER_FAILURES;

/// Which list a [`ServerRef`] points into. User entries carry the
/// generation they were created with, so a reference taken before an entry
/// was replaced or expired can never touch its successor.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Default,
    User { pubkey: String, generation: u64 },
}

/// Reference to a canonical server record, handed out by
/// [`ServerDirectory::best_servers`]. Health updates made through it land on
/// the record the directory itself ranks with.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerRef {
    pub url: Url,
    /// Score at the time the reference was handed out
    pub health_score: f64,
    slot: Slot,
    index: usize,
}

struct DirectoryEntry {
    servers: Vec<ServerRecord>,
    cached_at: Instant,
    generation: u64,
}

/// Per-user server lists with TTL expiry, health ranking and default
/// fallback. Not synchronised; owned by a single task
/// (see [`crate::directory_manager::DirectoryHandle`]).
pub struct ServerDirectory {
    server_list_ttl: Duration,
    max_servers_per_user: usize,
    defaults: Vec<ServerRecord>,
    entries: HashMap<String, DirectoryEntry>,
    next_generation: u64,
}

impl ServerDirectory {
    pub fn new(config: &DirectoryConfig) -> Result<Self> {
        let defaults = config
            .default_servers
            .iter()
            .map(|raw| {
                validate_server_url(raw)
                    .with_context(|| format!("Invalid default server: {}", raw))
                    .map(|url| ServerRecord::new(url, Some("default".to_string())))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            server_list_ttl: config.server_list_ttl(),
            max_servers_per_user: config.max_servers_per_user,
            defaults,
            entries: HashMap::new(),
            next_generation: 0,
        })
    }

    /// Copies of a user's cached list, if present and within TTL.
    /// An expired entry is removed on the way.
    pub fn cached_servers(&mut self, pubkey: &str, now: Instant) -> Option<Vec<ServerRecord>> {
        let entry = self.entries.get(pubkey)?;
        if now.saturating_duration_since(entry.cached_at) < self.server_list_ttl {
            return Some(entry.servers.clone());
        }

        tracing::debug!("Server list for {} expired", pubkey);
        self.entries.remove(pubkey);
        None
    }

    /// Copies of the default servers
    pub fn default_servers(&self) -> Vec<ServerRecord> {
        self.defaults.clone()
    }

    /// Replace a user's list from a server-list record. Returns the number
    /// of servers stored; 0 means the record was ignored.
    pub fn update_server_list(
        &mut self,
        pubkey: &str,
        record: &ServerListRecord,
        now: Instant,
    ) -> usize {
        if record.kind != SERVER_LIST_KIND {
            tracing::warn!(
                "Ignoring server list for {}: kind {} is not {}",
                pubkey,
                record.kind,
                SERVER_LIST_KIND
            );
            return 0;
        }

        let mut servers = parse_server_tags(record);
        if servers.is_empty() {
            tracing::warn!("No valid servers in server list for {}", pubkey);
            return 0;
        }
        servers.truncate(self.max_servers_per_user);

        let count = servers.len();
        let generation = self.next_generation;
        self.next_generation += 1;
        self.entries.insert(
            pubkey.to_string(),
            DirectoryEntry {
                servers,
                cached_at: now,
                generation,
            },
        );

        tracing::info!("Updated server list for {} with {} servers", pubkey, count);
        count
    }

    /// Up to `max_count` servers to try for a user, best first.
    ///
    /// Without a cached entry this is the default set in configured order.
    /// Otherwise unavailable servers are dropped and the rest are stable
    /// sorted by descending health score, so ties keep source order.
    pub fn best_servers(&self, pubkey: &str, max_count: usize, now: Instant) -> Vec<ServerRef> {
        let Some(entry) = self.entries.get(pubkey) else {
            return self
                .defaults
                .iter()
                .enumerate()
                .take(max_count)
                .map(|(index, server)| ServerRef {
                    url: server.url.clone(),
                    health_score: server.health_score_at(now),
                    slot: Slot::Default,
                    index,
                })
                .collect();
        };

        let mut candidates: Vec<ServerRef> = entry
            .servers
            .iter()
            .enumerate()
            .filter(|(_, server)| server.is_available)
            .map(|(index, server)| ServerRef {
                url: server.url.clone(),
                health_score: server.health_score_at(now),
                slot: Slot::User {
                    pubkey: pubkey.to_string(),
                    generation: entry.generation,
                },
                index,
            })
            .collect();

        candidates.sort_by(|a, b| b.health_score.total_cmp(&a.health_score));
        candidates.truncate(max_count);
        candidates
    }

    /// Record a successful attempt. Returns false if the reference no longer
    /// points at a live record.
    pub fn record_success(&mut self, server: &ServerRef, now: Instant) -> bool {
        match self.resolve_ref(server) {
            Some(record) => {
                record.mark_success_at(now);
                true
            }
            None => false,
        }
    }

    /// Record a failed attempt. Returns false if the reference no longer
    /// points at a live record.
    pub fn record_failure(&mut self, server: &ServerRef, now: Instant) -> bool {
        match self.resolve_ref(server) {
            Some(record) => {
                record.mark_failure_at(now);
                if !record.is_available {
                    tracing::warn!(
                        "{} taken out of rotation after {} consecutive failures",
                        record.url,
                        record.consecutive_failures
                    );
                }
                true
            }
            None => false,
        }
    }

    fn resolve_ref(&mut self, server: &ServerRef) -> Option<&mut ServerRecord> {
        let record = match &server.slot {
            Slot::Default => self.defaults.get_mut(server.index),
            Slot::User { pubkey, generation } => self
                .entries
                .get_mut(pubkey)
                .filter(|entry| entry.generation == *generation)
                .and_then(|entry| entry.servers.get_mut(server.index)),
        };

        let record = record.filter(|record| record.url == server.url);
        if record.is_none() {
            tracing::debug!("Dropping health update for replaced server {}", server.url);
        }
        record
    }

    /// Remove every entry whose TTL has elapsed. Returns the number removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let ttl = self.server_list_ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.cached_at) < ttl);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached user entries, expired or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
