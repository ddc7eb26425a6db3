use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use anyhow::{bail, Context, Result};
use crate::directory::parse::validate_server_url;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// A single attempt slower than this counts as failed
    #[serde(default = "default_server_timeout")]
    pub server_timeout_secs: u64,
    /// Budget for a whole resolution, checked between attempts
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_max_servers_to_try")]
    pub max_servers_to_try: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_server_list_ttl")]
    pub server_list_ttl_secs: u64,
    #[serde(default = "default_max_servers_per_user")]
    pub max_servers_per_user: usize,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Fallback servers for users without a cached server list
    #[serde(default)]
    pub default_servers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_server_timeout() -> u64 {
    30
}

fn default_total_timeout() -> u64 {
    120
}

fn default_max_concurrent_requests() -> usize {
    3
}

fn default_max_servers_to_try() -> usize {
    10
}

fn default_server_list_ttl() -> u64 {
    3600
}

fn default_max_servers_per_user() -> usize {
    50
}

fn default_sweep_interval() -> u64 {
    600
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("blossom-resolverd/{}", env!("CARGO_PKG_VERSION"))
}

fn default_listen() -> String {
    "127.0.0.1:8063".to_string()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            server_timeout_secs: default_server_timeout(),
            total_timeout_secs: default_total_timeout(),
            max_concurrent_requests: default_max_concurrent_requests(),
            max_servers_to_try: default_max_servers_to_try(),
        }
    }
}

impl ResolverConfig {
    pub fn server_timeout(&self) -> Duration {
        Duration::from_secs(self.server_timeout_secs)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_secs(self.total_timeout_secs)
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            server_list_ttl_secs: default_server_list_ttl(),
            max_servers_per_user: default_max_servers_per_user(),
            sweep_interval_secs: default_sweep_interval(),
            default_servers: Vec::new(),
        }
    }
}

impl DirectoryConfig {
    pub fn server_list_ttl(&self) -> Duration {
        Duration::from_secs(self.server_list_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?;

        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.resolver.max_concurrent_requests == 0 {
            bail!("resolver.max_concurrent_requests must be greater than zero");
        }
        if self.resolver.max_servers_to_try == 0 {
            bail!("resolver.max_servers_to_try must be greater than zero");
        }
        if self.directory.max_servers_per_user == 0 {
            bail!("directory.max_servers_per_user must be greater than zero");
        }
        if self.directory.sweep_interval_secs == 0 {
            bail!("directory.sweep_interval_secs must be greater than zero");
        }
        for raw in &self.directory.default_servers {
            validate_server_url(raw)
                .with_context(|| format!("Invalid default server: {}", raw))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();

        assert_eq!(config.resolver.server_timeout(), Duration::from_secs(30));
        assert_eq!(config.resolver.total_timeout(), Duration::from_secs(120));
        assert_eq!(config.resolver.max_concurrent_requests, 3);
        assert_eq!(config.resolver.max_servers_to_try, 10);
        assert_eq!(config.directory.server_list_ttl(), Duration::from_secs(3600));
        assert_eq!(config.directory.max_servers_per_user, 50);
        assert!(config.directory.default_servers.is_empty());
        assert_eq!(config.api.listen, "127.0.0.1:8063");
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = Config::from_toml(
            r#"
            [resolver]
            max_concurrent_requests = 5

            [directory]
            server_list_ttl_secs = 60
            default_servers = ["https://blossom.example.com", "http://cdn.example.org/blobs/"]
            "#,
        )
        .unwrap();

        assert_eq!(config.resolver.max_concurrent_requests, 5);
        assert_eq!(config.resolver.max_servers_to_try, 10);
        assert_eq!(config.directory.server_list_ttl_secs, 60);
        assert_eq!(config.directory.default_servers.len(), 2);
    }

    #[test]
    fn test_rejects_invalid_default_server() {
        let result = Config::from_toml(
            r#"
            [directory]
            default_servers = ["ftp://files.example.com"]
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let result = Config::from_toml(
            r#"
            [resolver]
            max_concurrent_requests = 0
            "#,
        );
        assert!(result.is_err());
    }
}
