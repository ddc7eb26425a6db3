pub mod http;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

pub use self::http::HttpTransport;

/// Content returned by a server for a hash
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedBlob {
    pub content: Bytes,
    pub mime_type: String,
}

/// Moves blobs to and from a single storage server.
///
/// Implementations report every failure as an error; the caller decides what
/// a failure means for the server's health.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, server: &Url, hash: &str) -> Result<FetchedBlob>;

    async fn upload(&self, server: &Url, hash: &str, content: Bytes, mime_type: &str)
        -> Result<()>;

    /// Whether the server holds `hash`, without downloading it
    async fn exists(&self, server: &Url, hash: &str) -> Result<bool>;
}

/// Location of `hash` on `server`: the server URL with `hash` appended as a
/// path segment.
pub fn resource_url(server: &Url, hash: &str) -> Result<Url> {
    let mut url = server.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("Server URL cannot have path segments: {}", server))?
        .pop_if_empty()
        .push(hash);
    Ok(url)
}
