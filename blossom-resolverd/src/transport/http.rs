use std::time::Duration;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use url::Url;
use shared::protocol::DEFAULT_MIME_TYPE;
use crate::config::TransportConfig;
use super::{resource_url, FetchedBlob, Transport};

/// [`Transport`] over plain HTTP: GET, PUT and HEAD on `<server>/<hash>`.
/// No retries here; failing over to the next server is the retry.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(&config.user_agent)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, server: &Url, hash: &str) -> Result<FetchedBlob> {
        let url = resource_url(server, hash)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("GET {} returned {}", url, status);
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string();

        let content = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body from {}", url))?;

        Ok(FetchedBlob { content, mime_type })
    }

    async fn upload(
        &self,
        server: &Url,
        hash: &str,
        content: Bytes,
        mime_type: &str,
    ) -> Result<()> {
        let url = resource_url(server, hash)?;
        let response = self
            .client
            .put(url.clone())
            .header(CONTENT_TYPE, mime_type)
            .body(content)
            .send()
            .await
            .with_context(|| format!("PUT {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("PUT {} returned {}", url, status);
        }
        Ok(())
    }

    async fn exists(&self, server: &Url, hash: &str) -> Result<bool> {
        let url = resource_url(server, hash)?;
        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .with_context(|| format!("HEAD {} failed", url))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => bail!("HEAD {} returned {}", url, status),
        }
    }
}
