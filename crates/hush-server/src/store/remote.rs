use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;

use super::{SecretRecord, SecretStore, StoreError};

/// Client for a remote hush service. Only ever sends the alias and the
/// already-encrypted record; keys stay on this side of the wire.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base: Url,
}

impl HttpStore {
    /// `base` is the service root, e.g. `http://localhost:8080`.
    pub fn new(base: &str) -> anyhow::Result<Self> {
        Self::with_client(Client::new(), base)
    }

    /// Use a preconfigured client (timeouts, proxies, TLS roots).
    pub fn with_client(client: Client, base: &str) -> anyhow::Result<Self> {
        let base = Url::parse(base).with_context(|| format!("invalid server URL: {base}"))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("server URL cannot be a base: {base}");
        }
        Ok(Self { client, base })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

async fn error_text(resp: reqwest::Response) -> String {
    let status = resp.status();
    let body: Value = resp.json().await.unwrap_or_default();
    match body["error"].as_str() {
        Some(e) => format!("server returned {status}: {e}"),
        None => format!("server returned {status}"),
    }
}

#[async_trait]
impl SecretStore for HttpStore {
    async fn insert(&self, record: SecretRecord) -> Result<(), StoreError> {
        let resp = self
            .client
            .post(self.url(&["secrets"]))
            .json(&record)
            .send()
            .await
            .context("HTTP request failed")?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(StoreError::AliasCollision(record.alias)),
            _ => Err(StoreError::Backend(anyhow!(error_text(resp).await))),
        }
    }

    async fn fetch_and_delete(&self, alias: &str) -> Result<SecretRecord, StoreError> {
        let resp = self
            .client
            .delete(self.url(&["secrets", alias]))
            .send()
            .await
            .context("HTTP request failed")?;

        match resp.status() {
            s if s.is_success() => {
                let record = resp.json().await.context("parse secret record")?;
                Ok(record)
            }
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(alias.to_owned())),
            _ => Err(StoreError::Backend(anyhow!(error_text(resp).await))),
        }
    }
}
