//! Client for the iptv-org style metadata API
//!
//! Each metadata kind is published as a JSON array at `{base}/{kind}.json`.

use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::errors::{SourceError, SourceResult};
use crate::models::MetadataKind;

#[derive(Debug, Clone)]
pub struct IptvApiClient {
    client: Client,
    base_url: String,
}

impl IptvApiClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> SourceResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("iptv-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| SourceError::Request {
                url: base_url.clone(),
                source,
            })?;
        Ok(Self { client, base_url })
    }

    pub fn url_for(&self, kind: MetadataKind) -> String {
        format!("{}/{}.json", self.base_url, kind.resource())
    }

    /// Fetch every record of `kind`
    pub async fn fetch(&self, kind: MetadataKind) -> SourceResult<Vec<serde_json::Value>> {
        let url = self.url_for(kind);
        debug!("Fetching {} from {}", kind, url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| SourceError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                url,
            });
        }

        let body: serde_json::Value = response.json().await.map_err(|e| SourceError::ParseError {
            kind: kind.to_string(),
            message: e.to_string(),
        })?;

        match body {
            serde_json::Value::Array(records) => {
                debug!("Fetched {} {} records", records.len(), kind);
                Ok(records)
            }
            other => Err(SourceError::ParseError {
                kind: kind.to_string(),
                message: format!("expected a JSON array, got {}", json_type(&other)),
            }),
        }
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
