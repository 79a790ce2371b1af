//! Document ingestion, retrieval, and liveness — the plain JSON endpoints.

use serde::Deserialize;
use std::path::Path;

use crate::config::{paths, ClientConfig};
use crate::error::{Result, VoxError};
use crate::headers::build_headers;

/// `POST /v1/ingest` response.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestReceipt {
    pub doc_id: String,
    #[serde(default)]
    pub chunks_ingested: u64,
}

/// One retrieval hit from `GET /v1/retrieve`.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrieveHit {
    pub text: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrieveResponse {
    #[serde(default)]
    pub results: Vec<RetrieveHit>,
}

/// Thin client for the non-streaming endpoints.
pub struct RagClient {
    http: reqwest::Client,
    config: ClientConfig,
    session_id: String,
}

impl RagClient {
    pub fn new(http: reqwest::Client, config: ClientConfig, session_id: String) -> Self {
        RagClient {
            http,
            config,
            session_id,
        }
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        build_headers(&self.session_id, None, self.config.auth_token.as_deref())
    }

    /// Upload one document for ingestion (multipart `file` field).
    pub async fn ingest(&self, file: &Path) -> Result<IngestReceipt> {
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let bytes = tokio::fs::read(file).await?;
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(self.config.endpoint(paths::INGEST))
            .headers(self.headers())
            .multipart(form)
            .send()
            .await?;
        decode(response).await
    }

    /// Retrieve the `top_k` chunks most relevant to `query`.
    pub async fn retrieve(&self, query: &str, top_k: u32) -> Result<RetrieveResponse> {
        let top_k = top_k.to_string();
        let response = self
            .http
            .get(self.config.endpoint(paths::RETRIEVE))
            .headers(self.headers())
            .query(&[("q", query), ("top_k", top_k.as_str())])
            .send()
            .await?;
        decode(response).await
    }

    /// Liveness probe. Ok iff the orchestrator answers with success.
    pub async fn health(&self) -> Result<()> {
        let response = self
            .http
            .get(self.config.endpoint(paths::HEALTH))
            .headers(self.headers())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VoxError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(VoxError::Api {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        });
    }
    Ok(response.json().await?)
}
