// src/clients/retrieval.rs

//! HTTP client for the retrieval backend.

use async_trait::async_trait;
use serde::Deserialize;

use crate::clients::RetrievalClient;
use crate::error::{AppError, Result};
use crate::models::{HttpConfig, RetrievalConfig, RetrievalHit, RetrievalRequest};
use crate::utils::http::{create_async_client, endpoint};

const SERVICE: &str = "retrieval";

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RetrievalHit>,
}

/// Queries the backend with `POST {base_url}/query`.
#[derive(Clone)]
pub struct HttpRetrievalClient {
    client: reqwest::Client,
    query_url: String,
}

impl HttpRetrievalClient {
    pub fn new(http: &HttpConfig, config: &RetrievalConfig) -> Result<Self> {
        Ok(Self::with_client(create_async_client(http)?, config))
    }

    pub fn with_client(client: reqwest::Client, config: &RetrievalConfig) -> Self {
        Self {
            client,
            query_url: endpoint(&config.base_url, "query"),
        }
    }
}

#[async_trait]
impl RetrievalClient for HttpRetrievalClient {
    async fn search(&self, request: &RetrievalRequest) -> Result<Vec<RetrievalHit>> {
        log::debug!(
            "Querying retrieval ({} mode, {} allowed urls)",
            request.mode,
            request.allowed_urls.len()
        );

        let response = self
            .client
            .post(&self.query_url)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::collaborator(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::collaborator(
                SERVICE,
                format!("HTTP {}", status.as_u16()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::collaborator(SERVICE, e))?;
        parse_response(&body)
    }
}

fn parse_response(body: &str) -> Result<Vec<RetrievalHit>> {
    let parsed: SearchResponse = serde_json::from_str(body)
        .map_err(|e| AppError::collaborator(SERVICE, format!("malformed response: {e}")))?;
    Ok(parsed.results)
}
