// src/clients/frontier.rs

//! HTTP client for the crawl frontier.

use async_trait::async_trait;
use serde::Serialize;

use crate::clients::{CrawlMetadata, FrontierClient};
use crate::error::{AppError, Result};
use crate::models::{FrontierConfig, HttpConfig, PageUrl};
use crate::utils::http::{create_async_client, endpoint};

const SERVICE: &str = "frontier";

#[derive(Serialize)]
struct SubmitBody<'a> {
    url: &'a str,
    metadata: &'a CrawlMetadata,
}

/// Submits URLs with `POST {base_url}/urls`.
#[derive(Clone)]
pub struct HttpFrontierClient {
    client: reqwest::Client,
    submit_url: String,
}

impl HttpFrontierClient {
    pub fn new(http: &HttpConfig, config: &FrontierConfig) -> Result<Self> {
        Ok(Self::with_client(create_async_client(http)?, config))
    }

    pub fn with_client(client: reqwest::Client, config: &FrontierConfig) -> Self {
        Self {
            client,
            submit_url: endpoint(&config.base_url, "urls"),
        }
    }
}

#[async_trait]
impl FrontierClient for HttpFrontierClient {
    async fn submit(&self, url: &PageUrl, metadata: &CrawlMetadata) -> Result<()> {
        log::debug!("Submitting {} to frontier", url);

        let response = self
            .client
            .post(&self.submit_url)
            .json(&SubmitBody {
                url: url.as_str(),
                metadata,
            })
            .send()
            .await
            .map_err(|e| AppError::collaborator(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::collaborator(
                SERVICE,
                format!("HTTP {}: {}", status.as_u16(), body.trim()),
            ));
        }
        Ok(())
    }
}
