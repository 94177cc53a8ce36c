//! HTTP client for the Flexibee REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client};
use sync_core::{FieldDescriptor, Page};
use tokio_util::sync::CancellationToken;

use crate::{models, FetchOptions, RetryPolicy, SourceClient, SourceError};

/// Connection settings for a Flexibee company.
#[derive(Debug, Clone)]
pub struct FlexibeeConfig {
    /// Server root, e.g. `https://demo.flexibee.eu:5434`
    pub base_url: String,
    pub company: String,
    pub username: String,
    pub password: String,
    /// Per-request timeout
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct FlexibeeClient {
    http: Client,
    config: FlexibeeConfig,
    retry: RetryPolicy,
}

impl FlexibeeClient {
    pub fn new(config: FlexibeeConfig) -> Result<Self, SourceError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            config,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn company_url(&self) -> String {
        format!(
            "{}/c/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.company
        )
    }

    pub fn records_url(&self, entity: &str) -> String {
        format!("{}/{entity}.json", self.company_url())
    }

    pub fn properties_url(&self, entity: &str) -> String {
        format!("{}/{entity}/properties.json", self.company_url())
    }

    /// GET `url` with retries and return the body of the 2xx response.
    async fn get_with_retry(
        &self,
        operation: &str,
        url: &str,
        query: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<String, SourceError> {
        self.retry
            .run(operation, cancel, |attempt| {
                let request = self
                    .http
                    .get(url)
                    .basic_auth(&self.config.username, Some(&self.config.password))
                    .header(ACCEPT, "application/json")
                    .query(query);
                async move {
                    tracing::debug!(url, attempt, "GET");
                    let response = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(SourceError::Cancelled),
                        response = request.send() => response?,
                    };
                    let status = response.status();
                    let body = response.text().await?;
                    if !status.is_success() {
                        return Err(SourceError::from_status(status.as_u16(), body));
                    }
                    Ok(body)
                }
            })
            .await
    }
}

/// Query parameters for a records request.
fn page_query(options: &FetchOptions) -> Vec<(&'static str, String)> {
    let mut query = vec![("limit", options.limit.to_string())];
    if options.start > 0 {
        query.push(("start", options.start.to_string()));
    }
    if let Some(detail) = &options.detail {
        query.push(("detail", detail.clone()));
    }
    if let Some(filter) = &options.filter {
        query.push(("filter", filter.clone()));
    }
    if options.add_row_count {
        query.push(("add-row-count", "true".to_string()));
    }
    query
}

#[async_trait]
impl SourceClient for FlexibeeClient {
    async fn fetch_page(
        &self,
        entity: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<Page, SourceError> {
        let url = self.records_url(entity);
        let body = self
            .get_with_retry(entity, &url, &page_query(options), cancel)
            .await?;
        models::parse_records(entity, &body)
    }

    async fn fetch_fields(
        &self,
        entity: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<FieldDescriptor>, SourceError> {
        let url = self.properties_url(entity);
        let body = self.get_with_retry(entity, &url, &[], cancel).await?;
        models::parse_properties(&body)
    }
}
