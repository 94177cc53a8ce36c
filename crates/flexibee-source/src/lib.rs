//! Flexibee REST source for flexibee-sync.
//!
//! - [`FlexibeeClient`] fetches pages of records and field schemas over HTTP
//!   with bounded, cancellation-aware retries ([`RetryPolicy`]).
//! - [`Paginator`] drains one collection page by page through any
//!   [`SourceClient`].
//! - [`models`] decodes the `winstrom` envelopes, tolerating string-typed
//!   numbers and booleans.

pub mod client;
pub mod error;
pub mod models;
pub mod pagination;
pub mod retry;

pub use client::{FlexibeeClient, FlexibeeConfig};
pub use error::SourceError;
pub use pagination::{Paginator, DEFAULT_PAGE_SIZE};
pub use retry::RetryPolicy;

use async_trait::async_trait;
use sync_core::{FieldDescriptor, Page};
use tokio_util::sync::CancellationToken;

/// Options for a single page fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Page size; 0 lets the paginator pick its default
    pub limit: u32,
    /// Offset of the first record
    pub start: u64,
    /// Server-side filter expression
    pub filter: Option<String>,
    /// Detail level, e.g. `full`
    pub detail: Option<String>,
    /// Ask the server to report the total matching row count
    pub add_row_count: bool,
}

impl FetchOptions {
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Trait for a paginated record source.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch one page of records of `entity`.
    async fn fetch_page(
        &self,
        entity: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<Page, SourceError>;

    /// Fetch the field definitions of `entity`.
    async fn fetch_fields(
        &self,
        entity: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<FieldDescriptor>, SourceError>;
}
