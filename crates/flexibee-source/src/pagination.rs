//! Lazy page-by-page drain of one collection.

use sync_core::Page;
use tokio_util::sync::CancellationToken;

use crate::{FetchOptions, SourceClient, SourceError};

/// Page size used when the options leave it unset.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Iterates the pages of one entity.
///
/// Stops after an empty page, a page shorter than the page size, or once the
/// records fetched reach the total reported by the source. After that every
/// call to [`next`](Self::next) returns `None` without contacting the source.
/// A failed fetch leaves the position unchanged.
pub struct Paginator<'a, C: SourceClient + ?Sized> {
    client: &'a C,
    entity: String,
    options: FetchOptions,
    fetched: u64,
    total: Option<u64>,
    done: bool,
}

impl<'a, C: SourceClient + ?Sized> Paginator<'a, C> {
    pub fn new(client: &'a C, entity: impl Into<String>, mut options: FetchOptions) -> Self {
        if options.limit == 0 {
            options.limit = DEFAULT_PAGE_SIZE;
        }
        options.add_row_count = true;
        let fetched = options.start;
        Self {
            client,
            entity: entity.into(),
            options,
            fetched,
            total: None,
            done: false,
        }
    }

    /// Fetch the next page, or `None` once the collection is drained.
    pub async fn next(&mut self, cancel: &CancellationToken) -> Result<Option<Page>, SourceError> {
        if self.done {
            return Ok(None);
        }

        let mut options = self.options.clone();
        options.start = self.fetched;
        let page = self
            .client
            .fetch_page(&self.entity, &options, cancel)
            .await?;

        if self.total.is_none() {
            self.total = page.total;
        }

        let count = page.len() as u64;
        if count == 0 {
            self.done = true;
            return Ok(None);
        }

        self.fetched += count;
        if count < u64::from(self.options.limit) || self.total.is_some_and(|t| self.fetched >= t) {
            self.done = true;
        }

        Ok(Some(page))
    }

    /// Records fetched so far.
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn page_size(&self) -> u32 {
        self.options.limit
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}
