//! Fetcher and paginator.
//!
//! The fetcher wraps a single page request in the retry policy. The
//! paginator walks pages sequentially from 1, never re-requesting a page once
//! it has been accepted, until a short page or the page ceiling.

use super::retry::RetryPolicy;
use super::{FetchError, PageResult, PageSource, RawRecord};

/// A page source plus the retry policy applied to each request.
pub struct Fetcher<S> {
    source: S,
    policy: RetryPolicy,
}

impl<S: PageSource> Fetcher<S> {
    pub fn new(source: S, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch one page, retrying transient failures with backoff.
    pub fn fetch_page(&self, page: u32, page_size: u32) -> Result<PageResult, FetchError> {
        self.policy.run(
            |attempt| {
                tracing::info!(source = self.source.name(), page, attempt, "fetching page");
                self.source.fetch_page(page, page_size)
            },
            FetchError::is_transient,
        )
    }
}

/// Every record fetched in one run, in page order.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSummary {
    pub records: Vec<RawRecord>,
    pub pages_fetched: u32,
    /// True when the run stopped at `max_pages` while more data was signalled.
    pub truncated: bool,
}

/// Drives a [`Fetcher`] across pages.
pub struct Paginator<S> {
    fetcher: Fetcher<S>,
    page_size: u32,
    max_pages: Option<u32>,
}

impl<S: PageSource> Paginator<S> {
    /// `page_size` below 1 is raised to 1. A `max_pages` of 0 behaves like 1:
    /// the first page is always fetched.
    pub fn new(fetcher: Fetcher<S>, page_size: u32, max_pages: Option<u32>) -> Self {
        Self {
            fetcher,
            page_size: page_size.max(1),
            max_pages,
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Fetch all pages. Any error that survives the retry policy aborts the
    /// run; records from earlier pages are discarded with it.
    pub fn fetch_all(&self) -> Result<FetchSummary, FetchError> {
        let mut records = Vec::new();
        let mut page = 1u32;
        let mut truncated = false;

        loop {
            let result = self.fetcher.fetch_page(page, self.page_size)?;
            let count = result.records.len();
            records.extend(result.records);

            tracing::info!(page, records = count, total = records.len(), "fetched page");

            if !result.has_more {
                break;
            }

            if let Some(max) = self.max_pages {
                if page >= max {
                    tracing::warn!(max_pages = max, total = records.len(), "reached max_pages limit");
                    truncated = true;
                    break;
                }
            }

            page += 1;
        }

        tracing::info!(total = records.len(), pages = page, "pagination complete");

        Ok(FetchSummary {
            records,
            pages_fetched: page,
            truncated,
        })
    }
}
