//! Page source trait and structured fetch errors.
//!
//! The PageSource trait abstracts over the upstream paginated API so the
//! paginator can be driven by the HTTP implementation in production and by
//! in-memory fakes in tests.

pub mod http;
pub mod paginate;
pub mod retry;

pub use http::HttpPageSource;
pub use paginate::{FetchSummary, Fetcher, Paginator};
pub use retry::RetryPolicy;

use thiserror::Error;

/// An untyped JSON object as returned by the upstream source.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Errors from fetching a single page.
///
/// Only `Transient` errors are retried.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// Network failure, timeout, rate limit or server-side error.
    #[error("transient fetch error on page {page}: {reason}")]
    Transient { page: u32, reason: String },

    /// Malformed response or non-retryable status.
    #[error("fatal fetch error on page {page}: {reason}")]
    Fatal { page: u32, reason: String },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    pub fn page(&self) -> u32 {
        match self {
            FetchError::Transient { page, .. } | FetchError::Fatal { page, .. } => *page,
        }
    }
}

/// One page of upstream records.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    pub records: Vec<RawRecord>,
    pub page: u32,
    /// True iff the page came back full. The upstream offers no cursor, so a
    /// final page that is exactly full costs one extra empty request.
    pub has_more: bool,
}

impl PageResult {
    pub fn new(records: Vec<RawRecord>, page: u32, page_size: u32) -> Self {
        let has_more = records.len() == page_size as usize;
        Self {
            records,
            page,
            has_more,
        }
    }
}

/// Trait for upstream paginated sources.
///
/// Implementations perform exactly one request per call; retrying is the
/// caller's concern.
pub trait PageSource: Send + Sync {
    /// Human-readable name of this source, used in logs.
    fn name(&self) -> &str;

    /// Fetch one page (1-indexed) of at most `page_size` records.
    fn fetch_page(&self, page: u32, page_size: u32) -> Result<PageResult, FetchError>;
}

impl<S: PageSource + ?Sized> PageSource for &S {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch_page(&self, page: u32, page_size: u32) -> Result<PageResult, FetchError> {
        (**self).fetch_page(page, page_size)
    }
}
