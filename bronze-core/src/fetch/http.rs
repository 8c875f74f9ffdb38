//! HTTP page source for JSON APIs paginated with `_page` / `_limit` query
//! parameters.
//!
//! The body of every page must be a JSON array of objects. Status codes are
//! classified up front: 429 and 5xx are transient, every other non-success
//! status is fatal.

use super::{FetchError, PageResult, PageSource, RawRecord};
use crate::config::HttpConfig;
use reqwest::StatusCode;
use serde_json::Value;

/// Blocking HTTP implementation of [`PageSource`].
pub struct HttpPageSource {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpPageSource {
    pub fn new(base_url: impl Into<String>, config: &HttpConfig) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Fatal {
                page: 0,
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl PageSource for HttpPageSource {
    fn name(&self) -> &str {
        &self.base_url
    }

    fn fetch_page(&self, page: u32, page_size: u32) -> Result<PageResult, FetchError> {
        tracing::debug!(url = %self.base_url, page, page_size, "requesting page");

        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("_page", page), ("_limit", page_size)])
            .send()
            .map_err(|e| FetchError::Transient {
                page,
                reason: e.to_string(),
            })?;

        classify_status(page, resp.status())?;

        let body = resp.text().map_err(|e| FetchError::Transient {
            page,
            reason: format!("failed to read body: {e}"),
        })?;

        let records = parse_records(page, &body)?;
        Ok(PageResult::new(records, page, page_size))
    }
}

/// Map a response status onto the fetch error taxonomy.
pub fn classify_status(page: u32, status: StatusCode) -> Result<(), FetchError> {
    if status.is_success() {
        return Ok(());
    }
    let reason = format!("HTTP {status}");
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(FetchError::Transient { page, reason })
    } else {
        Err(FetchError::Fatal { page, reason })
    }
}

/// Parse a page body into raw records.
pub fn parse_records(page: u32, body: &str) -> Result<Vec<RawRecord>, FetchError> {
    let value: Value = serde_json::from_str(body).map_err(|e| FetchError::Fatal {
        page,
        reason: format!("malformed JSON: {e}"),
    })?;

    let Value::Array(items) = value else {
        return Err(FetchError::Fatal {
            page,
            reason: "response body is not a JSON array".into(),
        });
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(map),
            other => Err(FetchError::Fatal {
                page,
                reason: format!("element {i} is not a JSON object: {other}"),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_statuses_pass() {
        assert!(classify_status(1, StatusCode::OK).is_ok());
        assert!(classify_status(1, StatusCode::NO_CONTENT).is_ok());
    }

    #[test]
    fn rate_limit_and_server_errors_are_transient() {
        for status in [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::GATEWAY_TIMEOUT,
        ] {
            let err = classify_status(2, status).unwrap_err();
            assert!(err.is_transient(), "{status} should be transient");
        }
    }

    #[test]
    fn client_errors_are_fatal() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::UNAUTHORIZED,
            StatusCode::FORBIDDEN,
            StatusCode::NOT_FOUND,
        ] {
            let err = classify_status(2, status).unwrap_err();
            assert!(!err.is_transient(), "{status} should be fatal");
        }
    }

    #[test]
    fn parses_array_of_objects() {
        let records = parse_records(1, r#"[{"id": 1, "title": "a"}, {"id": 2}]"#).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["title"], "a");
    }

    #[test]
    fn empty_array_is_empty_page() {
        assert!(parse_records(5, "[]").unwrap().is_empty());
    }

    #[test]
    fn malformed_json_is_fatal() {
        let err = parse_records(1, "{not json").unwrap_err();
        assert!(matches!(err, FetchError::Fatal { page: 1, .. }));
    }

    #[test]
    fn object_body_is_fatal() {
        let err = parse_records(1, r#"{"data": []}"#).unwrap_err();
        assert!(matches!(err, FetchError::Fatal { .. }));
    }

    #[test]
    fn scalar_element_is_fatal() {
        let err = parse_records(3, r#"[{"id": 1}, 42]"#).unwrap_err();
        match err {
            FetchError::Fatal { page, reason } => {
                assert_eq!(page, 3);
                assert!(reason.contains("element 1"));
            }
            other => panic!("expected fatal, got {other:?}"),
        }
    }

    #[test]
    fn client_builds_from_default_config() {
        let source = HttpPageSource::new("http://localhost:9/posts", &HttpConfig::default())
            .unwrap();
        assert_eq!(source.base_url(), "http://localhost:9/posts");
        assert_eq!(source.name(), "http://localhost:9/posts");
    }

    #[test]
    fn unreachable_host_is_transient() {
        // Port 9 (discard) on localhost is closed in test environments.
        let config = HttpConfig {
            timeout_secs: 2,
            ..HttpConfig::default()
        };
        let source = HttpPageSource::new("http://127.0.0.1:9/posts", &config).unwrap();
        let err = source.fetch_page(1, 10).unwrap_err();
        assert!(err.is_transient());
    }
}
