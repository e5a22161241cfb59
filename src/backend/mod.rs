//! Data backend client
//!
//! The backend is an external managed platform: a row-store REST API for the
//! `alerts` and `events` tables plus a callable function that marks an alert
//! dismissed. [`AlertsBackend`] is the seam the poller works against;
//! [`HttpBackend`] is the production implementation, built once at startup
//! and injected (no implicit globals).

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::alerts::{Alert, Event, STATUS_DISMISSED};
use crate::config::ClientConfig;

/// Request timeout for backend calls. Kept below the poll interval so a hung
/// request cannot stack up cycles indefinitely.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors from the data backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid backend URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid api key header")]
    InvalidApiKey,
}

/// Operations the poller needs from the data backend.
pub trait AlertsBackend: Send + Sync {
    /// All non-dismissed alerts for a user, newest first, no limit.
    fn active_alerts(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<Alert>, BackendError>> + Send;

    /// Dismissed alerts for a user, newest first, capped at `limit`.
    fn past_alerts(
        &self,
        user_id: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Alert>, BackendError>> + Send;

    /// Batch lookup of event metadata by id.
    fn events_by_ids(
        &self,
        ids: &[String],
    ) -> impl Future<Output = Result<Vec<Event>, BackendError>> + Send;

    /// Mark one alert dismissed. Dismissing an already-dismissed alert is a
    /// no-op on the remote side.
    fn dismiss_alert(
        &self,
        alert_id: &str,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// Payload for the dismiss-alert callable.
#[derive(Debug, Serialize)]
struct DismissRequest<'a> {
    alert_id: &'a str,
}

/// HTTP client for the managed backend (PostgREST-style rows API plus a
/// functions endpoint).
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, BackendError> {
        let base_url = normalize_base_url(&config.backend_url)?;

        let mut headers = reqwest::header::HeaderMap::new();
        let key = reqwest::header::HeaderValue::from_str(&config.api_key)
            .map_err(|_| BackendError::InvalidApiKey)?;
        let bearer = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| BackendError::InvalidApiKey)?;
        headers.insert("apikey", key);
        headers.insert(reqwest::header::AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self { http, base_url })
    }

    /// Query a table and deserialize the returned rows.
    async fn rows<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, BackendError> {
        let mut url = self.base_url.join(&format!("rest/v1/{}", table))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }

        debug!("backend: GET {}", url);
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

impl AlertsBackend for HttpBackend {
    fn active_alerts(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<Alert>, BackendError>> + Send {
        let query = vec![
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", user_id)),
            ("status", format!("neq.{}", STATUS_DISMISSED)),
            ("order", "created_at.desc".to_string()),
        ];
        async move { self.rows("alerts", &query).await }
    }

    fn past_alerts(
        &self,
        user_id: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Alert>, BackendError>> + Send {
        let query = vec![
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", user_id)),
            ("status", format!("eq.{}", STATUS_DISMISSED)),
            ("order", "created_at.desc".to_string()),
            ("limit", limit.to_string()),
        ];
        async move { self.rows("alerts", &query).await }
    }

    fn events_by_ids(
        &self,
        ids: &[String],
    ) -> impl Future<Output = Result<Vec<Event>, BackendError>> + Send {
        let filter = in_filter(ids);
        async move {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let query = vec![("select", "id,type".to_string()), ("id", filter)];
            self.rows("events", &query).await
        }
    }

    fn dismiss_alert(
        &self,
        alert_id: &str,
    ) -> impl Future<Output = Result<(), BackendError>> + Send {
        async move {
            let url = self.base_url.join("functions/v1/dismiss-alert")?;
            debug!("backend: POST {} (alert_id={})", url, alert_id);
            let response = self
                .http
                .post(url)
                .json(&DismissRequest { alert_id })
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(BackendError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            Ok(())
        }
    }
}

/// Parse the configured base URL and force a trailing slash so `Url::join`
/// appends instead of replacing the last path segment.
pub(crate) fn normalize_base_url(raw: &str) -> Result<Url, BackendError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Ok(Url::parse(&normalized)?)
}

/// PostgREST `in.(...)` filter for a batch of ids. Values are double-quoted
/// so ids containing `,`, `(` or `)` cannot corrupt the filter; embedded
/// quotes and backslashes are escaped per PostgREST's quoting rules.
fn in_filter(ids: &[String]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("\"{}\"", id.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let url = normalize_base_url("https://backend.example.com").unwrap();
        assert_eq!(url.as_str(), "https://backend.example.com/");
        let joined = url.join("rest/v1/alerts").unwrap();
        assert_eq!(joined.as_str(), "https://backend.example.com/rest/v1/alerts");
    }

    #[test]
    fn test_base_url_keeps_existing_path() {
        let url = normalize_base_url("https://backend.example.com/api/").unwrap();
        let joined = url.join("rest/v1/events").unwrap();
        assert_eq!(
            joined.as_str(),
            "https://backend.example.com/api/rest/v1/events"
        );
    }

    #[test]
    fn test_in_filter_joins_ids() {
        let ids = vec!["3".to_string(), "4".to_string()];
        assert_eq!(in_filter(&ids), r#"in.("3","4")"#);
        assert_eq!(in_filter(&["7".to_string()]), r#"in.("7")"#);
    }

    #[test]
    fn test_in_filter_quotes_reserved_characters() {
        let ids = vec!["a,b".to_string(), "c(d)".to_string()];
        assert_eq!(in_filter(&ids), r#"in.("a,b","c(d)")"#);

        let ids = vec![r#"he said "hi""#.to_string()];
        assert_eq!(in_filter(&ids), r#"in.("he said \"hi\"")"#);
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(normalize_base_url("not a url").is_err());
    }
}
