use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone};
use thiserror::Error;

use crate::config::ApiCredentials;

/// Amplitude EU residency export endpoint.
pub const EXPORT_URL: &str = "https://analytics.eu.amplitude.com/api/2/export";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Error {status}: {body}")]
    Status { status: u16, body: String },
}

/// Trailing export window, truncated to hour boundaries. The API takes
/// `start`/`end` query parameters formatted as `YYYYMMDD'T'HH`; the window
/// opens at hour 00 of the start day and closes at hour 23 of the end day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportWindow {
    pub start: String,
    pub end: String,
}

impl ExportWindow {
    /// Window covering the last `days` days up to `now`.
    pub fn trailing<Tz: TimeZone>(days: i64, now: DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        let start = now.clone() - Duration::days(days);
        ExportWindow {
            start: start.format("%Y%m%dT00").to_string(),
            end: now.format("%Y%m%dT23").to_string(),
        }
    }
}

/// Client for the export endpoint. One authenticated GET per fetch, no
/// retries; a non-200 response is surfaced with its status and body text.
pub struct ExportClient {
    http: reqwest::Client,
    base_url: String,
    credentials: ApiCredentials,
}

impl ExportClient {
    pub fn new(credentials: ApiCredentials) -> Result<Self, ExportError> {
        Self::with_base_url(credentials, EXPORT_URL)
    }

    /// Point the client at a different endpoint (used by tests).
    pub fn with_base_url(
        credentials: ApiCredentials,
        base_url: impl Into<String>,
    ) -> Result<Self, ExportError> {
        let http = reqwest::Client::builder().build()?;
        Ok(ExportClient {
            http,
            base_url: base_url.into(),
            credentials,
        })
    }

    /// Fetch the export archive for `window`. The body is the raw zip bytes.
    pub async fn fetch(&self, window: &ExportWindow) -> Result<Bytes, ExportError> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[("start", window.start.as_str()), ("end", window.end.as_str())])
            .basic_auth(&self.credentials.api_key, Some(&self.credentials.secret_key))
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ExportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes().await?)
    }
}
