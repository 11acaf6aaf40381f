//! HTTP terminal gateway client.
//!
//! Talks to a BDH (historical data) gateway sitting in front of the market-data
//! terminal:
//! - `POST {endpoint}/bdh` with `{tickers, fields, start_date, end_date, options}`
//! - `GET {endpoint}/ping` for the startup connectivity probe
//!
//! One HTTP request per call and no retries here; every transport, status and
//! payload failure is folded into `TerminalError`.

use super::terminal::{DataTerminal, SeriesBatch, TerminalError, TerminalOptions};
use crate::domain::{Observation, TimeSeries};
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Seconds to assume when a 429 carries no usable `retry-after` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Longest slice of an error body carried into a `TerminalError`.
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Serialize)]
struct BdhRequest<'a> {
    tickers: &'a [String],
    fields: [&'a str; 1],
    start_date: String,
    end_date: String,
    options: &'a TerminalOptions,
}

#[derive(Debug, Deserialize)]
struct BdhResponse {
    #[serde(default)]
    data: HashMap<String, Vec<BdhPoint>>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BdhPoint {
    date: NaiveDate,
    value: Option<f64>,
}

/// Blocking client for the terminal's HTTP gateway.
pub struct HttpTerminal {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpTerminal {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, TerminalError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("atlas/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TerminalError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn bdh_url(&self) -> String {
        format!("{}/bdh", self.endpoint)
    }

    fn ping_url(&self) -> String {
        format!("{}/ping", self.endpoint)
    }
}

impl DataTerminal for HttpTerminal {
    fn name(&self) -> &str {
        "http_gateway"
    }

    fn fetch_series(
        &self,
        symbols: &[String],
        field: &str,
        start: NaiveDate,
        end: NaiveDate,
        options: &TerminalOptions,
    ) -> Result<SeriesBatch, TerminalError> {
        let body = BdhRequest {
            tickers: symbols,
            fields: [field],
            start_date: start.format("%Y-%m-%d").to_string(),
            end_date: end.format("%Y-%m-%d").to_string(),
            options,
        };

        let resp = self
            .client
            .post(self.bdh_url())
            .json(&body)
            .send()
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let text = resp.text().unwrap_or_default();
            return Err(classify_status(status, retry_after, &text));
        }

        let text = resp.text().map_err(transport_error)?;
        parse_response(&text)
    }

    fn is_available(&self) -> bool {
        match self.client.get(self.ping_url()).send() {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                log::debug!("terminal ping returned HTTP {}", resp.status());
                false
            }
            Err(e) => {
                log::debug!("terminal ping failed: {e}");
                false
            }
        }
    }
}

fn transport_error(e: reqwest::Error) -> TerminalError {
    if e.is_connect() || e.is_timeout() {
        TerminalError::Unreachable(e.to_string())
    } else {
        TerminalError::Other(e.to_string())
    }
}

/// Map a non-success HTTP status onto a terminal error.
fn classify_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> TerminalError {
    let detail = truncate(body.trim(), MAX_ERROR_BODY);
    match status {
        StatusCode::TOO_MANY_REQUESTS => TerminalError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            TerminalError::AuthenticationRequired(format!("HTTP {status}: {detail}"))
        }
        s if s.is_client_error() => TerminalError::Rejected(format!("HTTP {s}: {detail}")),
        s => TerminalError::Other(format!("HTTP {s}: {detail}")),
    }
}

/// Parse a BDH response body into series keyed by terminal symbol.
fn parse_response(body: &str) -> Result<SeriesBatch, TerminalError> {
    let resp: BdhResponse = serde_json::from_str(body)
        .map_err(|e| TerminalError::ResponseFormat(format!("invalid BDH response: {e}")))?;

    if let Some(err) = resp.error {
        return Err(TerminalError::Rejected(err));
    }

    Ok(resp
        .data
        .into_iter()
        .map(|(symbol, points)| {
            let series: TimeSeries = points
                .into_iter()
                .filter_map(|p| {
                    p.value
                        .filter(|v| v.is_finite())
                        .map(|v| Observation::new(p.date, v))
                })
                .collect();
            (symbol, series)
        })
        .collect())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
