//! Remote API ingestion adapter.
//!
//! Fetches a JSON array of price records with bounded retries and
//! exponential backoff, then runs it through the normalizer and cleaner.
//!
//! Retry policy:
//! - network errors, non-2xx statuses and undecodable bodies are transient:
//!   after failed attempt `n` (1-based) the adapter waits `2^n` seconds, as
//!   long as attempts remain
//! - a body that decodes but is not an array is a contract violation and
//!   fails immediately with [`DataError::Format`]
//! - once `max_retries` attempts have failed, the last failure is returned
//!   inside [`DataError::Fetch`]
//! - a cancel token is checked before every attempt and interrupts a
//!   backoff wait in progress
//!
//! The adapter never touches pipeline state; callers commit the result only
//! on success.

use super::backoff::{exponential_delay, Backoff, CancelToken, ThreadSleep};
use super::clean::{clean, CleanReport};
use super::normalize::normalize_batch;
use super::provider::{AttemptError, DataError};
use super::schema::Dataset;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// One HTTP GET returning a decoded JSON body.
///
/// Abstracted so tests can script failures without a network.
pub trait HttpTransport: Send + Sync {
    fn get_json(
        &self,
        url: &str,
        params: &[(String, String)],
        timeout: Duration,
    ) -> Result<Value, AttemptError>;
}

/// Blocking `reqwest` transport.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("pricelab/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get_json(
        &self,
        url: &str,
        params: &[(String, String)],
        timeout: Duration,
    ) -> Result<Value, AttemptError> {
        let resp = self
            .client
            .get(url)
            .query(params)
            .timeout(timeout)
            .send()
            .map_err(|e| AttemptError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AttemptError::Status {
                status: status.as_u16(),
            });
        }

        resp.json::<Value>()
            .map_err(|e| AttemptError::Body(e.to_string()))
    }
}

/// Parameters of one API ingestion call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub url: String,
    pub params: Vec<(String, String)>,
    pub max_retries: u32,
    pub timeout: Duration,
}

impl ApiRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: Vec::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// API ingestion adapter: transport plus backoff strategy.
pub struct ApiClient {
    transport: Box<dyn HttpTransport>,
    backoff: Box<dyn Backoff>,
}

impl ApiClient {
    pub fn new(transport: Box<dyn HttpTransport>, backoff: Box<dyn Backoff>) -> Self {
        Self { transport, backoff }
    }

    /// Real network transport with real sleeping backoff.
    pub fn with_reqwest() -> Result<Self, reqwest::Error> {
        Ok(Self::new(Box::new(ReqwestTransport::new()?), Box::new(ThreadSleep)))
    }

    /// Fetch the raw record array, retrying transient failures.
    pub fn fetch_records(
        &self,
        req: &ApiRequest,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<Value>, DataError> {
        let max_attempts = req.max_retries.max(1);
        let mut attempt = 0;

        loop {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                warn!(url = %req.url, attempts = attempt, "fetch cancelled");
                return Err(DataError::Cancelled { attempts: attempt });
            }
            attempt += 1;
            debug!(url = %req.url, attempt, max_attempts, "fetching");

            match self.transport.get_json(&req.url, &req.params, req.timeout) {
                Ok(Value::Array(items)) => return Ok(items),
                Ok(other) => {
                    return Err(DataError::Format(format!(
                        "expected a JSON array of records, got {}",
                        json_kind(&other)
                    )));
                }
                Err(e) => {
                    if attempt >= max_attempts {
                        error!(url = %req.url, attempts = attempt, error = %e, "fetch failed, retries exhausted");
                        return Err(DataError::Fetch {
                            attempts: attempt,
                            last: e,
                        });
                    }
                    let delay = exponential_delay(attempt);
                    warn!(
                        url = %req.url,
                        attempt,
                        error = %e,
                        retry_in_secs = delay.as_secs(),
                        "fetch attempt failed"
                    );
                    self.backoff.wait(delay, cancel);
                }
            }
        }
    }

    /// Fetch, normalize, sort and clean into a Dataset.
    pub fn fetch_dataset(
        &self,
        req: &ApiRequest,
        cancel: Option<&CancelToken>,
    ) -> Result<(Dataset, CleanReport), DataError> {
        let records = self.fetch_records(req, cancel)?;
        let mut batch = normalize_batch(&records);
        if batch.dropped > 0 {
            warn!(
                dropped = batch.dropped,
                total = records.len(),
                "dropped unusable API records"
            );
        }
        batch.points.sort_by_key(|p| p.timestamp);
        let (dataset, report) = clean(&batch.points)?;
        info!(url = %req.url, points = dataset.len(), "fetched price series from API");
        Ok((dataset, report))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
