//! HTTP fetcher for the GLM metering endpoints

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone, Timelike};
use log::{debug, info};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Url;
use serde_json::Value;

const MODEL_USAGE_PATH: &str = "/api/monitor/usage/model-usage";
const TOOL_USAGE_PATH: &str = "/api/monitor/usage/tool-usage";
const QUOTA_LIMIT_PATH: &str = "/api/monitor/usage/quota/limit";

/// Characters left unencoded in query values, matching `java.net.URLEncoder`
/// (the encoding used by the companion clients); spaces become `%20`.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'*');

/// Error type for fetch operations
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("empty response from {0}")]
    EmptyBody(String),
    #[error("invalid JSON response: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Convert a [`reqwest::Error`] into a [`FetchError`]
///
/// Timeout errors map to [`FetchError::Timeout`]; everything else maps to
/// [`FetchError::Network`].
fn from_reqwest(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(e.to_string())
    } else {
        FetchError::Network(e.to_string())
    }
}

/// Parameters for one fetch cycle, resolved fresh from settings each tick
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub base_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
}

/// Raw JSON documents from the two endpoints the normalizer consumes
#[derive(Debug, Clone)]
pub struct RawPayloads {
    pub model: Value,
    pub quota: Value,
}

/// Seam between the coordinator and the network, swappable for test doubles
#[async_trait]
pub trait UsageBackend: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<RawPayloads, FetchError>;
}

/// Fetcher hitting the real metering endpoints
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageFetcher;

/// Derive the metering domain from the configured base URL: keep scheme and
/// host, drop path and port (`https://open.bigmodel.cn/api/anthropic` becomes
/// `https://open.bigmodel.cn`)
pub fn metering_domain(base_url: &str) -> Result<String, FetchError> {
    let url = Url::parse(base_url).map_err(|_| FetchError::InvalidBaseUrl(base_url.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| FetchError::InvalidBaseUrl(base_url.to_string()))?;
    Ok(format!("{}://{}", url.scheme(), host))
}

/// Compute the 24-hour query window around `now`
///
/// Start is 24 hours back with the minute forced to :00, end is now with the
/// minute forced to :59; seconds are preserved in both. The odd truncation is
/// a contract match with the companion VS Code client. A DST gap can make the
/// adjusted minute nonexistent in the local timezone; the unadjusted
/// timestamp is kept in that case.
pub fn query_window<Tz: TimeZone>(now: DateTime<Tz>) -> (DateTime<Tz>, DateTime<Tz>) {
    let day_back = now.clone() - chrono::Duration::days(1);
    let start = day_back.with_minute(0).unwrap_or(day_back);
    let end = now.with_minute(59).unwrap_or(now);
    (start, end)
}

/// Build the encoded `?startTime=...&endTime=...` query string for `now`
pub fn window_query_string(now: DateTime<Local>) -> String {
    let (start, end) = query_window(now);
    format!(
        "?startTime={}&endTime={}",
        encode_query_value(&start.format("%Y-%m-%d %H:%M:%S").to_string()),
        encode_query_value(&end.format("%Y-%m-%d %H:%M:%S").to_string())
    )
}

fn encode_query_value(value: &str) -> String {
    utf8_percent_encode(value, QUERY_VALUE).to_string()
}

impl UsageFetcher {
    async fn request(
        &self,
        client: &reqwest::Client,
        url: &str,
        api_key: &str,
    ) -> Result<Value, FetchError> {
        debug!("Requesting: {}", url);

        let response = client
            .get(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(from_reqwest)?;
        if body.is_empty() {
            return Err(FetchError::EmptyBody(url.to_string()));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl UsageBackend for UsageFetcher {
    /// Issue the three metering GETs and return the model and quota payloads
    ///
    /// The tool-usage response is fetched for request-pattern parity with the
    /// reference client; its body is discarded. No retries happen here; the
    /// coordinator's periodic timer is the retry mechanism.
    async fn fetch(&self, req: &FetchRequest) -> Result<RawPayloads, FetchError> {
        let domain = metering_domain(&req.base_url)?;
        let query = window_query_string(Local::now());

        info!("Fetching usage data from {}", domain);

        let timeout = Duration::from_millis(req.timeout_ms);
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(from_reqwest)?;

        let model = self
            .request(&client, &format!("{}{}{}", domain, MODEL_USAGE_PATH, query), &req.api_key)
            .await?;
        let _tool = self
            .request(&client, &format!("{}{}{}", domain, TOOL_USAGE_PATH, query), &req.api_key)
            .await?;
        let quota = self
            .request(&client, &format!("{}{}{}", domain, QUOTA_LIMIT_PATH, query), &req.api_key)
            .await?;

        Ok(RawPayloads { model, quota })
    }
}
