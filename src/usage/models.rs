//! Data models for GLM usage monitoring

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Cumulative counts for the current measurement window
///
/// The backend defines the window; each fetch is authoritative for its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub calls: u64,
    pub tokens: u64,
}

/// A single metered resource's used/total/percent triple
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct QuotaItem {
    pub used: f64,
    pub total: f64,
    pub percent: f64,
}

impl QuotaItem {
    pub fn new(used: f64, total: f64, percent: f64) -> Self {
        Self { used, total, percent }
    }
}

/// The two quota kinds reported by the quota/limit endpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quotas {
    /// Monthly "time limit" quota; percent is derived from a fractional ratio
    pub mcp: QuotaItem,
    /// Rolling 5-hour token-rate quota; percent is reported verbatim by upstream
    pub token5h: QuotaItem,
}

impl Default for Quotas {
    fn default() -> Self {
        Self {
            mcp: QuotaItem::new(0.0, 4000.0, 0.0),
            token5h: QuotaItem::new(0.0, 100.0, 0.0),
        }
    }
}

/// One point of the rolling 24-hour call history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    /// Time-of-day label ("09:00:00") or the raw upstream string
    pub label: String,
    pub calls: u32,
}

impl HistoryPoint {
    pub fn new(label: impl Into<String>, calls: u32) -> Self {
        Self { label: label.into(), calls }
    }
}

/// Immutable point-in-time usage/quota summary produced by one refresh cycle
///
/// A new snapshot is constructed on every cycle (success, unconfigured, or
/// failure) and atomically replaces the previous one; it is never mutated in
/// place. Consumers use one code path: snapshot present, check `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub platform: String,
    /// Wall-clock time of normalization, epoch milliseconds
    pub fetched_at_ms: i64,
    pub totals: Totals,
    pub quotas: Quotas,
    pub history: Vec<HistoryPoint>,
    /// Set for the unconfigured and fetch-failed states, alongside zeroed metrics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Error marker carried by snapshots produced without a resolvable API token
pub const UNCONFIGURED_ERROR: &str = "API token not configured";

impl UsageSnapshot {
    /// Snapshot for a cycle that found no API token; no network call was made
    pub fn unconfigured(platform: impl Into<String>) -> Self {
        Self::degenerate(platform, UNCONFIGURED_ERROR.to_string())
    }

    /// Snapshot for a cycle whose fetch failed
    pub fn failed(platform: impl Into<String>, message: impl Into<String>) -> Self {
        Self::degenerate(platform, format!("request failed: {}", message.into()))
    }

    fn degenerate(platform: impl Into<String>, error: String) -> Self {
        Self {
            platform: platform.into(),
            fetched_at_ms: Utc::now().timestamp_millis(),
            totals: Totals::default(),
            quotas: Quotas::default(),
            history: Vec::new(),
            error: Some(error),
        }
    }

    /// Whether this snapshot carries usable metrics rather than an error state
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Derive the platform display name from the configured base URL
pub fn platform_for_base_url(base_url: &str) -> &'static str {
    if base_url.contains("z.ai") {
        "Z.AI"
    } else {
        "智谱AI"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_snapshot_defaults() {
        let snap = UsageSnapshot::unconfigured("智谱AI");
        assert_eq!(snap.totals, Totals::default());
        assert_eq!(snap.quotas.mcp, QuotaItem::new(0.0, 4000.0, 0.0));
        assert_eq!(snap.quotas.token5h, QuotaItem::new(0.0, 100.0, 0.0));
        assert!(snap.history.is_empty());
        assert_eq!(snap.error.as_deref(), Some(UNCONFIGURED_ERROR));
        assert!(!snap.is_ok());
    }

    #[test]
    fn test_failed_snapshot_carries_message() {
        let snap = UsageSnapshot::failed("Z.AI", "HTTP 503: upstream down");
        assert_eq!(
            snap.error.as_deref(),
            Some("request failed: HTTP 503: upstream down")
        );
        assert_eq!(snap.quotas, Quotas::default());
    }

    #[test]
    fn test_platform_for_base_url() {
        assert_eq!(
            platform_for_base_url("https://open.bigmodel.cn/api/anthropic"),
            "智谱AI"
        );
        assert_eq!(platform_for_base_url("https://api.z.ai/api/anthropic"), "Z.AI");
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let snap = UsageSnapshot::unconfigured("智谱AI");
        let json = serde_json::to_value(&snap).unwrap();
        assert!(json.get("fetchedAtMs").is_some());
        assert!(json["quotas"].get("token5h").is_some());
    }
}
