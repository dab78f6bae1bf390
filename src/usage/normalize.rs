//! Normalization of raw metering JSON into a canonical snapshot

use chrono::Utc;
use log::warn;
use serde_json::Value;

use crate::usage::models::{HistoryPoint, QuotaItem, Quotas, Totals, UsageSnapshot};

/// Quota discriminator for the monthly "time limit" (MCP) quota
const TYPE_TIME_LIMIT: &str = "TIME_LIMIT";
/// Quota discriminator for the rolling 5-hour token-rate quota
const TYPE_TOKENS_LIMIT: &str = "TOKENS_LIMIT";

/// Normalize the model-usage and quota/limit payloads into a snapshot
///
/// Pure over its inputs and never fails: missing or malformed optional fields
/// default to zero/empty, and an absent or non-object `data` root is treated
/// as an empty object. `fetched_at_ms` is the normalization wall-clock time,
/// not an upstream timestamp.
pub fn normalize(model: &Value, quota: &Value, platform: &str) -> UsageSnapshot {
    let m_data = data_root(model);
    let q_data = data_root(quota);

    UsageSnapshot {
        platform: platform.to_string(),
        fetched_at_ms: Utc::now().timestamp_millis(),
        totals: extract_totals(m_data),
        quotas: extract_quotas(q_data),
        history: extract_history(m_data),
        error: None,
    }
}

/// Top-level `data` object, or a reference to a shared empty object
fn data_root(payload: &Value) -> &Value {
    static EMPTY: Value = Value::Null;
    match payload.get("data") {
        Some(data) if data.is_object() => data,
        _ => &EMPTY,
    }
}

/// Zip `x_time` with the optional parallel `modelCallCount` array
///
/// Labels keep only the substring after the first space when one is present
/// ("2024-01-01 10:00:00" becomes "10:00:00"); indices past the end of the
/// call-count array get 0 calls. Absent `x_time` means empty history.
fn extract_history(data: &Value) -> Vec<HistoryPoint> {
    let times = match data.get("x_time").and_then(Value::as_array) {
        Some(times) => times,
        None => return Vec::new(),
    };
    let calls = data.get("modelCallCount").and_then(Value::as_array);

    let mut history = Vec::with_capacity(times.len());
    for (i, time) in times.iter().enumerate() {
        let raw = match time.as_str() {
            Some(s) => s,
            None => {
                warn!("Skipping non-string history label at index {}", i);
                continue;
            }
        };
        let label = match raw.split_once(' ') {
            Some((_, rest)) => rest,
            None => raw,
        };
        let count = calls
            .and_then(|c| c.get(i))
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;
        history.push(HistoryPoint::new(label, count));
    }

    history
}

fn extract_totals(data: &Value) -> Totals {
    let usage = data.get("totalUsage");
    Totals {
        calls: u64_field(usage, "totalModelCallCount"),
        tokens: u64_field(usage, "totalTokensUsage"),
    }
}

fn u64_field(obj: Option<&Value>, key: &str) -> u64 {
    obj.and_then(|o| o.get(key)).and_then(Value::as_u64).unwrap_or(0)
}

/// Walk the `limits` array and pick out the two recognized quota kinds
///
/// Entries missing a `type` discriminator are skipped with a log; unknown
/// discriminators are ignored. Kinds that never appear keep their defaults.
fn extract_quotas(data: &Value) -> Quotas {
    let mut quotas = Quotas::default();

    let limits = match data.get("limits").and_then(Value::as_array) {
        Some(limits) => limits,
        None => {
            warn!("No limits array found in quota data");
            return quotas;
        }
    };

    for limit in limits {
        let kind = match limit.get("type").and_then(Value::as_str) {
            Some(kind) => kind,
            None => {
                warn!("Limit entry missing 'type' field: {}", limit);
                continue;
            }
        };

        match kind {
            TYPE_TIME_LIMIT => {
                let used = f64_field(limit, "currentValue", 0.0);
                let total = f64_field(limit, "usage", 4000.0);
                // Upstream reports a 0-1 ratio; half-up to the nearest whole percent
                let percent = (f64_field(limit, "percentage", 0.0) * 100.0).round();
                quotas.mcp = QuotaItem::new(used, total, percent);
            }
            TYPE_TOKENS_LIMIT => {
                // Already a 0-100 value; taken verbatim, never rescaled or rounded
                let percent = f64_field(limit, "percentage", 0.0);
                quotas.token5h = QuotaItem::new(0.0, 0.0, percent);
            }
            _ => {}
        }
    }

    quotas
}

fn f64_field(obj: &Value, key: &str, default: f64) -> f64 {
    obj.get(key).and_then(Value::as_f64).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_history_zips_times_with_calls() {
        let model = json!({
            "data": {
                "x_time": ["2024-01-01 09:00:00", "2024-01-01 10:00:00", "2024-01-01 11:00:00"],
                "modelCallCount": [5, 12, 3]
            }
        });
        let snap = normalize(&model, &json!({}), "智谱AI");
        assert_eq!(
            snap.history,
            vec![
                HistoryPoint::new("09:00:00", 5),
                HistoryPoint::new("10:00:00", 12),
                HistoryPoint::new("11:00:00", 3),
            ]
        );
    }

    #[test]
    fn test_history_label_without_space_kept_verbatim() {
        let model = json!({"data": {"x_time": ["09:00"]}});
        let snap = normalize(&model, &json!({}), "智谱AI");
        assert_eq!(snap.history, vec![HistoryPoint::new("09:00", 0)]);
    }

    #[test]
    fn test_history_calls_default_past_shorter_array() {
        let model = json!({
            "data": {
                "x_time": ["2024-01-01 09:00:00", "2024-01-01 10:00:00"],
                "modelCallCount": [7]
            }
        });
        let snap = normalize(&model, &json!({}), "智谱AI");
        assert_eq!(snap.history[0].calls, 7);
        assert_eq!(snap.history[1].calls, 0);
    }

    #[test]
    fn test_missing_x_time_means_empty_history() {
        let snap = normalize(&json!({"data": {}}), &json!({}), "智谱AI");
        assert!(snap.history.is_empty());
        assert!(snap.is_ok());
    }

    #[test]
    fn test_absent_data_root_defaults_everything() {
        let snap = normalize(&json!("nonsense"), &json!(null), "智谱AI");
        assert_eq!(snap.totals, Totals::default());
        assert_eq!(snap.quotas, Quotas::default());
        assert!(snap.history.is_empty());
        assert!(snap.is_ok());
    }

    #[test]
    fn test_totals_default_missing_keys_to_zero() {
        let model = json!({"data": {"totalUsage": {"totalModelCallCount": 42}}});
        let snap = normalize(&model, &json!({}), "智谱AI");
        assert_eq!(snap.totals, Totals { calls: 42, tokens: 0 });
    }

    #[test]
    fn test_time_limit_percent_rounds_half_up() {
        let quota = |pct: f64| {
            json!({"data": {"limits": [{"type": "TIME_LIMIT", "percentage": pct}]}})
        };
        let snap = normalize(&json!({}), &quota(0.2345), "智谱AI");
        assert_eq!(snap.quotas.mcp.percent, 23.0);
        let snap = normalize(&json!({}), &quota(0.235), "智谱AI");
        assert_eq!(snap.quotas.mcp.percent, 24.0);
        let snap = normalize(&json!({}), &quota(1.0), "智谱AI");
        assert_eq!(snap.quotas.mcp.percent, 100.0);
    }

    #[test]
    fn test_tokens_limit_percent_taken_verbatim() {
        let quota = json!({"data": {"limits": [{"type": "TOKENS_LIMIT", "percentage": 42.7}]}});
        let snap = normalize(&json!({}), &quota, "智谱AI");
        assert_eq!(snap.quotas.token5h, QuotaItem::new(0.0, 0.0, 42.7));
    }

    #[test]
    fn test_limit_entries_without_type_are_skipped() {
        let quota = json!({
            "data": {
                "limits": [
                    {"percentage": 0.5},
                    {"type": "SOMETHING_ELSE", "percentage": 0.9},
                    {"type": "TIME_LIMIT", "currentValue": 10, "usage": 4000, "percentage": 0.01}
                ]
            }
        });
        let snap = normalize(&json!({}), &quota, "智谱AI");
        assert_eq!(snap.quotas.mcp, QuotaItem::new(10.0, 4000.0, 1.0));
        assert_eq!(snap.quotas.token5h, QuotaItem::new(0.0, 100.0, 0.0));
    }

    #[test]
    fn test_end_to_end_scenario() {
        let model = json!({
            "data": {
                "x_time": ["2024-01-01 09:00:00", "2024-01-01 10:00:00"],
                "modelCallCount": [5, 12],
                "totalUsage": {"totalModelCallCount": 17, "totalTokensUsage": 3400}
            }
        });
        let quota = json!({
            "data": {
                "limits": [
                    {"type": "TIME_LIMIT", "currentValue": 120, "usage": 4000, "percentage": 0.03},
                    {"type": "TOKENS_LIMIT", "percentage": 7.5}
                ]
            }
        });

        let snap = normalize(&model, &quota, "智谱AI");

        assert_eq!(snap.platform, "智谱AI");
        assert_eq!(snap.totals, Totals { calls: 17, tokens: 3400 });
        assert_eq!(snap.quotas.mcp, QuotaItem::new(120.0, 4000.0, 3.0));
        assert_eq!(snap.quotas.token5h, QuotaItem::new(0.0, 0.0, 7.5));
        assert_eq!(
            snap.history,
            vec![HistoryPoint::new("09:00:00", 5), HistoryPoint::new("10:00:00", 12)]
        );
        assert!(snap.is_ok());
    }
}
