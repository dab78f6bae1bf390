//! Synthesized snapshot for offline/UI testing

use chrono::{Local, Timelike};
use rand::Rng;

use crate::usage::models::{HistoryPoint, QuotaItem, Quotas, Totals, UsageSnapshot};

/// Build a pseudo-random snapshot shaped like a real one
///
/// Used when mock mode is enabled: no network call, no normalization.
/// Distribution is deliberately unspecified; only the shape is stable.
pub fn mock_snapshot(platform: &str) -> UsageSnapshot {
    let mut rng = rand::thread_rng();

    // 24 hourly points ending at the current hour
    let now = Local::now();
    let history: Vec<HistoryPoint> = (0..24i64)
        .map(|i| {
            let time = now - chrono::Duration::hours(23 - i);
            let label = format!("{:02}:00", time.hour());
            HistoryPoint::new(label, rng.gen_range(0..100))
        })
        .collect();

    let totals = Totals {
        calls: rng.gen_range(0..1000),
        tokens: rng.gen_range(0..5_000_000),
    };

    let mcp_pct = rng.gen_range(0..100) as f64;
    let t5h_pct = rng.gen_range(0..100) as f64;

    UsageSnapshot {
        platform: platform.to_string(),
        fetched_at_ms: chrono::Utc::now().timestamp_millis(),
        totals,
        quotas: Quotas {
            mcp: QuotaItem::new(mcp_pct * 40.0, 4000.0, mcp_pct),
            token5h: QuotaItem::new(0.0, 0.0, t5h_pct),
        },
        history,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Shape assertions only; the values are random by design.
    #[test]
    fn test_mock_snapshot_shape() {
        let snap = mock_snapshot("Z.AI");
        assert_eq!(snap.platform, "Z.AI");
        assert_eq!(snap.history.len(), 24);
        assert!(snap.is_ok());
        assert!((0.0..=100.0).contains(&snap.quotas.mcp.percent));
        assert!((0.0..=100.0).contains(&snap.quotas.token5h.percent));
        assert_eq!(snap.quotas.mcp.total, 4000.0);
        for point in &snap.history {
            assert_eq!(point.label.len(), 5);
            assert!(point.label.ends_with(":00"));
        }
    }
}
