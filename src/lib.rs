//! GLM Usage Monitor - headless poller for the GLM usage-metering API
//!
//! A [`RefreshCoordinator`](usage::RefreshCoordinator) periodically drives a
//! [`UsageFetcher`](usage::UsageFetcher) against the metering endpoints,
//! normalizes the raw JSON into an immutable [`UsageSnapshot`](usage::UsageSnapshot),
//! and keeps the latest snapshot available for any consumer. Every failure
//! mode (missing token, transport error, malformed payload) still produces a
//! snapshot, so consumers have a single code path.

pub mod usage;

pub use usage::{
    normalize, platform_for_base_url, EnvSettings, FetchError, FetchRequest, HistoryPoint,
    QuotaItem, Quotas, RawPayloads, RefreshCoordinator, Settings, SettingsProvider,
    SnapshotConsumer,
    StaticSettings, Totals, UsageBackend, UsageFetcher, UsageSnapshot, UNCONFIGURED_ERROR,
};
