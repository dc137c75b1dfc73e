//! Test fixtures for metrics records.

use pulse_events::MetricsRecord;
use serde_json::{Value, json};

/// Base timestamp used by fixtures (2023-11-14T22:13:20Z).
pub const BASE_TIMESTAMP: i64 = 1_700_000_000_000;

/// A system metrics payload as the monitoring backend publishes it.
#[must_use]
pub fn sample_metrics_payload(timestamp: i64) -> Value {
    json!({
        "timestamp": timestamp,
        "cpu": { "load": 23.5, "cores": 8, "speed": 3.2 },
        "memory": { "total": 17_179_869_184_u64, "used": 8_589_934_592_u64, "usage": 50.0 },
        "disk": [
            { "total": 512_000_000_000_u64, "used": 256_000_000_000_u64, "usage": 50.0, "mount": "/" },
            { "total": 1_000_000_000_000_u64, "used": 920_000_000_000_u64, "usage": 92.0, "mount": "/data" }
        ],
        "network": { "rxSec": 1_572_864.0, "txSec": 2_048.0 },
        "uptime": 93_784.0
    })
}

/// A system metrics record stamped `timestamp`.
#[must_use]
pub fn sample_metrics(timestamp: i64) -> MetricsRecord {
    MetricsRecord::new(timestamp, sample_metrics_payload(timestamp))
}

/// `count` records spaced `step_ms` apart, starting at `start`.
#[must_use]
pub fn sample_history(start: i64, step_ms: i64, count: usize) -> Vec<MetricsRecord> {
    let mut ts = start;
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        records.push(sample_metrics(ts));
        ts = ts.saturating_add(step_ms);
    }
    records
}
