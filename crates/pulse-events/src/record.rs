//! Value records carried by events.
//!
//! All records are plain data: cloned freely, compared by value, never
//! mutated after construction.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reason attached to the terminal status once retries are exhausted.
pub const REASON_MAX_RECONNECT_ATTEMPTS: &str = "max_reconnect_attempts_reached";

/// Reason attached to the status published when the watchdog finds stale data.
pub const REASON_DATA_TIMEOUT: &str = "data_timeout";

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Errors produced when interpreting a stream payload.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The payload has no numeric `timestamp` field.
    #[error("metrics payload has no numeric 'timestamp' field")]
    MissingTimestamp,

    /// The payload does not match the expected shape.
    #[error("metrics payload has an unexpected shape: {0}")]
    Shape(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// ConnectionStatus
// ---------------------------------------------------------------------------

/// A connection transition, broadcast by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Whether the stream is connected after this transition.
    pub connected: bool,
    /// When the transition happened (ms since epoch).
    pub timestamp: i64,
    /// Why the stream went down, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ConnectionStatus {
    /// A `connected` record stamped now.
    #[must_use]
    pub fn up() -> Self {
        Self {
            connected: true,
            timestamp: now_millis(),
            reason: None,
        }
    }

    /// A `disconnected` record stamped now.
    #[must_use]
    pub fn down(reason: impl Into<String>) -> Self {
        Self {
            connected: false,
            timestamp: now_millis(),
            reason: Some(reason.into()),
        }
    }

    /// Whether this is the terminal record emitted after retry exhaustion.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.reason.as_deref() == Some(REASON_MAX_RECONNECT_ATTEMPTS)
    }
}

// ---------------------------------------------------------------------------
// StreamError
// ---------------------------------------------------------------------------

/// An error surfaced by the transport (e.g. a failed connection attempt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamError {
    /// Human-readable description.
    pub message: String,
    /// Optional transport-specific code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// When the error was observed (ms since epoch).
    pub timestamp: i64,
}

impl StreamError {
    /// Create an error record stamped now.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            timestamp: now_millis(),
        }
    }

    /// Attach a transport-specific code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

// ---------------------------------------------------------------------------
// MetricsRecord
// ---------------------------------------------------------------------------

/// One data record received from the stream.
///
/// The payload is opaque apart from its numeric `timestamp` (ms since epoch),
/// which the watchdog uses to judge freshness. The whole payload, timestamp
/// included, is kept in `body`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct MetricsRecord {
    timestamp: i64,
    body: Value,
}

impl MetricsRecord {
    /// Build a record from a timestamp and a payload.
    ///
    /// If `body` is a JSON object its `timestamp` field is set to match.
    #[must_use]
    pub fn new(timestamp: i64, mut body: Value) -> Self {
        if let Value::Object(map) = &mut body {
            map.insert("timestamp".to_owned(), Value::from(timestamp));
        }
        Self { timestamp, body }
    }

    /// Interpret a raw payload.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MissingTimestamp`] if the payload has no
    /// numeric `timestamp`.
    pub fn from_value(body: Value) -> Result<Self, RecordError> {
        let ts = body.get("timestamp").ok_or(RecordError::MissingTimestamp)?;
        #[allow(clippy::cast_possible_truncation)]
        let timestamp = ts
            .as_i64()
            .or_else(|| ts.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .ok_or(RecordError::MissingTimestamp)?;
        Ok(Self { timestamp, body })
    }

    /// Source timestamp (ms since epoch).
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The full payload.
    #[must_use]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Milliseconds elapsed between the record's timestamp and `now`.
    ///
    /// Negative when the source clock runs ahead of ours.
    #[must_use]
    pub fn age_millis(&self, now: i64) -> i64 {
        now.saturating_sub(self.timestamp)
    }

    /// Typed view of a system metrics payload.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Shape`] if the payload is not a system metrics record.
    pub fn system_metrics(&self) -> Result<SystemMetrics, RecordError> {
        Ok(SystemMetrics::deserialize(&self.body)?)
    }
}

impl TryFrom<Value> for MetricsRecord {
    type Error = RecordError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<MetricsRecord> for Value {
    fn from(record: MetricsRecord) -> Self {
        record.body
    }
}

// ---------------------------------------------------------------------------
// SystemMetrics
// ---------------------------------------------------------------------------

/// Host metrics as published by the monitoring backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// Sample time (ms since epoch).
    pub timestamp: i64,
    /// CPU figures.
    pub cpu: CpuMetrics,
    /// Memory figures.
    pub memory: MemoryMetrics,
    /// One entry per mounted filesystem.
    #[serde(default)]
    pub disk: Vec<DiskMetrics>,
    /// Network throughput.
    pub network: NetworkMetrics,
    /// Host uptime in seconds.
    #[serde(default)]
    pub uptime: Option<f64>,
}

/// CPU load figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuMetrics {
    /// Load percentage.
    pub load: f64,
    /// Logical core count.
    pub cores: u32,
    /// Clock speed in GHz.
    #[serde(default)]
    pub speed: Option<f64>,
}

/// Memory figures in bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    /// Total memory.
    pub total: u64,
    /// Used memory.
    pub used: u64,
    /// Usage percentage.
    pub usage: f64,
}

/// Usage of one filesystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskMetrics {
    /// Total bytes.
    pub total: u64,
    /// Used bytes.
    pub used: u64,
    /// Usage percentage.
    pub usage: f64,
    /// Mount point.
    pub mount: String,
}

/// Network throughput in bytes per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMetrics {
    /// Received bytes per second.
    pub rx_sec: f64,
    /// Transmitted bytes per second.
    pub tx_sec: f64,
}
