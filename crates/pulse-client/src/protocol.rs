//! Wire envelope for the `WebSocket` transport.
//!
//! Every text frame carries one JSON object `{"event": <name>, "data": <payload>}`.
//! Payloads are opaque apart from the `timestamp` of metrics records.

use pulse_events::MetricsRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::TransportError;
use crate::transport::{OutboundFrame, TransportEvent};

/// Inbound event names.
pub(crate) mod event {
    pub(crate) const METRICS: &str = "metrics";
    pub(crate) const METRICS_HISTORY: &str = "metrics-history";
    pub(crate) const RECONNECT_ATTEMPT: &str = "reconnect_attempt";
    pub(crate) const RECONNECT: &str = "reconnect";
    pub(crate) const RECONNECT_FAILED: &str = "reconnect_failed";
}

/// One frame on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Envelope {
    pub(crate) event: String,
    #[serde(default)]
    pub(crate) data: Value,
}

impl From<OutboundFrame> for Envelope {
    fn from(frame: OutboundFrame) -> Self {
        Self {
            event: frame.event,
            data: frame.data,
        }
    }
}

/// Serialize an outbound frame.
pub(crate) fn encode(frame: OutboundFrame) -> Result<String, TransportError> {
    Ok(serde_json::to_string(&Envelope::from(frame))?)
}

/// Parse an inbound text frame.
///
/// Returns `Ok(None)` for events the client does not consume.
pub(crate) fn decode(text: &str) -> Result<Option<TransportEvent>, TransportError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    let decoded = match envelope.event.as_str() {
        event::METRICS => TransportEvent::Metrics(MetricsRecord::from_value(envelope.data)?),
        event::METRICS_HISTORY => {
            TransportEvent::MetricsHistory(serde_json::from_value(envelope.data)?)
        },
        event::RECONNECT_ATTEMPT => TransportEvent::ReconnectAttempt(count(&envelope.data)),
        event::RECONNECT => TransportEvent::Reconnected(count(&envelope.data)),
        event::RECONNECT_FAILED => TransportEvent::ReconnectFailed,
        other => {
            debug!(event = other, "Ignoring unknown stream event");
            return Ok(None);
        },
    };
    Ok(Some(decoded))
}

fn count(data: &Value) -> u32 {
    data.as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_metrics() {
        let text = r#"{"event":"metrics","data":{"timestamp":1700000000000,"cpu":{"load":3.5}}}"#;
        let Some(TransportEvent::Metrics(record)) = decode(text).unwrap() else {
            panic!("expected metrics");
        };
        assert_eq!(record.timestamp(), 1_700_000_000_000);
        assert_eq!(record.body()["cpu"]["load"], 3.5);
    }

    #[test]
    fn decode_history() {
        let text = r#"{"event":"metrics-history","data":[{"timestamp":1},{"timestamp":2}]}"#;
        let Some(TransportEvent::MetricsHistory(records)) = decode(text).unwrap() else {
            panic!("expected history");
        };
        let stamps: Vec<_> = records.iter().map(MetricsRecord::timestamp).collect();
        assert_eq!(stamps, [1, 2]);
    }

    #[test]
    fn decode_reconnect_notifications() {
        assert_eq!(
            decode(r#"{"event":"reconnect_attempt","data":3}"#).unwrap(),
            Some(TransportEvent::ReconnectAttempt(3))
        );
        assert_eq!(
            decode(r#"{"event":"reconnect","data":2}"#).unwrap(),
            Some(TransportEvent::Reconnected(2))
        );
        assert_eq!(
            decode(r#"{"event":"reconnect_failed"}"#).unwrap(),
            Some(TransportEvent::ReconnectFailed)
        );
    }

    #[test]
    fn decode_unknown_event_is_ignored() {
        assert_eq!(decode(r#"{"event":"hello","data":{}}"#).unwrap(), None);
    }

    #[test]
    fn decode_rejects_metrics_without_timestamp() {
        let err = decode(r#"{"event":"metrics","data":{"cpu":{}}}"#).unwrap_err();
        assert!(matches!(err, TransportError::Record(_)));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode("not json"), Err(TransportError::Json(_))));
    }

    #[test]
    fn encode_request_history() {
        let frame = OutboundFrame::new(
            crate::transport::REQUEST_HISTORY,
            json!({ "duration": "5m", "interval": "10s" }),
        );
        let value: Value = serde_json::from_str(&encode(frame).unwrap()).unwrap();
        assert_eq!(value["event"], "request-history");
        assert_eq!(value["data"]["duration"], "5m");
    }
}
