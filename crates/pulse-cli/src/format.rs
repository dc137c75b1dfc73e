//! Human-readable rendering of metrics and client events.

use std::fmt;

use chrono::{DateTime, Local};
use colored::Colorize;
use pulse_events::{ClientEvent, ConnectionStatus, MetricsRecord, SystemMetrics};
use serde_json::{Value, json};

use crate::theme::Theme;

/// Output format for streamed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    /// Colored, one line per record.
    Pretty,
    /// One JSON object per line.
    Json,
}

const BYTE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// A throughput figure split into value and unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NetworkSpeed {
    pub(crate) value: String,
    pub(crate) unit: &'static str,
}

impl fmt::Display for NetworkSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// Scale bytes per second to B/s, KB/s or MB/s with two decimals.
pub(crate) fn format_network_speed(bytes_per_sec: f64) -> NetworkSpeed {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * KIB;
    let (value, unit) = if bytes_per_sec >= MIB {
        (bytes_per_sec / MIB, "MB/s")
    } else if bytes_per_sec >= KIB {
        (bytes_per_sec / KIB, "KB/s")
    } else {
        (bytes_per_sec, "B/s")
    };
    NetworkSpeed {
        value: format!("{value:.2}"),
        unit,
    }
}

/// Scale a byte count to the largest unit that keeps it at or above one,
/// with at most two decimals and no trailing zeros.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len().saturating_sub(1) {
        value /= 1024.0;
        unit = unit.saturating_add(1);
    }
    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", BYTE_UNITS[unit])
}

/// Render uptime seconds as `1d 2h 3m 4s`, omitting zero parts.
#[allow(
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub(crate) fn format_uptime(seconds: Option<f64>) -> String {
    let total = match seconds {
        Some(s) if s.is_finite() && s >= 1.0 => s.floor() as u64,
        _ => return "0s".to_string(),
    };
    let days = total / 86_400;
    let hours = total % 86_400 / 3_600;
    let minutes = total % 3_600 / 60;
    let secs = total % 60;

    let mut parts = Vec::with_capacity(4);
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }
    parts.join(" ")
}

/// Severity band of a disk usage percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DiskUsage {
    /// Below 70%.
    Low,
    /// 70% up to 90%.
    Medium,
    /// 90% and above.
    High,
}

impl DiskUsage {
    pub(crate) fn classify(usage: f64) -> Self {
        if usage < 70.0 {
            Self::Low
        } else if usage < 90.0 {
            Self::Medium
        } else {
            Self::High
        }
    }

    fn paint(self, text: &str) -> String {
        match self {
            Self::Low => text.green().to_string(),
            Self::Medium => text.yellow().to_string(),
            Self::High => text.red().bold().to_string(),
        }
    }
}

fn clock_time(timestamp: i64) -> String {
    DateTime::from_timestamp_millis(timestamp).map_or_else(
        || timestamp.to_string(),
        |t| t.with_timezone(&Local).format("%H:%M:%S").to_string(),
    )
}

/// One pretty line for a system metrics sample.
pub(crate) fn metrics_line(m: &SystemMetrics) -> String {
    let mut line = format!(
        "{}  cpu {:>5.1}%  mem {:>5.1}% ({} / {})  net \u{2193}{} \u{2191}{}",
        Theme::dimmed(&clock_time(m.timestamp)),
        m.cpu.load,
        m.memory.usage,
        format_bytes(m.memory.used),
        format_bytes(m.memory.total),
        format_network_speed(m.network.rx_sec),
        format_network_speed(m.network.tx_sec),
    );
    for disk in &m.disk {
        let usage = format!("{:.0}%", disk.usage);
        line.push_str(&format!(
            "  {} {}",
            disk.mount,
            DiskUsage::classify(disk.usage).paint(&usage)
        ));
    }
    line.push_str(&format!("  up {}", format_uptime(m.uptime)));
    line
}

fn record_line(record: &MetricsRecord) -> String {
    match record.system_metrics() {
        Ok(m) => metrics_line(&m),
        Err(_) => format!("{}  {}", Theme::dimmed(&clock_time(record.timestamp())), record.body()),
    }
}

fn status_line(status: &ConnectionStatus) -> String {
    let time = Theme::dimmed(&clock_time(status.timestamp));
    if status.connected {
        format!("{time}  {}", Theme::success("Connected"))
    } else if status.is_exhausted() {
        format!(
            "{time}  {}",
            Theme::error("Gave up reconnecting; restart to try again")
        )
    } else {
        let reason = status.reason.as_deref().unwrap_or("unknown");
        format!("{time}  {}", Theme::warning(&format!("Disconnected ({reason})")))
    }
}

fn pretty(event: &ClientEvent) -> String {
    match event {
        ClientEvent::ConnectionChange(status) => status_line(status),
        ClientEvent::Data(record) => record_line(record),
        ClientEvent::History(records) => {
            let mut out = Theme::header(&format!("History ({} records)", records.len()));
            for record in records.as_slice() {
                out.push('\n');
                out.push_str(&record_line(record));
            }
            out
        },
        ClientEvent::Error(err) => Theme::error(&err.message),
        ClientEvent::Connect => Theme::info("Stream open"),
        ClientEvent::Disconnect { reason } => Theme::info(&format!("Stream closed ({reason})")),
    }
}

fn json_payload(event: &ClientEvent) -> Value {
    match event {
        ClientEvent::ConnectionChange(status) => json!({
            "connected": status.connected,
            "timestamp": status.timestamp,
            "reason": status.reason,
        }),
        ClientEvent::Data(record) => record.body().clone(),
        ClientEvent::History(records) => {
            Value::Array(records.iter().map(|r| r.body().clone()).collect())
        },
        ClientEvent::Error(err) => json!({
            "message": err.message,
            "code": err.code,
            "timestamp": err.timestamp,
        }),
        ClientEvent::Connect => Value::Null,
        ClientEvent::Disconnect { reason } => json!({ "reason": reason }),
    }
}

/// Render an event for the terminal.
pub(crate) fn render_event(event: &ClientEvent, format: OutputFormat) -> String {
    match format {
        OutputFormat::Pretty => pretty(event),
        OutputFormat::Json => json!({
            "event": event.kind().as_str(),
            "data": json_payload(event),
        })
        .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use pulse_events::StreamError;
    use pulse_test::{BASE_TIMESTAMP, sample_history, sample_metrics};

    #[test]
    fn network_speed_units() {
        assert_eq!(format_network_speed(1_572_864.0).to_string(), "1.50 MB/s");
        assert_eq!(format_network_speed(2_048.0).to_string(), "2.00 KB/s");
        assert_eq!(format_network_speed(512.0).to_string(), "512.00 B/s");
        assert_eq!(format_network_speed(0.0).unit, "B/s");
    }

    #[test]
    fn bytes_trim_trailing_zeros() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1_536), "1.5 KB");
        assert_eq!(format_bytes(1_073_741_824), "1 GB");
        assert_eq!(format_bytes(8_589_934_592), "8 GB");
        assert_eq!(format_bytes(5_629_499_534_213_120), "5120 TB");
    }

    #[test]
    fn uptime_parts() {
        assert_eq!(format_uptime(None), "0s");
        assert_eq!(format_uptime(Some(0.0)), "0s");
        assert_eq!(format_uptime(Some(45.9)), "45s");
        assert_eq!(format_uptime(Some(3_600.0)), "1h");
        assert_eq!(format_uptime(Some(93_784.0)), "1d 2h 3m 4s");
        assert_eq!(format_uptime(Some(86_460.0)), "1d 1m");
    }

    #[test]
    fn disk_usage_bands() {
        assert_eq!(DiskUsage::classify(0.0), DiskUsage::Low);
        assert_eq!(DiskUsage::classify(69.9), DiskUsage::Low);
        assert_eq!(DiskUsage::classify(70.0), DiskUsage::Medium);
        assert_eq!(DiskUsage::classify(89.9), DiskUsage::Medium);
        assert_eq!(DiskUsage::classify(90.0), DiskUsage::High);
    }

    #[test]
    fn pretty_metrics_line_has_every_figure() {
        let line = render_event(
            &ClientEvent::Data(Arc::new(sample_metrics(BASE_TIMESTAMP))),
            OutputFormat::Pretty,
        );
        assert!(line.contains("23.5%"));
        assert!(line.contains("8 GB / 16 GB"));
        assert!(line.contains("1.50 MB/s"));
        assert!(line.contains("2.00 KB/s"));
        assert!(line.contains("/data"));
        assert!(line.contains("92%"));
        assert!(line.contains("1d 2h 3m 4s"));
    }

    #[test]
    fn pretty_falls_back_to_raw_body() {
        let record = MetricsRecord::new(BASE_TIMESTAMP, json!({ "queue_depth": 7 }));
        let line = render_event(&ClientEvent::Data(Arc::new(record)), OutputFormat::Pretty);
        assert!(line.contains("queue_depth"));
    }

    #[test]
    fn pretty_history_lists_each_record() {
        let batch = sample_history(BASE_TIMESTAMP, 10_000, 3);
        let out = render_event(&ClientEvent::History(Arc::new(batch)), OutputFormat::Pretty);
        assert!(out.contains("History (3 records)"));
        assert_eq!(out.lines().count(), 4);
    }

    #[test]
    fn pretty_status_lines() {
        let down = render_event(
            &ClientEvent::ConnectionChange(ConnectionStatus::down("transport close")),
            OutputFormat::Pretty,
        );
        assert!(down.contains("transport close"));

        let exhausted = render_event(
            &ClientEvent::ConnectionChange(ConnectionStatus::down(
                pulse_events::REASON_MAX_RECONNECT_ATTEMPTS,
            )),
            OutputFormat::Pretty,
        );
        assert!(exhausted.contains("Gave up"));
    }

    #[test]
    fn json_lines_carry_kind_and_payload() {
        let line = render_event(
            &ClientEvent::Data(Arc::new(sample_metrics(BASE_TIMESTAMP))),
            OutputFormat::Json,
        );
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "data");
        assert_eq!(value["data"]["timestamp"], BASE_TIMESTAMP);
        assert_eq!(value["data"]["disk"][1]["mount"], "/data");

        let line = render_event(
            &ClientEvent::Error(StreamError::new("refused").with_code("ECONNREFUSED")),
            OutputFormat::Json,
        );
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "error");
        assert_eq!(value["data"]["code"], "ECONNREFUSED");
    }
}
