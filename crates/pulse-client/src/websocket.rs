//! `WebSocket` transport.
//!
//! Each session is one task owning the socket. Outbound frames and the close
//! request reach it over a channel; inbound frames are decoded and reported
//! through the session's sink.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::TransportKind;
use crate::error::TransportError;
use crate::protocol;
use crate::transport::{
    ConnectTarget, OutboundFrame, Transport, TransportEvent, TransportSession, TransportSink,
};

/// Reason reported when opening fails.
pub const REASON_CONNECT_ERROR: &str = "connect_error";
/// Reason reported when the server closes the socket.
pub const REASON_SERVER_DISCONNECT: &str = "io server disconnect";
/// Reason reported when the socket ends without a close frame.
pub const REASON_TRANSPORT_CLOSE: &str = "transport close";
/// Reason reported on a socket read or write error.
pub const REASON_TRANSPORT_ERROR: &str = "transport error";

/// Opens `WebSocket` sessions with `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create the transport.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, target: ConnectTarget, sink: TransportSink) -> Box<dyn TransportSession> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_session(target, sink, rx));
        Box::new(WebSocketSession { tx, closed: false })
    }
}

/// Build the socket URL: `http(s)` becomes `ws(s)`, the configured path is
/// the URL path and the channel travels as the `channel` query parameter.
///
/// # Errors
///
/// Returns [`TransportError::InvalidUrl`] if the endpoint cannot be parsed or
/// uses a scheme other than `http`, `https`, `ws` or `wss`.
pub fn stream_url(target: &ConnectTarget) -> Result<Url, TransportError> {
    let mut url = Url::parse(&target.endpoint)
        .map_err(|e| TransportError::InvalidUrl(format!("{}: {e}", target.endpoint)))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme '{other}'"
            )));
        },
    };
    url.set_scheme(scheme)
        .map_err(|()| TransportError::InvalidUrl(format!("cannot use scheme '{scheme}'")))?;
    url.set_path(&target.path);
    url.query_pairs_mut().append_pair("channel", &target.channel);
    Ok(url)
}

enum Outgoing {
    Frame(OutboundFrame),
    Close,
}

struct WebSocketSession {
    tx: mpsc::UnboundedSender<Outgoing>,
    closed: bool,
}

impl TransportSession for WebSocketSession {
    fn send(&self, frame: OutboundFrame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.tx
            .send(Outgoing::Frame(frame))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.tx.send(Outgoing::Close);
        }
    }
}

impl Drop for WebSocketSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn fail(sink: &TransportSink, err: &TransportError) {
    warn!(session = %sink.session(), error = %err, "Stream connect failed");
    sink.emit(TransportEvent::ConnectError {
        message: err.to_string(),
    });
    sink.emit(TransportEvent::Disconnected {
        reason: REASON_CONNECT_ERROR.to_string(),
    });
}

/// Resolves once the client asks to close; frames queued before the socket
/// is up are dropped.
async fn closed_by_client(outbound: &mut mpsc::UnboundedReceiver<Outgoing>) {
    loop {
        match outbound.recv().await {
            Some(Outgoing::Frame(frame)) => {
                debug!(event = %frame.event, "Dropping frame queued before connect");
            },
            Some(Outgoing::Close) | None => return,
        }
    }
}

async fn run_session(
    target: ConnectTarget,
    sink: TransportSink,
    mut outbound: mpsc::UnboundedReceiver<Outgoing>,
) {
    if !target.transports.contains(&TransportKind::WebSocket) {
        let kinds: Vec<_> = target.transports.iter().map(|k| k.as_str()).collect();
        fail(
            &sink,
            &TransportError::UnsupportedTransport(format!("[{}]", kinds.join(", "))),
        );
        return;
    }

    let url = match stream_url(&target) {
        Ok(url) => url,
        Err(e) => {
            fail(&sink, &e);
            return;
        },
    };

    info!(url = %url, session = %sink.session(), "Connecting to metrics stream");

    let connect = tokio::time::timeout(target.timeout, connect_async(url.as_str()));
    let ws = tokio::select! {
        biased;

        () = closed_by_client(&mut outbound) => {
            debug!(session = %sink.session(), "Session closed while connecting");
            return;
        }

        result = connect => match result {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                fail(&sink, &TransportError::from(e));
                return;
            }
            Err(_) => {
                fail(&sink, &TransportError::Timeout(target.timeout.as_millis()));
                return;
            }
        }
    };

    info!(session = %sink.session(), "Metrics stream connected");
    if !sink.emit(TransportEvent::Connected) {
        return;
    }

    let (mut writer, mut reader) = ws.split();

    let reason = loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outgoing::Frame(frame)) => {
                    let text = match protocol::encode(frame) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Failed to encode outbound frame");
                            continue;
                        }
                    };
                    if let Err(e) = writer.send(Message::Text(text.into())).await {
                        warn!(error = %e, "WebSocket write error");
                        break REASON_TRANSPORT_ERROR;
                    }
                }
                Some(Outgoing::Close) | None => {
                    let _ = writer.send(Message::Close(None)).await;
                    debug!(session = %sink.session(), "Session closed by client");
                    return;
                }
            },

            message = reader.next() => match message {
                Some(Ok(Message::Text(text))) => match protocol::decode(&text) {
                    Ok(Some(event)) => {
                        if !sink.emit(event) {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Failed to decode stream frame"),
                },
                Some(Ok(Message::Close(_))) => break REASON_SERVER_DISCONNECT,
                Some(Ok(_)) => {
                    // Ping/pong handled by tungstenite; binary skipped.
                }
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket read error");
                    break REASON_TRANSPORT_ERROR;
                }
                None => break REASON_TRANSPORT_CLOSE,
            },
        }
    };

    info!(session = %sink.session(), reason, "Metrics stream disconnected");
    sink.emit(TransportEvent::Disconnected {
        reason: reason.to_string(),
    });
}
