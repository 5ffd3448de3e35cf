//! Live event stream over a single long-lived WebSocket.
//!
//! The connection is supervised: a transport-level drop or failed
//! handshake is logged, waited out for a fixed two seconds and redialed
//! with the same credential, indefinitely. Only a clean close ends the
//! task: a normal-closure frame from the server, or a local
//! [`EventStream::shutdown`]. Nothing is replayed across reconnects; the
//! synchronization core is built to tolerate the gap.

mod events;

pub use events::ChatEvent;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{self, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Subprotocol the backend negotiates; the bearer token rides along as
/// the second entry of the offer list.
pub const DEFAULT_SUBPROTOCOL: &str = "chat-service-protocol";

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    pub subprotocol: String,
    pub token: String,
    /// Fixed pause between redial attempts. No growth, no cap.
    pub reconnect_delay: Duration,
}

impl StreamConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        StreamConfig {
            url: url.into(),
            subprotocol: DEFAULT_SUBPROTOCOL.to_string(),
            token: token.into(),
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    pub fn with_subprotocol(mut self, subprotocol: impl Into<String>) -> Self {
        self.subprotocol = subprotocol.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// Where the supervised connection currently stands.
///
/// A lost connection re-enters `Connecting` (the fixed redial pause
/// happens inside that state); `Closed` is terminal and only reached
/// through a clean close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Open,
    Closed,
}

/// Handle to the supervised stream task.
pub struct EventStream {
    events: mpsc::UnboundedReceiver<ChatEvent>,
    state: watch::Receiver<StreamState>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl EventStream {
    /// Starts the connect loop on a background task.
    pub fn spawn(config: StreamConfig) -> Self {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(StreamState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(supervise(config, event_tx, state_tx, shutdown_rx));
        EventStream {
            events,
            state,
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Next decoded event, or `None` once the stream task has ended.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        self.events.recv().await
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Waits until the connection reaches `target`. Returns `false` if
    /// the task ended without ever getting there.
    pub async fn wait_for_state(&mut self, target: StreamState) -> bool {
        self.state.wait_for(|state| *state == target).await.is_ok()
    }

    /// Announces a clean local close (when connected) and waits for the
    /// task to finish. The counterpart of closing the app window.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

enum Ended {
    Clean,
    Lost,
}

async fn supervise(
    config: StreamConfig,
    events: mpsc::UnboundedSender<ChatEvent>,
    state: watch::Sender<StreamState>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let _ = state.send(StreamState::Connecting);

        // A completed `changed` means either the shutdown flag flipped or
        // the handle was dropped; both end the supervisor.
        let dialed = tokio::select! {
            _ = shutdown.changed() => break,
            dialed = connect(&config) => dialed,
        };

        match dialed {
            Ok(stream) => match pump(stream, &events, &state, &mut shutdown).await {
                Ended::Clean => break,
                Ended::Lost => {}
            },
            Err(err) => error!("event stream connection failed: {err}"),
        }

        debug!(
            "retrying event stream in {}ms",
            config.reconnect_delay.as_millis()
        );
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(config.reconnect_delay) => {}
        }
    }
    let _ = state.send(StreamState::Closed);
}

async fn connect(config: &StreamConfig) -> tungstenite::Result<WsStream> {
    debug!("connecting to event stream at {}", config.url);
    let mut request = config.url.as_str().into_client_request()?;
    let offer = format!("{}, {}", config.subprotocol, config.token);
    let offer = HeaderValue::from_str(&offer).map_err(http::Error::from)?;
    request.headers_mut().insert("Sec-WebSocket-Protocol", offer);
    let (stream, _response) = connect_async(request).await?;
    Ok(stream)
}

/// Forwards decoded frames until the connection ends one way or the
/// other. Pings are answered by the protocol layer underneath.
async fn pump(
    stream: WsStream,
    events: &mpsc::UnboundedSender<ChatEvent>,
    state: &watch::Sender<StreamState>,
    shutdown: &mut watch::Receiver<bool>,
) -> Ended {
    info!("event stream connected");
    let _ = state.send(StreamState::Open);
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "".into(),
                };
                let _ = sink.send(WsMessage::Close(Some(frame))).await;
                info!("event stream closed locally");
                return Ended::Clean;
            }
            frame = source.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if !forward(&text, events) {
                        return Ended::Clean;
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    return match frame {
                        Some(frame) if frame.code != CloseCode::Normal => {
                            warn!("event stream closed by server ({})", frame.code);
                            Ended::Lost
                        }
                        _ => {
                            info!("event stream closed cleanly by server");
                            Ended::Clean
                        }
                    };
                }
                // Pings, pongs and stray binary frames carry no events.
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    error!("event stream lost: {err}");
                    return Ended::Lost;
                }
                None => {
                    error!("event stream ended without a close frame");
                    return Ended::Lost;
                }
            }
        }
    }
}

/// Decodes one text frame. Unknown event types and malformed frames are
/// dropped with a log line; they never take the connection down.
/// Returns `false` when nobody listens for events anymore.
fn forward(text: &str, events: &mpsc::UnboundedSender<ChatEvent>) -> bool {
    match serde_json::from_str::<ChatEvent>(text) {
        Ok(event) => {
            debug!("event frame: {text}");
            events.send(event).is_ok()
        }
        Err(err) => {
            warn!("dropping unrecognized event frame: {err}");
            true
        }
    }
}
