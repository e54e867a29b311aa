//! Relay bridge into the conversational session
//!
//! Drains the [`PriorityMessageQueue`] into a single WebSocket session one
//! message at a time. After each `text-input` the bridge is `Busy` until
//! the session reports `conversation-chain-end`. The bridge runs headless,
//! so it answers every `backend-synth-complete` with
//! `frontend-playback-complete` itself; otherwise the session would wait
//! forever for audio playback that never happens.
//!
//! The connection is re-established after a fixed delay whenever it fails.
//! The queue lives outside the connection, so buffered chat survives
//! reconnects.

use std::fmt;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use aiko_core::bus::{PriorityMessageQueue, QueuedMessage};
use aiko_core::config::RelayConfig;
use aiko_core::utils::truncate;

use crate::base::{ChannelError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// Control text marking the end of a conversation turn
const CONVERSATION_CHAIN_END: &str = "conversation-chain-end";

/// Lifecycle of the downstream connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Connected and idle, the next message may be sent
    Ready,
    /// A message is in flight, waiting for the turn to end
    Busy,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Busy => "busy",
        };
        f.write_str(name)
    }
}

/// Frames sent by the conversational session
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum InboundFrame {
    #[serde(rename = "control")]
    Control {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "backend-synth-complete")]
    BackendSynthComplete {},
    #[serde(rename = "full-text")]
    FullText {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "error")]
    Error {},
    #[serde(other)]
    Unrecognized,
}

/// Frames sent to the conversational session
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum OutboundFrame {
    #[serde(rename = "text-input")]
    TextInput { text: String },
    #[serde(rename = "frontend-playback-complete")]
    PlaybackComplete,
}

/// What the receive loop does with an inbound frame
#[derive(Debug, PartialEq, Eq)]
enum FrameAction {
    MarkReady,
    AckPlayback,
    Ignore,
}

/// Interpret one raw inbound frame; malformed frames are dropped
fn classify_frame(raw: &str) -> FrameAction {
    let frame: InboundFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(
                "Dropping malformed frame from session: {} (raw: {})",
                e,
                truncate(raw, 100)
            );
            return FrameAction::Ignore;
        }
    };

    match frame {
        InboundFrame::Control { text } if text == CONVERSATION_CHAIN_END => {
            info!("Session is idle, ready for the next message");
            FrameAction::MarkReady
        }
        InboundFrame::Control { text } => {
            debug!("Ignoring control frame: {}", text);
            FrameAction::Ignore
        }
        InboundFrame::BackendSynthComplete {} => {
            debug!("Synthesis complete, acknowledging playback");
            FrameAction::AckPlayback
        }
        InboundFrame::FullText { text } => {
            info!("Session said: {:?}", text);
            FrameAction::Ignore
        }
        InboundFrame::Error {} => {
            error!("Session reported an error: {}", truncate(raw, 500));
            FrameAction::Ignore
        }
        InboundFrame::Unrecognized => {
            debug!("Ignoring unrecognized frame: {}", truncate(raw, 100));
            FrameAction::Ignore
        }
    }
}

fn encode(frame: &OutboundFrame) -> Result<WsMessage> {
    serde_json::to_string(frame)
        .map(WsMessage::Text)
        .map_err(|e| ChannelError::SendError(format!("failed to encode frame: {}", e)))
}

/// Hand one frame to the sink, then flush it
///
/// The message counts as delivered as soon as the sink accepts the frame.
/// Closing the socket flushes anything already buffered, so a requeue after
/// that point would relay the message twice.
async fn deliver<S>(sink: &Mutex<S>, in_flight: InFlight<'_>, frame: WsMessage) -> Result<()>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: fmt::Display,
{
    let mut sink = sink.lock().await;
    sink.feed(frame)
        .await
        .map_err(|e| ChannelError::SendError(e.to_string()))?;
    in_flight.delivered();
    sink.flush()
        .await
        .map_err(|e| ChannelError::SendError(e.to_string()))
}

/// A dequeued message that goes back into the queue unless delivered
struct InFlight<'a> {
    queue: &'a PriorityMessageQueue,
    entry: Option<QueuedMessage>,
}

impl<'a> InFlight<'a> {
    fn new(queue: &'a PriorityMessageQueue, entry: QueuedMessage) -> Self {
        Self {
            queue,
            entry: Some(entry),
        }
    }

    fn delivered(mut self) {
        self.entry = None;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            warn!(
                "Message from {} was not delivered, returning it to the queue",
                entry.message().username
            );
            self.queue.requeue(entry);
        }
    }
}

/// Single-consumer relay from the chat queue to the conversational session
pub struct RelayBridge {
    url: String,
    reconnect_delay: Duration,
    queue: PriorityMessageQueue,
    state: watch::Sender<ConnectionState>,
}

impl RelayBridge {
    /// Create a bridge draining `queue` into the session at `config.url`
    pub fn new(config: &RelayConfig, queue: PriorityMessageQueue) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url: config.url.clone(),
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            queue,
            state,
        }
    }

    /// Session endpoint
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Connect, relay and reconnect until `shutdown` fires
    ///
    /// Never gives up: every failure is logged and retried after the fixed
    /// reconnect delay.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Relay bridge started for {}", self.url);

        loop {
            let outcome = tokio::select! {
                _ = shutdown.cancelled() => break,
                outcome = self.run_session() => outcome,
            };
            self.set_state(ConnectionState::Disconnected);

            match outcome {
                Ok(()) => info!("Session ended"),
                Err(e) => warn!(
                    "Relay disconnected ({}), retrying in {}ms",
                    e,
                    self.reconnect_delay.as_millis()
                ),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("Relay bridge stopped");
    }

    /// One connection lifetime; returns why the session ended
    async fn run_session(&self) -> Result<()> {
        self.set_state(ConnectionState::Connecting);
        info!("Connecting to session at {}", self.url);

        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ChannelError::ConnectionFailed(e.to_string()))?;
        info!("Connected to session");

        let (write, read) = ws_stream.split();
        let sink = Mutex::new(write);

        // A fresh session is idle.
        self.set_state(ConnectionState::Ready);

        // Both loops are polled by this task. When one finishes, select!
        // drops the other before the socket is closed below.
        let outcome = tokio::select! {
            outcome = self.receive_loop(read, &sink) => outcome,
            outcome = self.send_loop(&sink) => outcome,
        };

        let mut write = sink.into_inner();
        if let Err(e) = write.close().await {
            debug!("Error closing session socket: {}", e);
        }
        outcome
    }

    async fn receive_loop(&self, mut read: WsSource, sink: &Mutex<WsSink>) -> Result<()> {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => match classify_frame(&text) {
                    FrameAction::MarkReady => self.mark_ready(),
                    FrameAction::AckPlayback => {
                        let ack = encode(&OutboundFrame::PlaybackComplete)?;
                        sink.lock()
                            .await
                            .send(ack)
                            .await
                            .map_err(|e| ChannelError::SendError(e.to_string()))?;
                    }
                    FrameAction::Ignore => {}
                },
                Ok(WsMessage::Close(frame)) => {
                    return Err(ChannelError::Closed(format!("closed by session: {:?}", frame)));
                }
                Ok(_) => {}
                Err(e) => return Err(ChannelError::ConnectionError(e.to_string())),
            }
        }
        Err(ChannelError::Closed("session stream ended".to_string()))
    }

    async fn send_loop(&self, sink: &Mutex<WsSink>) -> Result<()> {
        let mut state_rx = self.state.subscribe();
        loop {
            state_rx
                .wait_for(|state| *state == ConnectionState::Ready)
                .await
                .map(|_| ())
                .map_err(|e| ChannelError::ConnectionError(e.to_string()))?;

            let entry = self.queue.get_entry().await;
            let text = entry.message().relay_text();
            let in_flight = InFlight::new(&self.queue, entry);

            self.set_state(ConnectionState::Busy);
            info!("Relaying to session: {}", truncate(&text, 120));

            let frame = encode(&OutboundFrame::TextInput { text })?;
            deliver(sink, in_flight, frame).await?;
        }
    }

    fn mark_ready(&self) {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Busy {
                *state = ConnectionState::Ready;
                true
            } else {
                false
            }
        });
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("Relay state {} -> {}", previous, next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiko_core::bus::ChatMessage;
    use serde_json::{json, Value};
    use std::pin::Pin;
    use std::task::{Context, Poll};

    fn bridge() -> RelayBridge {
        RelayBridge::new(&RelayConfig::default(), PriorityMessageQueue::new())
    }

    #[test]
    fn test_classify_recognized_frames() {
        assert_eq!(
            classify_frame(r#"{"type":"control","text":"conversation-chain-end"}"#),
            FrameAction::MarkReady
        );
        assert_eq!(
            classify_frame(r#"{"type":"backend-synth-complete"}"#),
            FrameAction::AckPlayback
        );
        assert_eq!(
            classify_frame(r#"{"type":"backend-synth-complete","extra":1}"#),
            FrameAction::AckPlayback
        );
        assert_eq!(
            classify_frame(r#"{"type":"full-text","text":"Thinking..."}"#),
            FrameAction::Ignore
        );
        assert_eq!(
            classify_frame(r#"{"type":"error","message":"tts failed"}"#),
            FrameAction::Ignore
        );
    }

    #[test]
    fn test_classify_ignores_unknown_and_malformed() {
        assert_eq!(
            classify_frame(r#"{"type":"control","text":"conversation-chain-start"}"#),
            FrameAction::Ignore
        );
        assert_eq!(classify_frame(r#"{"type":"audio","data":"..."}"#), FrameAction::Ignore);
        assert_eq!(classify_frame(r#"{"text":"no type"}"#), FrameAction::Ignore);
        assert_eq!(classify_frame("not json at all"), FrameAction::Ignore);
        assert_eq!(classify_frame("[1,2,3]"), FrameAction::Ignore);
    }

    #[test]
    fn test_outbound_frame_shapes() {
        let text_input = serde_json::to_value(OutboundFrame::TextInput {
            text: "[viewer]: hi".to_string(),
        })
        .unwrap();
        assert_eq!(text_input, json!({"type": "text-input", "text": "[viewer]: hi"}));

        let ack: Value = serde_json::to_value(OutboundFrame::PlaybackComplete).unwrap();
        assert_eq!(ack, json!({"type": "frontend-playback-complete"}));
    }

    #[test]
    fn test_new_bridge_is_disconnected() {
        let bridge = bridge();
        assert_eq!(bridge.state(), ConnectionState::Disconnected);
        assert_eq!(bridge.url(), "ws://localhost:12393/client-ws");
    }

    #[test]
    fn test_mark_ready_only_leaves_busy() {
        let bridge = bridge();
        bridge.mark_ready();
        assert_eq!(bridge.state(), ConnectionState::Disconnected);

        bridge.set_state(ConnectionState::Busy);
        bridge.mark_ready();
        assert_eq!(bridge.state(), ConnectionState::Ready);
    }

    #[test]
    fn test_undelivered_message_returns_to_queue() {
        let queue = PriorityMessageQueue::new();
        queue.put(ChatMessage::new("first", "a"));
        queue.put(ChatMessage::new("second", "b"));

        let entry = queue.try_pop().unwrap();
        drop(InFlight::new(&queue, entry));
        assert_eq!(queue.try_pop().unwrap().message().username, "first");

        let entry = queue.try_pop().unwrap();
        InFlight::new(&queue, entry).delivered();
        assert!(queue.is_empty());
    }

    type SinkResult = std::result::Result<(), String>;

    /// Sink that buffers frames but never finishes flushing
    struct StalledSink {
        accepted: Vec<WsMessage>,
        reject: bool,
    }

    impl Sink<WsMessage> for StalledSink {
        type Error = String;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<SinkResult> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: WsMessage) -> SinkResult {
            let this = self.get_mut();
            if this.reject {
                return Err("socket gone".to_string());
            }
            this.accepted.push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<SinkResult> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<SinkResult> {
            Poll::Pending
        }
    }

    #[tokio::test]
    async fn test_buffered_frame_is_not_requeued_when_flush_is_cut_short() {
        let queue = PriorityMessageQueue::new();
        queue.put(ChatMessage::new("viewer", "only once please"));
        let sink = Mutex::new(StalledSink {
            accepted: Vec::new(),
            reject: false,
        });

        let entry = queue.try_pop().unwrap();
        let frame = encode(&OutboundFrame::TextInput {
            text: entry.message().relay_text(),
        })
        .unwrap();
        let cut_short = tokio::time::timeout(
            Duration::from_millis(50),
            deliver(&sink, InFlight::new(&queue, entry), frame),
        )
        .await;

        assert!(cut_short.is_err());
        assert_eq!(sink.lock().await.accepted.len(), 1);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_frame_is_requeued() {
        let queue = PriorityMessageQueue::new();
        queue.put(ChatMessage::new("viewer", "try again"));
        let sink = Mutex::new(StalledSink {
            accepted: Vec::new(),
            reject: true,
        });

        let entry = queue.try_pop().unwrap();
        let sequence = entry.sequence();
        let frame = encode(&OutboundFrame::TextInput {
            text: entry.message().relay_text(),
        })
        .unwrap();
        let err = deliver(&sink, InFlight::new(&queue, entry), frame)
            .await
            .unwrap_err();

        assert!(matches!(err, ChannelError::SendError(_)));
        let requeued = queue.try_pop().unwrap();
        assert_eq!(requeued.sequence(), sequence);
        assert_eq!(requeued.message().text, "try again");
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_while_unreachable() {
        let queue = PriorityMessageQueue::new();
        queue.put(ChatMessage::new("viewer", "anyone there?"));
        let config = RelayConfig {
            url: "ws://127.0.0.1:1/client-ws".to_string(),
            reconnect_delay_ms: 20,
        };
        let bridge = RelayBridge::new(&config, queue.clone());

        let shutdown = CancellationToken::new();
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            stopper.cancel();
        });

        tokio::time::timeout(Duration::from_secs(2), bridge.run(shutdown))
            .await
            .expect("bridge stops on shutdown");
        assert_eq!(bridge.state(), ConnectionState::Disconnected);
        assert_eq!(queue.len(), 1);
    }
}
