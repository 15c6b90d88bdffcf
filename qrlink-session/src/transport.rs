use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use url::Url;

/// What happened on a transport, as seen by the session controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Open,
    Message(String),
    Error(String),
    /// The remote end went away. Never emitted for a locally requested close.
    Close,
}

/// A transport event tagged with the generation of the session that opened
/// the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub generation: u64,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn new(generation: u64, kind: TransportEventKind) -> Self {
        Self { generation, kind }
    }
}

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Opens duplex connections to the pairing backend.
///
/// `open` must return immediately; connection progress and failures are
/// reported through `events`, never returned to the caller.
pub trait Transport: Send + Sync + 'static {
    fn open(&self, url: &Url, generation: u64, events: EventSender) -> Box<dyn TransportHandle>;
}

/// One open (or opening) connection. Dropping the handle closes it.
pub trait TransportHandle: Send {
    fn send(&mut self, frame: String);
    /// Idempotent.
    fn close(&mut self);
    fn is_closed(&self) -> bool;
}

/// WebSocket transport on top of tokio-tungstenite.
///
/// Each connection runs in its own tokio task, so `open` must be called from
/// within a tokio runtime.
#[derive(Debug, Default, Clone)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

enum Command {
    Send(String),
    Close,
}

struct WsHandle {
    generation: u64,
    commands: mpsc::UnboundedSender<Command>,
    closed: bool,
}

impl TransportHandle for WsHandle {
    fn send(&mut self, frame: String) {
        if self.closed {
            debug!("transport {}: dropping frame sent after close", self.generation);
            return;
        }
        if self.commands.send(Command::Send(frame)).is_err() {
            debug!("transport {}: connection task already ended", self.generation);
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.commands.send(Command::Close);
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for WsHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl Transport for WsTransport {
    fn open(&self, url: &Url, generation: u64, events: EventSender) -> Box<dyn TransportHandle> {
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_connection(url.clone(), generation, events, rx));
        Box::new(WsHandle {
            generation,
            commands,
            closed: false,
        })
    }
}

struct Emitter {
    generation: u64,
    events: EventSender,
}

impl Emitter {
    fn emit(&self, kind: TransportEventKind) {
        if self.events.send(TransportEvent::new(self.generation, kind)).is_err() {
            debug!("transport {}: controller is gone", self.generation);
        }
    }
}

/// Resolves once the owner asks for a close or drops its handle.
async fn closed_by_owner(commands: &mut mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        if let Command::Close = command {
            return;
        }
    }
}

async fn run_connection(
    url: Url,
    generation: u64,
    events: EventSender,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let emitter = Emitter { generation, events };

    info!("transport {generation}: connecting to {url}");
    let stream = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((stream, _response)) => stream,
            Err(e) => {
                warn!("transport {generation}: failed to connect to {url}: {e}");
                emitter.emit(TransportEventKind::Error(e.to_string()));
                return;
            }
        },
        _ = closed_by_owner(&mut commands) => {
            debug!("transport {generation}: closed before the connection opened");
            return;
        }
    };

    emitter.emit(TransportEventKind::Open);
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(frame)) => {
                    if let Err(e) = write.send(WsMessage::Text(frame)).await {
                        warn!("transport {generation}: send failed: {e}");
                        emitter.emit(TransportEventKind::Error(e.to_string()));
                        return;
                    }
                }
                Some(Command::Close) | None => {
                    debug!("transport {generation}: closing");
                    let _ = write.send(WsMessage::Close(None)).await;
                    let _ = write.close().await;
                    return;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    emitter.emit(TransportEventKind::Message(text));
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    emitter.emit(TransportEventKind::Message(
                        String::from_utf8_lossy(&bytes).into_owned(),
                    ));
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    info!("transport {generation}: backend closed the connection ({frame:?})");
                    emitter.emit(TransportEventKind::Close);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("transport {generation}: websocket error: {e}");
                    emitter.emit(TransportEventKind::Error(e.to_string()));
                    return;
                }
                None => {
                    info!("transport {generation}: connection ended");
                    emitter.emit(TransportEventKind::Close);
                    return;
                }
            }
        }
    }
}
