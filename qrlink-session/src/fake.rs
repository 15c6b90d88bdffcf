use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;

use crate::transport::{EventSender, Transport, TransportEvent, TransportEventKind, TransportHandle};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process transport for driving a controller without a network.
///
/// Every `open` is recorded as a [`FakeConnection`] through which the
/// caller plays the backend's part.
#[derive(Clone, Default)]
pub struct FakeTransport {
    connections: Arc<Mutex<Vec<FakeConnection>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connection ever opened, oldest first.
    pub fn connections(&self) -> Vec<FakeConnection> {
        lock(&self.connections).clone()
    }

    pub fn last(&self) -> Option<FakeConnection> {
        lock(&self.connections).last().cloned()
    }

    /// Connections whose handle has not been closed.
    pub fn live_count(&self) -> usize {
        lock(&self.connections)
            .iter()
            .filter(|c| !c.is_closed())
            .count()
    }
}

impl Transport for FakeTransport {
    fn open(&self, url: &Url, generation: u64, events: EventSender) -> Box<dyn TransportHandle> {
        let conn = FakeConnection {
            url: url.clone(),
            generation,
            events,
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let handle = FakeHandle {
            sent: conn.sent.clone(),
            closed: conn.closed.clone(),
        };
        lock(&self.connections).push(conn);
        Box::new(handle)
    }
}

#[derive(Clone)]
pub struct FakeConnection {
    pub url: Url,
    pub generation: u64,
    events: EventSender,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl FakeConnection {
    pub fn emit(&self, kind: TransportEventKind) {
        let _ = self.events.send(TransportEvent::new(self.generation, kind));
    }

    pub fn open(&self) {
        self.emit(TransportEventKind::Open);
    }

    pub fn message(&self, raw: &str) {
        self.emit(TransportEventKind::Message(raw.to_string()));
    }

    pub fn fail(&self, reason: &str) {
        self.emit(TransportEventKind::Error(reason.to_string()));
    }

    pub fn remote_close(&self) {
        self.emit(TransportEventKind::Close);
    }

    /// Frames the controller sent on this connection.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct FakeHandle {
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl TransportHandle for FakeHandle {
    fn send(&mut self, frame: String) {
        if !self.is_closed() {
            lock(&self.sent).push(frame);
        }
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.close();
    }
}
