//! Drives QR pairing sessions against the pairing backend.
//!
//! [`SessionController`] owns at most one live transport at a time and feeds
//! everything it hears into the pairing state machine from `qrlink-pairing`.
//! [`WsTransport`] speaks WebSocket; [`FakeTransport`] lets tests play the
//! backend in-process.

mod controller;
mod fake;
mod transport;

pub use controller::SessionController;
pub use fake::{FakeConnection, FakeTransport};
pub use transport::{
    EventSender, Transport, TransportEvent, TransportEventKind, TransportHandle, WsTransport,
};
