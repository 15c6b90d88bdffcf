use log::debug;
use qrlink_proto::{DecodeError, InboundFrame, LinkedDeviceRecord};
use serde::Serialize;

use crate::phase::PairingPhase;

pub const MSG_CONNECTING: &str = "Connecting to the pairing service";
pub const MSG_WAITING: &str = "Waiting for a QR code";
pub const MSG_SCAN: &str = "Scan the QR code with the phone you want to link";
pub const MSG_SCANNED: &str = "QR code scanned, confirm the link on your phone";
pub const MSG_UNEXPECTED: &str = "Received an unexpected response from the pairing service";
pub const MSG_CONNECTION_FAILED: &str = "Could not connect to the pairing service";
pub const MSG_CLOSED: &str = "The pairing session was closed";
pub const MSG_TIMED_OUT: &str = "Pairing timed out";
pub const MSG_CANCELLED: &str = "Pairing cancelled";

/// Everything that can move a session between phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    /// `start()` for the given generation
    Start { generation: u64 },
    /// The transport finished connecting
    Opened,
    Frame(InboundFrame),
    /// An inbound frame the codec rejected
    Undecodable(DecodeError),
    /// The transport failed (connect refused, network drop, ...)
    TransportError(String),
    /// The remote end closed the connection
    Closed,
    /// No inbound traffic within the idle timeout
    TimedOut,
    Cancel,
}

/// Work the owner of the transport must carry out after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    OpenTransport,
    SendHandshake,
    CloseTransport,
    DeviceLinked(LinkedDeviceRecord),
}

/// Read-only view of the current session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PairingSnapshot {
    pub generation: u64,
    pub phase: PairingPhase,
    pub message: String,
    pub last_error: Option<String>,
    pub qr_payload: Option<String>,
    pub device: Option<LinkedDeviceRecord>,
}

/// The transition table as a pure function.
pub fn next_phase(phase: PairingPhase, event: &PairingEvent) -> PairingPhase {
    use PairingPhase::*;

    match (phase, event) {
        (_, PairingEvent::Cancel) => Idle,
        (_, PairingEvent::Start { .. }) => Connecting,
        (Idle, _) => Idle,
        (Connecting, PairingEvent::Opened) => Waiting,
        (Waiting, PairingEvent::Frame(InboundFrame::Qr { .. })) => Waiting,
        (Waiting | Scanned, PairingEvent::Frame(InboundFrame::Scanned)) => Scanned,
        (_, PairingEvent::Frame(InboundFrame::Linked { .. })) => Completed,
        (_, PairingEvent::Frame(InboundFrame::Error { .. })) => Error,
        (_, PairingEvent::Undecodable(_)) => Error,
        (_, PairingEvent::TransportError(_)) => Error,
        (Completed, PairingEvent::Closed) => Completed,
        (_, PairingEvent::Closed) => Idle,
        (Connecting | Waiting | Scanned, PairingEvent::TimedOut) => Error,
        (current, _) => current,
    }
}

/// Applies [`next_phase`] to a snapshot and reports the side effects.
#[derive(Debug, Default)]
pub struct PairingMachine {
    snapshot: PairingSnapshot,
}

impl PairingMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &PairingSnapshot {
        &self.snapshot
    }

    pub fn phase(&self) -> PairingPhase {
        self.snapshot.phase
    }

    pub fn apply(&mut self, event: PairingEvent) -> Vec<Effect> {
        let from = self.snapshot.phase;
        let to = next_phase(from, &event);
        let mut effects = Vec::new();

        match event {
            PairingEvent::Start { generation } => {
                if from != PairingPhase::Idle {
                    effects.push(Effect::CloseTransport);
                }
                self.snapshot = PairingSnapshot {
                    generation,
                    phase: to,
                    message: MSG_CONNECTING.to_string(),
                    ..PairingSnapshot::default()
                };
                effects.push(Effect::OpenTransport);
            }
            PairingEvent::Cancel => {
                if from == PairingPhase::Idle {
                    return effects;
                }
                self.snapshot.message = MSG_CANCELLED.to_string();
                self.snapshot.qr_payload = None;
                self.snapshot.last_error = None;
                effects.push(Effect::CloseTransport);
            }
            ref ignored if from == PairingPhase::Idle => {
                debug!("ignoring {ignored:?} while idle");
                return effects;
            }
            PairingEvent::Opened => {
                if from != PairingPhase::Connecting {
                    debug!("ignoring transport open in phase {from}");
                    return effects;
                }
                self.snapshot.message = MSG_WAITING.to_string();
                effects.push(Effect::SendHandshake);
            }
            PairingEvent::Frame(InboundFrame::Qr { qr }) => {
                if from != PairingPhase::Waiting {
                    debug!("ignoring qr payload in phase {from}");
                    return effects;
                }
                self.snapshot.qr_payload = Some(qr);
                self.snapshot.last_error = None;
                self.snapshot.message = MSG_SCAN.to_string();
            }
            PairingEvent::Frame(InboundFrame::Scanned) => {
                if to != PairingPhase::Scanned {
                    debug!("ignoring scan notice in phase {from}");
                    return effects;
                }
                self.snapshot.qr_payload = None;
                self.snapshot.message = MSG_SCANNED.to_string();
            }
            PairingEvent::Frame(InboundFrame::Linked { device }) => {
                if from == PairingPhase::Completed {
                    debug!("ignoring repeated link notice for {}", device.id);
                    return effects;
                }
                self.snapshot.message = format!("Device linked: {}", device.display_name);
                self.snapshot.qr_payload = None;
                self.snapshot.last_error = None;
                self.snapshot.device = Some(device.clone());
                effects.push(Effect::DeviceLinked(device));
                effects.push(Effect::CloseTransport);
            }
            PairingEvent::Frame(InboundFrame::Error { code, message }) => {
                let text = message.unwrap_or_else(|| format!("Pairing failed (code {code})"));
                self.fail(text, &mut effects);
            }
            PairingEvent::Undecodable(_) => {
                self.fail(MSG_UNEXPECTED.to_string(), &mut effects);
            }
            PairingEvent::TransportError(detail) => {
                debug!("transport error: {detail}");
                self.fail(MSG_CONNECTION_FAILED.to_string(), &mut effects);
            }
            PairingEvent::Closed => {
                if from == PairingPhase::Completed {
                    return effects;
                }
                self.snapshot.message = MSG_CLOSED.to_string();
                self.snapshot.qr_payload = None;
                self.snapshot.last_error = None;
                effects.push(Effect::CloseTransport);
            }
            PairingEvent::TimedOut => {
                if !from.is_live() {
                    return effects;
                }
                self.fail(MSG_TIMED_OUT.to_string(), &mut effects);
            }
        }

        if from != to {
            debug!("pairing phase {from} -> {to}");
        }
        self.snapshot.phase = to;
        effects
    }

    fn fail(&mut self, text: String, effects: &mut Vec<Effect>) {
        self.snapshot.qr_payload = None;
        self.snapshot.message = text.clone();
        self.snapshot.last_error = Some(text);
        effects.push(Effect::CloseTransport);
    }
}
