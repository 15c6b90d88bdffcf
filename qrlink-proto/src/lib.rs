//! Wire codec for the QR device-pairing protocol.
//!
//! The pairing backend speaks JSON text frames over a WebSocket. The client
//! sends one [`Handshake`] and then receives a sequence of [`InboundFrame`]s.

pub mod device;
pub mod frame;

pub use device::{normalize_timestamp, LinkedDeviceRecord};
pub use frame::{decode_frame, DecodeError, Handshake, InboundFrame};
