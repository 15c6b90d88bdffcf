mod config;
mod endpoint;
mod machine;
mod phase;
mod qr;
mod registry;

pub use config::{
    PairingConfig, DEFAULT_IDLE_TIMEOUT, DEFAULT_PAIRING_PORT, ENV_PAGE_HOST, ENV_PAGE_SECURE,
    ENV_PAIRING_PORT, ENV_PAIRING_URL, ENV_TIMEOUT_SECS,
};
pub use endpoint::{resolve_endpoint, EndpointError, PageOrigin};
pub use machine::{
    next_phase, Effect, PairingEvent, PairingMachine, PairingSnapshot, MSG_CANCELLED, MSG_CLOSED,
    MSG_CONNECTING, MSG_CONNECTION_FAILED, MSG_SCAN, MSG_SCANNED, MSG_TIMED_OUT, MSG_UNEXPECTED,
    MSG_WAITING,
};
pub use phase::PairingPhase;
pub use qr::{QrImage, QrImageError};
pub use registry::{upsert_device, DeviceList, DeviceRegistry};

pub use qrlink_proto::LinkedDeviceRecord;
