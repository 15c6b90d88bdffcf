use k9::assert_equal;
use qrlink_pairing::{
    next_phase, Effect, PairingEvent, PairingMachine, PairingPhase, MSG_CLOSED, MSG_SCAN,
    MSG_SCANNED,
};
use qrlink_proto::{decode_frame, DecodeError, InboundFrame, LinkedDeviceRecord};

use PairingPhase::*;

fn device() -> LinkedDeviceRecord {
    LinkedDeviceRecord {
        id: "d1".to_string(),
        display_name: "Shop A".to_string(),
        phone_number: "+15551234567".to_string(),
        is_connected: true,
        messages_this_month: 0,
        created_at: "2024-01-01T00:00:00.000Z".to_string(),
        updated_at: "2024-01-01T00:00:00.000Z".to_string(),
        last_synced_at: None,
    }
}

fn qr() -> PairingEvent {
    PairingEvent::Frame(InboundFrame::Qr {
        qr: "data:image/png;base64,AA".to_string(),
    })
}

fn scanned() -> PairingEvent {
    PairingEvent::Frame(InboundFrame::Scanned)
}

fn linked() -> PairingEvent {
    PairingEvent::Frame(InboundFrame::Linked { device: device() })
}

fn error_frame() -> PairingEvent {
    PairingEvent::Frame(InboundFrame::Error {
        code: 3,
        message: Some("expired".to_string()),
    })
}

#[test]
fn test_transition_table() {
    let rows: Vec<(PairingPhase, PairingEvent, PairingPhase)> = vec![
        (Idle, PairingEvent::Start { generation: 1 }, Connecting),
        (Waiting, PairingEvent::Start { generation: 2 }, Connecting),
        (Completed, PairingEvent::Start { generation: 2 }, Connecting),
        (Connecting, PairingEvent::Opened, Waiting),
        (Waiting, qr(), Waiting),
        (Waiting, scanned(), Scanned),
        (Scanned, scanned(), Scanned),
        (Connecting, linked(), Completed),
        (Waiting, linked(), Completed),
        (Scanned, linked(), Completed),
        (Connecting, error_frame(), Error),
        (Waiting, error_frame(), Error),
        (Scanned, error_frame(), Error),
        (Connecting, PairingEvent::Undecodable(DecodeError::NotAnObject), Error),
        (Waiting, PairingEvent::Undecodable(DecodeError::NotAnObject), Error),
        (Scanned, PairingEvent::Undecodable(DecodeError::Unrecognized), Error),
        (Connecting, PairingEvent::TransportError("refused".to_string()), Error),
        (Waiting, PairingEvent::TransportError("reset".to_string()), Error),
        (Scanned, PairingEvent::TransportError("reset".to_string()), Error),
        (Connecting, PairingEvent::Closed, Idle),
        (Waiting, PairingEvent::Closed, Idle),
        (Scanned, PairingEvent::Closed, Idle),
        (Completed, PairingEvent::Closed, Completed),
        (Connecting, PairingEvent::TimedOut, Error),
        (Waiting, PairingEvent::TimedOut, Error),
        (Scanned, PairingEvent::TimedOut, Error),
        (Completed, PairingEvent::TimedOut, Completed),
        (Error, PairingEvent::TimedOut, Error),
        (Scanned, qr(), Scanned),
        (Idle, qr(), Idle),
        (Idle, linked(), Idle),
        (Idle, PairingEvent::Closed, Idle),
    ];

    for (from, event, expected) in rows {
        assert_eq!(next_phase(from, &event), expected, "{from} + {event:?}");
    }
}

#[test]
fn test_cancel_always_returns_to_idle() {
    for phase in PairingPhase::ALL {
        assert_equal!(next_phase(phase, &PairingEvent::Cancel), Idle);
    }
}

#[test]
fn test_frames_drive_machine_from_wire() {
    let mut machine = PairingMachine::new();
    assert_equal!(
        machine.apply(PairingEvent::Start { generation: 1 }),
        vec![Effect::OpenTransport]
    );
    assert_equal!(
        machine.apply(PairingEvent::Opened),
        vec![Effect::SendHandshake]
    );

    let frame = decode_frame(r#"{"code":0,"data":{"qr":"data:image/png;base64,AA"}}"#).unwrap();
    machine.apply(PairingEvent::Frame(frame));
    assert_equal!(machine.phase(), Waiting);
    assert_equal!(machine.snapshot().message, MSG_SCAN.to_string());

    let frame = decode_frame(r#"{"data":{"step":1}}"#).unwrap();
    machine.apply(PairingEvent::Frame(frame));
    assert_equal!(machine.phase(), Scanned);
    assert_equal!(machine.snapshot().message, MSG_SCANNED.to_string());
    assert_equal!(machine.snapshot().qr_payload, None);

    let effects = machine.apply(linked());
    assert_equal!(
        effects,
        vec![Effect::DeviceLinked(device()), Effect::CloseTransport]
    );
    assert_equal!(machine.snapshot().device, Some(device()));
    assert_equal!(machine.snapshot().message, "Device linked: Shop A".to_string());
}

#[test]
fn test_close_while_scanned_is_soft() {
    let mut machine = PairingMachine::new();
    machine.apply(PairingEvent::Start { generation: 1 });
    machine.apply(PairingEvent::Opened);
    machine.apply(scanned());

    assert_equal!(
        machine.apply(PairingEvent::Closed),
        vec![Effect::CloseTransport]
    );
    assert_equal!(machine.phase(), Idle);
    assert_equal!(machine.snapshot().message, MSG_CLOSED.to_string());
    assert_equal!(machine.snapshot().last_error, None);
}

#[test]
fn test_snapshot_serializes_for_observers() {
    let mut machine = PairingMachine::new();
    machine.apply(PairingEvent::Start { generation: 4 });
    let value = serde_json::to_value(machine.snapshot()).unwrap();
    assert_equal!(value["phase"], serde_json::json!("connecting"));
    assert_equal!(value["generation"], serde_json::json!(4));
}
