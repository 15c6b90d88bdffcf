use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::frame::DecodeError;

/// A messaging account that completed QR pairing.
///
/// Timestamps are always held in the canonical `YYYY-MM-DDTHH:MM:SS.mmmZ`
/// form, whatever shape the backend sent them in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedDeviceRecord {
    /// Stable identity, used as the reconciliation key
    pub id: String,
    pub display_name: String,
    /// E.164-like phone number of the linked account
    pub phone_number: String,
    pub is_connected: bool,
    pub messages_this_month: u64,
    pub created_at: String,
    pub updated_at: String,
    pub last_synced_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDevice {
    id: Value,
    display_name: String,
    phone_number: String,
    #[serde(default = "default_connected")]
    is_connected: bool,
    #[serde(default)]
    messages_this_month: u64,
    created_at: Value,
    updated_at: Value,
    #[serde(default)]
    last_synced_at: Value,
}

fn default_connected() -> bool {
    true
}

impl LinkedDeviceRecord {
    /// Build a record from the `device` object of a step-2 frame.
    pub fn from_wire(value: &Value) -> Result<Self, DecodeError> {
        let wire = WireDevice::deserialize(value)
            .map_err(|e| DecodeError::InvalidDevice(e.to_string()))?;

        let id = match &wire.id {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return Err(DecodeError::InvalidField { field: "device.id" }),
        };

        Ok(Self {
            id,
            display_name: wire.display_name,
            phone_number: wire.phone_number,
            is_connected: wire.is_connected,
            messages_this_month: wire.messages_this_month,
            created_at: required_timestamp("createdAt", &wire.created_at)?,
            updated_at: required_timestamp("updatedAt", &wire.updated_at)?,
            last_synced_at: normalize_timestamp(&wire.last_synced_at).map_err(|reason| {
                DecodeError::InvalidTimestamp {
                    field: "lastSyncedAt",
                    reason,
                }
            })?,
        })
    }
}

fn required_timestamp(field: &'static str, value: &Value) -> Result<String, DecodeError> {
    match normalize_timestamp(value) {
        Ok(Some(ts)) => Ok(ts),
        Ok(None) => Err(DecodeError::InvalidTimestamp {
            field,
            reason: "value is null".to_string(),
        }),
        Err(reason) => Err(DecodeError::InvalidTimestamp { field, reason }),
    }
}

/// ISO-8601 layouts carrying an explicit numeric offset.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M%z",
];

/// ISO-8601 layouts read as UTC once any `Z` suffix is removed.
const UTC_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let utc = s.strip_suffix(|c: char| c == 'Z' || c == 'z').unwrap_or(s);
    for fmt in UTC_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(utc, fmt) {
            return Some(naive.and_utc());
        }
    }
    // date only: midnight UTC
    NaiveDate::parse_from_str(utc, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn canonical(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn from_millis(millis: i64) -> Result<String, String> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(canonical)
        .ok_or_else(|| format!("epoch milliseconds {millis} out of range"))
}

/// Normalize a timestamp as sent by the backend.
///
/// Accepts ISO-8601 strings (with or without seconds, fraction, offset or
/// time of day), epoch milliseconds and extended-json `{"$date": ...}`
/// objects. `null` maps to `None`; anything else is an error.
pub fn normalize_timestamp(value: &Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => parse_iso(s.trim())
            .map(|dt| Some(canonical(dt)))
            .ok_or_else(|| format!("unrecognized timestamp {s:?}")),
        Value::Number(n) => {
            let millis = match n.as_i64() {
                Some(ms) => ms,
                None => n
                    .as_f64()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
                    .ok_or_else(|| format!("unsupported numeric timestamp {n}"))?,
            };
            from_millis(millis).map(Some)
        }
        Value::Object(map) => match map.get("$date") {
            Some(inner @ (Value::String(_) | Value::Number(_))) => normalize_timestamp(inner),
            _ => Err("object timestamp without a $date value".to_string()),
        },
        Value::Bool(_) | Value::Array(_) => Err(format!("unsupported timestamp value {value}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn iso_strings_are_canonicalized() {
        assert_eq!(
            normalize_timestamp(&json!("2024-01-01T00:00:00Z")).unwrap(),
            Some("2024-01-01T00:00:00.000Z".to_string())
        );
        assert_eq!(
            normalize_timestamp(&json!("2024-01-01T02:30:00.5+02:00")).unwrap(),
            Some("2024-01-01T00:30:00.500Z".to_string())
        );
        assert_eq!(
            normalize_timestamp(&json!("2024-03-05T10:11:12")).unwrap(),
            Some("2024-03-05T10:11:12.000Z".to_string())
        );
    }

    #[test]
    fn native_dates_become_strings() {
        assert_eq!(
            normalize_timestamp(&json!(1_704_067_200_000i64)).unwrap(),
            Some("2024-01-01T00:00:00.000Z".to_string())
        );
        assert_eq!(
            normalize_timestamp(&json!({"$date": 1_704_067_200_000i64})).unwrap(),
            Some("2024-01-01T00:00:00.000Z".to_string())
        );
        assert_eq!(
            normalize_timestamp(&json!({"$date": "2024-01-01T00:00:00Z"})).unwrap(),
            Some("2024-01-01T00:00:00.000Z".to_string())
        );
    }

    #[test]
    fn null_stays_null() {
        assert_eq!(normalize_timestamp(&Value::Null).unwrap(), None);
    }

    #[test]
    fn iso_variants_share_one_form() {
        for input in [
            "2024-01-01",
            "2024-01-01T00:00:00+0000",
            "2024-01-01T00:00Z",
            "2024-01-01 00:00:00",
            "2024-01-01 00:00:00Z",
            "2024-01-01T02:00+0200",
            "2023-12-31T19:00:00-0500",
        ] {
            assert_eq!(
                normalize_timestamp(&json!(input)).unwrap(),
                Some("2024-01-01T00:00:00.000Z".to_string()),
                "{input}"
            );
        }
    }

    #[test]
    fn unparsable_strings_are_rejected() {
        assert!(normalize_timestamp(&json!("yesterday")).is_err());
        assert!(normalize_timestamp(&json!("2024-13-01")).is_err());
        assert!(normalize_timestamp(&json!("")).is_err());
    }

    #[test]
    fn device_with_unparsable_timestamp_is_rejected() {
        let err = LinkedDeviceRecord::from_wire(&json!({
            "id": "d1",
            "displayName": "Shop A",
            "phoneNumber": "+15551234567",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "last tuesday",
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidTimestamp {
                field: "updatedAt",
                ..
            }
        ));
    }

    #[test]
    fn rejects_non_date_shapes() {
        assert!(normalize_timestamp(&json!(true)).is_err());
        assert!(normalize_timestamp(&json!([1, 2])).is_err());
        assert!(normalize_timestamp(&json!({"when": 1})).is_err());
    }

    #[test]
    fn device_defaults_apply() {
        let record = LinkedDeviceRecord::from_wire(&json!({
            "id": 17,
            "displayName": "Front desk",
            "phoneNumber": "+15550000000",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": {"$date": 1_704_067_200_000i64},
        }))
        .unwrap();

        assert_eq!(record.id, "17");
        assert!(record.is_connected);
        assert_eq!(record.messages_this_month, 0);
        assert_eq!(record.updated_at, "2024-01-01T00:00:00.000Z");
        assert_eq!(record.last_synced_at, None);
    }

    #[test]
    fn device_requires_created_at() {
        let err = LinkedDeviceRecord::from_wire(&json!({
            "id": "d1",
            "displayName": "Shop A",
            "phoneNumber": "+15551234567",
            "createdAt": null,
            "updatedAt": "2024-01-01T00:00:00Z",
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidTimestamp {
                field: "createdAt",
                ..
            }
        ));
    }

    #[test]
    fn negative_message_count_is_rejected() {
        let err = LinkedDeviceRecord::from_wire(&json!({
            "id": "d1",
            "displayName": "Shop A",
            "phoneNumber": "+15551234567",
            "messagesThisMonth": -1,
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z",
        }))
        .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidDevice(_)));
    }
}
