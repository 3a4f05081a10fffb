// Wire codec - JSON text frames to and from the device
use crate::domain::command::Command;
use crate::domain::telemetry::TelemetryFrame;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Field aliases the firmware may send, mapped to their canonical key.
const ALIASES: [(&str, &str); 2] = [("temp", "temperature"), ("battery", "voltage")];

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    NotUtf8(#[from] std::str::Utf8Error),
    #[error("payload is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("payload is JSON but not an object")]
    NotAnObject,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireCommand<'a> {
    Speed { speed: u8 },
    Named { command: &'a str },
}

impl<'a> From<&'a Command> for WireCommand<'a> {
    fn from(command: &'a Command) -> Self {
        match command {
            Command::SetSpeed(speed) => WireCommand::Speed { speed: *speed },
            Command::MotorStart => WireCommand::Named { command: "motor_start" },
            Command::MotorStop => WireCommand::Named { command: "motor_stop" },
            Command::Heartbeat => WireCommand::Named { command: "heartbeat" },
        }
    }
}

/// Serialize a command to its JSON text frame.
pub fn encode(command: &Command) -> String {
    // Serializing a fixed-shape struct with string and integer fields cannot fail.
    serde_json::to_string(&WireCommand::from(command)).unwrap_or_default()
}

/// Decode one inbound message and normalize field aliases.
pub fn decode(payload: &[u8]) -> Result<TelemetryFrame, DecodeError> {
    let text = std::str::from_utf8(payload)?;
    match serde_json::from_str::<Value>(text)? {
        Value::Object(fields) => Ok(TelemetryFrame::new(normalize(fields))),
        _ => Err(DecodeError::NotAnObject),
    }
}

/// A non-null alias wins over its canonical key and is stored under it.
fn normalize(mut fields: Map<String, Value>) -> Map<String, Value> {
    for (alias, canonical) in ALIASES {
        match fields.remove(alias) {
            Some(Value::Null) | None => {}
            Some(value) => {
                fields.insert(canonical.to_string(), value);
            }
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_command_shapes() {
        assert_eq!(encode(&Command::SetSpeed(40)), r#"{"speed":40}"#);
        assert_eq!(encode(&Command::MotorStart), r#"{"command":"motor_start"}"#);
        assert_eq!(encode(&Command::MotorStop), r#"{"command":"motor_stop"}"#);
        assert_eq!(encode(&Command::Heartbeat), r#"{"command":"heartbeat"}"#);
    }

    #[test]
    fn test_decode_normalizes_aliases() {
        let frame = decode(br#"{"rpm": 12, "temp": 31.5, "battery": 11.9}"#).unwrap();
        assert_eq!(frame.rpm(), Some(12.0));
        assert_eq!(frame.temperature(), Some(31.5));
        assert_eq!(frame.voltage(), Some(11.9));
        assert!(frame.get("temp").is_none());
        assert!(frame.get("battery").is_none());
    }

    #[test]
    fn test_alias_wins_over_canonical() {
        let frame = decode(br#"{"temperature": 20, "temp": 25, "voltage": 3.3}"#).unwrap();
        assert_eq!(frame.temperature(), Some(25.0));
        assert_eq!(frame.voltage(), Some(3.3));
    }

    #[test]
    fn test_null_alias_keeps_canonical_value() {
        let frame = decode(br#"{"temperature": 20, "temp": null, "battery": null}"#).unwrap();
        assert_eq!(frame.temperature(), Some(20.0));
        assert!(frame.get("temp").is_none());
        assert!(frame.get("voltage").is_none());
    }

    #[test]
    fn test_unknown_fields_are_preserved() {
        let frame = decode(br#"{"rpm": 1, "uptime": 99}"#).unwrap();
        assert_eq!(frame.get("uptime"), Some(&Value::from(99)));
        assert!(frame.get("rpm").is_some());
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(decode(b"{not json"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode(b"[1,2,3]"), Err(DecodeError::NotAnObject)));
        assert!(matches!(decode(&[0xff, 0xfe]), Err(DecodeError::NotUtf8(_))));
    }
}
