// Telemetry data domain models
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// The three charted metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Rpm,
    Temperature,
    Voltage,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Rpm, Metric::Temperature, Metric::Voltage];

    /// Position in [`Metric::ALL`].
    pub fn index(&self) -> usize {
        match self {
            Metric::Rpm => 0,
            Metric::Temperature => 1,
            Metric::Voltage => 2,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Metric::Rpm => "Impeller RPM",
            Metric::Temperature => "Exhaust Temperature",
            Metric::Voltage => "Battery Voltage",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Metric::Rpm => "RPM",
            Metric::Temperature => "°C",
            Metric::Voltage => "V",
        }
    }

    /// Decimal places used when showing values of this metric.
    pub fn precision(&self) -> usize {
        match self {
            Metric::Rpm => 0,
            Metric::Temperature => 1,
            Metric::Voltage => 2,
        }
    }

    /// Reads this metric's value out of a snapshot.
    pub fn value_in(&self, snapshot: &TelemetrySnapshot) -> Option<f64> {
        match self {
            Metric::Rpm => snapshot.rpm,
            Metric::Temperature => snapshot.temperature,
            Metric::Voltage => snapshot.voltage,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Rpm => "rpm",
            Metric::Temperature => "temperature",
            Metric::Voltage => "voltage",
        };
        f.write_str(name)
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rpm" => Ok(Metric::Rpm),
            "temperature" | "temp" => Ok(Metric::Temperature),
            "voltage" | "battery" => Ok(Metric::Voltage),
            other => Err(format!("unknown metric: {}", other)),
        }
    }
}

/// Latest known device state. Every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub rpm: Option<f64>,
    pub temperature: Option<f64>,
    pub voltage: Option<f64>,
    pub speed_setting: Option<u8>,
    pub motor_active: Option<bool>,
}

impl TelemetrySnapshot {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One decoded inbound message, already alias-normalized.
///
/// Unknown keys are kept so the frame round-trips into logs intact, but the
/// typed accessors only look at the canonical telemetry keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryFrame {
    fields: Map<String, Value>,
}

impl TelemetryFrame {
    pub const RPM: &'static str = "rpm";
    pub const TEMPERATURE: &'static str = "temperature";
    pub const VOLTAGE: &'static str = "voltage";
    pub const SPEED: &'static str = "speed";
    pub const MOTOR_ACTIVE: &'static str = "motor_active";

    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn rpm(&self) -> Option<f64> {
        self.number(Self::RPM)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.number(Self::TEMPERATURE)
    }

    pub fn voltage(&self) -> Option<f64> {
        self.number(Self::VOLTAGE)
    }

    /// Device speed setting; floats are truncated and the result clamped to 0..=100.
    pub fn speed(&self) -> Option<u8> {
        let raw = self.number(Self::SPEED)?;
        Some(raw.trunc().clamp(0.0, 100.0) as u8)
    }

    pub fn motor_active(&self) -> Option<bool> {
        match self.get(Self::MOTOR_ACTIVE) {
            Some(Value::Bool(active)) => Some(*active),
            Some(other) => {
                tracing::debug!("Ignoring non-boolean motor_active: {}", other);
                None
            }
            None => None,
        }
    }

    fn number(&self, key: &str) -> Option<f64> {
        match self.get(key) {
            Some(value) => {
                let number = value.as_f64().filter(|v| v.is_finite());
                if number.is_none() {
                    tracing::debug!("Ignoring non-numeric {}: {}", key, value);
                }
                number
            }
            None => None,
        }
    }
}

/// One retained sample of a series, timestamped in monotonic milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub at_ms: u64,
    pub value: f64,
}

impl HistoryPoint {
    pub fn new(at_ms: u64, value: f64) -> Self {
        Self { at_ms, value }
    }
}

/// Vertical scale of a chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VisualRange {
    pub min: f64,
    pub max: f64,
}

impl VisualRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Rolling readout shown next to a chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesStats {
    pub latest: f64,
    pub min: f64,
    pub max: f64,
}

/// Read-only copy of a series buffer as published to readers.
///
/// `first_seq` is the sequence number of `points[0]`; sequence numbers count
/// every accepted push since the buffer was created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSnapshot {
    pub metric: Metric,
    pub first_seq: u64,
    pub points: Vec<HistoryPoint>,
    pub range: VisualRange,
    pub pinned: bool,
    pub stats: Option<SeriesStats>,
}

impl SeriesSnapshot {
    pub fn end_seq(&self) -> u64 {
        self.first_seq + self.points.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(value: Value) -> TelemetryFrame {
        match value {
            Value::Object(map) => TelemetryFrame::new(map),
            _ => panic!("test frame must be an object"),
        }
    }

    #[test]
    fn test_speed_is_truncated_and_clamped() {
        assert_eq!(frame(json!({"speed": 42.9})).speed(), Some(42));
        assert_eq!(frame(json!({"speed": 140})).speed(), Some(100));
        assert_eq!(frame(json!({"speed": -3})).speed(), Some(0));
        assert_eq!(frame(json!({"speed": 0})).speed(), Some(0));
    }

    #[test]
    fn test_wrong_types_are_unusable() {
        let f = frame(json!({"rpm": "fast", "motor_active": 1, "voltage": null}));
        assert!(f.get("rpm").is_some());
        assert_eq!(f.rpm(), None);
        assert_eq!(f.motor_active(), None);
        assert_eq!(f.voltage(), None);
    }

    #[test]
    fn test_metric_parse_accepts_aliases() {
        assert_eq!("temp".parse::<Metric>(), Ok(Metric::Temperature));
        assert_eq!("battery".parse::<Metric>(), Ok(Metric::Voltage));
        assert!("pressure".parse::<Metric>().is_err());
    }

    #[test]
    fn test_metric_reads_snapshot_field() {
        let snapshot = TelemetrySnapshot {
            rpm: Some(12.0),
            voltage: Some(11.1),
            ..Default::default()
        };
        assert_eq!(Metric::Rpm.value_in(&snapshot), Some(12.0));
        assert_eq!(Metric::Temperature.value_in(&snapshot), None);
        assert_eq!(Metric::Voltage.value_in(&snapshot), Some(11.1));
    }
}
