// Telemetry merger - Folds partial frames into the latest known state
use crate::domain::telemetry::{TelemetryFrame, TelemetrySnapshot};

/// Overwrite every field the frame carries, keep every field it does not.
///
/// Presence is decided by the frame's typed accessors, so `false` and `0`
/// overwrite like any other value.
pub fn merge(previous: &TelemetrySnapshot, frame: &TelemetryFrame) -> TelemetrySnapshot {
    let mut next = previous.clone();

    if let Some(rpm) = frame.rpm() {
        next.rpm = Some(rpm);
    }
    if let Some(temperature) = frame.temperature() {
        next.temperature = Some(temperature);
    }
    if let Some(voltage) = frame.voltage() {
        next.voltage = Some(voltage);
    }
    if let Some(speed) = frame.speed() {
        next.speed_setting = Some(speed);
    }
    if let Some(active) = frame.motor_active() {
        next.motor_active = Some(active);
    }

    next
}
