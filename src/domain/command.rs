// Outbound command domain model

/// Inclusive upper bound of the speed setting, in percent.
pub const MAX_SPEED: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetSpeed(u8),
    MotorStart,
    MotorStop,
    Heartbeat,
}

/// Rounds an operator value to a whole percent in 0..=100; NaN becomes 0.
pub fn clamp_speed(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, MAX_SPEED as f64) as u8
}
