// Motor control service - Speed slider, presets and start/stop over the link
use crate::application::device_link::LinkHandle;
use crate::domain::command::{Command, clamp_speed};
use crate::domain::link::LinkError;
use crate::domain::telemetry::TelemetrySnapshot;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::task::JoinHandle;

pub const SPEED_PRESETS: [u8; 6] = [0, 20, 40, 60, 80, 100];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("device is not connected")]
    NotConnected,
    #[error("{0} is not a speed preset")]
    InvalidPreset(u8),
    #[error("motor is already started")]
    AlreadyStarted,
    #[error("motor is not started")]
    NotStarted,
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Nearest 20 % step, the granularity the device reports speed in.
pub fn display_step(speed: u8) -> u8 {
    ((speed as f64 / 20.0).round() * 20.0) as u8
}

/// What the operator's controls show and which of them are usable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlView {
    pub speed: u8,
    pub started: bool,
    pub connected: bool,
    pub speed_enabled: bool,
    pub start_enabled: bool,
    pub stop_enabled: bool,
    pub presets: [u8; 6],
}

/// Control state kept in step with the device.
///
/// Device-reported speed and motor state only override the local state when
/// they change, so an optimistic start or stop is not undone by a repeat of
/// the previous report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlPanel {
    speed: u8,
    started: bool,
    connected: bool,
    device_speed: Option<u8>,
    device_motor_active: Option<bool>,
}

impl ControlPanel {
    pub fn observe(&mut self, snapshot: &TelemetrySnapshot, connected: bool) {
        if !connected && self.started {
            tracing::debug!("Link down, clearing started flag");
            self.started = false;
        }
        self.connected = connected;

        if snapshot.speed_setting != self.device_speed {
            if let Some(speed) = snapshot.speed_setting {
                self.speed = display_step(speed);
            }
            self.device_speed = snapshot.speed_setting;
        }

        if snapshot.motor_active != self.device_motor_active {
            if let Some(active) = snapshot.motor_active {
                tracing::debug!("Device reports motor_active={}", active);
                self.started = active;
            }
            self.device_motor_active = snapshot.motor_active;
        }
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn view(&self) -> ControlView {
        ControlView {
            speed: self.speed,
            started: self.started,
            connected: self.connected,
            speed_enabled: self.connected,
            start_enabled: self.connected && !self.started,
            stop_enabled: self.connected && self.started,
            presets: SPEED_PRESETS,
        }
    }
}

#[derive(Clone)]
pub struct MotorControlService {
    link: LinkHandle,
    panel: Arc<Mutex<ControlPanel>>,
}

impl MotorControlService {
    pub fn new(link: LinkHandle) -> Self {
        Self {
            link,
            panel: Arc::new(Mutex::new(ControlPanel::default())),
        }
    }

    /// Keeps the panel following link status and device reports until the link stops.
    pub fn spawn_sync(&self) -> JoinHandle<()> {
        let panel = self.panel.clone();
        let mut status = self.link.watch_status();
        let mut snapshot = self.link.watch_snapshot();

        tokio::spawn(async move {
            loop {
                {
                    let connected = status.borrow_and_update().connected;
                    let latest = snapshot.borrow_and_update().clone();
                    lock(&panel).observe(&latest, connected);
                }

                tokio::select! {
                    changed = status.changed() => if changed.is_err() { break },
                    changed = snapshot.changed() => if changed.is_err() { break },
                }
            }
            tracing::debug!("Control sync stopped");
        })
    }

    pub fn view(&self) -> ControlView {
        let mut view = lock(&self.panel).view();
        view.connected = self.link.is_connected();
        view.speed_enabled &= view.connected;
        view.start_enabled &= view.connected;
        view.stop_enabled &= view.connected;
        view
    }

    /// Clamps to 0..=100 and sends the exact value right away.
    pub async fn set_speed(&self, value: f64) -> Result<u8, ControlError> {
        self.require_connected()?;
        let speed = clamp_speed(value);
        lock(&self.panel).speed = speed;
        self.link.send(Command::SetSpeed(speed)).await?;
        Ok(speed)
    }

    pub async fn preset(&self, speed: u8) -> Result<u8, ControlError> {
        if !SPEED_PRESETS.contains(&speed) {
            return Err(ControlError::InvalidPreset(speed));
        }
        self.set_speed(speed as f64).await
    }

    /// Marks the motor started before the device confirms, then sends start
    /// followed by the current speed.
    pub async fn start(&self) -> Result<(), ControlError> {
        self.require_connected()?;
        let speed = {
            let mut panel = lock(&self.panel);
            if panel.started {
                return Err(ControlError::AlreadyStarted);
            }
            panel.started = true;
            panel.speed
        };
        self.link.send(Command::MotorStart).await?;
        self.link.send(Command::SetSpeed(speed)).await?;
        Ok(())
    }

    /// Stops the motor; the speed setting is kept.
    pub async fn stop(&self) -> Result<(), ControlError> {
        self.require_connected()?;
        {
            let mut panel = lock(&self.panel);
            if !panel.started {
                return Err(ControlError::NotStarted);
            }
            panel.started = false;
        }
        self.link.send(Command::MotorStop).await?;
        Ok(())
    }

    fn require_connected(&self) -> Result<(), ControlError> {
        if self.link.is_connected() {
            Ok(())
        } else {
            Err(ControlError::NotConnected)
        }
    }
}

fn lock(panel: &Mutex<ControlPanel>) -> MutexGuard<'_, ControlPanel> {
    panel.lock().unwrap_or_else(PoisonError::into_inner)
}
