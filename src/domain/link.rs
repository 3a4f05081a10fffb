// Device link domain model
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

pub const NORMAL_CLOSURE: u16 = 1000;
pub const NO_STATUS_RECEIVED: u16 = 1005;
pub const ABNORMAL_CLOSURE: u16 = 1006;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Idle => "IDLE",
            LinkState::Connecting => "CONNECTING",
            LinkState::Open => "OPEN",
            LinkState::Closing => "CLOSING",
            LinkState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// What observers see. `connected` drops to false as soon as a disconnect is
/// requested, before the transport has actually closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    pub state: LinkState,
    pub connected: bool,
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self {
            state: LinkState::Idle,
            connected: false,
        }
    }
}

/// How a transport ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn is_normal(&self) -> bool {
        self.code == NORMAL_CLOSURE
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("device address is empty")]
    EmptyAddress,
    #[error("invalid device address: {0}")]
    InvalidAddress(String),
    #[error("device link is not running")]
    LinkStopped,
}

/// A validated device host (IP address or hostname, without scheme or port).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    pub fn parse(raw: &str) -> Result<Self, LinkError> {
        let host = raw.trim();
        if host.is_empty() {
            return Err(LinkError::EmptyAddress);
        }
        if host.parse::<IpAddr>().is_ok() || is_hostname(host) {
            Ok(Self(host.to_string()))
        } else {
            Err(LinkError::InvalidAddress(host.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn ws_url(&self, port: u16) -> String {
        match self.0.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("ws://[{}]:{}", ip, port),
            _ => format!("ws://{}:{}", self.0, port),
        }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_hostname(host: &str) -> bool {
    host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}
