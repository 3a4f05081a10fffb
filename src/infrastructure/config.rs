use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DashboardConfig {
    pub http: HttpSettings,
    pub device: DeviceSettings,
    pub history: HistorySettings,
    pub chart: ChartSettings,
    pub console: ConsoleSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpSettings {
    pub bind: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeviceSettings {
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub auto_connect: bool,
    pub auto_connect_delay_ms: u64,
    pub state_file: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            port: 81,
            connect_timeout_ms: 10_000,
            reconnect_delay_ms: 3_000,
            heartbeat_interval_ms: 1_000,
            auto_connect: true,
            auto_connect_delay_ms: 500,
            state_file: "state/last_device.toml".to_string(),
        }
    }
}

impl DeviceSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    pub fn auto_connect_delay(&self) -> Duration {
        Duration::from_millis(self.auto_connect_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistorySettings {
    pub capacity: usize,
    pub window_ms: u64,
    pub sweep_interval_ms: u64,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            capacity: 300,
            window_ms: 30_000,
            sweep_interval_ms: 1_000,
        }
    }
}

impl HistorySettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChartSettings {
    pub frames_per_second: u32,
    pub window_ms: u64,
    pub width: u32,
    pub height: u32,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            frames_per_second: 60,
            window_ms: 30_000,
            width: 600,
            height: 200,
        }
    }
}

impl ChartSettings {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frames_per_second.clamp(1, 240)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConsoleSettings {
    pub max_lines: usize,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self { max_lines: 500 }
    }
}

/// Reads `config/dashboard.*` if present, then `DASHBOARD__SECTION__KEY` overrides.
pub fn load_dashboard_config() -> anyhow::Result<DashboardConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/dashboard").required(false))
        .add_source(config::Environment::with_prefix("DASHBOARD").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}
