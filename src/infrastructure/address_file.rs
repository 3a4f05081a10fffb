// File-backed address store
use crate::application::address_store::AddressStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredState {
    #[serde(default)]
    device_address: Option<String>,
}

/// Keeps the last connected address in a small TOML file under one key.
#[derive(Debug, Clone)]
pub struct FileAddressStore {
    path: PathBuf,
}

impl FileAddressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AddressStore for FileAddressStore {
    async fn load(&self) -> Result<Option<String>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()));
            }
        };

        let state: StoredState = toml::from_str(&text)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(state.device_address.filter(|a| !a.trim().is_empty()))
    }

    async fn save(&self, address: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let state = StoredState {
            device_address: Some(address.to_string()),
        };
        let text = toml::to_string(&state).context("Failed to serialize device address")?;
        tokio::fs::write(&self.path, text)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        tracing::debug!("Stored device address {} in {}", address, self.path.display());
        Ok(())
    }
}
