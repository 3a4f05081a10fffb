// Repository trait for the remembered device address
use async_trait::async_trait;

#[async_trait]
pub trait AddressStore: Send + Sync {
    /// Last device address that reached the open state, if any was stored
    async fn load(&self) -> anyhow::Result<Option<String>>;

    /// Remember an address for reconnects and the next start
    async fn save(&self, address: &str) -> anyhow::Result<()>;
}
