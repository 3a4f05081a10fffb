// Application layer - Link actor, recorders and services
pub mod address_store;
pub mod chart_renderer;
pub mod chart_service;
pub mod control_service;
pub mod device_link;
pub mod history_service;
pub mod series_buffer;
pub mod telemetry_merger;
pub mod transport;

#[cfg(test)]
pub mod test_support;
