// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use axum::{
    Router,
    routing::{get, post, put},
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::chart_renderer::SurfaceSize;
use crate::application::chart_service::{ChartRenderer, RenderSettings};
use crate::application::control_service::MotorControlService;
use crate::application::device_link::{DeviceLink, LinkSettings};
use crate::application::history_service::{HistoryRecorder, RecorderSettings};
use crate::domain::console::ConsoleLog;
use crate::infrastructure::address_file::FileAddressStore;
use crate::infrastructure::config::load_dashboard_config;
use crate::infrastructure::ws_connector::WebSocketConnector;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    clear_range, connect, disconnect, get_console, get_state, health_check, preset, reconnect,
    resize_charts, set_range, set_speed, start_motor, stop_motor, stream_chart,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = load_dashboard_config()?;

    // Device link (infrastructure adapters injected into the actor)
    let console = ConsoleLog::new(config.console.max_lines);
    let connector = Arc::new(WebSocketConnector::new(config.device.connect_timeout()));
    let store = Arc::new(FileAddressStore::new(&config.device.state_file));
    let (link, link_task) = DeviceLink::spawn(
        LinkSettings {
            port: config.device.port,
            reconnect_delay: config.device.reconnect_delay(),
            heartbeat_interval: config.device.heartbeat_interval(),
        },
        connector,
        store,
        console,
    );

    // History, charts and controls (application layer)
    let (history, _history_task) = HistoryRecorder::spawn(
        RecorderSettings {
            capacity: config.history.capacity,
            window_ms: config.history.window_ms,
            sweep_interval: config.history.sweep_interval(),
        },
        link.subscribe_updates(),
    );
    let (charts, _chart_task) = ChartRenderer::spawn(
        RenderSettings {
            frame_interval: config.chart.frame_interval(),
            window_ms: config.chart.window_ms,
            size: SurfaceSize::new(config.chart.width, config.chart.height),
        },
        &history,
    );
    let control = MotorControlService::new(link.clone());
    control.spawn_sync();

    if config.device.auto_connect {
        let link = link.clone();
        let delay = config.device.auto_connect_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = link.auto_connect().await {
                tracing::warn!("Auto-connect not started: {}", e);
            }
        });
    }

    // Create application state
    let state = Arc::new(AppState {
        link: link.clone(),
        history,
        charts,
        control,
    });

    // Build router (presentation layer)
    // Compression is applied per response/chunk by the handlers, not by a layer.
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/state", get(get_state))
        .route("/console", get(get_console))
        .route("/link/connect", post(connect))
        .route("/link/disconnect", post(disconnect))
        .route("/link/reconnect", post(reconnect))
        .route("/motor/speed", post(set_speed))
        .route("/motor/preset/:speed", post(preset))
        .route("/motor/start", post(start_motor))
        .route("/motor/stop", post(stop_motor))
        .route("/charts/size", put(resize_charts))
        .route("/charts/:metric/range", put(set_range).delete(clear_range))
        .route("/charts/:metric/stream", get(stream_chart))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config.http.bind.parse()?;
    tracing::info!("Starting motor-dashboard service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await?;

    link.shutdown().await?;
    link_task.await?;
    Ok(())
}
