// HTTP request handlers
use crate::application::chart_renderer::Readout;
use crate::application::chart_service::ChartError;
use crate::application::control_service::{ControlError, ControlView};
use crate::application::history_service::HistoryError;
use crate::domain::link::{LinkError, LinkStatus};
use crate::domain::telemetry::{Metric, TelemetrySnapshot, VisualRange};
use crate::infrastructure::chunked_json::stream_from_watch;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Chart(#[from] ChartError),
    #[error("{0}")]
    UnknownMetric(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Link(LinkError::EmptyAddress | LinkError::InvalidAddress(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Control(ControlError::InvalidPreset(_)) => StatusCode::BAD_REQUEST,
            ApiError::Control(
                ControlError::NotConnected | ControlError::AlreadyStarted | ControlError::NotStarted,
            ) => StatusCode::CONFLICT,
            ApiError::UnknownMetric(_) => StatusCode::NOT_FOUND,
            ApiError::Link(LinkError::LinkStopped)
            | ApiError::Control(ControlError::Link(_))
            | ApiError::History(_)
            | ApiError::Chart(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn parse_metric(raw: &str) -> Result<Metric, ApiError> {
    raw.parse().map_err(ApiError::UnknownMetric)
}

#[derive(Deserialize)]
pub struct ConnectRequest {
    pub address: String,
}

#[derive(Deserialize)]
pub struct SpeedRequest {
    pub speed: f64,
}

#[derive(Deserialize)]
pub struct RangeRequest {
    pub min: f64,
    pub max: f64,
}

#[derive(Deserialize)]
pub struct SizeRequest {
    pub width: u32,
    pub height: u32,
}

#[derive(Serialize)]
pub struct SeriesView {
    pub metric: Metric,
    pub title: &'static str,
    pub unit: &'static str,
    pub points: usize,
    pub range: VisualRange,
    pub pinned: bool,
    pub readout: Option<Readout>,
}

#[derive(Serialize)]
pub struct DashboardState {
    pub link: LinkStatus,
    pub telemetry: TelemetrySnapshot,
    pub controls: ControlView,
    pub series: Vec<SeriesView>,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Everything the operator screen shows, in one document
pub async fn get_state(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let series = Metric::ALL
        .iter()
        .map(|&metric| {
            let snapshot = state.history.snapshot(metric);
            SeriesView {
                metric,
                title: metric.title(),
                unit: metric.unit(),
                points: snapshot.points.len(),
                range: snapshot.range,
                pinned: snapshot.pinned,
                readout: snapshot.stats.as_ref().map(|s| Readout::new(metric, s)),
            }
        })
        .collect();

    let body = DashboardState {
        link: state.link.status(),
        telemetry: state.link.snapshot(),
        controls: state.control.view(),
        series,
    };
    match json_response(&body, accepts_brotli(&headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

pub async fn get_console(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let body = json!({ "lines": state.link.console().lines() });
    match json_response(&body, accepts_brotli(&headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

pub async fn connect(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConnectRequest>,
) -> Result<StatusCode, ApiError> {
    state.link.connect(&request.address).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn disconnect(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.link.disconnect().await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn reconnect(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.link.reconnect().await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn set_speed(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SpeedRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let speed = state.control.set_speed(request.speed).await?;
    Ok(Json(json!({ "speed": speed })))
}

pub async fn preset(
    Path(speed): Path<u8>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let speed = state.control.preset(speed).await?;
    Ok(Json(json!({ "speed": speed })))
}

pub async fn start_motor(State(state): State<Arc<AppState>>) -> Result<Json<ControlView>, ApiError> {
    state.control.start().await?;
    Ok(Json(state.control.view()))
}

pub async fn stop_motor(State(state): State<Arc<AppState>>) -> Result<Json<ControlView>, ApiError> {
    state.control.stop().await?;
    Ok(Json(state.control.view()))
}

pub async fn set_range(
    Path(metric): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<RangeRequest>,
) -> Result<StatusCode, ApiError> {
    let metric = parse_metric(&metric)?;
    state.history.set_range(metric, request.min, request.max).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_range(
    Path(metric): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    let metric = parse_metric(&metric)?;
    state.history.clear_range(metric).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn resize_charts(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SizeRequest>,
) -> Result<StatusCode, ApiError> {
    state.charts.resize(request.width, request.height).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Stream rendered frames for one chart (length-prefixed JSON chunks)
pub async fn stream_chart(
    Path(metric): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let metric = parse_metric(&metric)?;
    Ok(stream_from_watch(
        state.charts.frames(metric),
        accepts_brotli(&headers),
    ))
}
