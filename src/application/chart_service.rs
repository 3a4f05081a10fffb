// Chart service - Frame-paced render loop over the three live charts
use crate::application::chart_renderer::{ChartFrame, LiveChart, SurfaceSize};
use crate::application::history_service::HistoryHandle;
use crate::domain::telemetry::{Metric, SeriesSnapshot, SeriesStats, VisualRange};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChartError {
    #[error("chart renderer has stopped")]
    Stopped,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub frame_interval: Duration,
    pub window_ms: u64,
    pub size: SurfaceSize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_secs(1) / 60,
            window_ms: 30_000,
            size: SurfaceSize::new(600, 200),
        }
    }
}

#[derive(Debug)]
enum ChartCommand {
    Resize(SurfaceSize),
}

#[derive(Clone)]
pub struct ChartHandle {
    commands: mpsc::Sender<ChartCommand>,
    frames: Vec<watch::Receiver<Option<ChartFrame>>>,
}

impl ChartHandle {
    /// Receiver of drawn frames; `None` until the first frame is drawn.
    pub fn frames(&self, metric: Metric) -> watch::Receiver<Option<ChartFrame>> {
        self.frames[metric.index()].clone()
    }

    pub fn latest(&self, metric: Metric) -> Option<ChartFrame> {
        self.frames[metric.index()].borrow().clone()
    }

    /// Resizes every chart surface. Retained points are kept.
    pub async fn resize(&self, width: u32, height: u32) -> Result<(), ChartError> {
        self.commands
            .send(ChartCommand::Resize(SurfaceSize::new(width, height)))
            .await
            .map_err(|_| ChartError::Stopped)
    }
}

struct ChartSlot {
    chart: LiveChart,
    series: watch::Receiver<SeriesSnapshot>,
    range: VisualRange,
    stats: Option<SeriesStats>,
    publisher: watch::Sender<Option<ChartFrame>>,
}

impl ChartSlot {
    /// Pulls any series change into the chart; at most one redraw per call.
    fn render(&mut self) {
        if self.series.has_changed().unwrap_or(false) {
            let snapshot = self.series.borrow_and_update();
            let fresh = self.chart.ingest(&snapshot);
            self.range = snapshot.range;
            self.stats = snapshot.stats;
            // Range or eviction changes redraw even without fresh points.
            self.chart.mark_dirty();
            tracing::trace!("{} chart ingested {} points", self.chart.metric(), fresh);
        }

        if self.chart.is_dirty() {
            let frame = self.chart.draw(self.range, self.stats.as_ref());
            self.publisher.send_replace(Some(frame));
        }
    }
}

/// Owns the live charts and redraws them on a fixed frame cadence, no matter
/// how often the underlying series change.
pub struct ChartRenderer {
    slots: Vec<ChartSlot>,
}

impl ChartRenderer {
    pub fn spawn(settings: RenderSettings, history: &HistoryHandle) -> (ChartHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(8);
        let mut frames = Vec::with_capacity(Metric::ALL.len());

        let slots = Metric::ALL
            .iter()
            .map(|&metric| {
                let (publisher, frames_rx) = watch::channel(None);
                frames.push(frames_rx);

                let mut series = history.watch(metric);
                series.mark_changed();
                let snapshot = series.borrow().clone();
                ChartSlot {
                    chart: LiveChart::new(metric, settings.window_ms, settings.size),
                    series,
                    range: snapshot.range,
                    stats: snapshot.stats,
                    publisher,
                }
            })
            .collect();

        let renderer = ChartRenderer { slots };
        let task = tokio::spawn(renderer.run(commands_rx, settings.frame_interval));
        let handle = ChartHandle {
            commands: commands_tx,
            frames,
        };
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<ChartCommand>, frame_interval: Duration) {
        let mut ticker = tokio::time::interval(frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for slot in &mut self.slots {
                        slot.render();
                    }
                }
                command = commands.recv() => match command {
                    Some(ChartCommand::Resize(size)) => {
                        tracing::debug!("Resizing charts to {}x{}", size.width, size.height);
                        for slot in &mut self.slots {
                            slot.chart.resize(size);
                        }
                    }
                    None => break,
                },
            }
        }
        tracing::info!("Chart renderer stopped");
    }
}
