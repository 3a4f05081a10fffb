// History service - Records merged telemetry into per-metric series buffers
use crate::application::series_buffer::SeriesBuffer;
use crate::domain::telemetry::{Metric, SeriesSnapshot, TelemetrySnapshot};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const COMMAND_QUEUE_DEPTH: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("history recorder has stopped")]
    Stopped,
}

#[derive(Debug, Clone)]
pub struct RecorderSettings {
    pub capacity: usize,
    pub window_ms: u64,
    pub sweep_interval: Duration,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            capacity: 300,
            window_ms: 30_000,
            sweep_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
enum HistoryCommand {
    SetRange { metric: Metric, min: f64, max: f64 },
    ClearRange(Metric),
}

/// Milliseconds since the recorder started, on the runtime's clock.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct HistoryHandle {
    commands: mpsc::Sender<HistoryCommand>,
    series: Vec<watch::Receiver<SeriesSnapshot>>,
}

impl HistoryHandle {
    /// Receiver that is marked changed every time the metric's series changes.
    pub fn watch(&self, metric: Metric) -> watch::Receiver<SeriesSnapshot> {
        self.series[metric.index()].clone()
    }

    pub fn snapshot(&self, metric: Metric) -> SeriesSnapshot {
        self.series[metric.index()].borrow().clone()
    }

    /// Pins the visual range. A non-finite bound returns the metric to auto range.
    pub async fn set_range(&self, metric: Metric, min: f64, max: f64) -> Result<(), HistoryError> {
        self.post(HistoryCommand::SetRange { metric, min, max }).await
    }

    pub async fn clear_range(&self, metric: Metric) -> Result<(), HistoryError> {
        self.post(HistoryCommand::ClearRange(metric)).await
    }

    async fn post(&self, command: HistoryCommand) -> Result<(), HistoryError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| HistoryError::Stopped)
    }
}

/// Owns the three series buffers. Appends every present metric of each merged
/// snapshot and ages points out on a periodic sweep.
pub struct HistoryRecorder {
    buffers: Vec<SeriesBuffer>,
    publishers: Vec<watch::Sender<SeriesSnapshot>>,
    clock: MonotonicClock,
}

impl HistoryRecorder {
    pub fn spawn(
        settings: RecorderSettings,
        updates: broadcast::Receiver<TelemetrySnapshot>,
    ) -> (HistoryHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);

        let buffers: Vec<SeriesBuffer> = Metric::ALL
            .iter()
            .map(|&metric| SeriesBuffer::new(metric, settings.capacity, settings.window_ms))
            .collect();
        let (publishers, series): (Vec<_>, Vec<_>) = buffers
            .iter()
            .map(|buffer| watch::channel(buffer.snapshot()))
            .unzip();

        let recorder = HistoryRecorder {
            buffers,
            publishers,
            clock: MonotonicClock::new(),
        };
        let task = tokio::spawn(recorder.run(updates, commands_rx, settings.sweep_interval));

        let handle = HistoryHandle {
            commands: commands_tx,
            series,
        };
        (handle, task)
    }

    async fn run(
        mut self,
        mut updates: broadcast::Receiver<TelemetrySnapshot>,
        mut commands: mpsc::Receiver<HistoryCommand>,
        sweep_interval: Duration,
    ) {
        let mut sweep = tokio::time::interval_at(Instant::now() + sweep_interval, sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Ok(snapshot) => self.record(&snapshot),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("History recorder fell behind, {} updates skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
                command = commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
                _ = sweep.tick() => self.sweep(),
            }
        }
        tracing::info!("History recorder stopped");
    }

    fn record(&mut self, snapshot: &TelemetrySnapshot) {
        let now = self.clock.now_ms();
        for metric in Metric::ALL {
            if let Some(value) = metric.value_in(snapshot) {
                if self.buffers[metric.index()].push(value, now) {
                    self.publish(metric);
                }
            }
        }
    }

    fn sweep(&mut self) {
        let now = self.clock.now_ms();
        for metric in Metric::ALL {
            let evicted = self.buffers[metric.index()].sweep(now);
            if evicted > 0 {
                tracing::trace!("Swept {} aged {} points", evicted, metric);
                self.publish(metric);
            }
        }
    }

    fn apply(&mut self, command: HistoryCommand) {
        let metric = match command {
            HistoryCommand::SetRange { metric, min, max } => {
                self.buffers[metric.index()].set_range(min, max);
                tracing::debug!("{} range set to {}..{}", metric, min, max);
                metric
            }
            HistoryCommand::ClearRange(metric) => {
                self.buffers[metric.index()].clear_range();
                tracing::debug!("{} range returned to auto", metric);
                metric
            }
        };
        self.publish(metric);
    }

    fn publish(&self, metric: Metric) {
        let index = metric.index();
        self.publishers[index].send_replace(self.buffers[index].snapshot());
    }
}
