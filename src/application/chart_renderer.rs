// Live chart renderer - Incremental ingest and polyline layout for one series
use crate::domain::telemetry::{HistoryPoint, Metric, SeriesSnapshot, SeriesStats, VisualRange};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(10),
            height: height.max(10),
        }
    }
}

/// Current value and rolling extremes, preformatted for the metric's precision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Readout {
    pub latest: String,
    pub min: String,
    pub max: String,
}

impl Readout {
    pub fn new(metric: Metric, stats: &SeriesStats) -> Self {
        let precision = metric.precision();
        Self {
            latest: format!("{:.*}", precision, stats.latest),
            min: format!("{:.*}", precision, stats.min),
            max: format!("{:.*}", precision, stats.max),
        }
    }
}

/// One drawn frame: surface-space polyline plus the scales used to lay it out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartFrame {
    pub metric: Metric,
    pub title: &'static str,
    pub unit: &'static str,
    pub frame: u64,
    pub size: SurfaceSize,
    pub x_start_ms: u64,
    pub x_end_ms: u64,
    pub y_range: VisualRange,
    pub polyline: Vec<[f32; 2]>,
    pub readout: Option<Readout>,
}

/// Scrolling line chart fed from series snapshots.
///
/// The chart keeps its own copy of the points it has ingested and a cursor
/// (`next_seq`) into the series. Only unseen points are copied on each ingest.
#[derive(Debug)]
pub struct LiveChart {
    metric: Metric,
    window_ms: u64,
    size: SurfaceSize,
    points: VecDeque<HistoryPoint>,
    first_seq: u64,
    next_seq: u64,
    dirty: bool,
    frames: u64,
}

impl LiveChart {
    pub fn new(metric: Metric, window_ms: u64, size: SurfaceSize) -> Self {
        Self {
            metric,
            window_ms: window_ms.max(1),
            size,
            points: VecDeque::new(),
            first_seq: 0,
            next_seq: 0,
            dirty: true,
            frames: 0,
        }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn points(&self) -> impl Iterator<Item = &HistoryPoint> {
        self.points.iter()
    }

    /// Pulls in whatever the snapshot holds that this chart has not seen yet.
    /// Returns how many points were copied.
    pub fn ingest(&mut self, snapshot: &SeriesSnapshot) -> usize {
        let shrunk = snapshot.points.len() < self.points.len();
        let discontinuous = snapshot.end_seq() < self.next_seq || snapshot.first_seq > self.next_seq;
        if shrunk || discontinuous {
            tracing::trace!("{} chart resyncing from start of series", self.metric);
            self.points.clear();
            self.first_seq = snapshot.first_seq;
            self.next_seq = snapshot.first_seq;
        }

        while self.first_seq < snapshot.first_seq && self.points.pop_front().is_some() {
            self.first_seq += 1;
        }
        self.first_seq = self.first_seq.max(snapshot.first_seq);

        let cursor = (self.next_seq - snapshot.first_seq) as usize;
        let fresh = &snapshot.points[cursor.min(snapshot.points.len())..];
        self.points.extend(fresh.iter().copied());
        self.next_seq = snapshot.end_seq();

        if !fresh.is_empty() || shrunk || discontinuous {
            self.dirty = true;
        }
        fresh.len()
    }

    /// Changes the drawing surface. Retained points are untouched.
    pub fn resize(&mut self, size: SurfaceSize) -> bool {
        if size == self.size {
            return false;
        }
        self.size = size;
        self.dirty = true;
        true
    }

    /// Lays out the polyline for the current points and clears the dirty flag.
    pub fn draw(&mut self, y_range: VisualRange, stats: Option<&SeriesStats>) -> ChartFrame {
        self.dirty = false;
        self.frames += 1;

        let width = self.size.width as f64;
        let height = self.size.height as f64;
        let x_end = self.points.back().map(|p| p.at_ms).unwrap_or(0);
        let x_start = x_end.saturating_sub(self.window_ms);
        let span = if y_range.span() > 0.0 { y_range.span() } else { 1.0 };

        let polyline = self
            .points
            .iter()
            .filter(|p| p.at_ms >= x_start && p.value.is_finite())
            .map(|p| {
                let x = (p.at_ms - x_start) as f64 / self.window_ms as f64 * width;
                let y = height - (p.value - y_range.min) / span * height;
                [x as f32, y as f32]
            })
            .collect();

        ChartFrame {
            metric: self.metric,
            title: self.metric.title(),
            unit: self.metric.unit(),
            frame: self.frames,
            size: self.size,
            x_start_ms: x_start,
            x_end_ms: x_end,
            y_range,
            polyline,
            readout: stats.map(|s| Readout::new(self.metric, s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::series_buffer::SeriesBuffer;

    fn chart() -> LiveChart {
        LiveChart::new(Metric::Rpm, 30_000, SurfaceSize::new(300, 100))
    }

    fn seqs(chart: &LiveChart, buffer: &SeriesBuffer) -> (Vec<HistoryPoint>, Vec<HistoryPoint>) {
        (chart.points().copied().collect(), buffer.iter().collect())
    }

    #[test]
    fn test_ingest_only_copies_new_points() {
        let mut buffer = SeriesBuffer::new(Metric::Rpm, 100, 30_000);
        let mut chart = chart();
        buffer.push(1.0, 0);
        buffer.push(2.0, 100);
        assert_eq!(chart.ingest(&buffer.snapshot()), 2);
        assert_eq!(chart.ingest(&buffer.snapshot()), 0);

        buffer.push(3.0, 200);
        assert_eq!(chart.ingest(&buffer.snapshot()), 1);
        let (drawn, retained) = seqs(&chart, &buffer);
        assert_eq!(drawn, retained);
    }

    #[test]
    fn test_shrink_resets_cursor_without_duplicates() {
        let mut buffer = SeriesBuffer::new(Metric::Rpm, 100, 30_000);
        let mut chart = chart();
        for i in 0..5 {
            buffer.push(i as f64, i * 1_000);
        }
        assert_eq!(chart.ingest(&buffer.snapshot()), 5);

        // Three oldest points age out.
        assert_eq!(buffer.sweep(32_500), 3);
        assert_eq!(buffer.len(), 2);
        assert_eq!(chart.ingest(&buffer.snapshot()), 2);

        let (drawn, retained) = seqs(&chart, &buffer);
        assert_eq!(drawn, retained);
        assert_eq!(drawn.iter().map(|p| p.value).collect::<Vec<_>>(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_eviction_with_equal_length_is_not_missed() {
        let mut buffer = SeriesBuffer::new(Metric::Rpm, 3, 30_000);
        let mut chart = chart();
        for i in 0..3 {
            buffer.push(i as f64, i);
        }
        chart.ingest(&buffer.snapshot());

        // Capacity eviction plus append keeps the length at 3.
        buffer.push(3.0, 3);
        assert_eq!(chart.ingest(&buffer.snapshot()), 1);
        let (drawn, retained) = seqs(&chart, &buffer);
        assert_eq!(drawn, retained);
    }

    #[test]
    fn test_draw_anchors_window_on_newest_point() {
        let mut buffer = SeriesBuffer::new(Metric::Rpm, 100, 30_000);
        let mut chart = chart();
        buffer.push(-5.0, 10_000);
        buffer.push(10.0, 40_000);
        chart.ingest(&buffer.snapshot());

        let frame = chart.draw(buffer.range(), buffer.stats().as_ref());
        assert_eq!(frame.x_start_ms, 10_000);
        assert_eq!(frame.x_end_ms, 40_000);
        assert_eq!(frame.polyline, vec![[0.0, 100.0], [300.0, 0.0]]);
        assert!(!chart.is_dirty());

        let readout = frame.readout.unwrap();
        assert_eq!(readout.latest, "10");
        assert_eq!(readout.min, "-5");
    }

    #[test]
    fn test_resize_redraws_without_touching_points() {
        let mut buffer = SeriesBuffer::new(Metric::Rpm, 100, 30_000);
        let mut chart = chart();
        buffer.push(2.5, 0);
        chart.ingest(&buffer.snapshot());
        chart.draw(buffer.range(), None);

        assert!(!chart.resize(SurfaceSize::new(300, 100)));
        assert!(chart.resize(SurfaceSize::new(600, 200)));
        assert!(chart.is_dirty());
        assert_eq!(chart.points().count(), 1);

        let frame = chart.draw(buffer.range(), None);
        assert_eq!(frame.size, SurfaceSize::new(600, 200));
        assert_eq!(frame.frame, 2);
    }

    #[test]
    fn test_flat_range_does_not_divide_by_zero() {
        let mut chart = chart();
        let mut buffer = SeriesBuffer::new(Metric::Rpm, 10, 30_000);
        buffer.push(4.0, 0);
        chart.ingest(&buffer.snapshot());

        let frame = chart.draw(VisualRange::new(4.0, 4.0), None);
        assert!(frame.polyline.iter().all(|[x, y]| x.is_finite() && y.is_finite()));
    }
}
