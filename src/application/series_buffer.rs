// Series buffer - Fixed-capacity, time-windowed history for one metric
use crate::domain::telemetry::{HistoryPoint, Metric, SeriesSnapshot, SeriesStats, VisualRange};

/// How a series derives its auto range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangePolicy {
    /// Always spans at least `floor..ceiling`; grows by `padding` past the data
    /// only once the data leaves that band.
    SoftCeiling { floor: f64, ceiling: f64, padding: f64 },
    /// Data span plus `fraction` of it on each side.
    Proportional { fraction: f64 },
}

impl RangePolicy {
    pub fn for_metric(metric: Metric) -> Self {
        match metric {
            Metric::Rpm => RangePolicy::SoftCeiling {
                floor: -5.0,
                ceiling: 10.0,
                padding: 5.0,
            },
            Metric::Temperature | Metric::Voltage => RangePolicy::SoftCeiling {
                floor: 0.0,
                ceiling: 30.0,
                padding: 5.0,
            },
        }
    }

    fn empty_range(&self) -> VisualRange {
        match *self {
            RangePolicy::SoftCeiling { floor, ceiling, .. } => VisualRange::new(floor, ceiling),
            RangePolicy::Proportional { .. } => VisualRange::new(0.0, 1.0),
        }
    }

    fn auto_range(&self, data_min: f64, data_max: f64) -> VisualRange {
        let range = match *self {
            RangePolicy::SoftCeiling {
                floor,
                ceiling,
                padding,
            } => {
                let min = if data_min < floor { data_min - padding } else { floor };
                let max = if data_max > ceiling { data_max + padding } else { ceiling };
                VisualRange::new(min, max)
            }
            RangePolicy::Proportional { fraction } => {
                let pad = (data_max - data_min) * fraction;
                VisualRange::new(data_min - pad, data_max + pad)
            }
        };
        widen_if_flat(range)
    }
}

/// Keeps downstream scaling away from a zero-width span.
fn widen_if_flat(range: VisualRange) -> VisualRange {
    if range.span() > 0.0 {
        range
    } else {
        VisualRange::new(range.min - 0.5, range.min + 0.5)
    }
}

/// Ring buffer over a preallocated arena.
///
/// Points leave by two rules that both apply at all times: the count never
/// exceeds `capacity`, and nothing older than `window_ms` relative to "now"
/// survives an insert or a [`SeriesBuffer::sweep`].
#[derive(Debug, Clone)]
pub struct SeriesBuffer {
    metric: Metric,
    slots: Box<[HistoryPoint]>,
    head: usize,
    len: usize,
    window_ms: u64,
    next_seq: u64,
    policy: RangePolicy,
    pinned: Option<VisualRange>,
}

impl SeriesBuffer {
    pub fn new(metric: Metric, capacity: usize, window_ms: u64) -> Self {
        Self::with_policy(metric, capacity, window_ms, RangePolicy::for_metric(metric))
    }

    pub fn with_policy(metric: Metric, capacity: usize, window_ms: u64, policy: RangePolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            metric,
            slots: vec![HistoryPoint::new(0, f64::NAN); capacity].into_boxed_slice(),
            head: 0,
            len: 0,
            window_ms,
            next_seq: 0,
            policy,
            pinned: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends a sample. Non-finite values are dropped and `false` is returned.
    pub fn push(&mut self, value: f64, at_ms: u64) -> bool {
        if !value.is_finite() {
            return false;
        }

        let capacity = self.capacity();
        let point = HistoryPoint::new(at_ms, value);
        if self.len == capacity {
            self.slots[self.head] = point;
            self.head = (self.head + 1) % capacity;
        } else {
            let tail = (self.head + self.len) % capacity;
            self.slots[tail] = point;
            self.len += 1;
        }
        self.next_seq += 1;

        self.evict_older_than(at_ms);
        true
    }

    /// Drops everything that has aged out of the window as of `now_ms`.
    /// Returns the number of evicted points.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        self.evict_older_than(now_ms)
    }

    fn evict_older_than(&mut self, now_ms: u64) -> usize {
        let mut evicted = 0;
        while self.len > 0 {
            let oldest = self.slots[self.head];
            if now_ms.saturating_sub(oldest.at_ms) <= self.window_ms {
                break;
            }
            self.head = (self.head + 1) % self.capacity();
            self.len -= 1;
            evicted += 1;
        }
        evicted
    }

    /// Retained points, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = HistoryPoint> + '_ {
        let capacity = self.capacity();
        (0..self.len).map(move |i| self.slots[(self.head + i) % capacity])
    }

    /// Sequence number of the oldest retained point.
    pub fn first_seq(&self) -> u64 {
        self.next_seq - self.len as u64
    }

    pub fn set_range(&mut self, min: f64, max: f64) {
        self.pinned = if min.is_finite() && max.is_finite() {
            Some(VisualRange::new(min, max))
        } else {
            None
        };
    }

    pub fn clear_range(&mut self) {
        self.pinned = None;
    }

    pub fn range(&self) -> VisualRange {
        if let Some(pinned) = self.pinned {
            return pinned;
        }
        match self.bounds() {
            Some((min, max)) => self.policy.auto_range(min, max),
            None => self.policy.empty_range(),
        }
    }

    pub fn stats(&self) -> Option<SeriesStats> {
        let (min, max) = self.bounds()?;
        let latest = self.iter().last()?.value;
        Some(SeriesStats { latest, min, max })
    }

    fn bounds(&self) -> Option<(f64, f64)> {
        self.iter()
            .map(|p| p.value)
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((min, max)) => Some((min.min(v), max.max(v))),
            })
    }

    pub fn snapshot(&self) -> SeriesSnapshot {
        SeriesSnapshot {
            metric: self.metric,
            first_seq: self.first_seq(),
            points: self.iter().collect(),
            range: self.range(),
            pinned: self.pinned.is_some(),
            stats: self.stats(),
        }
    }
}
