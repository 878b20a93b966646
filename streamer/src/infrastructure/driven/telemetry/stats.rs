use std::fmt;
use std::time::{Duration, Instant};

/// Linear-interpolated percentile over sorted values
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let (Some(first), Some(last)) = (sorted.first(), sorted.last()) else {
        return 0.0;
    };
    if pct <= 0.0 {
        return *first;
    }
    if pct >= 100.0 {
        return *last;
    }

    let index = (sorted.len() - 1) as f64 * (pct / 100.0);
    let low = index.floor() as usize;
    let high = (low + 1).min(sorted.len() - 1);
    let weight = index - low as f64;
    sorted[low] * (1.0 - weight) + sorted[high] * weight
}

/// One reporting window, times in milliseconds
#[derive(Debug, Clone, PartialEq)]
pub struct ArrivalReport {
    pub messages: usize,
    pub intervals: usize,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

impl fmt::Display for ArrivalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.intervals == 0 {
            return write!(f, "messages={} (no intervals yet)", self.messages);
        }
        write!(
            f,
            "messages={} intervals={} mean={:.2}ms min={:.2}ms p50={:.2}ms p90={:.2}ms p99={:.2}ms max={:.2}ms",
            self.messages,
            self.intervals,
            self.mean_ms,
            self.min_ms,
            self.p50_ms,
            self.p90_ms,
            self.p99_ms,
            self.max_ms
        )
    }
}

/// Gaps between consecutive messages over a report window.
/// The last arrival carries over a reset so the next window's first gap is kept.
#[derive(Debug, Default)]
pub struct InterArrivalStats {
    last_arrival: Option<Instant>,
    intervals: Vec<Duration>,
    messages: usize,
}

impl InterArrivalStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, at: Instant) {
        if let Some(last) = self.last_arrival {
            self.intervals.push(at.saturating_duration_since(last));
        }
        self.last_arrival = Some(at);
        self.messages += 1;
    }

    pub fn report(&self) -> ArrivalReport {
        let mut values: Vec<f64> = self
            .intervals
            .iter()
            .map(|d| d.as_secs_f64() * 1000.0)
            .collect();
        values.sort_by(f64::total_cmp);

        let n = values.len();
        let mean_ms = if n == 0 {
            0.0
        } else {
            values.iter().sum::<f64>() / n as f64
        };

        ArrivalReport {
            messages: self.messages,
            intervals: n,
            mean_ms,
            min_ms: values.first().copied().unwrap_or(0.0),
            p50_ms: percentile(&values, 50.0),
            p90_ms: percentile(&values, 90.0),
            p99_ms: percentile(&values, 99.0),
            max_ms: values.last().copied().unwrap_or(0.0),
        }
    }

    /// Report the current window and start a new one
    pub fn take_report(&mut self) -> ArrivalReport {
        let report = self.report();
        self.intervals.clear();
        self.messages = 0;
        report
    }
}
