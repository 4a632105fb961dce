use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// ProgressMeter
// ---------------------------------------------------------------------------

/// Integer percentage of an upload, reported only when it changes.
#[derive(Debug, Clone)]
pub struct ProgressMeter {
    size: u64,
    last: u8,
}

impl ProgressMeter {
    pub fn new(size: u64) -> Self {
        Self { size, last: 0 }
    }

    /// `floor(cursor / size * 100)`; an empty object is complete.
    pub fn percent(cursor: u64, size: u64) -> u8 {
        if size == 0 {
            return 100;
        }
        let cursor = cursor.min(size);
        (u128::from(cursor) * 100 / u128::from(size)) as u8
    }

    /// Returns the new percentage if it differs from the last one reported.
    ///
    /// Never reports a value lower than one already reported.
    pub fn update(&mut self, cursor: u64) -> Option<u8> {
        let percent = Self::percent(cursor, self.size);
        if percent > self.last {
            self.last = percent;
            Some(percent)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Throughput
// ---------------------------------------------------------------------------

/// Transfer rate over a sliding time window.
#[derive(Debug)]
pub struct Throughput {
    samples: Vec<(Instant, u64)>,
    window: Duration,
}

impl Throughput {
    /// Creates a meter averaging over `window` (default 5 s).
    pub fn new(window: Option<Duration>) -> Self {
        Self {
            samples: Vec::new(),
            window: window.unwrap_or(Duration::from_secs(5)),
        }
    }

    /// Records `bytes` sent at the current instant.
    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    fn record_at(&mut self, now: Instant, bytes: u64) {
        self.samples.push((now, bytes));
        if let Some(cutoff) = now.checked_sub(self.window) {
            self.samples.retain(|(at, _)| *at >= cutoff);
        }
    }

    /// Average bytes per second in the window; 0.0 with fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.first(), self.samples.last()) else {
            return 0.0;
        };
        let elapsed = last.0.duration_since(first.0);
        if self.samples.len() < 2 || elapsed.is_zero() {
            return 0.0;
        }
        // The first sample marks the window start; its bytes predate it.
        let bytes: u64 = self.samples[1..].iter().map(|(_, b)| b).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to send `remaining` bytes, if the rate is known.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        let rate = self.bytes_per_second();
        (rate > 0.0).then(|| Duration::from_secs_f64(remaining as f64 / rate))
    }
}
