use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters for one stream.
///
/// The pipeline stages update these as batches flow; [`StreamMetrics::snapshot`] can be taken at
/// any time.
#[derive(Debug)]
pub struct StreamMetrics {
    started_at: Instant,
    batches_read: AtomicU64,
    rows_read: AtomicU64,
    rows_emitted: AtomicU64,
    frames_emitted: AtomicU64,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            batches_read: AtomicU64::new(0),
            rows_read: AtomicU64::new(0),
            rows_emitted: AtomicU64::new(0),
            frames_emitted: AtomicU64::new(0),
        }
    }

    pub fn on_batch_read(&self, rows: usize) {
        let _ = self.batches_read.fetch_add(1, Ordering::Relaxed);
        let _ = self.rows_read.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub fn on_rows_emitted(&self, rows: usize) {
        let _ = self.rows_emitted.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub fn on_frame(&self) {
        let _ = self.frames_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamStats {
        StreamStats {
            batches_read: self.batches_read.load(Ordering::Relaxed),
            rows_read: self.rows_read.load(Ordering::Relaxed),
            rows_emitted: self.rows_emitted.load(Ordering::Relaxed),
            frames_emitted: self.frames_emitted.load(Ordering::Relaxed),
            elapsed: self.started_at.elapsed(),
        }
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable snapshot of [`StreamMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    pub batches_read: u64,
    pub rows_read: u64,
    /// Rows that survived the filter and were written in data frames.
    pub rows_emitted: u64,
    pub frames_emitted: u64,
    pub elapsed: Duration,
}

impl fmt::Display for StreamStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batches_read={}, rows_read={}, rows_emitted={}, frames={}, elapsed={:?}",
            self.batches_read, self.rows_read, self.rows_emitted, self.frames_emitted, self.elapsed
        )
    }
}
