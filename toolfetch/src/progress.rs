use std::sync::Mutex;

/// Percent reached once the archive has been unpacked.
pub const EXTRACTED: u8 = 95;
/// Percent reached once files from a previous install were removed.
pub const STALE_REMOVED: u8 = 96;
/// Percent reached once the payload sits in the install directory.
pub const MOVED: u8 = 98;
pub const COMPLETE: u8 = 100;

/// Receiver of integer progress updates in the range `0..=100`.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, percent: u8);
}

impl<F> ProgressSink for F
where
    F: Fn(u8) + Send + Sync,
{
    fn emit(&self, percent: u8) {
        self(percent)
    }
}

/// Sink that drops every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _percent: u8) {}
}

/// Forwards updates to a sink while keeping them clamped and non-decreasing.
pub struct ProgressReporter<'a> {
    sink: &'a dyn ProgressSink,
    last: Mutex<Option<u8>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            last: Mutex::new(None),
        }
    }

    /// Emit `percent` unless it would move progress backwards.
    pub fn report(&self, percent: u8) {
        let percent = percent.min(COMPLETE);
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if matches!(*last, Some(prev) if percent < prev) {
            return;
        }
        *last = Some(percent);
        self.sink.emit(percent);
    }

    pub fn last(&self) -> Option<u8> {
        match self.last.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Scale `bytes` of `total` into `0..=cap`.
///
/// An unknown or zero total reports 0 so the download stage never claims
/// more than it can prove.
pub fn download_percent(bytes: u64, total: Option<u64>, cap: u8) -> u8 {
    match total {
        Some(total) if total > 0 => {
            let scaled = (bytes as f64 / total as f64) * f64::from(cap);
            scaled.clamp(0.0, f64::from(cap)) as u8
        }
        _ => 0,
    }
}
