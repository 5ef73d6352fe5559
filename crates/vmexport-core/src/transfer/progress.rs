//! Progress observation for byte transfers

use std::sync::Arc;

/// Snapshot handed to progress observers after every chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Cumulative bytes on disk, including resumed bytes
    pub current: u64,
    pub total: Option<u64>,
    pub file_name: String,
    /// 1-based position of this file within the export
    pub file_index: usize,
    pub total_files: usize,
}

impl ProgressUpdate {
    /// Percentage clamped to 0..=100, when the total is known
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(100.0),
            Some(total) => Some((self.current as f64 / total as f64 * 100.0).clamp(0.0, 100.0)),
            None => None,
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;

/// Percentage-oriented progress display (progress bar, log line, ...)
pub trait ProgressReporter: Send + Sync {
    /// A new file started; `total` is its size when known
    fn start(&self, _file_name: &str, _total: Option<u64>) {}

    fn update(&self, percent: f64);

    fn describe(&self, _description: &str) {}

    fn finish(&self, _file_name: &str) {}
}

/// Fans a transfer's progress out to the configured observers
#[derive(Clone, Default)]
pub struct ProgressSink {
    callback: Option<ProgressCallback>,
    reporter: Option<Arc<dyn ProgressReporter>>,
}

impl ProgressSink {
    pub fn new(
        callback: Option<ProgressCallback>,
        reporter: Option<Arc<dyn ProgressReporter>>,
    ) -> Self {
        Self { callback, reporter }
    }

    pub fn is_empty(&self) -> bool {
        self.callback.is_none() && self.reporter.is_none()
    }

    pub(crate) fn start(&self, file_name: &str, total: Option<u64>) {
        if let Some(reporter) = &self.reporter {
            reporter.start(file_name, total);
        }
    }

    pub(crate) fn report(&self, update: &ProgressUpdate) {
        if let Some(callback) = &self.callback {
            callback(update);
        }
        if let (Some(reporter), Some(percent)) = (&self.reporter, update.percent()) {
            reporter.update(percent);
        }
    }

    pub(crate) fn finish(&self, file_name: &str) {
        if let Some(reporter) = &self.reporter {
            reporter.finish(file_name);
        }
    }

    /// Free-form status line for the reporter (e.g. "Granting access")
    pub fn describe(&self, description: &str) {
        if let Some(reporter) = &self.reporter {
            reporter.describe(description);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        percents: Mutex<Vec<f64>>,
    }

    impl ProgressReporter for Recorder {
        fn update(&self, percent: f64) {
            self.percents.lock().unwrap().push(percent);
        }
    }

    fn update(current: u64, total: Option<u64>) -> ProgressUpdate {
        ProgressUpdate {
            current,
            total,
            file_name: "disk.vhd".into(),
            file_index: 1,
            total_files: 1,
        }
    }

    #[test]
    fn test_percent() {
        assert_eq!(update(50, Some(200)).percent(), Some(25.0));
        assert_eq!(update(0, Some(0)).percent(), Some(100.0));
        assert_eq!(update(10, None).percent(), None);
        assert_eq!(update(300, Some(200)).percent(), Some(100.0));
    }

    #[test]
    fn test_sink_fans_out() {
        let recorder = Arc::new(Recorder::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        let sink = ProgressSink::new(
            Some(Arc::new(move |u: &ProgressUpdate| {
                seen_cb.lock().unwrap().push(u.current);
            })),
            Some(recorder.clone() as Arc<dyn ProgressReporter>),
        );

        sink.report(&update(25, Some(100)));
        sink.report(&update(7, None));

        assert_eq!(*seen.lock().unwrap(), vec![25, 7]);
        // Unknown totals are not forwarded as percentages
        assert_eq!(*recorder.percents.lock().unwrap(), vec![25.0]);
    }
}
