//! Progress monitors: advisory, side-effect-only reporting.
//!
//! Monitors cannot fail the pipeline; they have no error return and
//! implementations log their own problems.

use super::{ExtensionError, MonitorRegistry};
use std::sync::Arc;
use tracing::info;
use url::Url;

/// One placed picture.
///
/// The final page count is unknown until the run ends (blank and text pages
/// are inserted as needed), so progress is measured in pictures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Page the picture landed on.
    pub page: usize,
    /// Pictures in this run, placed or not.
    pub total_pictures: usize,
    pub message: String,
}

impl Event {
    pub fn new(page: usize, total_pictures: usize, message: impl Into<String>) -> Self {
        Self {
            page,
            total_pictures,
            message: message.into(),
        }
    }
}

pub trait ProgressMonitor: Send + Sync {
    fn signal(&self, event: &Event);
    fn clear(&self) {}
    fn close(&self) {}
}

/// `null://`
pub struct NullMonitor;

impl ProgressMonitor for NullMonitor {
    fn signal(&self, _: &Event) {}
}

/// `log://` reports each event through `tracing`.
pub struct LogMonitor;

impl ProgressMonitor for LogMonitor {
    fn signal(&self, event: &Event) {
        info!(
            page = event.page,
            pictures = event.total_pictures,
            "{}",
            event.message
        );
    }
}

pub fn register_defaults(registry: &MonitorRegistry) -> Result<(), ExtensionError> {
    registry.register("null", |_: &Url| -> Result<Arc<dyn ProgressMonitor>, ExtensionError> {
        Ok(Arc::new(NullMonitor))
    })?;
    registry.register("log", |_: &Url| -> Result<Arc<dyn ProgressMonitor>, ExtensionError> {
        Ok(Arc::new(LogMonitor))
    })?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every call, for orchestrator tests.
    #[derive(Default)]
    pub struct RecordingMonitor {
        pub events: Mutex<Vec<Event>>,
        pub closed: Mutex<bool>,
    }

    impl ProgressMonitor for RecordingMonitor {
        fn signal(&self, event: &Event) {
            self.events.lock().unwrap().push(event.clone());
        }

        fn close(&self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    #[test]
    fn builtin_monitors_accept_events() {
        let registry = MonitorRegistry::new("progress monitor");
        register_defaults(&registry).unwrap();

        let event = Event::new(1, 3, "added page");
        for scheme in ["null://", "log://"] {
            let monitor = registry.create(scheme).unwrap();
            monitor.signal(&event);
            monitor.clear();
            monitor.close();
        }
    }

    #[test]
    fn recording_monitor_captures_events() {
        let monitor = RecordingMonitor::default();
        monitor.signal(&Event::new(2, 5, "x"));
        monitor.close();
        assert_eq!(monitor.events.lock().unwrap()[0].page, 2);
        assert!(*monitor.closed.lock().unwrap());
    }
}
