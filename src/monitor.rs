use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};

/// Cooperative shutdown flag, flipped by the first SIGINT or SIGTERM and
/// never reset. Long loops poll [`SignalMonitor::is_shutdown`] between
/// units of work.
#[derive(Clone)]
pub struct SignalMonitor {
    name: &'static str,
    shutdown: Arc<AtomicBool>,
}

impl SignalMonitor {
    /// Installs the signal handlers and returns the monitor.
    pub fn install(name: &'static str) -> Result<Self> {
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let monitor = Self::new(name);
        let flag = monitor.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = interrupt.recv() => {}
                _ = terminate.recv() => {}
            }
            tracing::info!("{name} shutting down");
            flag.store(true, Ordering::SeqCst);
        });
        Ok(monitor)
    }

    fn new(name: &'static str) -> Self {
        Self {
            name,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// Test-only monitor that is never tripped by a signal.
    #[cfg(test)]
    pub(crate) fn idle(name: &'static str) -> Self {
        Self::new(name)
    }

    /// Test-only shutdown trigger.
    #[cfg(test)]
    pub(crate) fn trip(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_starts_clear_and_stays_set_once_tripped() {
        let monitor = SignalMonitor::idle("test");
        assert!(!monitor.is_shutdown());
        assert_eq!(monitor.name(), "test");

        monitor.trip();
        assert!(monitor.is_shutdown());
        assert!(monitor.is_shutdown(), "the flag never resets");

        let clone = monitor.clone();
        assert!(clone.is_shutdown(), "clones observe the same flag");
    }
}
