use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared switch for automatic polling.
///
/// The aggregator lowers it on total failure; only an explicit refresh raises
/// it again. Clones observe the same flag.
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl Default for RunFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl RunFlag {
    pub fn new(running: bool) -> Self {
        Self(Arc::new(AtomicBool::new(running)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn resume(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn halt(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
