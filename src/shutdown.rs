//! Two-stage interrupt handling.
//!
//! The first interrupt only raises a flag; drivers poll it between records
//! and finish cleanly, so an archive still gets its closing bracket. A second
//! interrupt exits on the spot.

use crate::Result;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    interrupts: Arc<AtomicUsize>,
}

impl Shutdown {
    /// Register the process signal handler and hand out the shared state.
    pub fn install() -> Result<Shutdown> {
        let shutdown = Shutdown::default();
        let state = shutdown.clone();
        ctrlc::set_handler(move || {
            let count = state.interrupts.fetch_add(1, Ordering::SeqCst) + 1;
            if count >= 2 {
                std::process::exit(130);
            }
            warn!("interrupt received; finishing the current pass (interrupt again to abort)");
        })?;
        Ok(shutdown)
    }

    /// True once at least one interrupt has arrived.
    pub fn requested(&self) -> bool {
        self.interrupts.load(Ordering::SeqCst) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_until_signaled() {
        let shutdown = Shutdown::default();
        assert!(!shutdown.requested());
        shutdown.interrupts.fetch_add(1, Ordering::SeqCst);
        assert!(shutdown.requested());
    }
}
