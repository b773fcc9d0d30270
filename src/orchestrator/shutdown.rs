//! Cooperative shutdown flag for SIGINT/SIGTERM (spec.md §4.4 Supervision:
//! on interrupt the orchestrator sets a flag, advises the operator that
//! workers continue, and returns — it never kills workers). Detached
//! workers run in their own process group (`orchestrator/spawn.rs`), so
//! the signal only reaches the orchestrator's own process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    /// Installs SIGINT and SIGTERM handlers that flip this flag; never
    /// cleared afterward, so one interrupt is enough for the rest of the
    /// run to observe it.
    pub fn register() -> std::io::Result<Self> {
        let flag = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&flag))?;
        signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&flag))?;
        Ok(Self(flag))
    }

    pub fn requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn raw(flag: bool) -> Self {
        Self(Arc::new(AtomicBool::new(flag)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_flag_is_not_requested() {
        assert!(!ShutdownFlag::raw(false).requested());
    }

    #[test]
    fn a_set_flag_is_observed() {
        assert!(ShutdownFlag::raw(true).requested());
    }
}
