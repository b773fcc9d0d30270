//! The orchestrator: plans row ranges, spawns detached workers,
//! supervises them to completion, triages failures, and merges their
//! outputs (spec.md §4.4).

pub mod failure_triage;
pub mod merge;
pub mod planning;
pub mod shutdown;
pub mod spawn;
pub mod summary;
pub mod supervise;

use std::path::{Path, PathBuf};

/// `status_dir/{run_id}/pause.flag` — its mere presence pauses every
/// worker in the run between batches (spec.md §4.4 Pause/resume).
pub fn pause_flag_path(status_dir: &Path, run_id: &str) -> PathBuf {
    status_dir.join(run_id).join("pause.flag")
}

pub fn set_pause(status_dir: &Path, run_id: &str) -> std::io::Result<()> {
    let path = pause_flag_path(status_dir, run_id);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, b"")
}

pub fn clear_pause(status_dir: &Path, run_id: &str) -> std::io::Result<()> {
    let path = pause_flag_path(status_dir, run_id);
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

pub fn is_paused(status_dir: &Path, run_id: &str) -> bool {
    pause_flag_path(status_dir, run_id).exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_then_clear_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_paused(dir.path(), "run1"));
        set_pause(dir.path(), "run1").unwrap();
        assert!(is_paused(dir.path(), "run1"));
        clear_pause(dir.path(), "run1").unwrap();
        assert!(!is_paused(dir.path(), "run1"));
    }

    #[test]
    fn clear_pause_is_a_no_op_when_never_set() {
        let dir = tempfile::tempdir().unwrap();
        assert!(clear_pause(dir.path(), "run1").is_ok());
    }
}
