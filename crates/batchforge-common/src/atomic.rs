//! Whole-file atomic replacement: write to a sibling temp path, then rename.
//!
//! Used by every durable artifact the orchestrator and workers share
//! (manifest, worker status, checkpoint parts) so that a concurrent reader
//! never observes a torn write — the invariant both `spec.md` §3 and §5
//! require of the status directory and manifest.

use std::io;
use std::path::Path;

pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp_path = path.with_extension(match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    });
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
