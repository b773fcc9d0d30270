//! Checkpoint store: durable, resumable, order-preserving accumulation of
//! processed rows per `job_id` (spec.md §4.1). Grounded on
//! `S_serializer.py`, with the write path switched to temp-file + rename
//! for the atomicity contract that module only documented in a comment.

use crate::errors::SerializerError;
use crate::row::{read_csv, row_id, rows_to_csv_bytes, RowRecord};
use batchforge_common::atomic::write_atomic;
use std::path::{Path, PathBuf};

pub struct Serializer {
    checkpoint_dir: PathBuf,
    checkpoint_interval: u32,
    keep_merged: bool,
}

impl Serializer {
    pub fn new(checkpoint_dir: PathBuf, checkpoint_interval: u32, keep_merged: bool) -> std::io::Result<Self> {
        std::fs::create_dir_all(&checkpoint_dir)?;
        Ok(Self { checkpoint_dir, checkpoint_interval, keep_merged })
    }

    pub fn checkpoint_filename(&self, job_id: &str, part_number: u32) -> PathBuf {
        self.checkpoint_dir.join(format!("checkpoint_{job_id}_part{part_number:04}.csv"))
    }

    /// True when `processed_count` is a multiple of `checkpoint_interval`
    /// or equals `total` — evenly spaced checkpoints plus a guaranteed
    /// final flush.
    pub fn should_checkpoint(&self, processed_count: u64, total: u64) -> bool {
        if self.checkpoint_interval == 0 {
            return processed_count == total;
        }
        processed_count % self.checkpoint_interval as u64 == 0 || processed_count == total
    }

    fn part_number_from_path(path: &Path, job_id: &str) -> Option<u32> {
        let stem = path.file_stem()?.to_str()?;
        let prefix = format!("checkpoint_{job_id}_part");
        stem.strip_prefix(&prefix)?.parse().ok()
    }

    /// List parts for `job_id` sorted by part number. A filename that fails
    /// to parse is skipped rather than failing the whole listing.
    pub fn list_checkpoints(&self, job_id: &str) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.checkpoint_dir) else {
            return Vec::new();
        };
        let prefix = format!("checkpoint_{job_id}_part");
        let mut parts: Vec<(u32, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension().is_some_and(|e| e == "csv")
                    && p.file_stem().and_then(|s| s.to_str()).is_some_and(|s| s.starts_with(&prefix))
            })
            .filter_map(|p| Self::part_number_from_path(&p, job_id).map(|n| (n, p)))
            .collect();
        parts.sort_by_key(|(n, _)| *n);
        parts.into_iter().map(|(_, p)| p).collect()
    }

    /// Most recent checkpoint for `job_id` and the last `RowID` it covers.
    pub fn find_last_checkpoint(&self, job_id: &str) -> Result<Option<(PathBuf, i64)>, SerializerError> {
        let parts = self.list_checkpoints(job_id);
        let Some(last) = parts.last() else {
            return Ok(None);
        };
        let rows = read_csv(last).map_err(|e| SerializerError::ReadFailed {
            path: last.clone(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        })?;
        let last_row_id = rows.last().and_then(row_id).unwrap_or(0);
        Ok(Some((last.clone(), last_row_id)))
    }

    /// Filter `rows` to `RowID > last_row_id` for this job, resuming from
    /// the checkpoint frontier.
    pub fn get_resume_point(&self, job_id: &str, rows: Vec<RowRecord>) -> Result<(Vec<RowRecord>, i64, bool), SerializerError> {
        match self.find_last_checkpoint(job_id)? {
            Some((_, last_row_id)) => {
                let remaining: Vec<RowRecord> = rows
                    .into_iter()
                    .filter(|r| row_id(r).is_some_and(|id| id > last_row_id))
                    .collect();
                Ok((remaining, last_row_id, true))
            }
            None => Ok((rows, 0, false)),
        }
    }

    /// Write one checkpoint part, all-or-nothing: a temp file is written
    /// and renamed into place so a reader never observes a partial
    /// `part{NNNN}` file.
    pub fn save_checkpoint(
        &self,
        rows: &[RowRecord],
        job_id: &str,
        part_number: u32,
        metadata: &RowRecord,
    ) -> Result<PathBuf, SerializerError> {
        let path = self.checkpoint_filename(job_id, part_number);
        let rows_with_metadata: Vec<RowRecord> = rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                for (key, value) in metadata {
                    row.insert(key.clone(), value.clone());
                }
                row
            })
            .collect();
        let bytes = rows_to_csv_bytes(&rows_with_metadata).map_err(|source| SerializerError::Csv { path: path.clone(), source })?;
        write_atomic(&path, &bytes).map_err(|source| SerializerError::WriteFailed { path: path.clone(), source })?;
        Ok(path)
    }

    /// Concatenate all parts for `job_id`, in part-number (equivalently
    /// RowID) order, and write the result atomically to `output_path`.
    /// On success, deletes the source parts unless `keep_merged` is set
    /// (spec.md §4.1: parts are deleted only after a successful merge).
    pub fn merge_checkpoints(&self, job_id: &str, output_path: &Path) -> Result<bool, SerializerError> {
        let parts = self.list_checkpoints(job_id);
        if parts.is_empty() {
            return Ok(false);
        }
        let mut all_rows = Vec::new();
        for part in &parts {
            let rows = read_csv(part).map_err(|e| SerializerError::ReadFailed {
                path: part.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            })?;
            all_rows.extend(rows);
        }
        let bytes = rows_to_csv_bytes(&all_rows).map_err(|source| SerializerError::Csv { path: output_path.to_path_buf(), source })?;
        write_atomic(output_path, &bytes)
            .map_err(|source| SerializerError::WriteFailed { path: output_path.to_path_buf(), source })?;

        if !self.keep_merged {
            self.cleanup_checkpoints(&parts);
        }
        Ok(true)
    }

    /// Removes checkpoint part files after a successful merge. A single
    /// file failing to delete is logged and skipped rather than failing
    /// the merge that already succeeded.
    fn cleanup_checkpoints(&self, parts: &[PathBuf]) {
        for part in parts {
            if let Err(err) = std::fs::remove_file(part) {
                tracing::warn!(path = %part.display(), error = %err, "failed to remove checkpoint part after merge");
            }
        }
    }
}
