//! Planning: for each queued input file, count its rows and split them
//! into worker ranges per the configured strategy (spec.md §4.4 Planning).

use crate::errors::OrchestratorError;
use batchforge_common::{partition_auto, partition_manual, single_range, JobConfig, ManifestEntry, Range, SplitStrategy};
use std::path::{Path, PathBuf};

pub fn count_rows(path: &Path) -> Result<i64, OrchestratorError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| OrchestratorError::Other(e.into()))?;
    let count = reader.records().count();
    Ok(count as i64)
}

/// Ranges for one input file, per `parallelization.enabled`/`split_strategy`.
pub fn plan_ranges(config: &JobConfig, total_rows: i64) -> Result<Vec<Range>, OrchestratorError> {
    if !config.parallelization.enabled {
        return Ok(vec![single_range(total_rows)]);
    }
    match config.parallelization.split_strategy {
        SplitStrategy::Auto => Ok(partition_auto(total_rows, config.parallelization.workers)?),
        SplitStrategy::Manual => {
            let ranges = config
                .parallelization
                .manual_ranges
                .as_ref()
                .ok_or(batchforge_common::CommonError::NoManualRanges)?;
            Ok(partition_manual(ranges)?)
        }
    }
}

pub fn output_file_name(naming_pattern: &str, project: &str, version: &str, label: &str, date: &str, worker_id: u32) -> String {
    let base = naming_pattern
        .replace("{project}", project)
        .replace("{version}", version)
        .replace("{label}", label)
        .replace("{date}", date);
    format!("{base}_w{worker_id}.csv")
}

pub fn expected_outputs(config: &JobConfig, label: &str, date: &str, ranges: &[Range]) -> Vec<PathBuf> {
    ranges
        .iter()
        .map(|r| {
            config.output.directory.join(output_file_name(
                &config.output.naming_pattern,
                &config.project.name,
                &config.project.version,
                label,
                date,
                r.worker_id,
            ))
        })
        .collect()
}

pub fn build_manifest_entry(
    config: &JobConfig,
    label: &str,
    input_file: &Path,
    date: &str,
    ranges: Vec<Range>,
) -> ManifestEntry {
    let expected = expected_outputs(config, label, date, &ranges);
    ManifestEntry::pending(label.to_string(), input_file.to_path_buf(), ranges, expected)
}
