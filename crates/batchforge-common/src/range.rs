//! Row ranges and partitioning strategies (spec.md §3, §4.4 Planning).

use crate::errors::CommonError;
use serde::{Deserialize, Serialize};

/// An inclusive `[start, end]` RowID interval owned by exactly one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub worker_id: u32,
    pub start: i64,
    pub end: i64,
}

impl Range {
    pub fn new(worker_id: u32, start: i64, end: i64) -> Self {
        Self {
            worker_id,
            start,
            end,
        }
    }

    /// Number of rows covered; zero for an inverted/empty range.
    pub fn row_count(&self) -> u64 {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start + 1) as u64
        }
    }
}

/// One range covering every row of a file (parallelization disabled).
pub fn single_range(total_rows: i64) -> Range {
    Range::new(1, 1, total_rows)
}

/// Assign dense 1-indexed `worker_id`s to explicitly configured ranges.
pub fn partition_manual(ranges: &[(i64, i64)]) -> Result<Vec<Range>, CommonError> {
    if ranges.is_empty() {
        return Err(CommonError::NoManualRanges);
    }
    Ok(ranges
        .iter()
        .enumerate()
        .map(|(i, &(start, end))| Range::new((i + 1) as u32, start, end))
        .collect())
}

/// Balance `total_rows` across `workers` contiguous, disjoint, gapless
/// ranges. A base size of `total_rows / workers` is given to every range;
/// the `total_rows % workers` remainder is distributed one row at a time
/// to the earliest ranges, producing maximally balanced ranges (spec.md
/// §4.4, scenarios in §8.1-2).
///
/// When `total_rows < workers`, the result has exactly `total_rows`
/// non-empty ranges; no empty range is ever produced.
pub fn partition_auto(total_rows: i64, workers: u32) -> Result<Vec<Range>, CommonError> {
    if workers == 0 {
        return Err(CommonError::InvalidWorkerCount);
    }
    if total_rows <= 0 {
        return Ok(Vec::new());
    }

    let effective_workers = std::cmp::min(workers as i64, total_rows) as u32;
    let base = total_rows / effective_workers as i64;
    let remainder = total_rows % effective_workers as i64;

    let mut ranges = Vec::with_capacity(effective_workers as usize);
    let mut cursor = 1i64;
    for worker_id in 1..=effective_workers {
        let extra = if (worker_id as i64) <= remainder { 1 } else { 0 };
        let size = base + extra;
        let start = cursor;
        let end = cursor + size - 1;
        ranges.push(Range::new(worker_id, start, end));
        cursor = end + 1;
    }
    Ok(ranges)
}

/// Confirms a set of ranges partitions `[1, total_rows]` with no overlap
/// and no gap (spec.md §3 Invariants, §8 quantified invariant).
pub fn covers_exactly(ranges: &[Range], total_rows: i64) -> bool {
    let mut sorted: Vec<&Range> = ranges.iter().collect();
    sorted.sort_by_key(|r| r.start);
    let mut expected_next = 1i64;
    for r in sorted {
        if r.start != expected_next {
            return false;
        }
        expected_next = r.end + 1;
    }
    expected_next == total_rows + 1
}
