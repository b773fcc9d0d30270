//! Supervision loop: poll worker status files at `dashboard_refresh`
//! cadence and render progress until every worker reaches a terminal
//! state (spec.md §4.4 Supervision). Grounded on the teacher's
//! `ui/progress.rs` console+indicatif idiom.

use super::shutdown::ShutdownFlag;
use batchforge_common::{WorkerState, WorkerStatus};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Outcome of a supervision poll loop: either every expected worker
/// reached a terminal state, or the operator interrupted the orchestrator
/// (SIGINT/SIGTERM) while workers were still running (spec.md §4.4).
pub enum SupervisionOutcome {
    Completed(Vec<WorkerStatus>),
    Interrupted(Vec<WorkerStatus>),
}

pub struct Dashboard {
    multi: MultiProgress,
    bars: HashMap<u32, ProgressBar>,
}

impl Dashboard {
    pub fn new(worker_ids: &[u32]) -> Self {
        let multi = MultiProgress::new();
        let style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("█▓▒░");

        let mut bars = HashMap::new();
        for &id in worker_ids {
            let bar = multi.add(ProgressBar::new(0));
            bar.set_style(style.clone());
            bar.set_prefix(format!("worker {id}"));
            bars.insert(id, bar);
        }
        Self { multi, bars }
    }

    pub fn render(&self, statuses: &[WorkerStatus]) {
        for status in statuses {
            let Some(bar) = self.bars.get(&status.worker_id) else { continue };
            bar.set_length(status.total_rows.max(1));
            bar.set_position(status.rows_processed.min(status.total_rows.max(status.rows_processed)));
            let message = match status.state {
                WorkerState::Initializing => style("starting").dim().to_string(),
                WorkerState::Running => {
                    let rps = status.rows_per_sec.map(|r| format!(" {r:.2} rows/s")).unwrap_or_default();
                    format!("{}{}", style("running").cyan(), rps)
                }
                WorkerState::Completed => style("completed").green().to_string(),
                WorkerState::Failed => style(status.last_error.clone().unwrap_or_else(|| "failed".into())).red().to_string(),
            };
            bar.set_message(message);
            if status.state.is_terminal() {
                bar.finish();
            }
        }
    }

    pub fn println(&self, message: &str) {
        let _ = self.multi.println(message);
    }
}

pub fn all_terminal(statuses: &[WorkerStatus], expected: usize) -> bool {
    statuses.len() == expected && statuses.iter().all(|s| s.state.is_terminal())
}

/// Block until every expected worker reaches a terminal state, rendering
/// the dashboard each poll. Returns early with `Interrupted` the moment
/// `shutdown` is observed set, without killing any worker — workers run
/// in their own process group and keep going in the background.
pub fn supervise(
    status_dir: &Path,
    run_id: &str,
    worker_ids: &[u32],
    refresh: Duration,
    shutdown: &ShutdownFlag,
) -> SupervisionOutcome {
    let dashboard = Dashboard::new(worker_ids);
    loop {
        let statuses = WorkerStatus::load_all(status_dir, run_id);
        dashboard.render(&statuses);
        if all_terminal(&statuses, worker_ids.len()) {
            return SupervisionOutcome::Completed(statuses);
        }
        if shutdown.requested() {
            dashboard.println("interrupted: workers continue running in the background, orchestrator is exiting");
            return SupervisionOutcome::Interrupted(statuses);
        }
        std::thread::sleep(refresh);
    }
}
