//! `batchforge`: the orchestrator CLI binary. Plans row ranges, spawns
//! detached workers, supervises them, triages failures, and merges
//! outputs for one job config (spec.md §4.4, §6).

mod config;
mod errors;
mod orchestrator;

use batchforge_common::{build_run_id, FileStatus, JobConfig, Manifest};
use chrono::Utc;
use clap::Parser;
use console::style;
use dialoguer::Select;
use errors::OrchestratorError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "batchforge", about = "Parallel batch-processing orchestrator for row-wise LLM transformation of tabular data")]
struct Args {
    /// Path to the job config file (YAML or JSON).
    config: PathBuf,

    /// Plan ranges and print the spawn commands without launching workers.
    #[arg(long)]
    dry_run: bool,

    /// Override `parallelization.workers` from the config.
    #[arg(long)]
    workers: Option<u32>,

    /// Override `project.version` from the config.
    #[arg(long)]
    version: Option<String>,

    /// Run id to operate on; required by `--resume`, `--summary`,
    /// `--pause-run`, `--resume-run`, `--monitor-only`.
    #[arg(long = "run-id")]
    run_id: Option<String>,

    /// Reattach to an existing run and process only its pending/incomplete files.
    #[arg(long)]
    resume: bool,

    /// Write a markdown run summary for `--run-id` and exit.
    #[arg(long)]
    summary: bool,

    /// Set the pause flag for `--run-id` and exit.
    #[arg(long = "pause-run")]
    pause_run: bool,

    /// Clear the pause flag for `--run-id` and exit.
    #[arg(long = "resume-run")]
    resume_run: bool,

    /// Reattach to `--run-id` and supervise without spawning any workers.
    #[arg(long = "monitor-only")]
    monitor_only: bool,

    #[arg(long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn worker_binary_path() -> PathBuf {
    let exe_name = if cfg!(windows) { "batchforge-worker.exe" } else { "batchforge-worker" };
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.join(exe_name)))
        .unwrap_or_else(|| PathBuf::from(exe_name))
}

fn require_run_id(args: &Args) -> Result<String, OrchestratorError> {
    args.run_id
        .clone()
        .ok_or_else(|| OrchestratorError::Other(anyhow::anyhow!("--run-id is required for this command")))
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(err) = run(args) {
        eprintln!("{} {err}", style("error:").red().bold());
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), OrchestratorError> {
    let mut config = config::load_job_config(&args.config)?;
    if let Some(workers) = args.workers {
        config.parallelization.workers = workers;
    }
    if let Some(version) = args.version.clone() {
        config.project.version = version;
    }

    if args.pause_run {
        let run_id = require_run_id(&args)?;
        orchestrator::set_pause(&config.monitoring.status_dir, &run_id).map_err(|e| OrchestratorError::Other(e.into()))?;
        println!("paused run {run_id}");
        return Ok(());
    }
    if args.resume_run {
        let run_id = require_run_id(&args)?;
        orchestrator::clear_pause(&config.monitoring.status_dir, &run_id).map_err(|e| OrchestratorError::Other(e.into()))?;
        println!("resumed run {run_id}");
        return Ok(());
    }
    if args.summary {
        let run_id = require_run_id(&args)?;
        let summary = orchestrator::summary::build_summary(&config.monitoring.status_dir, &config.monitoring.logs_dir, &run_id)?;
        let path = summary.write(&config.monitoring.logs_dir).map_err(|e| OrchestratorError::Other(e.into()))?;
        println!("wrote summary to {}", path.display());
        return Ok(());
    }
    if args.monitor_only {
        let run_id = require_run_id(&args)?;
        return monitor_only(&config, &run_id);
    }

    let run_id = match args.run_id.clone() {
        Some(id) => id,
        None => build_run_id(
            &config.project.name,
            &config.project.version,
            &config.model.name,
            config.model.id.as_deref(),
            &Utc::now().format("%Y%m%dT%H%M%S").to_string(),
        ),
    };
    if args.resume && args.run_id.is_none() {
        return Err(OrchestratorError::Other(anyhow::anyhow!("--resume requires --run-id")));
    }

    execute_run(&config, &run_id, args.dry_run, args.resume)
}

/// Reattach to a run already in progress: supervise to completion without
/// spawning anything (spec.md §4.4 Supervision loop interruption).
fn monitor_only(config: &JobConfig, run_id: &str) -> Result<(), OrchestratorError> {
    let manifest = Manifest::load(&config.monitoring.logs_dir, run_id)?;
    let worker_ids: Vec<u32> = manifest
        .files
        .iter()
        .flat_map(|f| f.row_ranges.iter().map(|r| r.worker_id))
        .collect();
    if worker_ids.is_empty() {
        return Err(OrchestratorError::RunNotFound(run_id.to_string()));
    }
    let shutdown = orchestrator::shutdown::ShutdownFlag::register().map_err(|e| OrchestratorError::Other(e.into()))?;
    let refresh = Duration::from_secs(config.monitoring.dashboard_refresh);
    orchestrator::supervise::supervise(&config.monitoring.status_dir, run_id, &worker_ids, refresh, &shutdown);
    Ok(())
}

fn execute_run(config: &JobConfig, run_id: &str, dry_run: bool, resume: bool) -> Result<(), OrchestratorError> {
    let mut manifest = Manifest::load_or_create(&config.monitoring.logs_dir, run_id, config)?;
    let date = Utc::now().format("%Y%m%d").to_string();
    let worker_binary = worker_binary_path();

    let mut all_worker_ids = Vec::new();
    let mut spawned = Vec::new();

    for entry in &config.input_queue {
        let existing = manifest.entry(&entry.label).cloned();
        if let Some(existing) = &existing {
            if matches!(existing.status, FileStatus::Completed) {
                continue;
            }
        }

        // On resume, reuse the ranges already recorded for this label
        // instead of replanning — a `--workers` override combined with
        // `--resume` must not silently shift range/job_id boundaries out
        // from under already-written checkpoints.
        let ranges = match existing.as_ref().filter(|e| resume && !e.row_ranges.is_empty()) {
            Some(existing) => {
                tracing::info!(label = %entry.label, "resume: reusing previously planned ranges");
                existing.row_ranges.clone()
            }
            None => {
                let total_rows = orchestrator::planning::count_rows(&entry.path)?;
                orchestrator::planning::plan_ranges(config, total_rows)?
            }
        };
        let manifest_entry = orchestrator::planning::build_manifest_entry(config, &entry.label, &entry.path, &date, ranges.clone());
        manifest.upsert_entry(manifest_entry.clone());

        for (range, output_path) in ranges.into_iter().zip(manifest_entry.expected_outputs.iter()) {
            all_worker_ids.push(range.worker_id);
            let plan = orchestrator::spawn::SpawnPlan {
                worker_binary: &worker_binary,
                range,
                input_file: &entry.path,
                output_path,
                prompts_config: &config.prompts_config,
                run_id,
                project_path: &config.monitoring.logs_dir,
                config,
            };

            if dry_run {
                println!("{:?}", plan.command());
                continue;
            }
            spawned.push(orchestrator::spawn::spawn_detached(&plan)?);
        }
    }
    manifest.save(&config.monitoring.logs_dir)?;

    if dry_run {
        println!("dry run: {} ranges planned, no workers spawned", all_worker_ids.len());
        return Ok(());
    }
    // Workers are detached; dropping these handles does not kill them, we
    // only needed the spawn calls to succeed. Status files carry progress.
    drop(spawned);

    let shutdown = orchestrator::shutdown::ShutdownFlag::register().map_err(|e| OrchestratorError::Other(e.into()))?;
    let refresh = Duration::from_secs(config.monitoring.dashboard_refresh);
    let outcome = orchestrator::supervise::supervise(&config.monitoring.status_dir, run_id, &all_worker_ids, refresh, &shutdown);

    let statuses = match outcome {
        orchestrator::supervise::SupervisionOutcome::Interrupted(_) => {
            println!("{}", style("interrupted: workers continue running in the background, re-run with --monitor-only to reattach").yellow());
            return Ok(());
        }
        orchestrator::supervise::SupervisionOutcome::Completed(statuses) => statuses,
    };

    let statuses = triage_failures(config, run_id, &worker_binary, &manifest, statuses, &shutdown)?;
    merge_all(config, &mut manifest)?;
    manifest.save(&config.monitoring.logs_dir)?;

    Ok(())
}

/// Offers the operator Retry/Merge/Save for each failed worker
/// (spec.md §4.4 Failure triage). Retry respawns only that worker with
/// an identical `SpawnPlan` and re-supervises it alone, bounded by
/// `error_handling.max_worker_retries` retries per worker.
fn triage_failures(
    config: &JobConfig,
    run_id: &str,
    worker_binary: &Path,
    manifest: &Manifest,
    mut statuses: Vec<batchforge_common::WorkerStatus>,
    shutdown: &orchestrator::shutdown::ShutdownFlag,
) -> Result<Vec<batchforge_common::WorkerStatus>, OrchestratorError> {
    let mut retries: std::collections::HashMap<u32, u32> = std::collections::HashMap::new();
    let mut i = 0;
    while i < statuses.len() {
        if statuses[i].state != batchforge_common::WorkerState::Failed {
            i += 1;
            continue;
        }
        let status = statuses[i].clone();
        if config.error_handling.save_failed_ranges {
            orchestrator::failure_triage::append_failed_range(
                &config.monitoring.logs_dir,
                orchestrator::failure_triage::FailedRange {
                    run_id: run_id.to_string(),
                    label: String::new(),
                    range: batchforge_common::Range::new(status.worker_id, status.row_start, status.row_end),
                    error: status.last_error.clone().unwrap_or_default(),
                    recorded_at: Utc::now(),
                },
            )?;
        }
        if !(config.error_handling.prompt_on_failure && atty_stdin()) {
            i += 1;
            continue;
        }
        let options = ["Retry", "Merge what succeeded", "Save and move on"];
        let choice = Select::new()
            .with_prompt(format!("worker {} failed: {}", status.worker_id, status.last_error.clone().unwrap_or_default()))
            .items(&options)
            .default(2)
            .interact_opt()
            .ok()
            .flatten();
        match choice {
            Some(0) => {
                let attempt = retries.entry(status.worker_id).or_insert(0);
                if *attempt >= config.error_handling.max_worker_retries {
                    println!("worker {} already retried {} time(s), not retrying again", status.worker_id, attempt);
                    i += 1;
                    continue;
                }
                *attempt += 1;
                match respawn_failed_worker(config, run_id, worker_binary, manifest, &status, shutdown)? {
                    Some(new_status) => statuses[i] = new_status,
                    None => i += 1,
                }
            }
            Some(1) => break,
            _ => i += 1,
        }
    }
    Ok(statuses)
}

/// Respawns exactly one failed worker with the same range/config it
/// originally ran with and supervises it alone until it reaches a
/// terminal state (or the operator interrupts). Returns `None` if the
/// worker's range can no longer be found in the manifest.
fn respawn_failed_worker(
    config: &JobConfig,
    run_id: &str,
    worker_binary: &Path,
    manifest: &Manifest,
    failed: &batchforge_common::WorkerStatus,
    shutdown: &orchestrator::shutdown::ShutdownFlag,
) -> Result<Option<batchforge_common::WorkerStatus>, OrchestratorError> {
    let Some((entry, idx)) = manifest
        .files
        .iter()
        .find_map(|entry| entry.row_ranges.iter().position(|r| r.worker_id == failed.worker_id).map(|idx| (entry, idx)))
    else {
        println!("worker {} is no longer in the manifest, cannot retry", failed.worker_id);
        return Ok(None);
    };
    let range = entry.row_ranges[idx];
    let output_path = &entry.expected_outputs[idx];
    let plan = orchestrator::spawn::SpawnPlan {
        worker_binary,
        range,
        input_file: &entry.input_file,
        output_path,
        prompts_config: &config.prompts_config,
        run_id,
        project_path: &config.monitoring.logs_dir,
        config,
    };
    orchestrator::spawn::spawn_detached(&plan)?;

    let refresh = Duration::from_secs(config.monitoring.dashboard_refresh);
    let outcome = orchestrator::supervise::supervise(&config.monitoring.status_dir, run_id, &[failed.worker_id], refresh, shutdown);
    let statuses = match outcome {
        orchestrator::supervise::SupervisionOutcome::Completed(s) => s,
        orchestrator::supervise::SupervisionOutcome::Interrupted(s) => s,
    };
    Ok(statuses.into_iter().find(|s| s.worker_id == failed.worker_id))
}

fn atty_stdin() -> bool {
    use std::io::IsTerminal;
    std::io::stdin().is_terminal()
}

fn merge_all(config: &JobConfig, manifest: &mut Manifest) -> Result<(), OrchestratorError> {
    let entries: Vec<String> = manifest.files.iter().map(|f| f.label.clone()).collect();
    for label in entries {
        let entry = manifest.entry(&label).expect("label came from manifest.files").clone();
        let completed = entry
            .expected_outputs
            .iter()
            .filter(|p| p.exists())
            .count();
        if !orchestrator::merge::should_merge(config.merge.condition, completed, entry.expected_outputs.len()) {
            continue;
        }
        let merged_path = merged_output_path(config, &label);
        let merged = orchestrator::merge::merge_outputs(&entry.expected_outputs, &merged_path, &config.merge.sort_by)?;
        let status = orchestrator::merge::entry_status_after_attempt(&entry, completed);
        manifest.mark_status(&label, status, merged.then_some(merged_path))?;
    }
    Ok(())
}

fn merged_output_path(config: &JobConfig, label: &str) -> PathBuf {
    let date = Utc::now().format("%Y%m%d").to_string();
    let base = config
        .output
        .naming_pattern
        .replace("{project}", &config.project.name)
        .replace("{version}", &config.project.version)
        .replace("{label}", label)
        .replace("{date}", &date);
    config.output.directory.join(format!("{base}.csv"))
}
