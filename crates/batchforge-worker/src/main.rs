use anyhow::Context;
use batchforge_worker::processor::PromptsConfig;
use batchforge_worker::{HttpModelClient, HttpModelClientConfig, Worker, WorkerArgs};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// One worker process: owns a single contiguous row range from input to
/// output. Spawned detached by the orchestrator; never talks back to it
/// except through the filesystem (spec.md §4.3, §6).
#[derive(Parser)]
#[command(name = "batchforge-worker")]
#[command(version, about = "Process one row range of a batch job")]
struct Args {
    #[arg(long)]
    worker_id: u32,

    #[arg(long)]
    input_file: PathBuf,

    #[arg(long)]
    row_start: i64,

    #[arg(long)]
    row_end: i64,

    #[arg(long)]
    model: String,

    #[arg(long, default_value = "15")]
    batch_size: usize,

    #[arg(long)]
    prompts_config: PathBuf,

    #[arg(long)]
    output_dir: PathBuf,

    #[arg(long)]
    output_name: String,

    #[arg(long)]
    checkpoint_dir: PathBuf,

    #[arg(long, default_value = "50")]
    checkpoint_interval: u32,

    /// Keep checkpoint part files after a successful merge instead of deleting them.
    #[arg(long)]
    keep_merged: bool,

    #[arg(long)]
    status_dir: PathBuf,

    #[arg(long)]
    project_path: PathBuf,

    #[arg(long)]
    run_id: String,

    #[arg(long, default_value = "3")]
    retries: u32,

    #[arg(long, default_value = "5")]
    delay: u64,

    #[arg(long)]
    pause_file: PathBuf,

    #[arg(long, env = "BATCHFORGE_MODEL_BASE_URL")]
    model_base_url: String,

    #[arg(long, env = "BATCHFORGE_MODEL_API_KEY")]
    model_api_key: Option<String>,

    #[arg(long, default_value = "120")]
    model_timeout_secs: u64,
}

fn init_logging(project_path: &std::path::Path, run_id: &str) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = project_path.join("logs").join("terminal_logs");
    std::fs::create_dir_all(&log_dir).context("failed to create terminal log directory")?;
    let file_appender = tracing_appender::rolling::never(&log_dir, format!("run_{run_id}.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
    Ok(guard)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(&args.project_path, &args.run_id)?;

    tracing::info!(worker_id = args.worker_id, row_start = args.row_start, row_end = args.row_end, "worker starting");

    let prompts_json = std::fs::read_to_string(&args.prompts_config)
        .with_context(|| format!("failed to read prompts config {}", args.prompts_config.display()))?;
    let prompts_config: PromptsConfig = serde_json::from_str(&prompts_json)
        .with_context(|| format!("failed to parse prompts config {}", args.prompts_config.display()))?;

    let model = Arc::new(HttpModelClient::new(HttpModelClientConfig {
        base_url: args.model_base_url,
        model: args.model,
        api_key: args.model_api_key,
        timeout: Duration::from_secs(args.model_timeout_secs),
    })?);

    let worker_args = WorkerArgs {
        worker_id: args.worker_id,
        input_file: args.input_file,
        row_start: args.row_start,
        row_end: args.row_end,
        batch_size: args.batch_size,
        output_dir: args.output_dir,
        output_name: args.output_name,
        checkpoint_dir: args.checkpoint_dir,
        checkpoint_interval: args.checkpoint_interval,
        keep_merged: args.keep_merged,
        status_dir: args.status_dir,
        run_id: args.run_id,
        retries: args.retries,
        delay_secs: args.delay,
        pause_file: args.pause_file,
    };

    let mut worker = Worker::new(worker_args, model, prompts_config)?;
    match worker.run() {
        Ok(status) => {
            tracing::info!(worker_id = status.worker_id, rows_processed = status.rows_processed, "worker completed");
            Ok(())
        }
        Err(err) => {
            tracing::error!(error = %err, "worker failed");
            std::process::exit(1);
        }
    }
}
