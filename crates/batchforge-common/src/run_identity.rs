//! Deterministic run and job identifiers (spec.md §3, §4.5).
//!
//! Grounded on `run_ids.py`: a run id encodes project, version, a short
//! model tag, and a timestamp, all sanitized to a filesystem-safe alphabet.

/// Replace any character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// `"m" + configured_id`, or `"m" + alphanumeric_prefix(model_name, 10)`
/// when no configured id is known.
pub fn resolve_model_tag(model_name: &str, configured_id: Option<&str>) -> String {
    let tag = match configured_id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            let cleaned: String = model_name.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
            let prefix: String = cleaned.chars().take(10).collect();
            if prefix.is_empty() { "unknown".to_string() } else { prefix }
        }
    };
    format!("m{tag}")
}

/// `run_id = sanitize(project)_sanitize(version)_modelTag_timestamp`.
///
/// `timestamp` is passed in rather than read from the clock here so the
/// function stays pure and testable; callers stamp `Utc::now()` once at
/// run start and never regenerate it.
pub fn build_run_id(
    project: &str,
    version: &str,
    model_name: &str,
    configured_model_id: Option<&str>,
    timestamp: &str,
) -> String {
    let model_tag = resolve_model_tag(model_name, configured_model_id);
    format!(
        "{}_{}_{}_{}",
        sanitize(project),
        sanitize(version),
        model_tag,
        timestamp
    )
}

/// `job_id = "{start}-{end}_w{worker_id}_{run_id}"`.
pub fn build_job_id(start: i64, end: i64, worker_id: u32, run_id: &str) -> String {
    format!("{start}-{end}_w{worker_id}_{run_id}")
}
