use std::path::{Path, PathBuf};
use std::sync::Arc;

use medagent_core::{
    config::{
        archive_dir_from_env_value, confidence_threshold_from_env_value,
        max_iterations_from_env_value, max_triage_attempts_from_env_value,
        retry_policy_from_env_values, simulation_seed_from_env_value,
    },
    specialists, AbortHandle, CaseFile, CoreConfig, InMemoryLiteratureIndex, Orchestrator,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CASES_DIR: &str = "cases";

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Case files directly under `dir`, sorted by name.
fn case_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml" | "yml" | "json")
            )
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Batch runner for a directory of case files.
///
/// Each case runs as an independent session on a blocking task; all sessions share one
/// orchestrator. Ctrl-C aborts every session still in progress at its next step boundary.
///
/// # Environment Variables
/// - `MEDAGENT_CASES_DIR`: directory of case files (default: "cases")
/// - `MEDAGENT_ARCHIVE_DIR`: archive root for finalized sessions (optional)
/// - `MEDAGENT_CONFIDENCE_THRESHOLD`, `MEDAGENT_MAX_ITERATIONS`, `MEDAGENT_MAX_TRIAGE_ATTEMPTS`,
///   `MEDAGENT_MAX_RETRIES`, `MEDAGENT_RETRY_DELAY_MS`, `MEDAGENT_SIM_SEED`: session limits
///
/// # Returns
/// * `Ok(())` - If every case finalized
/// * `Err(anyhow::Error)` - If configuration is invalid or any case failed
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("medagent_run=info".parse()?)
                .add_directive("medagent_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cases_dir = PathBuf::from(env("MEDAGENT_CASES_DIR").unwrap_or_else(|| DEFAULT_CASES_DIR.into()));
    if !cases_dir.is_dir() {
        anyhow::bail!("Cases directory does not exist: {}", cases_dir.display());
    }

    let config = CoreConfig::new(
        confidence_threshold_from_env_value(env("MEDAGENT_CONFIDENCE_THRESHOLD"))?,
        max_iterations_from_env_value(env("MEDAGENT_MAX_ITERATIONS"))?,
        max_triage_attempts_from_env_value(env("MEDAGENT_MAX_TRIAGE_ATTEMPTS"))?,
        retry_policy_from_env_values(env("MEDAGENT_MAX_RETRIES"), env("MEDAGENT_RETRY_DELAY_MS"))?,
        simulation_seed_from_env_value(env("MEDAGENT_SIM_SEED"))?,
        archive_dir_from_env_value(env("MEDAGENT_ARCHIVE_DIR")),
    )?;

    let index = Arc::new(InMemoryLiteratureIndex::with_builtin_guidelines());
    let registry = specialists::default_registry(&config, index);
    let orchestrator = Arc::new(Orchestrator::new(config, registry)?);

    let abort = AbortHandle::new();
    {
        let abort = abort.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("-- Interrupted, aborting running sessions");
                abort.abort();
            }
        });
    }

    let files = case_files(&cases_dir)?;
    tracing::info!("++ Running {} case(s) from {}", files.len(), cases_dir.display());

    let mut handles = Vec::with_capacity(files.len());
    for path in files {
        let orchestrator = orchestrator.clone();
        let abort = abort.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let outcome = CaseFile::load(&path).and_then(|case| orchestrator.run_case(&case, &abort));
            (path, outcome)
        });
        handles.push(handle);
    }

    let mut failed = 0usize;
    for handle in handles {
        let (path, outcome) = handle.await?;
        match outcome {
            Ok(outcome) => {
                let summary = serde_json::json!({
                    "case": path.display().to_string(),
                    "case_id": outcome.record.id().to_string(),
                    "diagnosis": outcome.report.final_diagnosis,
                    "probability": outcome.report.final_probability,
                    "termination": outcome.termination,
                    "iterations": outcome.record.iterations(),
                    "archived_to": outcome.archived_to.map(|p| p.display().to_string()),
                });
                println!("{}", summary);
            }
            Err(e) => {
                failed += 1;
                tracing::error!("Case {} failed: {:?}", path.display(), e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} case(s) failed", failed);
    }
    Ok(())
}
