use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use medagent_core::{
    config::{
        archive_dir_from_env_value, confidence_threshold_from_env_value,
        max_iterations_from_env_value, max_triage_attempts_from_env_value,
        retry_policy_from_env_values, simulation_seed_from_env_value,
    },
    labs::LAB_PANEL,
    specialists, AbortHandle, ArchiveService, CaseFile, CaseId, CoreConfig,
    InMemoryLiteratureIndex, Orchestrator, PatientInterview,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "medagent")]
#[command(about = "Diagnostic orchestration CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one diagnostic session from a case file
    Run {
        /// Case file (YAML, or JSON with a .json extension)
        case: PathBuf,
        /// Answer triage clarification questions on stdin
        #[arg(long)]
        interactive: bool,
        /// Confidence threshold in (0, 1]
        #[arg(long)]
        threshold: Option<f64>,
        /// Maximum evidence-gathering iterations
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Report output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
        /// Archive the finalized session under this directory
        #[arg(long)]
        archive_dir: Option<PathBuf>,
        /// Directory of .md/.txt guideline excerpts added to the literature index
        #[arg(long)]
        corpus: Option<PathBuf>,
    },
    /// List the supported lab panel
    Labs,
    /// Parse and validate case files
    Validate {
        /// Case files to check
        #[arg(required = true)]
        cases: Vec<PathBuf>,
    },
    /// Print an archived handoff report
    Show {
        /// Case ID
        case_id: String,
        /// Archive root (defaults to MEDAGENT_ARCHIVE_DIR)
        #[arg(long)]
        archive_dir: Option<PathBuf>,
    },
}

/// Reads clarification answers from stdin; an empty line or EOF means no answer.
struct StdinInterview;

impl PatientInterview for StdinInterview {
    fn ask(&self, question: &str) -> Option<String> {
        eprint!("{}\n> ", question);
        io::stderr().flush().ok()?;

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()).filter(|l| !l.is_empty()),
        }
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn load_config() -> anyhow::Result<CoreConfig> {
    Ok(CoreConfig::new(
        confidence_threshold_from_env_value(env("MEDAGENT_CONFIDENCE_THRESHOLD"))?,
        max_iterations_from_env_value(env("MEDAGENT_MAX_ITERATIONS"))?,
        max_triage_attempts_from_env_value(env("MEDAGENT_MAX_TRIAGE_ATTEMPTS"))?,
        retry_policy_from_env_values(
            env("MEDAGENT_MAX_RETRIES"),
            env("MEDAGENT_RETRY_DELAY_MS"),
        )?,
        simulation_seed_from_env_value(env("MEDAGENT_SIM_SEED"))?,
        archive_dir_from_env_value(env("MEDAGENT_ARCHIVE_DIR")),
    )?)
}

fn literature_index(corpus: Option<&Path>) -> anyhow::Result<InMemoryLiteratureIndex> {
    let mut index = InMemoryLiteratureIndex::with_builtin_guidelines();
    if let Some(dir) = corpus {
        let added = index.load_dir(dir)?;
        tracing::info!("loaded {} excerpt(s) from {}", added, dir.display());
    }
    Ok(index)
}

#[allow(clippy::too_many_arguments)]
fn run(
    case: &Path,
    interactive: bool,
    threshold: Option<f64>,
    max_iterations: Option<u32>,
    format: OutputFormat,
    archive_dir: Option<PathBuf>,
    corpus: Option<PathBuf>,
) -> anyhow::Result<()> {
    let case_file = CaseFile::load(case)?;

    let mut config = load_config()?;
    if let Some(threshold) = threshold {
        config = config.with_confidence_threshold(threshold)?;
    }
    if let Some(max_iterations) = max_iterations {
        config = config.with_max_iterations(max_iterations)?;
    }
    if archive_dir.is_some() {
        config = config.with_archive_dir(archive_dir);
    }

    let index = Arc::new(literature_index(corpus.as_deref())?);
    let registry = specialists::default_registry(&config, index);
    let mut orchestrator = Orchestrator::new(config, registry)?;
    if interactive {
        orchestrator = orchestrator.with_interview(StdinInterview);
    }

    let outcome = orchestrator.run_case(&case_file, &AbortHandle::new())?;
    match format {
        OutputFormat::Markdown => println!("{}", outcome.markdown),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome.report)?),
    }
    if let Some(dir) = outcome.archived_to {
        eprintln!("Archived to {}", dir.display());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("medagent_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            case,
            interactive,
            threshold,
            max_iterations,
            format,
            archive_dir,
            corpus,
        }) => run(
            &case,
            interactive,
            threshold,
            max_iterations,
            format,
            archive_dir,
            corpus,
        )?,
        Some(Commands::Labs) => {
            println!("{:<12} {:<10} {:>16}", "CODE", "UNIT", "REFERENCE");
            for spec in LAB_PANEL {
                println!("{:<12} {:<10} {:>16}", spec.code, spec.unit, spec.range);
            }
        }
        Some(Commands::Validate { cases }) => {
            let mut failed = 0;
            for path in &cases {
                match CaseFile::load(path).and_then(|case| case.validate()) {
                    Ok(()) => println!("OK    {}", path.display()),
                    Err(e) => {
                        failed += 1;
                        eprintln!("FAIL  {}: {}", path.display(), e);
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{} of {} case file(s) failed validation", failed, cases.len());
            }
        }
        Some(Commands::Show {
            case_id,
            archive_dir,
        }) => {
            let root = archive_dir
                .or_else(|| archive_dir_from_env_value(env("MEDAGENT_ARCHIVE_DIR")))
                .ok_or_else(|| anyhow::anyhow!("no archive directory configured"))?;
            let case_id = CaseId::parse(&case_id)?;
            print!("{}", ArchiveService::new(root).load_report(case_id)?);
        }
        None => {
            println!("Use 'medagent --help' for commands");
        }
    }

    Ok(())
}
