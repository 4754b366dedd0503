use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use driftwatch_core::config::EngineConfig;
use driftwatch_core::engine::{DayArtifacts, Engine, RunStatus};
use driftwatch_core::errors::ConfigError;
use driftwatch_core::model::ModelKey;
use driftwatch_core::storage::Store;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "driftwatch",
    version,
    about = "Daily drift, reliability, and performance metrics for deployed ML models"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    Run(RunArgs),
    Init(InitArgs),
    Version,
}

#[derive(Parser, Clone)]
struct RunArgs {
    /// engine config; built-in defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = ".driftwatch/driftwatch.db")]
    db: PathBuf,

    /// target day, YYYY-MM-DD (default: today, UTC)
    #[arg(long)]
    day: Option<String>,

    /// inclusive backfill range, both ends required
    #[arg(long)]
    from: Option<String>,
    #[arg(long)]
    to: Option<String>,

    /// compute exactly one model/version instead of discovering active ones
    #[arg(long)]
    model_id: Option<String>,
    #[arg(long)]
    model_version: Option<String>,

    /// output format: text|json
    #[arg(long, default_value = "text")]
    format: String,
}

#[derive(Parser, Clone)]
struct InitArgs {
    #[arg(long, default_value = "driftwatch.yaml")]
    config: PathBuf,
}

mod exit_codes {
    pub const OK: i32 = 0;
    pub const RUN_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();
    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fatal: {e:?}");
            exit_codes::CONFIG_ERROR
        }
    };
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Init(args) => cmd_init(args).await,
        Command::Run(args) => cmd_run(args).await,
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

async fn cmd_init(args: InitArgs) -> anyhow::Result<i32> {
    if !args.config.exists() {
        if let Some(parent) = args.config.parent() {
            std::fs::create_dir_all(parent)?;
        }
        driftwatch_core::config::write_sample_config(&args.config)?;
        eprintln!("created {}", args.config.display());
    } else {
        eprintln!("note: {} already exists", args.config.display());
    }
    Ok(exit_codes::OK)
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<i32> {
    if args.from.is_some() != args.to.is_some() {
        return Err(ConfigError("--from and --to must be given together".into()).into());
    }
    if args.day.is_some() && args.from.is_some() {
        return Err(ConfigError("--day conflicts with --from/--to".into()).into());
    }
    if args.model_id.is_some() != args.model_version.is_some() {
        return Err(
            ConfigError("--model-id and --model-version must be given together".into()).into(),
        );
    }
    if args.model_id.is_some() && args.from.is_some() {
        return Err(ConfigError("a model run targets a single --day, not a range".into()).into());
    }
    match args.format.as_str() {
        "text" | "json" => {}
        other => {
            return Err(ConfigError(format!("unknown --format: {}", other)).into());
        }
    }

    let cfg = match &args.config {
        Some(path) => driftwatch_core::config::load_config(path)?,
        None => EngineConfig::default(),
    };

    ensure_parent_dir(&args.db)?;
    let store = Store::open(&args.db)?;
    store.init_schema()?;
    let engine = Engine::new(store, cfg);

    let runs: Vec<DayArtifacts> = match (&args.from, &args.to) {
        (Some(from), Some(to)) => engine.run_range(parse_day(from)?, parse_day(to)?).await?,
        _ => {
            let day = match &args.day {
                Some(raw) => parse_day(raw)?,
                None => Utc::now().date_naive(),
            };
            let artifacts = match (&args.model_id, &args.model_version) {
                (Some(id), Some(version)) => {
                    engine.run_model(&ModelKey::new(id.clone(), version.clone()), day).await?
                }
                _ => engine.run_day(day).await?,
            };
            vec![artifacts]
        }
    };

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&runs)?);
    } else {
        print_summary(&runs);
    }
    Ok(decide_exit_code(&runs))
}

fn print_summary(runs: &[DayArtifacts]) {
    let mut completed = 0;
    let mut failed = 0;
    for artifacts in runs {
        if artifacts.outcomes.is_empty() {
            eprintln!("note: no active models on {}", artifacts.day);
        }
        for o in &artifacts.outcomes {
            match o.status {
                RunStatus::Completed => {
                    completed += 1;
                    eprintln!(
                        "DONE [{}@{}] {}: events={} metrics={}",
                        o.model_id, o.model_version, o.day, o.n_events, o.metrics_written
                    );
                    if !o.skipped_features.is_empty() {
                        eprintln!("  skipped features: {}", o.skipped_features.join(", "));
                    }
                }
                RunStatus::Failed => {
                    failed += 1;
                    eprintln!(
                        "FAIL [{}@{}] {}: {}",
                        o.model_id, o.model_version, o.day, o.message
                    );
                }
            }
        }
    }
    eprintln!("Results: completed={} failed={}", completed, failed);
}

fn decide_exit_code(runs: &[DayArtifacts]) -> i32 {
    let mut has_failed = false;
    let mut has_config_error = false;

    for artifacts in runs {
        for o in &artifacts.outcomes {
            if o.status == RunStatus::Failed {
                has_failed = true;
                if o.message.contains("config error:") {
                    has_config_error = true;
                }
            }
        }
    }

    if has_config_error {
        return exit_codes::CONFIG_ERROR;
    }
    if has_failed {
        return exit_codes::RUN_FAILED;
    }
    exit_codes::OK
}

fn parse_day(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ConfigError(format!("invalid day '{}', expected YYYY-MM-DD", raw)).into())
}

fn ensure_parent_dir(path: &std::path::Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
