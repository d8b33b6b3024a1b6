//! SigmaLab CLI: list, inspect, run, and execute statistical analyses.
//!
//! Commands:
//! - `tests`: list the catalog, optionally marking applicability for a dataset profile
//! - `info`: show one test's requirements
//! - `categories`: list test types per category
//! - `run`: run one or more tests on a CSV file and print the results
//! - `execute`: run the full engine pipeline with in-memory collaborators

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use sigmalab_core::catalog::DatasetProfile;
use sigmalab_core::{
    available_tests, categories, run_full_validation, run_test, test_info, DataTable, JsonMap,
    Registry, TestKind,
};
use sigmalab_runner::dataset::read_csv_file;
use sigmalab_runner::{
    init_logging, AiReviewer, AnalysisRecord, DatasetSnapshot, EngineConfig, EngineError,
    ExecutionEngine, HttpAiReviewer, InMemoryDatasets, InMemoryResultStore, LoggingConfig,
    NoopPublisher,
};

const CLI_ANALYSIS_ID: &str = "cli-analysis";
const CLI_DATASET_ID: &str = "cli-dataset";

#[derive(Parser)]
#[command(
    name = "sigmalab",
    about = "SigmaLab CLI: statistical test execution engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available tests.
    Tests {
        /// Dataset profile JSON ({"columns": [{"name", "dtype"}], "row_count"}).
        #[arg(long)]
        profile: Option<PathBuf>,
    },
    /// Show requirements for one test type.
    Info {
        test_type: String,
    },
    /// List test types grouped by category.
    Categories,
    /// Run tests directly on a CSV file.
    Run {
        /// Test type, or several separated by commas.
        #[arg(long, required = true, value_delimiter = ',')]
        test: Vec<String>,

        /// CSV file with a header row.
        #[arg(long)]
        data: PathBuf,

        /// Test configuration as inline JSON, or @path to a JSON file.
        #[arg(long, default_value = "{}")]
        config: String,

        /// Also run programmatic validation.
        #[arg(long, default_value_t = false)]
        validate: bool,
    },
    /// Run the full pipeline: reconstruct, run, validate, review, persist.
    Execute {
        /// Engine configuration (TOML). Defaults apply when omitted.
        #[arg(long)]
        engine_config: Option<PathBuf>,

        /// CSV file with a header row.
        #[arg(long)]
        data: PathBuf,

        #[arg(long)]
        test: String,

        /// Test configuration as inline JSON, or @path to a JSON file.
        #[arg(long, default_value = "{}")]
        config: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Tests { profile } => {
            init_logging(&LoggingConfig::default());
            run_tests_cmd(profile.as_deref())
        }
        Commands::Info { test_type } => run_info(&test_type),
        Commands::Categories => run_categories(),
        Commands::Run {
            test,
            data,
            config,
            validate,
        } => {
            init_logging(&LoggingConfig::default());
            run_tests_on_file(&test, &data, &config, validate)
        }
        Commands::Execute {
            engine_config,
            data,
            test,
            config,
        } => run_execute(engine_config.as_deref(), &data, &test, &config),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_config(raw: &str) -> Result<JsonMap> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("read config file {path}"))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).context("test configuration must be a JSON object")
}

fn load_table(path: &Path) -> Result<DataTable> {
    read_csv_file(path).with_context(|| format!("read dataset {}", path.display()))
}

fn run_tests_cmd(profile: Option<&Path>) -> Result<()> {
    let profile: Option<DatasetProfile> = profile
        .map(|path| -> Result<DatasetProfile> {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read profile {}", path.display()))?;
            serde_json::from_str(&text).context("parse dataset profile")
        })
        .transpose()?;
    print_json(&available_tests(profile.as_ref()))
}

fn run_info(test_type: &str) -> Result<()> {
    match test_info(test_type) {
        Some(req) => print_json(req),
        None => bail!(
            "unknown test type '{test_type}'. Available: {}",
            TestKind::names().join(", ")
        ),
    }
}

fn run_categories() -> Result<()> {
    let mut listing = serde_json::Map::new();
    for (category, kinds) in categories() {
        let names: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
        listing.insert(category.as_str().to_string(), json!(names));
    }
    print_json(&listing)
}

fn run_tests_on_file(tests: &[String], data: &Path, raw_config: &str, validate: bool) -> Result<()> {
    let table = load_table(data)?;
    let config = parse_config(raw_config)?;
    info!(rows = table.n_rows(), cols = table.n_cols(), tests = tests.len(), "running tests");

    let outputs: Vec<Value> = tests
        .par_iter()
        .map(|test_type| {
            let result = run_test(test_type, &table, &config);
            debug!(test_type = %test_type, success = result.success, "test finished");
            if validate {
                let report = run_full_validation(test_type, &config, Some(&table), None, &result);
                json!({ "result": result, "validation": report })
            } else {
                json!(result)
            }
        })
        .collect();

    match outputs.as_slice() {
        [single] => print_json(single),
        _ => print_json(&outputs),
    }
}

fn run_execute(engine_config: Option<&Path>, data: &Path, test_type: &str, raw_config: &str) -> Result<()> {
    let config = match engine_config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    init_logging(&config.logging);

    let table = load_table(data)?;
    let configuration = parse_config(raw_config)?;
    let profile = DatasetProfile::from_table(&table);
    let snapshot = DatasetSnapshot {
        id: CLI_DATASET_ID.to_string(),
        columns: profile.columns,
        row_count: profile.row_count,
        file_reference: Some(data.to_path_buf()),
        preview_rows: None,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;

    runtime.block_on(execute_pipeline(config, snapshot, test_type, configuration))
}

async fn execute_pipeline(
    config: EngineConfig,
    snapshot: DatasetSnapshot,
    test_type: &str,
    configuration: JsonMap,
) -> Result<()> {
    let store = Arc::new(InMemoryResultStore::new());
    store
        .insert(
            AnalysisRecord::pending(CLI_ANALYSIS_ID, test_type, configuration)
                .with_dataset(CLI_DATASET_ID),
        )
        .await;

    let reviewer = HttpAiReviewer::from_config(&config.ai_review)?;
    let mut engine = ExecutionEngine::new(
        Arc::new(Registry::standard()),
        Arc::new(InMemoryDatasets::from_snapshots([snapshot])),
        store.clone(),
        Arc::new(NoopPublisher),
        config,
    );
    if let Some(reviewer) = reviewer {
        info!(endpoint = %reviewer.endpoint(), "AI review enabled");
        engine = engine.with_reviewer(Arc::new(reviewer) as Arc<dyn AiReviewer>);
    }

    let outcome = engine.execute_analysis(CLI_ANALYSIS_ID).await;
    if let Some(saved) = store.saved(CLI_ANALYSIS_ID).await {
        print_json(&saved.to_document())?;
    }
    match outcome {
        Ok(_) => Ok(()),
        Err(EngineError::UnknownTest(e)) => bail!("{e}. Available: {}", e.available.join(", ")),
        Err(e) => Err(e).context("execute analysis"),
    }
}
