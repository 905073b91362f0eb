//! CLI definition, run flow, and tracing setup.

use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use rfqscope_artifacts::FINAL_RESPONSE_FILE;
use rfqscope_core::cache::CachedGenerator;
use rfqscope_core::pipeline::{ProgressReporter, RunRequest, RunResult, run_pipeline};
use rfqscope_llm::OpenAiClient;
use rfqscope_shared::{AppConfig, Role, RunId, VendorId, load_config, validate_api_key};
use rfqscope_storage::{Storage, db_path};

/// Environment variable selecting the log format (`text` or `json`).
const LOG_FORMAT_ENV: &str = "RFQSCOPE_LOG_FORMAT";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// RFQScope: structured summaries and a verified ranking of RFQ responses.
#[derive(Parser)]
#[command(
    name = "rfqscope",
    version,
    about = "Summarize a customer RFQ and its vendor responses, compare each vendor, and rank them.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Run id: names the input directory under docs_root and the output directory.
    pub run_id: RunId,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing from `RUST_LOG` and `RFQSCOPE_LOG_FORMAT`.
pub(crate) fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rfqscope=info"));

    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Execute one run end to end and print where its outputs went.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = load_config()?;
    let api_key = validate_api_key(&config)?;

    let cwd = std::env::current_dir()
        .map_err(|e| eyre!("cannot determine working directory: {e}"))?;
    let request = RunRequest {
        input_dir: config.run_input_dir(&cwd, &cli.run_id),
        output_root: config.output_root(&cwd),
        run_id: cli.run_id,
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
    };

    info!(
        run_id = %request.run_id,
        input = %request.input_dir.display(),
        vendors = config.pipeline.vendors.len(),
        model = %config.llm.model,
        "starting rfqscope run"
    );

    let client = OpenAiClient::new(&config.llm, api_key)?;
    let storage = Arc::new(Storage::open(&db_path(&request.output_root)).await?);
    let reporter = CliProgress::new();

    let outcome = if config.cache.enabled {
        let generator = Arc::new(CachedGenerator::new(client, Arc::clone(&storage)));
        let outcome = execute(&request, &config, Arc::clone(&generator), storage, &reporter).await;
        info!(
            hits = generator.hits(),
            misses = generator.misses(),
            "generation cache"
        );
        outcome
    } else {
        execute(&request, &config, Arc::new(client), storage, &reporter).await
    };

    match outcome {
        Ok(result) => {
            print_result(&result);
            Ok(())
        }
        Err(e) => {
            reporter.abandon();
            Err(e)
        }
    }
}

async fn execute<G: rfqscope_llm::TextGenerator + 'static>(
    request: &RunRequest,
    config: &AppConfig,
    generator: Arc<G>,
    storage: Arc<Storage>,
    reporter: &CliProgress,
) -> Result<RunResult> {
    Ok(run_pipeline(request, config, generator, Some(storage), reporter).await?)
}

fn print_result(result: &RunResult) {
    println!();
    println!("  Run complete!");
    println!("  Run:       {}", result.run_id);
    println!("  Output:    {}", result.output_dir.display());
    println!("  Artifacts: {}", result.artifacts.len());
    if result.skipped_files > 0 {
        println!(
            "  Skipped:   {} file(s), see manifest.json",
            result.skipped_files
        );
    }
    println!("  Time:      {:.1}s", result.elapsed.as_secs_f64());
    println!();

    match &result.ranking {
        Some(ranking) => {
            println!("  Ranking (verified):");
            for entry in &ranking.entries {
                println!(
                    "    {}. {:<20} {}",
                    entry.rank, entry.vendor, entry.combined_score
                );
            }
        }
        None => {
            let reason = result
                .verification_error
                .as_deref()
                .unwrap_or("no ratings produced");
            println!("  Ranking could not be verified: {reason}");
            println!(
                "  See {} for the generated tables.",
                result.output_dir.join(FINAL_RESPONSE_FILE).display()
            );
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn abandon(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn role_summarized(&self, role: &Role, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Summarizing [{current}/{total}] {role}"));
    }

    fn comparison_done(&self, vendor: &VendorId, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Comparing [{current}/{total}] {vendor}"));
    }

    fn done(&self, _result: &RunResult) {
        self.spinner.finish_and_clear();
    }
}
