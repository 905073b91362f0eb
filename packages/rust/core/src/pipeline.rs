//! End-to-end run: load → summarize → compare → synthesize → persist.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use rfqscope_artifacts::{
    ArtifactMeta, FINAL_ANALYSIS_FILE, FINAL_RESPONSE_FILE, MANIFEST_SCHEMA_VERSION,
    ManifestStatus, RANKING_FILE, RunLayout, RunManifest, comparison_filename, partial_filename,
    summary_filename,
};
use rfqscope_llm::TextGenerator;
use rfqscope_loader::{LoadOptions, LoadedRun, RoleGroup, load_run};
use rfqscope_shared::{AppConfig, Result, RfqScopeError, Role, RunId, Stage, StageFailure, VendorId};
use rfqscope_storage::{RunStatus, StageStatus, Storage};

use crate::chunker::Chunker;
use crate::comparator::{ComparisonResult, PairwiseComparator};
use crate::prompts;
use crate::ranking::{CRITERIA, FinalRecommendation, Ranking, RankingReport, RankingSynthesizer};
use crate::summarizer::{RollingSummarizer, SummarizeError, Summary};

/// Role label for run-wide stages.
const ALL_ROLES: &str = "all";

/// Inputs of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: RunId,
    /// Directory holding the customer RFQ and one subdirectory per vendor.
    pub input_dir: PathBuf,
    /// Root under which `{run_id}/` is created.
    pub output_root: PathBuf,
    /// Tool version string recorded in the manifest.
    pub tool_version: String,
}

/// Result of a successful run.
#[derive(Debug)]
pub struct RunResult {
    pub run_id: RunId,
    /// Output directory of the run.
    pub output_dir: PathBuf,
    pub artifacts: Vec<ArtifactMeta>,
    /// Computed ranking, if the generated ratings could be verified.
    pub ranking: Option<Ranking>,
    pub verification_error: Option<String>,
    /// Number of input files excluded during loading.
    pub skipped_files: usize,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a role's summary finishes, successfully or not.
    fn role_summarized(&self, role: &Role, current: usize, total: usize);
    /// Called when a vendor comparison finishes, successfully or not.
    fn comparison_done(&self, vendor: &VendorId, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &RunResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn role_summarized(&self, _role: &Role, _current: usize, _total: usize) {}
    fn comparison_done(&self, _vendor: &VendorId, _current: usize, _total: usize) {}
    fn done(&self, _result: &RunResult) {}
}

/// Run the full pipeline for one run id.
///
/// 1. Load and partition documents by role
/// 2. Summarize every non-empty role concurrently
/// 3. Compare each vendor against the customer
/// 4. Synthesize and verify the ranking
///
/// Every artifact that completes is written even when a later stage fails.
/// Stage failures are collected and returned together as
/// [`RfqScopeError::Pipeline`]; a persistence failure stops the run at once.
#[instrument(skip_all, fields(run_id = %request.run_id))]
pub async fn run_pipeline<G: TextGenerator + 'static>(
    request: &RunRequest,
    config: &AppConfig,
    generator: Arc<G>,
    ledger: Option<Arc<Storage>>,
    progress: &dyn ProgressReporter,
) -> Result<RunResult> {
    let start = Instant::now();
    info!(input = %request.input_dir.display(), model = generator.model(), "starting run");

    let mut ctx = RunContext {
        run_id: request.run_id.clone(),
        layout: RunLayout::new(&request.output_root, &request.run_id),
        ledger,
        model: generator.model().to_string(),
        tool_version: request.tool_version.clone(),
        vendors: config.pipeline.vendors.clone(),
        started_at: Utc::now(),
        artifacts: Vec::new(),
        skipped: Vec::new(),
        failures: Vec::new(),
    };
    ctx.begin().await;

    let recommendation = match execute(&mut ctx, request, config, generator, progress).await {
        Ok(recommendation) => recommendation,
        Err(e) => {
            error!(error = %e, "persistence failed, stopping run");
            None
        }
    };

    if !ctx.failures.is_empty() {
        return Err(ctx.abort().await);
    }

    let (ranking, verification_error) = match recommendation {
        Some(rec) => (rec.ranking, rec.verification_error),
        None => (None, Some("synthesis produced no result".to_string())),
    };

    if let Err(e) = ctx.write_manifest(ManifestStatus::Complete) {
        ctx.failures.push(StageFailure::new(Stage::Persist, ALL_ROLES, e.to_string()));
        return Err(ctx.abort().await);
    }
    ctx.finish(RunStatus::Succeeded).await;

    let result = RunResult {
        run_id: ctx.run_id.clone(),
        output_dir: ctx.layout.dir().to_path_buf(),
        skipped_files: ctx.skipped.len(),
        artifacts: ctx.artifacts,
        ranking,
        verification_error,
        elapsed: start.elapsed(),
    };

    info!(
        artifacts = result.artifacts.len(),
        first = result.ranking.as_ref().and_then(Ranking::first).map(VendorId::as_str),
        elapsed_ms = result.elapsed.as_millis() as u64,
        "run complete"
    );

    progress.done(&result);
    Ok(result)
}

/// Stage sequence. `Err` means persistence failed; every other failure is
/// recorded on `ctx` and ends the sequence with `Ok(None)`.
async fn execute<G: TextGenerator + 'static>(
    ctx: &mut RunContext,
    request: &RunRequest,
    config: &AppConfig,
    generator: Arc<G>,
    progress: &dyn ProgressReporter,
) -> Result<Option<FinalRecommendation>> {
    ctx.layout.create().inspect_err(|e| {
        ctx.failures
            .push(StageFailure::new(Stage::Persist, ALL_ROLES, e.to_string()));
    })?;
    // Run-level conclusions from an earlier attempt must not survive a rerun.
    for stale in [FINAL_ANALYSIS_FILE, FINAL_RESPONSE_FILE, RANKING_FILE] {
        ctx.discard(stale, ALL_ROLES)?;
    }
    for vendor in &config.pipeline.vendors {
        ctx.discard(&comparison_filename(vendor), Role::Vendor(vendor.clone()))?;
    }

    // --- Phase 1: Load ---
    progress.phase("Loading documents");
    let loaded = match load(request, config).await {
        Ok(loaded) => {
            ctx.record(Stage::Load, ALL_ROLES, None).await;
            loaded
        }
        Err(e) => {
            ctx.fail(Stage::Load, ALL_ROLES, e.to_string()).await;
            return Ok(None);
        }
    };
    ctx.skipped = loaded
        .skipped
        .iter()
        .map(|s| format!("{}: {}", s.path.display(), s.reason))
        .collect();

    // --- Phase 2: Rolling summaries ---
    progress.phase("Summarizing documents");
    let summarizer = RollingSummarizer::new(
        Arc::clone(&generator),
        Chunker::from_config(&config.chunking),
        config.llm.summary_temperature,
    );
    let groups: Vec<RoleGroup> = std::iter::once(loaded.customer)
        .chain(loaded.vendors)
        .collect();
    let total = groups.len();
    let pending = spawn_summaries(&summarizer, groups, config.pipeline.concurrency);

    let mut summaries: Vec<Option<Summary>> = Vec::with_capacity(total);
    for (i, (role, handle)) in pending.into_iter().enumerate() {
        let outcome = match handle {
            None => {
                info!(%role, "no documents, writing placeholder summary");
                ctx.persist(&summary_filename(&role), &placeholder_summary(&role), &role)?;
                Some(Summary::empty(role.clone()))
            }
            Some(mut task) => match (&mut task.0).await {
                Ok(Ok(summary)) => {
                    ctx.persist(&summary_filename(&role), &summary.text, &role)?;
                    Some(summary)
                }
                Ok(Err(e)) => {
                    ctx.summary_failed(&e).await?;
                    None
                }
                Err(e) => {
                    ctx.discard(&summary_filename(&role), &role)?;
                    ctx.fail(Stage::Summary, role.to_string(), format!("summary task aborted: {e}"))
                        .await;
                    None
                }
            },
        };
        if outcome.is_some() {
            ctx.record(Stage::Summary, &role.to_string(), None).await;
        }
        progress.role_summarized(&role, i + 1, total);
        summaries.push(outcome);
    }

    let mut summaries = summaries.into_iter();
    let Some(Some(customer)) = summaries.next() else {
        warn!("customer summary unavailable, skipping comparisons");
        return Ok(None);
    };
    let vendor_summaries: Vec<Summary> = summaries.flatten().collect();

    // --- Phase 3: Comparisons ---
    progress.phase("Comparing vendor responses");
    let comparator = PairwiseComparator::new(
        Arc::clone(&generator),
        config.llm.judgment_temperature,
        config.pipeline.concurrency,
    );
    let results = comparator.compare_all(&vendor_summaries, &customer).await;
    let total = results.len();
    let mut comparisons = Vec::with_capacity(total);
    for (i, (vendor, result)) in results.into_iter().enumerate() {
        let role = Role::Vendor(vendor.clone());
        match result {
            Ok(comparison) => {
                ctx.persist(&comparison_filename(&vendor), &comparison.text, &role)?;
                ctx.record(Stage::Comparison, &role.to_string(), None).await;
                comparisons.push(comparison);
            }
            Err(e) => {
                ctx.discard(&comparison_filename(&vendor), &role)?;
                ctx.fail(Stage::Comparison, role.to_string(), e.to_string())
                    .await;
            }
        }
        progress.comparison_done(&vendor, i + 1, total);
    }

    // Synthesis needs every vendor.
    if !ctx.failures.is_empty() {
        warn!(failures = ctx.failures.len(), "skipping synthesis after earlier failures");
        return Ok(None);
    }
    ctx.persist(FINAL_ANALYSIS_FILE, &final_analysis(&comparisons), ALL_ROLES)?;

    // --- Phase 4: Synthesis ---
    progress.phase("Ranking vendors");
    let empty_vendors: Vec<VendorId> = vendor_summaries
        .iter()
        .filter(|s| s.is_empty())
        .filter_map(|s| s.role.vendor().cloned())
        .collect();
    let synthesizer = RankingSynthesizer::new(generator, config.llm.judgment_temperature);
    let recommendation = match synthesizer
        .synthesize(&comparisons, &config.pipeline.vendors, &empty_vendors)
        .await
    {
        Ok(rec) => rec,
        Err(e) => {
            ctx.fail(Stage::Synthesis, ALL_ROLES, e.to_string()).await;
            return Ok(None);
        }
    };

    ctx.persist(FINAL_RESPONSE_FILE, &recommendation.to_markdown(), ALL_ROLES)?;
    if let (Some(ratings), Some(ranking)) = (&recommendation.ratings, &recommendation.ranking) {
        let report = RankingReport {
            criteria: CRITERIA.iter().map(|c| (*c).to_string()).collect(),
            ratings: ratings.clone(),
            ranking: ranking.clone(),
        };
        let meta = ctx
            .layout
            .write_json(RANKING_FILE, &report)
            .inspect_err(|e| ctx.persist_failed(ALL_ROLES, e))?;
        ctx.artifacts.push(meta);
    }
    ctx.record(Stage::Synthesis, ALL_ROLES, None).await;

    Ok(Some(recommendation))
}

async fn load(request: &RunRequest, config: &AppConfig) -> Result<LoadedRun> {
    let input_dir = request.input_dir.clone();
    let vendors = config.pipeline.vendors.clone();
    let opts = LoadOptions::from(config);

    tokio::task::spawn_blocking(move || load_run(&input_dir, &vendors, &opts))
        .await
        .map_err(|e| RfqScopeError::load(&request.input_dir, format!("loader task failed: {e}")))?
}

/// Aborts the task when dropped, so returning early never leaves it detached.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

type SummaryTask = AbortOnDrop<std::result::Result<Summary, SummarizeError>>;

/// One task per non-empty group, bounded by `concurrency`. Empty groups get no task.
fn spawn_summaries<G: TextGenerator + 'static>(
    summarizer: &RollingSummarizer<G>,
    groups: Vec<RoleGroup>,
    concurrency: usize,
) -> Vec<(Role, Option<SummaryTask>)> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    groups
        .into_iter()
        .map(|group| {
            let role = group.role.clone();
            if group.is_empty() {
                return (role, None);
            }
            let summarizer = summarizer.clone();
            let semaphore = Arc::clone(&semaphore);
            let handle = tokio::spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                summarizer.summarize_group(&group).await
            });
            (role, Some(AbortOnDrop(handle)))
        })
        .collect()
}

fn placeholder_summary(role: &Role) -> String {
    match role {
        Role::Customer => format!("{}\n", prompts::NO_RFQ_STATEMENT),
        Role::Vendor(_) => format!("{}\n", prompts::NO_RESPONSE_STATEMENT),
    }
}

fn final_analysis(comparisons: &[ComparisonResult]) -> String {
    comparisons
        .iter()
        .map(|c| format!("## {}\n\n{}\n", c.vendor, c.text.trim_end()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn partial_report(e: &SummarizeError) -> String {
    format!(
        "# Partial summary: {role}\n\n\
         Generation failed at chunk {k} of {n}: {source}\n\n\
         The text below is the summary as of the last successful chunk. \
         It is diagnostic output and not the role's summary.\n\n---\n\n{partial}\n",
        role = e.role,
        k = e.failed_chunk,
        n = e.total_chunks,
        source = e.source,
        partial = e.partial,
    )
}

// ---------------------------------------------------------------------------
// Run bookkeeping
// ---------------------------------------------------------------------------

/// Mutable state of one run: written artifacts, failures, ledger handle.
struct RunContext {
    run_id: RunId,
    layout: RunLayout,
    ledger: Option<Arc<Storage>>,
    model: String,
    tool_version: String,
    vendors: Vec<VendorId>,
    started_at: DateTime<Utc>,
    artifacts: Vec<ArtifactMeta>,
    skipped: Vec<String>,
    failures: Vec<StageFailure>,
}

impl RunContext {
    /// Write an artifact, recording a persist failure for `role` on error.
    fn persist(&mut self, filename: &str, content: &str, role: impl ToString) -> Result<()> {
        let meta = self
            .layout
            .write(filename, content)
            .inspect_err(|e| self.persist_failed(role, e))?;
        self.artifacts.push(meta);
        Ok(())
    }

    fn discard(&mut self, filename: &str, role: impl ToString) -> Result<()> {
        self.layout
            .discard(filename)
            .inspect_err(|e| self.persist_failed(role, e))
    }

    fn persist_failed(&mut self, role: impl ToString, e: &RfqScopeError) {
        self.failures
            .push(StageFailure::new(Stage::Persist, role.to_string(), e.to_string()));
    }

    /// A failed rolling summary: drop any stale summary, keep the partial fold
    /// for diagnostics only.
    async fn summary_failed(&mut self, e: &SummarizeError) -> Result<()> {
        warn!(role = %e.role, chunk = e.failed_chunk, error = %e.source, "rolling summary failed");
        self.discard(&summary_filename(&e.role), &e.role)?;
        self.persist(&partial_filename(&e.role), &partial_report(e), &e.role)?;
        self.fail(Stage::Summary, e.role.to_string(), e.to_string())
            .await;
        Ok(())
    }

    async fn fail(&mut self, stage: Stage, role: impl Into<String>, message: String) {
        let failure = StageFailure::new(stage, role, message);
        warn!(%failure, "stage failed");
        self.record(stage, &failure.role, Some(&failure.message))
            .await;
        self.failures.push(failure);
    }

    /// Ledger writes never fail the run.
    async fn record(&self, stage: Stage, role: &str, failure: Option<&str>) {
        let Some(ledger) = &self.ledger else {
            return;
        };
        let status = if failure.is_some() {
            StageStatus::Failed
        } else {
            StageStatus::Succeeded
        };
        if let Err(e) = ledger
            .record_stage(&self.run_id, stage, role, status, failure)
            .await
        {
            warn!(error = %e, "failed to record stage event");
        }
    }

    async fn begin(&self) {
        if let Some(ledger) = &self.ledger
            && let Err(e) = ledger.begin_run(&self.run_id, &self.model).await
        {
            warn!(error = %e, "failed to record run start");
        }
    }

    async fn finish(&self, status: RunStatus) {
        let Some(ledger) = &self.ledger else {
            return;
        };
        let failures = (!self.failures.is_empty())
            .then(|| serde_json::to_string(&self.failures).ok())
            .flatten();
        if let Err(e) = ledger
            .finish_run(&self.run_id, status, failures.as_deref())
            .await
        {
            warn!(error = %e, "failed to record run completion");
        }
    }

    fn write_manifest(&self, status: ManifestStatus) -> Result<()> {
        let manifest = RunManifest {
            schema_version: MANIFEST_SCHEMA_VERSION,
            run_id: self.run_id.clone(),
            tool_version: self.tool_version.clone(),
            model: self.model.clone(),
            vendors: self.vendors.clone(),
            status,
            started_at: self.started_at,
            completed_at: Utc::now(),
            artifacts: self.artifacts.clone(),
            skipped_files: self.skipped.clone(),
            failures: self.failures.clone(),
        };
        self.layout.write_manifest(&manifest)
    }

    /// Close out a failed run and build the error returned to the caller.
    async fn abort(self) -> RfqScopeError {
        if let Err(e) = self.write_manifest(ManifestStatus::Partial) {
            warn!(error = %e, "failed to write partial manifest");
        }
        self.finish(RunStatus::Failed).await;
        RfqScopeError::Pipeline {
            run_id: self.run_id,
            failures: self.failures,
        }
    }
}
