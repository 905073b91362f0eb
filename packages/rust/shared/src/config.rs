//! Application configuration for RFQScope.
//!
//! User config lives at `~/.rfqscope/rfqscope.toml`.
//! A missing file means defaults; the run id is the only per-run input.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RfqScopeError};
use crate::types::{Role, VendorId};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "rfqscope.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".rfqscope";

// ---------------------------------------------------------------------------
// Config structs (matching rfqscope.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Input and output roots.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Text-generation service settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Chunk sizing.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Vendor list and scheduling.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Document loading limits.
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Generation cache.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root holding one input directory per run id.
    #[serde(default = "default_docs_root")]
    pub docs_root: String,

    /// Root holding one output directory per run id.
    #[serde(default = "default_output_root")]
    pub output_root: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            docs_root: default_docs_root(),
            output_root: default_output_root(),
        }
    }
}

fn default_docs_root() -> String {
    "./docs".into()
}
fn default_output_root() -> String {
    "./markdown".into()
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible chat completions API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model id sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries on 429, 5xx and timeouts.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Temperature for factual summarization.
    #[serde(default = "default_summary_temperature")]
    pub summary_temperature: f32,

    /// Temperature for comparison and ranking judgment.
    #[serde(default = "default_judgment_temperature")]
    pub judgment_temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            summary_temperature: default_summary_temperature(),
            judgment_temperature: default_judgment_temperature(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_api_key_env() -> String {
    "OPENAI_KEY".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    3
}
fn default_summary_temperature() -> f32 {
    0.0
}
fn default_judgment_temperature() -> f32 {
    0.3
}

/// `[chunking]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Estimated tokens per character of a word.
    #[serde(default = "default_token_estimate_per_char")]
    pub token_estimate_per_char: f64,

    /// Token ceiling of a single chunk.
    #[serde(default = "default_max_tokens_per_chunk")]
    pub max_tokens_per_chunk: usize,

    /// Characters of the previous chunk repeated as read-only context.
    #[serde(default = "default_chunk_overlap_chars")]
    pub chunk_overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            token_estimate_per_char: default_token_estimate_per_char(),
            max_tokens_per_chunk: default_max_tokens_per_chunk(),
            chunk_overlap_chars: default_chunk_overlap_chars(),
        }
    }
}

fn default_token_estimate_per_char() -> f64 {
    0.8
}
fn default_max_tokens_per_chunk() -> usize {
    8000
}
fn default_chunk_overlap_chars() -> usize {
    100
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Ordered vendor ids; each is also the vendor's input subdirectory.
    #[serde(default = "default_vendors")]
    pub vendors: Vec<VendorId>,

    /// Maximum concurrent generation tasks.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vendors: default_vendors(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_vendors() -> Vec<VendorId> {
    ["provider1", "provider2", "provider3"]
        .iter()
        .filter_map(|v| v.parse().ok())
        .collect()
}
fn default_concurrency() -> usize {
    3
}

/// `[loader]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Files larger than this are skipped.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Replay identical generation requests from the local database.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_tokens_per_chunk == 0 {
            return Err(RfqScopeError::config(
                "chunking.max_tokens_per_chunk must be greater than 0",
            ));
        }
        if !(self.chunking.token_estimate_per_char > 0.0) {
            return Err(RfqScopeError::config(
                "chunking.token_estimate_per_char must be greater than 0",
            ));
        }
        if self.pipeline.concurrency == 0 {
            return Err(RfqScopeError::config("pipeline.concurrency must be at least 1"));
        }
        if self.pipeline.vendors.is_empty() {
            return Err(RfqScopeError::config("pipeline.vendors must list at least one vendor"));
        }
        let mut seen = HashSet::new();
        for vendor in &self.pipeline.vendors {
            // Vendor artifacts are named by id, so a vendor cannot take the customer's name.
            if vendor.as_str().eq_ignore_ascii_case(Role::Customer.slug()) {
                return Err(RfqScopeError::config(format!(
                    "pipeline.vendors cannot contain '{vendor}': the name is reserved for the customer"
                )));
            }
            if !seen.insert(vendor.as_str()) {
                return Err(RfqScopeError::config(format!(
                    "pipeline.vendors lists '{vendor}' more than once"
                )));
            }
        }
        for (name, t) in [
            ("llm.summary_temperature", self.llm.summary_temperature),
            ("llm.judgment_temperature", self.llm.judgment_temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                return Err(RfqScopeError::config(format!("{name} must be within 0.0..=2.0")));
            }
        }
        url::Url::parse(&self.llm.base_url).map_err(|e| {
            RfqScopeError::config(format!("llm.base_url '{}' is invalid: {e}", self.llm.base_url))
        })?;
        Ok(())
    }

    /// Input directory of a run, resolved against `base`.
    pub fn run_input_dir(&self, base: &Path, run_id: &crate::RunId) -> PathBuf {
        base.join(&self.paths.docs_root).join(run_id.as_str())
    }

    /// Output root, resolved against `base`.
    pub fn output_root(&self, base: &Path) -> PathBuf {
        base.join(&self.paths.output_root)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.rfqscope/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RfqScopeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.rfqscope/rfqscope.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RfqScopeError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        RfqScopeError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Read the API key from the env var named by `llm.api_key_env`.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.llm.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(RfqScopeError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}
