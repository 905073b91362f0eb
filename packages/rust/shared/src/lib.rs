//! Shared types, error model, and configuration for RFQScope.
//!
//! This crate is the foundation depended on by all other RFQScope crates.
//! It provides:
//! - [`RfqScopeError`], the unified error type
//! - Domain types ([`RunId`], [`VendorId`], [`Role`], [`Stage`], [`StageFailure`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CacheConfig, ChunkingConfig, LlmConfig, LoaderConfig, PathsConfig,
    PipelineConfig, config_dir, config_file_path, load_config, load_config_from,
    validate_api_key,
};
pub use error::{Result, RfqScopeError};
pub use types::{Role, RunId, Stage, StageFailure, VendorId};
