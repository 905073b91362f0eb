//! Run output layout and artifact persistence.
//!
//! Every run writes into its own directory:
//!
//! ```text
//! {output_root}/{run_id}/
//! ├── RFQ_customerSummary.md
//! ├── <vendor>_summary.md
//! ├── <vendor>_comparison.md
//! ├── finalAnalysis.md
//! ├── finalResponse.md
//! ├── ranking.json
//! ├── manifest.json
//! └── diagnostics/
//!     └── <role>_partial.md
//! ```
//!
//! Files are written atomically (temp file, then rename) so a reader never
//! sees a half-written artifact.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use rfqscope_shared::{Result, RfqScopeError, Role, RunId, StageFailure, VendorId};

pub const CUSTOMER_SUMMARY_FILE: &str = "RFQ_customerSummary.md";
pub const FINAL_ANALYSIS_FILE: &str = "finalAnalysis.md";
pub const FINAL_RESPONSE_FILE: &str = "finalResponse.md";
pub const RANKING_FILE: &str = "ranking.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const DIAGNOSTICS_DIR: &str = "diagnostics";

/// Current manifest schema version.
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// File names
// ---------------------------------------------------------------------------

/// Summary artifact of a role.
pub fn summary_filename(role: &Role) -> String {
    match role {
        Role::Customer => CUSTOMER_SUMMARY_FILE.to_string(),
        Role::Vendor(vendor) => format!("{vendor}_summary.md"),
    }
}

/// Comparison artifact of a vendor.
pub fn comparison_filename(vendor: &VendorId) -> String {
    format!("{vendor}_comparison.md")
}

/// Diagnostic file holding the partial fold of a failed summary.
pub fn partial_filename(role: &Role) -> String {
    format!("{DIAGNOSTICS_DIR}/{}_partial.md", role.slug())
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Output directory of one run.
#[derive(Debug, Clone)]
pub struct RunLayout {
    dir: PathBuf,
}

impl RunLayout {
    pub fn new(output_root: &Path, run_id: &RunId) -> Self {
        Self {
            dir: output_root.join(run_id.as_str()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Absolute path of an artifact in this run.
    pub fn path(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Create the run directory.
    pub fn create(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| RfqScopeError::io(&self.dir, e))?;
        debug!(path = %self.dir.display(), "run directory ready");
        Ok(())
    }

    /// Atomically write a text artifact and return its metadata.
    #[instrument(skip_all, fields(file = %filename, size = content.len()))]
    pub fn write(&self, filename: &str, content: &str) -> Result<ArtifactMeta> {
        let target = self.path(filename);
        let parent = target.parent().unwrap_or(&self.dir);
        std::fs::create_dir_all(parent).map_err(|e| RfqScopeError::io(parent, e))?;

        let name = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RfqScopeError::validation(format!("invalid artifact name: {filename}")))?;
        let temp = parent.join(format!(".{name}.tmp"));

        std::fs::write(&temp, content).map_err(|e| RfqScopeError::io(&temp, e))?;
        std::fs::rename(&temp, &target).map_err(|e| RfqScopeError::io(&target, e))?;

        debug!("wrote artifact");

        Ok(ArtifactMeta {
            filename: filename.to_string(),
            sha256: sha256_hex(content.as_bytes()),
            size_bytes: content.len(),
        })
    }

    /// Atomically write a pretty-printed JSON artifact.
    pub fn write_json<T: Serialize>(&self, filename: &str, data: &T) -> Result<ArtifactMeta> {
        let json = serde_json::to_string_pretty(data).map_err(|e| {
            RfqScopeError::validation(format!("JSON serialization failed: {e}"))
        })?;
        self.write(filename, &json)
    }

    /// Remove an artifact left over from an earlier attempt. Missing is fine.
    pub fn discard(&self, filename: &str) -> Result<()> {
        let target = self.path(filename);
        match std::fs::remove_file(&target) {
            Ok(()) => {
                debug!(file = %filename, "discarded stale artifact");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RfqScopeError::io(&target, e)),
        }
    }

    /// Write `manifest.json`.
    pub fn write_manifest(&self, manifest: &RunManifest) -> Result<()> {
        self.write_json(MANIFEST_FILE, manifest).map(|_| ())
    }

    /// Read back `manifest.json`.
    pub fn read_manifest(&self) -> Result<RunManifest> {
        let path = self.path(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| RfqScopeError::io(&path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| RfqScopeError::validation(format!("invalid manifest.json: {e}")))
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// Metadata for a single artifact file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub filename: String,
    pub sha256: String,
    pub size_bytes: usize,
}

/// Overall run status recorded in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestStatus {
    Complete,
    Partial,
}

/// Contents of `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub run_id: RunId,
    pub tool_version: String,
    pub model: String,
    pub vendors: Vec<VendorId>,
    pub status: ManifestStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub artifacts: Vec<ArtifactMeta>,
    #[serde(default)]
    pub skipped_files: Vec<String>,
    #[serde(default)]
    pub failures: Vec<StageFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_layout() -> RunLayout {
        let root = std::env::temp_dir().join(format!("rfqscope-artifacts-{}", uuid::Uuid::now_v7()));
        let run_id: RunId = "run-1".parse().unwrap();
        let layout = RunLayout::new(&root, &run_id);
        layout.create().unwrap();
        layout
    }

    #[test]
    fn file_names_follow_run_layout() {
        let vendor: VendorId = "provider2".parse().unwrap();
        assert_eq!(summary_filename(&Role::Customer), "RFQ_customerSummary.md");
        assert_eq!(
            summary_filename(&Role::Vendor(vendor.clone())),
            "provider2_summary.md"
        );
        assert_eq!(comparison_filename(&vendor), "provider2_comparison.md");
        assert_eq!(
            partial_filename(&Role::Customer),
            "diagnostics/customer_partial.md"
        );
    }

    #[test]
    fn write_is_atomic_and_hashed() {
        let layout = temp_layout();
        let meta = layout.write(FINAL_ANALYSIS_FILE, "hello").expect("write");

        assert_eq!(
            std::fs::read_to_string(layout.path(FINAL_ANALYSIS_FILE)).unwrap(),
            "hello"
        );
        assert!(!layout.path(".finalAnalysis.md.tmp").exists());
        assert_eq!(meta.size_bytes, 5);
        assert_eq!(
            meta.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn write_creates_diagnostics_dir() {
        let layout = temp_layout();
        let name = partial_filename(&Role::Customer);
        layout.write(&name, "partial fold").expect("write diagnostics");
        assert!(layout.path(&name).exists());
        assert!(!layout.path("diagnostics/.customer_partial.md.tmp").exists());
    }

    #[test]
    fn discard_missing_is_ok() {
        let layout = temp_layout();
        layout.discard(CUSTOMER_SUMMARY_FILE).expect("discard missing");
        layout.write(CUSTOMER_SUMMARY_FILE, "old").unwrap();
        layout.discard(CUSTOMER_SUMMARY_FILE).expect("discard existing");
        assert!(!layout.path(CUSTOMER_SUMMARY_FILE).exists());
    }

    #[test]
    fn manifest_roundtrip() {
        let layout = temp_layout();
        let meta = layout.write(FINAL_RESPONSE_FILE, "# Ranking").unwrap();
        let now = Utc::now();
        let manifest = RunManifest {
            schema_version: MANIFEST_SCHEMA_VERSION,
            run_id: "run-1".parse().unwrap(),
            tool_version: "0.1.0-test".into(),
            model: "gpt-4o".into(),
            vendors: vec!["provider1".parse().unwrap()],
            status: ManifestStatus::Complete,
            started_at: now,
            completed_at: now,
            artifacts: vec![meta.clone()],
            skipped_files: vec![],
            failures: vec![],
        };
        layout.write_manifest(&manifest).expect("write manifest");

        let read = layout.read_manifest().expect("read manifest");
        assert_eq!(read.artifacts, vec![meta]);
        assert_eq!(read.status, ManifestStatus::Complete);
        assert_eq!(read.run_id.as_str(), "run-1");
    }
}
