//! Document loading and role partitioning.
//!
//! An input directory holds one customer RFQ (`rfq_customer.<ext>`) and one
//! subdirectory per vendor. Every supported file is reduced to plain text and
//! assigned to a [`RoleGroup`]. Files within a group are ordered by file name
//! (see [`walkdir::WalkDir::sort_by_file_name`]); this order is the contract
//! for how a group's text is concatenated.

mod formats;

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use rfqscope_shared::{Result, RfqScopeError, Role, VendorId};

pub use formats::{DocumentFormat, extract_text};

/// File stem identifying the customer RFQ.
pub const CUSTOMER_FILE_STEM: &str = "rfq_customer";

/// Separator placed between documents when a group is concatenated.
pub const DOCUMENT_SEPARATOR: &str = "\n\n";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Text of one input file.
#[derive(Debug, Clone)]
pub struct Document {
    /// Extracted plain text.
    pub text: String,
    /// Path relative to the run's input directory.
    pub source: String,
    pub role: Role,
}

/// All documents of one participant, in load order.
#[derive(Debug, Clone)]
pub struct RoleGroup {
    pub role: Role,
    pub documents: Vec<Document>,
}

impl RoleGroup {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            documents: Vec::new(),
        }
    }

    /// True when the group has no document with any non-whitespace text.
    pub fn is_empty(&self) -> bool {
        self.documents.iter().all(|d| d.text.trim().is_empty())
    }

    /// Concatenated text of every document, in load order.
    pub fn text(&self) -> String {
        self.documents
            .iter()
            .map(|d| d.text.as_str())
            .collect::<Vec<_>>()
            .join(DOCUMENT_SEPARATOR)
    }
}

/// A file excluded from loading, with the reason.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of loading a run's input directory.
#[derive(Debug, Clone)]
pub struct LoadedRun {
    pub customer: RoleGroup,
    /// One group per configured vendor, in configured order.
    pub vendors: Vec<RoleGroup>,
    pub skipped: Vec<SkippedFile>,
}

/// Loader limits.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Files larger than this are skipped.
    pub max_file_bytes: u64,
}

impl From<&rfqscope_shared::AppConfig> for LoadOptions {
    fn from(config: &rfqscope_shared::AppConfig) -> Self {
        Self {
            max_file_bytes: config.loader.max_file_bytes,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load every document of a run and partition them by role.
///
/// Unsupported or unreadable files are skipped with a warning. A missing or
/// empty vendor directory yields an empty group. Only a missing input
/// directory is an error.
#[instrument(skip_all, fields(input_dir = %input_dir.display(), vendors = vendors.len()))]
pub fn load_run(input_dir: &Path, vendors: &[VendorId], opts: &LoadOptions) -> Result<LoadedRun> {
    if !input_dir.is_dir() {
        return Err(RfqScopeError::load(
            input_dir,
            "input directory does not exist",
        ));
    }

    let mut skipped = Vec::new();

    let customer_files: Vec<PathBuf> = WalkDir::new(input_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "unreadable directory entry, skipping");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_customer_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    if customer_files.is_empty() {
        warn!("no {CUSTOMER_FILE_STEM} file found");
    }

    let customer = load_group(Role::Customer, input_dir, customer_files, opts, &mut skipped);

    let mut vendor_groups = Vec::with_capacity(vendors.len());
    for vendor in vendors {
        let dir = input_dir.join(vendor.as_str());
        let files = if dir.is_dir() {
            vendor_files(&dir)
        } else {
            info!(vendor = %vendor, "vendor directory missing, treating as empty");
            Vec::new()
        };
        vendor_groups.push(load_group(
            Role::Vendor(vendor.clone()),
            input_dir,
            files,
            opts,
            &mut skipped,
        ));
    }

    info!(
        customer_docs = customer.documents.len(),
        vendor_docs = vendor_groups.iter().map(|g| g.documents.len()).sum::<usize>(),
        skipped = skipped.len(),
        "documents loaded"
    );

    Ok(LoadedRun {
        customer,
        vendors: vendor_groups,
        skipped,
    })
}

fn is_customer_file(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.eq_ignore_ascii_case(CUSTOMER_FILE_STEM))
}

fn vendor_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "unreadable directory entry, skipping");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

fn load_group(
    role: Role,
    input_dir: &Path,
    files: Vec<PathBuf>,
    opts: &LoadOptions,
    skipped: &mut Vec<SkippedFile>,
) -> RoleGroup {
    let mut group = RoleGroup::new(role);

    for path in files {
        match load_file(&path, opts) {
            Ok(text) => {
                let source = path
                    .strip_prefix(input_dir)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                debug!(role = %group.role, %source, chars = text.len(), "loaded document");
                group.documents.push(Document {
                    text,
                    source,
                    role: group.role.clone(),
                });
            }
            Err(e) => {
                warn!(role = %group.role, path = %path.display(), error = %e, "skipping file");
                skipped.push(SkippedFile {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }

    group
}

fn load_file(path: &Path, opts: &LoadOptions) -> Result<String> {
    let format = DocumentFormat::from_path(path)
        .ok_or_else(|| RfqScopeError::load(path, "unsupported file format"))?;

    let meta = std::fs::metadata(path).map_err(|e| RfqScopeError::io(path, e))?;
    if meta.len() > opts.max_file_bytes {
        return Err(RfqScopeError::load(
            path,
            format!(
                "file is {} bytes, limit is {}",
                meta.len(),
                opts.max_file_bytes
            ),
        ));
    }

    extract_text(path, format)
}
