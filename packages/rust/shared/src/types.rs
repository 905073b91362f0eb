//! Core domain types shared across RFQScope crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RfqScopeError;

/// Maximum length of a run or vendor identifier.
const MAX_ID_LEN: usize = 128;

/// Check that an identifier is safe to use as a single path component.
fn validate_path_component(kind: &str, value: &str) -> Result<(), RfqScopeError> {
    if value.is_empty() {
        return Err(RfqScopeError::validation(format!("{kind} must not be empty")));
    }
    if value.len() > MAX_ID_LEN {
        return Err(RfqScopeError::validation(format!(
            "{kind} longer than {MAX_ID_LEN} characters"
        )));
    }
    if value.starts_with('.') {
        return Err(RfqScopeError::validation(format!(
            "{kind} '{value}' must not start with '.'"
        )));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(RfqScopeError::validation(format!(
            "{kind} '{value}' contains invalid character {bad:?}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// Identifier of one pipeline run.
///
/// Locates the input directory (`{docs_root}/{run_id}`) and namespaces the
/// output directory (`{output_root}/{run_id}`). Always passed explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(String);

impl RunId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RunId {
    type Err = RfqScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_path_component("run id", s)?;
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for RunId {
    type Error = RfqScopeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RunId> for String {
    fn from(id: RunId) -> Self {
        id.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// VendorId
// ---------------------------------------------------------------------------

/// Identifier of a vendor group (e.g. `provider1`). Also its input subdirectory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VendorId(String);

impl VendorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for VendorId {
    type Err = RfqScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_path_component("vendor id", s)?;
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for VendorId {
    type Error = RfqScopeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VendorId> for String {
    fn from(id: VendorId) -> Self {
        id.0
    }
}

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Which participant a document or summary belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Vendor(VendorId),
}

impl Role {
    /// The vendor id, if this is a vendor role.
    pub fn vendor(&self) -> Option<&VendorId> {
        match self {
            Self::Customer => None,
            Self::Vendor(id) => Some(id),
        }
    }

    /// Short name usable in file names (`customer`, `provider1`).
    pub fn slug(&self) -> &str {
        match self {
            Self::Customer => "customer",
            Self::Vendor(id) => id.as_str(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Customer => f.write_str("customer"),
            Self::Vendor(id) => write!(f, "vendor:{id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage / StageFailure
// ---------------------------------------------------------------------------

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Summary,
    Comparison,
    Synthesis,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Summary => "summary",
            Self::Comparison => "comparison",
            Self::Synthesis => "synthesis",
            Self::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed stage with enough context to re-run just that portion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    /// `customer`, `vendor:<id>`, or `all` for run-wide stages.
    pub role: String,
    pub message: String,
}

impl StageFailure {
    pub fn new(stage: Stage, role: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage,
            role: role.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stage failed for {}: {}",
            self.stage, self.role, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id: RunId = "0193-abc_def".parse().expect("parse run id");
        assert_eq!(id.to_string(), "0193-abc_def");
        let json = serde_json::to_string(&id).expect("serialize");
        let parsed: RunId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, id);
    }

    #[test]
    fn run_id_rejects_path_tricks() {
        assert!("".parse::<RunId>().is_err());
        assert!("..".parse::<RunId>().is_err());
        assert!("a/b".parse::<RunId>().is_err());
        assert!(".hidden".parse::<RunId>().is_err());
        assert!("x".repeat(200).parse::<RunId>().is_err());
    }

    #[test]
    fn vendor_id_rejected_in_serde() {
        let result: Result<VendorId, _> = serde_json::from_str(r#""../etc""#);
        assert!(result.is_err());
    }

    #[test]
    fn role_display_and_slug() {
        let vendor = Role::Vendor("provider2".parse().expect("vendor id"));
        assert_eq!(Role::Customer.to_string(), "customer");
        assert_eq!(vendor.to_string(), "vendor:provider2");
        assert_eq!(vendor.slug(), "provider2");
        assert_eq!(Role::Customer.slug(), "customer");
        assert!(Role::Customer.vendor().is_none());
    }

    #[test]
    fn stage_failure_display() {
        let f = StageFailure::new(Stage::Persist, "vendor:provider1", "disk full");
        assert_eq!(
            f.to_string(),
            "persist stage failed for vendor:provider1: disk full"
        );
    }
}
