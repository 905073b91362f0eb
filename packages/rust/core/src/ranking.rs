//! Ranking synthesis and in-process score verification.
//!
//! The synthesis call returns prose tables plus a fenced JSON block of
//! per-criterion ratings. The JSON is parsed into a [`RatingSheet`], checked
//! against the rating scale and vendor list, and the combined scores and
//! ranking are computed here rather than trusted from the generated text.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use rfqscope_llm::TextGenerator;
use rfqscope_shared::{Result, RfqScopeError, VendorId};

use crate::comparator::ComparisonResult;
use crate::prompts;

pub const RATING_MIN: u8 = 1;
pub const RATING_MAX: u8 = 5;

/// Rated criteria, in table order.
pub const CRITERIA: [&str; 14] = [
    "Overall quote clarity and completeness",
    "Solution approach correctness and alignment with scope",
    "Services and deliverables",
    "Relevant experience",
    "Previous work and references",
    "Value and fee structure",
    "Capabilities",
    "Response completeness and alignment with the ask",
    "Innovation and value additions",
    "Risk management",
    "Support and maintenance",
    "Timeline and delivery schedule",
    "Compliance and certifications",
    "Evaluation criteria alignment",
];

static JSON_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").expect("valid regex"));

// ---------------------------------------------------------------------------
// Ratings
// ---------------------------------------------------------------------------

/// Per-criterion ratings of one vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorRatings {
    pub vendor: String,
    pub scores: BTreeMap<String, u8>,
}

/// Typed ratings extracted from the synthesis output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingSheet {
    pub ratings: Vec<VendorRatings>,
}

impl RatingSheet {
    /// Extract and deserialize the last fenced ```json block in `text`.
    pub fn extract(text: &str) -> Result<Self> {
        let block = JSON_BLOCK
            .captures_iter(text)
            .last()
            .and_then(|c| c.get(1))
            .ok_or_else(|| RfqScopeError::parse("no ```json ratings block in synthesis output"))?;
        serde_json::from_str(block.as_str())
            .map_err(|e| RfqScopeError::parse(format!("ratings block is not valid: {e}")))
    }

    /// Force the minimum rating on every criterion for `vendor`.
    pub fn pin_minimum(&mut self, vendor: &VendorId) {
        let scores: BTreeMap<String, u8> = CRITERIA
            .iter()
            .map(|c| ((*c).to_string(), RATING_MIN))
            .collect();
        match self.ratings.iter_mut().find(|r| r.vendor == vendor.as_str()) {
            Some(entry) => entry.scores = scores,
            None => self.ratings.push(VendorRatings {
                vendor: vendor.to_string(),
                scores,
            }),
        }
    }

    /// Check the sheet covers exactly `vendors` and every criterion, within scale.
    pub fn validate(&self, vendors: &[VendorId]) -> Result<()> {
        for vendor in vendors {
            let count = self
                .ratings
                .iter()
                .filter(|r| r.vendor == vendor.as_str())
                .count();
            if count != 1 {
                return Err(RfqScopeError::validation(format!(
                    "expected one ratings entry for {vendor}, found {count}"
                )));
            }
        }

        for entry in &self.ratings {
            if !vendors.iter().any(|v| v.as_str() == entry.vendor) {
                return Err(RfqScopeError::validation(format!(
                    "ratings for unknown vendor {:?}",
                    entry.vendor
                )));
            }
            for criterion in CRITERIA {
                let score = entry.scores.get(criterion).ok_or_else(|| {
                    RfqScopeError::validation(format!(
                        "{} has no rating for {criterion:?}",
                        entry.vendor
                    ))
                })?;
                if !(RATING_MIN..=RATING_MAX).contains(score) {
                    return Err(RfqScopeError::validation(format!(
                        "{} rated {score} for {criterion:?}, outside {RATING_MIN}-{RATING_MAX}",
                        entry.vendor
                    )));
                }
            }
            if let Some(extra) = entry
                .scores
                .keys()
                .find(|k| !CRITERIA.contains(&k.as_str()))
            {
                return Err(RfqScopeError::validation(format!(
                    "{} rated unknown criterion {extra:?}",
                    entry.vendor
                )));
            }
        }
        Ok(())
    }

    fn scores_for(&self, vendor: &VendorId) -> Option<&BTreeMap<String, u8>> {
        self.ratings
            .iter()
            .find(|r| r.vendor == vendor.as_str())
            .map(|r| &r.scores)
    }
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// One vendor's place in the computed ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedVendor {
    pub rank: usize,
    pub vendor: VendorId,
    pub combined_score: u32,
}

/// Vendors ordered by combined score, best first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ranking {
    pub entries: Vec<RankedVendor>,
}

impl Ranking {
    /// Sum each vendor's ratings and order by combined score.
    ///
    /// Ties keep the configured vendor order. The sheet must already be
    /// validated against `vendors`.
    pub fn from_sheet(sheet: &RatingSheet, vendors: &[VendorId]) -> Result<Self> {
        let mut totals = Vec::with_capacity(vendors.len());
        for vendor in vendors {
            let scores = sheet.scores_for(vendor).ok_or_else(|| {
                RfqScopeError::validation(format!("no ratings for {vendor}"))
            })?;
            let combined: u32 = scores.values().map(|&s| u32::from(s)).sum();
            totals.push((vendor.clone(), combined));
        }

        // Stable sort keeps vendor order among equal scores.
        totals.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(Self {
            entries: totals
                .into_iter()
                .enumerate()
                .map(|(i, (vendor, combined_score))| RankedVendor {
                    rank: i + 1,
                    vendor,
                    combined_score,
                })
                .collect(),
        })
    }

    pub fn first(&self) -> Option<&VendorId> {
        self.entries.first().map(|e| &e.vendor)
    }

    /// Markdown section appended to the final artifact.
    pub fn to_markdown(&self, sheet: &RatingSheet) -> String {
        let mut out = String::from("## Verified ranking\n\n");
        out.push_str(
            "Combined scores below were recomputed from the per-criterion ratings.\n\n",
        );
        out.push_str("| Rank | Vendor | Combined score |\n|---|---|---|\n");
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "| {} | {} | {} |",
                entry.rank, entry.vendor, entry.combined_score
            );
        }

        out.push_str("\n| Criterion |");
        for entry in &self.entries {
            let _ = write!(out, " {} |", entry.vendor);
        }
        out.push_str("\n|---|");
        for _ in &self.entries {
            out.push_str("---|");
        }
        out.push('\n');
        for criterion in CRITERIA {
            let _ = write!(out, "| {criterion} |");
            for entry in &self.entries {
                let score = sheet
                    .scores_for(&entry.vendor)
                    .and_then(|s| s.get(criterion))
                    .copied()
                    .unwrap_or(RATING_MIN);
                let _ = write!(out, " {score} |");
            }
            out.push('\n');
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Synthesizer
// ---------------------------------------------------------------------------

/// Output of the synthesis stage.
#[derive(Debug, Clone)]
pub struct FinalRecommendation {
    /// Generated comparison and ratings tables.
    pub text: String,
    pub ratings: Option<RatingSheet>,
    pub ranking: Option<Ranking>,
    /// Why the generated scores could not be verified, if they could not.
    pub verification_error: Option<String>,
}

impl FinalRecommendation {
    /// Content of `finalResponse.md`.
    pub fn to_markdown(&self) -> String {
        let mut out = self.text.trim_end().to_string();
        out.push_str("\n\n");
        match (&self.ranking, &self.ratings) {
            (Some(ranking), Some(sheet)) => out.push_str(&ranking.to_markdown(sheet)),
            _ => {
                let reason = self
                    .verification_error
                    .as_deref()
                    .unwrap_or("no ratings were produced");
                let _ = writeln!(
                    out,
                    "> **Unverified scores:** the ratings and combined scores above were \
produced by the model and could not be checked ({reason})."
                );
            }
        }
        out
    }
}

/// Typed ratings plus computed ranking, persisted as `ranking.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingReport {
    pub criteria: Vec<String>,
    pub ratings: RatingSheet,
    pub ranking: Ranking,
}

/// Runs the single synthesis call and verifies its ratings.
pub struct RankingSynthesizer<G> {
    generator: Arc<G>,
    temperature: f32,
}

impl<G: TextGenerator> RankingSynthesizer<G> {
    pub fn new(generator: Arc<G>, temperature: f32) -> Self {
        Self {
            generator,
            temperature,
        }
    }

    /// Synthesize the final recommendation from per-vendor comparisons.
    ///
    /// `comparisons` must be in configured vendor order. Vendors listed in
    /// `empty_vendors` are pinned to the minimum rating on every criterion.
    #[instrument(skip_all, fields(stage = "synthesis", vendors = vendors.len()))]
    pub async fn synthesize(
        &self,
        comparisons: &[ComparisonResult],
        vendors: &[VendorId],
        empty_vendors: &[VendorId],
    ) -> Result<FinalRecommendation> {
        let prompt = prompts::synthesis_prompt(comparisons, vendors);
        let text = self.generator.generate(&prompt, self.temperature).await?;

        let verified = RatingSheet::extract(&text).and_then(|mut sheet| {
            for vendor in empty_vendors {
                sheet.pin_minimum(vendor);
            }
            sheet.validate(vendors)?;
            let ranking = Ranking::from_sheet(&sheet, vendors)?;
            Ok((sheet, ranking))
        });

        match verified {
            Ok((sheet, ranking)) => {
                info!(
                    first = ranking.first().map(VendorId::as_str),
                    "ranking verified"
                );
                Ok(FinalRecommendation {
                    text,
                    ratings: Some(sheet),
                    ranking: Some(ranking),
                    verification_error: None,
                })
            }
            Err(e) => {
                warn!(error = %e, "synthesis ratings could not be verified");
                Ok(FinalRecommendation {
                    text,
                    ratings: None,
                    ranking: None,
                    verification_error: Some(e.to_string()),
                })
            }
        }
    }
}
