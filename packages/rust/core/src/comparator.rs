//! Pairwise comparison of each vendor summary against the customer summary.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use rfqscope_llm::TextGenerator;
use rfqscope_shared::{Result, RfqScopeError, VendorId};

use crate::prompts;
use crate::summarizer::Summary;

/// Evaluation of one vendor's response against the RFQ.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    pub vendor: VendorId,
    pub text: String,
}

/// Compares vendors independently; one call per vendor.
pub struct PairwiseComparator<G> {
    generator: Arc<G>,
    temperature: f32,
    concurrency: usize,
}

impl<G: TextGenerator + 'static> PairwiseComparator<G> {
    pub fn new(generator: Arc<G>, temperature: f32, concurrency: usize) -> Self {
        Self {
            generator,
            temperature,
            concurrency: concurrency.max(1),
        }
    }

    /// Compare one vendor summary with the customer summary.
    ///
    /// An empty vendor summary is replaced by an explicit statement that no
    /// response documents were provided; the comparison still runs.
    pub async fn compare(
        &self,
        vendor_summary: &Summary,
        customer_summary: &Summary,
    ) -> Result<ComparisonResult> {
        compare_one(
            self.generator.as_ref(),
            self.temperature,
            vendor_summary,
            customer_summary,
        )
        .await
    }

    /// Compare every vendor concurrently, bounded by the configured concurrency.
    ///
    /// Results come back in input order. A failure for one vendor never
    /// affects the others.
    pub async fn compare_all(
        &self,
        vendor_summaries: &[Summary],
        customer_summary: &Summary,
    ) -> Vec<(VendorId, Result<ComparisonResult>)> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let customer = Arc::new(customer_summary.clone());
        let mut handles = Vec::with_capacity(vendor_summaries.len());

        for summary in vendor_summaries {
            let Some(vendor) = summary.role.vendor().cloned() else {
                warn!(role = %summary.role, "skipping non-vendor summary in comparison");
                continue;
            };
            let generator = Arc::clone(&self.generator);
            let semaphore = Arc::clone(&semaphore);
            let customer = Arc::clone(&customer);
            let summary = summary.clone();
            let temperature = self.temperature;

            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| RfqScopeError::generation(format!("scheduler closed: {e}")))?;
                compare_one(generator.as_ref(), temperature, &summary, &customer).await
            });
            handles.push((vendor, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (vendor, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(RfqScopeError::generation(format!(
                    "comparison task for {vendor} aborted: {e}"
                ))),
            };
            results.push((vendor, result));
        }
        results
    }
}

#[instrument(skip_all, fields(stage = "comparison", role = %vendor_summary.role))]
async fn compare_one<G: TextGenerator>(
    generator: &G,
    temperature: f32,
    vendor_summary: &Summary,
    customer_summary: &Summary,
) -> Result<ComparisonResult> {
    let vendor = vendor_summary.role.vendor().cloned().ok_or_else(|| {
        RfqScopeError::validation(format!(
            "cannot compare non-vendor role {}",
            vendor_summary.role
        ))
    })?;

    let response = (!vendor_summary.is_empty()).then_some(vendor_summary.text.as_str());
    if response.is_none() {
        info!(%vendor, "no response documents, comparing against an empty response");
    }
    let customer = (!customer_summary.is_empty()).then_some(customer_summary.text.as_str());
    if customer.is_none() {
        info!(%vendor, "no customer RFQ documents, comparing against an empty RFQ");
    }
    let prompt = prompts::comparison_prompt(&vendor, response, customer);
    let text = generator.generate(&prompt, temperature).await?;

    Ok(ComparisonResult { vendor, text })
}
