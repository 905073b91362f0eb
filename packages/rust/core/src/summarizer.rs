//! Rolling (incremental) summarization of one role's documents.
//!
//! The summary is seeded, then folded once per chunk:
//! `summary_i = generate(prompt(role, summary_{i-1}, chunk_i))`. The fold is
//! strictly serial within a role; different roles run in parallel tasks,
//! each owning its own running summary.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use rfqscope_llm::TextGenerator;
use rfqscope_loader::RoleGroup;
use rfqscope_shared::{RfqScopeError, Role};

use crate::chunker::Chunker;
use crate::prompts;

/// Finished summary of one role.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub role: Role,
    pub text: String,
}

impl Summary {
    pub fn empty(role: Role) -> Self {
        Self {
            role,
            text: String::new(),
        }
    }

    /// True for the placeholder produced by a group with no documents.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A rolling summary that failed part-way through.
///
/// `partial` is the fold as of the last successful chunk. It is kept for
/// diagnostics only and must never be persisted as the role's summary.
#[derive(Debug, thiserror::Error)]
#[error("summary for {role} failed at chunk {failed_chunk} of {total_chunks}: {source}")]
pub struct SummarizeError {
    pub role: Role,
    /// 1-based index of the chunk whose call failed.
    pub failed_chunk: usize,
    pub total_chunks: usize,
    pub partial: String,
    #[source]
    pub source: RfqScopeError,
}

/// Folds chunks into a structured summary via the text-generation service.
pub struct RollingSummarizer<G> {
    generator: Arc<G>,
    chunker: Chunker,
    temperature: f32,
}

impl<G> Clone for RollingSummarizer<G> {
    fn clone(&self) -> Self {
        Self {
            generator: Arc::clone(&self.generator),
            chunker: self.chunker.clone(),
            temperature: self.temperature,
        }
    }
}

impl<G: TextGenerator> RollingSummarizer<G> {
    pub fn new(generator: Arc<G>, chunker: Chunker, temperature: f32) -> Self {
        Self {
            generator,
            chunker,
            temperature,
        }
    }

    /// Fold `chunks` into `previous_summary`, one service call per chunk.
    ///
    /// Zero chunks returns the seed unchanged without calling the service.
    #[instrument(skip_all, fields(stage = "summary", role = %role, chunks = chunks.len()))]
    pub async fn summarize_role(
        &self,
        role: &Role,
        chunks: &[&str],
        previous_summary: &str,
    ) -> Result<Summary, SummarizeError> {
        let mut running = previous_summary.to_string();

        for (i, chunk) in chunks.iter().enumerate() {
            let context = self.chunker.preceding_context(chunks, i);
            let prompt = match role {
                Role::Customer => prompts::customer_summary_prompt(&running, chunk, context),
                Role::Vendor(vendor) => {
                    prompts::vendor_summary_prompt(vendor, &running, chunk, context)
                }
            };

            match self.generator.generate(&prompt, self.temperature).await {
                Ok(next) => {
                    debug!(chunk = i + 1, chars = next.len(), "summary updated");
                    running = next;
                }
                Err(source) => {
                    return Err(SummarizeError {
                        role: role.clone(),
                        failed_chunk: i + 1,
                        total_chunks: chunks.len(),
                        partial: running,
                        source,
                    });
                }
            }
        }

        Ok(Summary {
            role: role.clone(),
            text: running,
        })
    }

    /// Chunk a role group's concatenated text and fold it from an empty seed.
    pub async fn summarize_group(&self, group: &RoleGroup) -> Result<Summary, SummarizeError> {
        let text = group.text();
        let chunks = self.chunker.chunk(&text);
        info!(role = %group.role, documents = group.documents.len(), chunks = chunks.len(), "summarizing role");
        self.summarize_role(&group.role, &chunks, "").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfqscope_llm::mock::MockGenerator;
    use rfqscope_loader::Document;

    fn summarizer(mock: &Arc<MockGenerator>, ceiling: usize) -> RollingSummarizer<MockGenerator> {
        RollingSummarizer::new(Arc::clone(mock), Chunker::new(0.8, ceiling, 100), 0.0)
    }

    /// Responds with a summary that names the excerpt it last saw.
    fn echoing_mock() -> Arc<MockGenerator> {
        Arc::new(MockGenerator::new(|prompt, _| {
            let excerpt = prompt
                .split("<document_excerpt>\n")
                .nth(1)
                .and_then(|rest| rest.split('\n').next())
                .unwrap_or_default()
                .trim();
            Ok(format!("summary-through-{excerpt}"))
        }))
    }

    #[tokio::test]
    async fn zero_chunks_makes_no_calls() {
        let mock = echoing_mock();
        let summary = summarizer(&mock, 8000)
            .summarize_role(&Role::Customer, &[], "")
            .await
            .expect("summarize");
        assert!(summary.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn each_call_sees_previous_summary() {
        let mock = echoing_mock();
        let summary = summarizer(&mock, 8000)
            .summarize_role(&Role::Customer, &["c1", "c2", "c3"], "")
            .await
            .expect("summarize");

        assert_eq!(summary.text, "summary-through-c3");
        let calls = mock.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[1].prompt.contains("<existing_summary>\nsummary-through-c1\n"));
        assert!(calls[2].prompt.contains("<existing_summary>\nsummary-through-c2\n"));
        assert!(calls.iter().all(|c| c.temperature == 0.0));
    }

    #[tokio::test]
    async fn vendor_role_uses_vendor_prompt() {
        let mock = echoing_mock();
        let role = Role::Vendor("provider1".parse().unwrap());
        summarizer(&mock, 8000)
            .summarize_role(&role, &["pricing"], "")
            .await
            .unwrap();
        let prompt = &mock.calls()[0].prompt;
        assert!(prompt.contains(prompts::VENDOR_SECTIONS[6]));
        assert!(prompt.contains("provider1"));
    }

    #[tokio::test]
    async fn failure_reports_chunk_and_keeps_partial() {
        let mock = Arc::new(echoing_mock().as_ref().clone().failing_on("c2"));
        let err = summarizer(&mock, 8000)
            .summarize_role(&Role::Customer, &["c1", "c2", "c3"], "")
            .await
            .unwrap_err();

        assert_eq!(err.failed_chunk, 2);
        assert_eq!(err.total_chunks, 3);
        assert_eq!(err.partial, "summary-through-c1");
        assert_eq!(err.role, Role::Customer);
        // No call after the failure.
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn group_text_is_chunked_with_overlap_context() {
        let mock = echoing_mock();
        let mut group = RoleGroup::new(Role::Customer);
        group.documents.push(Document {
            text: "alpha beta gamma".into(),
            source: "rfq_customer.txt".into(),
            role: Role::Customer,
        });

        // Ceiling 8 splits into "alpha beta " and "gamma".
        summarizer(&mock, 8).summarize_group(&group).await.unwrap();
        let calls = mock.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].prompt.contains("<previous_excerpt_tail>\nalpha beta\n"));
    }
}
