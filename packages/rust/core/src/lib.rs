//! Core pipeline orchestration and domain logic for RFQScope.
//!
//! This crate ties together chunking, rolling summarization, pairwise
//! comparison and ranking synthesis into one end-to-end run
//! ([`pipeline::run_pipeline`]).

pub mod cache;
pub mod chunker;
pub mod comparator;
pub mod pipeline;
pub mod prompts;
pub mod ranking;
pub mod summarizer;
