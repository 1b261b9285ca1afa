//! # litscreen
//!
//! LLM-assisted title/abstract and full-text screening for systematic reviews.
//!
//! Engines assess each paper against a rubric of YES/NO/UNCLEAR criteria. The
//! assessments are fused by fixed rules, never by a model:
//!
//! - **Decision**: any NO excludes, all YES includes, anything else is MAYBE
//! - **Follow-up**: a second pass over UNCLEAR criteria only
//! - **Reconciliation**: two engines must agree, otherwise the paper is MAYBE
//!   and goes to a human reviewer
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use litscreen::{BatchOrchestrator, Rubric, ScreeningEngine, ScreeningMode};
//!
//! let rubric = Arc::new(Rubric::cash_plus_assets(ScreeningMode::TitleAbstract));
//! let engines = vec![
//!     ScreeningEngine::new("claude", claude_assessor, Arc::clone(&rubric)),
//!     ScreeningEngine::new("gpt", gpt_assessor, Arc::clone(&rubric)),
//! ];
//! let orchestrator = BatchOrchestrator::new(engines, Default::default())?;
//! let report = orchestrator.run_to_completion(papers).await?;
//! ```

pub mod assess;
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod paper;
pub mod report;
pub mod screening;
pub mod sources;

// Re-exports for convenience
pub use assess::{AssessmentRequest, Assessor, LlmAssessor, PromptConfig, RawModelOutput};
pub use batch::{
    BatchConfig, BatchOrchestrator, BatchReport, CheckpointStore, PaperRecord, RunAnalysis,
};
pub use config::{EngineConfig, ScreeningConfig};
pub use engine::ScreeningEngine;
pub use error::{Error, ErrorKind, Result};
pub use paper::Paper;
pub use screening::{
    decide, reconcile, AgreementCategory, Assessment, AssessmentSet, Criterion, CriterionDef,
    CriterionRecord, Decision, DecisionResult, EngineOutcome, FollowUpOutcome, ReconciledResult,
    Rubric, ScreeningMode,
};
