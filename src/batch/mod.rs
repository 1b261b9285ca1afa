//! Batch screening: worker pool, checkpoint ledger, counters and run analysis.

pub mod analysis;
pub mod checkpoint;
pub mod metrics;
pub mod orchestrator;
pub mod record;

pub use analysis::{AgreementSummary, EngineSummary, RunAnalysis};
pub use checkpoint::CheckpointStore;
pub use metrics::{BatchMetrics, MetricsSnapshot};
pub use orchestrator::{BatchConfig, BatchOrchestrator, BatchReport};
pub use record::{MonotonicClock, PaperError, PaperRecord, PaperStatus, Stamp};
