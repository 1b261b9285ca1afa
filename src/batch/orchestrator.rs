//! Bounded worker pool over a paper collection.
//!
//! Each paper runs end to end in one slot: its engines are screened
//! concurrently, joined, reconciled and checkpointed. Every engine gets the
//! paper budget on its own, so a hung engine never discards its partner's
//! outcome. A paper with no outcome at all becomes an `ERROR` record and never
//! stops the run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::MAX_ENGINES;
use crate::engine::ScreeningEngine;
use crate::error::{Error, ErrorKind, Result};
use crate::paper::Paper;
use crate::screening::{
    reconcile, reconcile_partial, reconcile_single, EngineFailure, EngineOutcome,
    ReconciledResult,
};

use super::checkpoint::CheckpointStore;
use super::metrics::{BatchMetrics, MetricsSnapshot};
use super::record::{MonotonicClock, PaperRecord};

/// `[batch]` settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Papers screened at once.
    pub concurrency: usize,
    /// Budget for one engine to screen one paper, follow-up included.
    pub paper_timeout_secs: u64,
    /// Write a progress snapshot every this many papers.
    pub checkpoint_interval: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            paper_timeout_secs: 300,
            checkpoint_interval: 5,
        }
    }
}

impl BatchConfig {
    pub fn paper_timeout(&self) -> Duration {
        Duration::from_secs(self.paper_timeout_secs)
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub run_id: Uuid,
    /// One record per input paper: restored ones first, then completion order.
    pub records: Vec<PaperRecord>,
    pub metrics: MetricsSnapshot,
}

pub struct BatchOrchestrator {
    engines: Vec<ScreeningEngine>,
    config: BatchConfig,
    checkpoint: Option<CheckpointStore>,
    clock: Arc<MonotonicClock>,
    metrics: Arc<BatchMetrics>,
    run_id: Uuid,
}

impl BatchOrchestrator {
    pub fn new(engines: Vec<ScreeningEngine>, config: BatchConfig) -> Result<Self> {
        if engines.is_empty() || engines.len() > MAX_ENGINES {
            return Err(Error::Config(format!(
                "expected 1 or {} engines, got {}",
                MAX_ENGINES,
                engines.len()
            )));
        }
        if config.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }
        Ok(Self {
            engines,
            config,
            checkpoint: None,
            clock: Arc::new(MonotonicClock::new()),
            metrics: Arc::new(BatchMetrics::new()),
            run_id: Uuid::new_v4(),
        })
    }

    /// Persist records to `store` and skip papers it already completed.
    pub fn with_checkpoint(mut self, store: CheckpointStore) -> Result<Self> {
        if let Some(stamp) = store.last_stamp()? {
            self.clock = Arc::new(MonotonicClock::resume_after(stamp));
        }
        self.checkpoint = Some(store);
        Ok(self)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Screen `papers`, yielding records in completion order.
    ///
    /// Papers the checkpoint already completed are skipped and not yielded.
    pub fn run(&self, papers: Vec<Paper>) -> Result<BoxStream<'_, PaperRecord>> {
        let done = self.completed_ids()?;
        let total = papers.len();
        let pending: Vec<Paper> = papers
            .into_iter()
            .filter(|p| !done.contains(&p.id))
            .collect();
        let skipped = total - pending.len();

        self.metrics.set_total(total as u64);
        self.metrics.record_skipped(skipped as u64);
        info!(
            run_id = %self.run_id,
            total,
            skipped,
            engines = self.engines.len(),
            concurrency = self.config.concurrency,
            "Starting batch"
        );

        Ok(stream::iter(pending)
            .map(move |paper| self.process(paper))
            .buffer_unordered(self.config.concurrency)
            .boxed())
    }

    /// Drive [`run`](Self::run) to the end and collect every record.
    pub async fn run_to_completion(&self, papers: Vec<Paper>) -> Result<BatchReport> {
        let wanted: HashSet<String> = papers.iter().map(|p| p.id.clone()).collect();
        let mut records: Vec<PaperRecord> = match &self.checkpoint {
            Some(store) => store
                .load_records()?
                .into_iter()
                .filter(|r| r.is_completed() && wanted.contains(&r.paper_id))
                .collect(),
            None => Vec::new(),
        };

        let fresh: Vec<PaperRecord> = self.run(papers)?.collect().await;
        records.extend(fresh);

        let metrics = self.metrics.snapshot();
        if let Some(store) = &self.checkpoint {
            store.save_progress(self.run_id, &metrics)?;
        }
        info!(
            run_id = %self.run_id,
            completed = metrics.completed,
            errors = metrics.errors,
            needs_review = metrics.needs_review,
            elapsed_ms = metrics.elapsed_ms,
            "Batch finished"
        );

        Ok(BatchReport {
            run_id: self.run_id,
            records,
            metrics,
        })
    }

    fn completed_ids(&self) -> Result<HashSet<String>> {
        match &self.checkpoint {
            Some(store) => store.completed_ids(),
            None => Ok(HashSet::new()),
        }
    }

    #[instrument(skip_all, fields(paper_id = %paper.id))]
    async fn process(&self, paper: Paper) -> PaperRecord {
        let record = match self.screen(&paper).await {
            Ok(result) => {
                debug!(
                    decision = %result.consensus_decision,
                    category = %result.agreement_category,
                    review = result.needs_human_review,
                    "Paper reconciled"
                );
                PaperRecord::completed(&paper, result, self.clock.tick())
            }
            Err(e) => {
                if e.kind() == ErrorKind::IncompleteAssessment {
                    error!("Paper failed: {}", e);
                } else {
                    warn!("Paper failed: {}", e);
                }
                PaperRecord::failed(&paper, &e, self.clock.tick())
            }
        };

        self.metrics.record(&record);
        self.persist(&record);
        record
    }

    async fn screen(&self, paper: &Paper) -> Result<ReconciledResult> {
        match self.engines.as_slice() {
            [engine] => {
                let outcome = self.screen_within_budget(engine, paper).await?;
                Ok(reconcile_single(&paper.id, &outcome))
            }
            [a, b] => {
                let (first, second) = futures::join!(
                    self.screen_within_budget(a, paper),
                    self.screen_within_budget(b, paper)
                );
                match (first, second) {
                    (Ok(oa), Ok(ob)) => Ok(reconcile(&paper.id, &oa, &ob)),
                    (Ok(oa), Err(e)) => Ok(reconcile_partial(
                        &paper.id,
                        &oa,
                        EngineFailure::from_error(b.id(), &e),
                    )),
                    (Err(e), Ok(ob)) => Ok(reconcile_partial(
                        &paper.id,
                        &ob,
                        EngineFailure::from_error(a.id(), &e),
                    )),
                    (Err(ea), Err(eb))
                        if ea.kind() == ErrorKind::Timeout && eb.kind() == ErrorKind::Timeout =>
                    {
                        Err(Error::timeout(self.config.paper_timeout().as_millis() as u64))
                    }
                    (Err(ea), Err(eb)) => Err(Error::EnginesFailed {
                        paper_id: paper.id.clone(),
                        reasons: vec![
                            format!("{}: {}", a.id(), ea),
                            format!("{}: {}", b.id(), eb),
                        ],
                    }),
                }
            }
            engines => Err(Error::Internal(format!(
                "orchestrator holds {} engines",
                engines.len()
            ))),
        }
    }

    async fn screen_within_budget(
        &self,
        engine: &ScreeningEngine,
        paper: &Paper,
    ) -> Result<EngineOutcome> {
        let budget = self.config.paper_timeout();
        match tokio::time::timeout(budget, engine.screen(paper)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(engine = engine.id(), "Engine exceeded the paper budget");
                Err(Error::timeout(budget.as_millis() as u64))
            }
        }
    }

    fn persist(&self, record: &PaperRecord) {
        let Some(store) = &self.checkpoint else {
            return;
        };
        if let Err(e) = store.save_record(record) {
            warn!(paper_id = %record.paper_id, "Checkpoint write failed: {}", e);
        }

        let snapshot = self.metrics.snapshot();
        let interval = self.config.checkpoint_interval.max(1) as u64;
        if snapshot.processed % interval == 0 {
            if let Err(e) = store.save_progress(self.run_id, &snapshot) {
                warn!("Progress snapshot failed: {}", e);
            } else {
                info!(
                    processed = snapshot.processed,
                    remaining = snapshot.remaining(),
                    papers_per_minute = snapshot.papers_per_minute,
                    "Checkpoint"
                );
            }
        }
    }
}
