//! Per-paper result records and the monotonic processing clock.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};
use crate::paper::Paper;
use crate::screening::{Decision, ReconciledResult};

/// Final state of one paper in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaperStatus {
    Completed,
    Error,
}

impl PaperStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
        }
    }
}

/// Why a paper has no result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperError {
    pub kind: ErrorKind,
    pub reason: String,
}

/// Processing position of a record: strictly increasing within a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub sequence: u64,
    pub at: DateTime<Utc>,
}

/// One output row. Every input paper gets exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub paper_id: String,
    #[serde(default)]
    pub title: String,
    pub status: PaperStatus,
    pub sequence: u64,
    pub processed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ReconciledResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PaperError>,
}

impl PaperRecord {
    pub fn completed(paper: &Paper, result: ReconciledResult, stamp: Stamp) -> Self {
        Self {
            paper_id: paper.id.clone(),
            title: paper.title.clone(),
            status: PaperStatus::Completed,
            sequence: stamp.sequence,
            processed_at: stamp.at,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(paper: &Paper, error: &Error, stamp: Stamp) -> Self {
        Self {
            paper_id: paper.id.clone(),
            title: paper.title.clone(),
            status: PaperStatus::Error,
            sequence: stamp.sequence,
            processed_at: stamp.at,
            result: None,
            error: Some(PaperError {
                kind: error.kind(),
                reason: error.to_string(),
            }),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == PaperStatus::Completed
    }

    pub fn decision(&self) -> Option<Decision> {
        self.result.as_ref().map(|r| r.consensus_decision)
    }

    pub fn needs_review(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.needs_human_review)
    }
}

/// Hands out strictly increasing `(sequence, timestamp)` pairs.
///
/// Both components advance together under one lock, so a later sequence
/// number never carries an earlier timestamp, even when the wall clock stalls
/// or steps backwards.
#[derive(Debug)]
pub struct MonotonicClock {
    last: Mutex<(u64, i64)>,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            last: Mutex::new((0, i64::MIN)),
        }
    }

    /// Continue after a previously persisted stamp.
    pub fn resume_after(stamp: Stamp) -> Self {
        Self {
            last: Mutex::new((stamp.sequence, stamp.at.timestamp_micros())),
        }
    }

    pub fn tick(&self) -> Stamp {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now().timestamp_micros();
        let micros = now.max(last.1.saturating_add(1));
        *last = (last.0 + 1, micros);

        Stamp {
            sequence: last.0,
            at: DateTime::<Utc>::from_timestamp_micros(micros).unwrap_or_else(Utc::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screening::AgreementCategory;
    use std::sync::Arc;

    #[test]
    fn test_clock_is_strictly_increasing() {
        let clock = MonotonicClock::new();
        let mut previous = clock.tick();
        assert_eq!(previous.sequence, 1);
        for _ in 0..1000 {
            let next = clock.tick();
            assert!(next.sequence > previous.sequence);
            assert!(next.at > previous.at);
            previous = next;
        }
    }

    #[test]
    fn test_clock_resumes_past_future_stamp() {
        let future = Utc::now() + chrono::Duration::hours(1);
        let clock = MonotonicClock::resume_after(Stamp {
            sequence: 41,
            at: future,
        });
        let stamp = clock.tick();
        assert_eq!(stamp.sequence, 42);
        assert!(stamp.at > future);
    }

    #[test]
    fn test_clock_across_threads() {
        let clock = Arc::new(MonotonicClock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = Arc::clone(&clock);
                std::thread::spawn(move || (0..250).map(|_| clock.tick()).collect::<Vec<_>>())
            })
            .collect();
        let mut stamps: Vec<Stamp> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        stamps.sort_by_key(|s| s.sequence);
        assert_eq!(stamps.len(), 1000);
        for pair in stamps.windows(2) {
            assert_eq!(pair[1].sequence, pair[0].sequence + 1);
            assert!(pair[1].at > pair[0].at);
        }
    }

    #[test]
    fn test_error_record_serializes_kind() {
        let clock = MonotonicClock::new();
        let paper = Paper::new("p1", "A title");
        let record = PaperRecord::failed(&paper, &Error::timeout(300_000), clock.tick());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "ERROR");
        assert_eq!(json["error"]["kind"], "timeout");
        assert!(json.get("result").is_none());
        assert!(!record.needs_review());
        assert_eq!(record.decision(), None);
    }

    #[test]
    fn test_completed_record_round_trips() {
        let clock = MonotonicClock::new();
        let paper = Paper::new("p2", "Another title");
        let result = ReconciledResult {
            paper_id: "p2".into(),
            engine_outcomes: Vec::new(),
            engine_failures: Vec::new(),
            agreement_category: AgreementCategory::AgreeMaybe,
            consensus_decision: Decision::Maybe,
            needs_human_review: false,
            single_engine_reported: false,
        };
        let record = PaperRecord::completed(&paper, result, clock.tick());
        let json = serde_json::to_string(&record).unwrap();
        let back: PaperRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.decision(), Some(Decision::Maybe));
    }
}
