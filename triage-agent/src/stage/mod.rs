//! Analysis-stage collaborator contracts.
//!
//! Every stage except the compliance gate returns a [`StageOutcome`], which
//! has no error variant: a stage that cannot finish reports a degraded safe
//! default. The compliance gate alone may fail, and the controller turns
//! that failure into a blocked tip.
//!
//! Stages receive a shared `&Tip` snapshot and return owned data; only the
//! controller writes to the tip.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use compliance::GateOutput;

use crate::analysis::{Classification, ExtractedEntities, HashMatchResults, PriorityScore, TipLinks};
use crate::tip::{RawTip, Tip};

pub mod gate;
pub mod hash;
pub mod intake;
pub mod link;
pub mod mock;
pub mod model;

pub use gate::DeterministicGate;
pub use hash::KnownHashLookup;
pub use intake::BasicIntake;
pub use link::{CaseIndexLinker, OpenCase};
pub use model::{ModelClassifier, ModelExtraction, ModelScorer, ModelStage};

/// Result of one stage call. Always a value; failure is encoded as
/// `degraded`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome<T> {
    /// The stage's result, or its safe default
    pub value: T,
    /// Attempts used
    pub attempts: u32,
    /// Last error when the safe default was returned
    pub degraded: Option<String>,
}

impl<T> StageOutcome<T> {
    /// Successful outcome.
    pub fn ok(value: T, attempts: u32) -> Self {
        Self {
            value,
            attempts,
            degraded: None,
        }
    }

    /// Safe default after failure.
    pub fn degraded(value: T, attempts: u32, reason: impl Into<String>) -> Self {
        Self {
            value,
            attempts,
            degraded: Some(reason.into()),
        }
    }

    /// Whether the value is a fallback.
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

impl<T> From<T> for StageOutcome<T> {
    fn from(value: T) -> Self {
        Self::ok(value, 1)
    }
}

/// Error from the compliance-gate stage.
///
/// Only raised when the stage's own fail-safe could not run.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Stage failed and could not build its own blocked output
    #[error("Compliance review failed: {0}")]
    ComplianceFailed(String),

    /// Stage panicked or was aborted
    #[error("Stage aborted: {0}")]
    Aborted(String),
}

/// Turns a raw report into a draft tip. Never fails; malformed input
/// yields a low-confidence draft.
#[async_trait]
pub trait IntakeStage: Send + Sync {
    async fn intake(&self, raw: &RawTip) -> StageOutcome<Tip>;
}

/// Decides file access for a draft tip.
#[async_trait]
pub trait ComplianceStage: Send + Sync {
    async fn review(&self, draft: &Tip) -> Result<StageOutcome<GateOutput>, StageError>;
}

/// Extracts subjects, victims and locations. Must only read metadata of
/// accessible files.
#[async_trait]
pub trait ExtractionStage: Send + Sync {
    async fn extract(&self, tip: &Tip) -> StageOutcome<ExtractedEntities>;
}

/// Looks up file hashes and open-source indicators.
#[async_trait]
pub trait HashOsintStage: Send + Sync {
    async fn lookup(&self, tip: &Tip) -> StageOutcome<HashMatchResults>;
}

/// Classifies the offense.
#[async_trait]
pub trait ClassificationStage: Send + Sync {
    async fn classify(&self, tip: &Tip) -> StageOutcome<Classification>;
}

/// Links the tip to related tips and runs deconfliction.
#[async_trait]
pub trait LinkingStage: Send + Sync {
    async fn link(&self, tip: &Tip) -> StageOutcome<TipLinks>;
}

/// Proposes a priority. Falls back to [`PriorityScore::fallback`].
#[async_trait]
pub trait ScoringStage: Send + Sync {
    async fn score(&self, tip: &Tip) -> StageOutcome<PriorityScore>;
}
