//! Recording test doubles for every stage contract.
//!
//! All stubs share a [`CallRecorder`] so tests can assert which stages ran
//! and in what order relative to each other.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use compliance::{build_blocked_output, gate_files, GateOutput};

use super::*;

/// Ordered log of stage start/end markers.
#[derive(Debug, Default)]
pub struct CallRecorder {
    events: Mutex<Vec<String>>,
}

impl CallRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, event: impl Into<String>) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.into());
    }

    /// All markers in order, e.g. `["intake:start", "intake:end", ...]`.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// How many times `stage` was entered.
    pub fn count(&self, stage: &str) -> usize {
        let marker = format!("{}:start", stage);
        self.events().iter().filter(|e| **e == marker).count()
    }

    /// Position of a marker, if recorded.
    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

/// Stub returning a fixed value after an optional delay.
pub struct StubStage<T> {
    name: &'static str,
    value: T,
    degraded: Option<String>,
    delay: Duration,
    recorder: Arc<CallRecorder>,
}

impl<T: Clone + Send + Sync> StubStage<T> {
    pub fn new(name: &'static str, value: T, recorder: Arc<CallRecorder>) -> Self {
        Self {
            name,
            value,
            degraded: None,
            delay: Duration::ZERO,
            recorder,
        }
    }

    /// Builder: report the value as a degraded fallback.
    pub fn degraded(mut self, reason: impl Into<String>) -> Self {
        self.degraded = Some(reason.into());
        self
    }

    /// Builder: sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn respond(&self) -> StageOutcome<T> {
        self.recorder.record(format!("{}:start", self.name));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.recorder.record(format!("{}:end", self.name));
        StageOutcome {
            value: self.value.clone(),
            attempts: 1,
            degraded: self.degraded.clone(),
        }
    }
}

#[async_trait]
impl IntakeStage for StubStage<Tip> {
    async fn intake(&self, raw: &RawTip) -> StageOutcome<Tip> {
        let mut outcome = self.respond().await;
        outcome.value.raw_body = raw.content.clone();
        outcome
    }
}

#[async_trait]
impl ExtractionStage for StubStage<ExtractedEntities> {
    async fn extract(&self, _tip: &Tip) -> StageOutcome<ExtractedEntities> {
        self.respond().await
    }
}

#[async_trait]
impl HashOsintStage for StubStage<HashMatchResults> {
    async fn lookup(&self, _tip: &Tip) -> StageOutcome<HashMatchResults> {
        self.respond().await
    }
}

#[async_trait]
impl ClassificationStage for StubStage<Classification> {
    async fn classify(&self, _tip: &Tip) -> StageOutcome<Classification> {
        self.respond().await
    }
}

#[async_trait]
impl LinkingStage for StubStage<TipLinks> {
    async fn link(&self, _tip: &Tip) -> StageOutcome<TipLinks> {
        self.respond().await
    }
}

#[async_trait]
impl ScoringStage for StubStage<PriorityScore> {
    async fn score(&self, _tip: &Tip) -> StageOutcome<PriorityScore> {
        self.respond().await
    }
}

/// How a [`StubGate`] behaves.
#[derive(Debug, Clone)]
pub enum GateBehavior {
    /// Gate the draft's files normally
    Pass,
    /// Return this output verbatim, however wrong it is
    Propose(GateOutput),
    /// Return the stage's own blocked output
    SelfBlock(String),
    /// Fail with an error
    Fail(String),
    /// Panic inside the stage
    Panic(String),
}

/// Compliance-gate stub.
pub struct StubGate {
    behavior: GateBehavior,
    recorder: Arc<CallRecorder>,
}

impl StubGate {
    pub fn new(behavior: GateBehavior, recorder: Arc<CallRecorder>) -> Self {
        Self { behavior, recorder }
    }
}

#[async_trait]
impl ComplianceStage for StubGate {
    async fn review(&self, draft: &Tip) -> Result<StageOutcome<GateOutput>, StageError> {
        self.recorder.record("legal_gate:start");
        let result = match &self.behavior {
            GateBehavior::Pass => Ok(StageOutcome::ok(
                gate_files(draft.files.iter().cloned(), draft.state_code()),
                1,
            )),
            GateBehavior::Propose(output) => Ok(StageOutcome::ok(output.clone(), 1)),
            GateBehavior::SelfBlock(reason) => Ok(StageOutcome::degraded(
                build_blocked_output(&draft.files, reason, draft.state_code()),
                3,
                reason.clone(),
            )),
            GateBehavior::Fail(message) => Err(StageError::ComplianceFailed(message.clone())),
            GateBehavior::Panic(message) => panic!("{}", message),
        };
        self.recorder.record("legal_gate:end");
        result
    }
}
