//! Pipeline controller.
//!
//! Owns the stage graph:
//!
//! ```text
//! intake → legal_gate → {extraction ∥ hash_osint} → {classifier ∥ linker}
//!        → priority → critical_override → complete
//! ```
//!
//! Stages read `&Tip` snapshots; only the controller writes the tip. The
//! compliance gate is the one stage allowed to fail, and its failure ends
//! the run with the tip `BLOCKED` and every file blocked.

use chrono::Utc;
use futures::FutureExt;
use serde_json::json;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use compliance::{build_blocked_output, build_legal_status, enforce_files, GateOutput, ReportedFile};
use triage_agent::{
    AuditSink, AuditStatus, ClassificationStage, ComplianceStage, EventBus, EventSink,
    ExtractionStage, HashOsintStage, InMemoryAuditLog, IntakeStage, LinkingStage, NewAuditEntry,
    PipelineEvent, RawTip, ScoringStage, StageError, StageOutcome, Tip, TipStatus,
};

use crate::error::TriageError;
use crate::override_engine::apply_critical_overrides;

/// Stage names used in audit entries and events.
pub mod steps {
    pub const INTAKE: &str = "intake";
    pub const LEGAL_GATE: &str = "legal_gate";
    pub const EXTRACTION: &str = "extraction";
    pub const HASH_OSINT: &str = "hash_osint";
    pub const CLASSIFIER: &str = "classifier";
    pub const LINKER: &str = "linker";
    pub const PRIORITY: &str = "priority";
    pub const CRITICAL_OVERRIDE: &str = "critical_override";
    pub const COMPLETE: &str = "complete";
}

/// Drives one tip at a time through the stage graph.
///
/// Holds only shared handles, so one pipeline can serve many concurrent
/// `process_tip` calls.
pub struct TriagePipeline {
    pipeline_id: String,
    intake: Arc<dyn IntakeStage>,
    gate: Arc<dyn ComplianceStage>,
    extraction: Arc<dyn ExtractionStage>,
    hash_osint: Arc<dyn HashOsintStage>,
    classifier: Arc<dyn ClassificationStage>,
    linker: Arc<dyn LinkingStage>,
    scorer: Arc<dyn ScoringStage>,
    audit: Arc<dyn AuditSink>,
    events: Arc<dyn EventSink>,
}

/// Bookkeeping for one stage call.
struct StageRecord {
    stage: &'static str,
    attempts: u32,
    degraded: Option<String>,
    duration_ms: u64,
    summary: String,
    payload: serde_json::Value,
}

impl StageRecord {
    fn new<T>(stage: &'static str, outcome: &StageOutcome<T>, duration_ms: u64) -> Self {
        Self {
            stage,
            attempts: outcome.attempts,
            degraded: outcome.degraded.clone(),
            duration_ms,
            summary: String::new(),
            payload: serde_json::Value::Null,
        }
    }

    fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

async fn timed<F: Future>(future: F) -> (F::Output, u64) {
    let started = Instant::now();
    let output = future.await;
    (output, duration_ms(started.elapsed()))
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl TriagePipeline {
    /// Start building a pipeline.
    pub fn builder() -> TriagePipelineBuilder {
        TriagePipelineBuilder::default()
    }

    /// Get the pipeline ID.
    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    /// The audit sink this pipeline writes to.
    pub fn audit(&self) -> Arc<dyn AuditSink> {
        Arc::clone(&self.audit)
    }

    /// Triage one raw report.
    ///
    /// Always resolves to a tip in a terminal state: `triaged`, or
    /// `BLOCKED` when compliance review failed.
    pub async fn process_tip(&self, raw: RawTip) -> Tip {
        // Intake
        let (outcome, intake_ms) = timed(self.intake.intake(&raw)).await;
        let record = StageRecord::new(steps::INTAKE, &outcome, intake_ms);
        let mut tip = outcome.value;
        tip.status = TipStatus::Pending;
        info!(
            pipeline_id = %self.pipeline_id,
            tip_id = %tip.tip_id,
            files = tip.files.len(),
            confidence = tip.intake_confidence,
            "Tip received"
        );
        let record = record
            .summary(format!(
                "Draft created with {} file(s), confidence {:.2}",
                tip.files.len(),
                tip.intake_confidence
            ))
            .payload(json!({ "files": tip.files.len(), "confidence": tip.intake_confidence }));
        self.record(&tip.tip_id, record).await;

        // Compliance gate
        let started = Instant::now();
        let reviewed = AssertUnwindSafe(self.gate.review(&tip))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(StageError::Aborted(panic_message(panic))));
        let gate_ms = duration_ms(started.elapsed());

        let gate_outcome = match reviewed {
            Ok(outcome) => outcome,
            Err(err) => return self.block(tip, err, gate_ms).await,
        };
        let gate_degraded = gate_outcome.is_degraded();
        let record = StageRecord::new(steps::LEGAL_GATE, &gate_outcome, gate_ms);
        Self::merge_gate_output(&mut tip, gate_outcome);
        let accessible = tip.accessible_files().count();
        let record = record
            .summary(format!(
                "{} of {} file(s) accessible",
                accessible,
                tip.files.len()
            ))
            .payload(json!({
                "accessible": accessible,
                "blocked": tip.files.len() - accessible,
                "relevant_circuit": tip.legal_status.as_ref().and_then(|s| s.relevant_circuit.clone()),
            }));
        self.record(&tip.tip_id, record).await;

        // Extraction and hash/OSINT share one snapshot.
        let ((entities, extraction_ms), (hashes, hash_ms)) = futures::join!(
            timed(self.extraction.extract(&tip)),
            timed(self.hash_osint.lookup(&tip))
        );
        debug!(tip_id = %tip.tip_id, "Extraction and hash lookup joined");

        let extraction_record = StageRecord::new(steps::EXTRACTION, &entities, extraction_ms);
        let hash_record = StageRecord::new(steps::HASH_OSINT, &hashes, hash_ms);
        let mut entities = entities.value;
        entities.degraded |= extraction_record.degraded.is_some();
        let mut hashes = hashes.value;
        hashes.degraded |= hash_record.degraded.is_some();

        let extraction_record = extraction_record
            .summary(format!(
                "{} subject(s), {} victim(s)",
                entities.subjects.len(),
                entities.victims.len()
            ))
            .payload(json!({
                "subjects": entities.subjects.len(),
                "victims": entities.victims.len(),
                "locations": entities.locations.len(),
            }));
        let hash_record = hash_record
            .summary(format!("{} known-hash match(es)", hashes.matches.len()))
            .payload(json!({
                "matches": hashes.matches.len(),
                "osint_findings": hashes.osint_findings.len(),
            }));

        tip.entities = Some(entities);
        Self::merge_hash_matches(&mut tip, &hashes, gate_degraded);
        tip.hash_matches = Some(hashes);
        self.record(&tip.tip_id, extraction_record).await;
        self.record(&tip.tip_id, hash_record).await;

        // Classification and linking share the enriched snapshot.
        let ((classification, classify_ms), (links, link_ms)) = futures::join!(
            timed(self.classifier.classify(&tip)),
            timed(self.linker.link(&tip))
        );
        debug!(tip_id = %tip.tip_id, "Classification and linking joined");

        let classify_record = StageRecord::new(steps::CLASSIFIER, &classification, classify_ms);
        let link_record = StageRecord::new(steps::LINKER, &links, link_ms);
        let mut classification = classification.value;
        classification.degraded |= classify_record.degraded.is_some();
        let mut links = links.value;
        links.degraded |= link_record.degraded.is_some();

        let classify_record = classify_record
            .summary(format!(
                "{:?} (confidence {:.2})",
                classification.offense_category, classification.confidence
            ))
            .payload(json!({
                "offense_category": classification.offense_category,
                "minor_victim": classification.minor_victim,
                "aig_csam_flag": classification.aig_csam_flag,
                "sextortion_victim_in_crisis": classification.sextortion_victim_in_crisis,
            }));
        let link_record = link_record
            .summary(format!(
                "{} related tip(s), {} deconfliction match(es)",
                links.related_tip_ids.len(),
                links.deconfliction_matches.len()
            ))
            .payload(json!({
                "related_tips": links.related_tip_ids.len(),
                "active_conflicts": links.active_conflicts().count(),
            }));

        tip.classification = Some(classification);
        tip.links = Some(links);
        self.record(&tip.tip_id, classify_record).await;
        self.record(&tip.tip_id, link_record).await;

        // Scoring
        let (proposed, score_ms) = timed(self.scorer.score(&tip)).await;
        let score_record = StageRecord::new(steps::PRIORITY, &proposed, score_ms);
        let mut proposed = proposed.value;
        proposed.degraded |= score_record.degraded.is_some();
        let score_record = score_record
            .summary(format!("Proposed {} {}", proposed.score, proposed.tier.as_str()))
            .payload(json!({ "score": proposed.score, "tier": proposed.tier }));
        self.record(&tip.tip_id, score_record).await;

        // Critical overrides always run.
        let (outcome, override_ms) = timed(async {
            apply_critical_overrides(tip.classification.as_ref(), tip.links.as_ref(), proposed)
        })
        .await;
        for applied in outcome.applied.iter().filter(|a| a.changed) {
            warn!(tip_id = %tip.tip_id, rule = ?applied.rule, detail = %applied.detail, "Critical override applied");
        }
        let fired: Vec<_> = outcome.rules();
        let record = StageRecord {
            stage: steps::CRITICAL_OVERRIDE,
            attempts: 1,
            degraded: None,
            duration_ms: override_ms,
            summary: if fired.is_empty() {
                "No override rules applied".to_string()
            } else {
                format!("Rules fired: {:?}", fired)
            },
            payload: json!({
                "applied": outcome.applied,
                "score": outcome.priority.score,
                "tier": outcome.priority.tier,
            }),
        };
        tip.priority = Some(outcome.priority);
        self.record(&tip.tip_id, record).await;

        // Complete
        tip.status = TipStatus::Triaged;
        tip.triaged_at = Some(Utc::now());
        let (score, tier) = tip
            .priority
            .as_ref()
            .map(|p| (p.score, p.tier.as_str()))
            .unwrap_or_default();
        info!(tip_id = %tip.tip_id, score, tier, "Tip triaged");
        let record = StageRecord {
            stage: steps::COMPLETE,
            attempts: 1,
            degraded: None,
            duration_ms: 0,
            summary: format!("Triaged at {} {}", score, tier),
            payload: json!({ "status": tip.status, "score": score, "tier": tier }),
        };
        self.record(&tip.tip_id, record).await;

        tip
    }

    /// End the run after a compliance failure.
    async fn block(&self, mut tip: Tip, err: StageError, duration_ms: u64) -> Tip {
        let reason = err.to_string();
        error!(tip_id = %tip.tip_id, error = %reason, "Compliance review failed, blocking tip");

        let output = build_blocked_output(&tip.files, &reason, tip.state_code());
        tip.files = output.files;
        tip.legal_status = Some(output.legal_status);
        tip.status = TipStatus::Blocked;
        tip.triaged_at = Some(Utc::now());

        let entry = NewAuditEntry::new(
            &tip.tip_id,
            steps::LEGAL_GATE,
            AuditStatus::Blocked,
            format!(
                "Compliance review failed; {} file(s) blocked, held for legal review",
                tip.files.len()
            ),
        )
        .with_error(reason.clone())
        .with_timing(1, duration_ms);
        self.append_audit(entry).await;

        self.emit(
            steps::LEGAL_GATE,
            &tip.tip_id,
            json!({ "status": tip.status, "error": reason }),
        )
        .await;
        self.emit(steps::COMPLETE, &tip.tip_id, json!({ "status": tip.status }))
            .await;
        tip
    }

    /// Merge the gate's output into the tip.
    ///
    /// Files are matched by `file_id`. The gate supplies typed viewing facts;
    /// `warrant_status` stays as drafted. Derived flags and the legal status
    /// are recomputed here whatever the gate proposed. A degraded gate
    /// outcome is replaced by the blocked output over the drafted files.
    fn merge_gate_output(tip: &mut Tip, outcome: StageOutcome<GateOutput>) {
        if let Some(reason) = &outcome.degraded {
            warn!(tip_id = %tip.tip_id, %reason, "Gate returned fail-safe output, all files blocked");
            let blocked = build_blocked_output(&tip.files, reason, tip.state_code());
            tip.files = blocked.files;
            tip.legal_status = Some(blocked.legal_status);
            return;
        }

        let output = outcome.value;
        let exigent = output.legal_status.exigent_circumstances_claimed;
        let mut proposed: HashMap<String, ReportedFile> = output
            .files
            .into_iter()
            .map(|f| (f.file_id.clone(), f))
            .collect();

        let merged: Vec<ReportedFile> = tip
            .files
            .iter()
            .map(|draft| match proposed.remove(&draft.file_id) {
                Some(mut gated) => {
                    gated.warrant_status = draft.warrant_status;
                    gated
                }
                None => draft.clone(),
            })
            .collect();
        if !proposed.is_empty() {
            warn!(tip_id = %tip.tip_id, extra = proposed.len(), "Ignoring files the gate added");
        }

        tip.files = enforce_files(merged);
        let mut legal_status = build_legal_status(&tip.files, tip.state_code());
        legal_status.exigent_circumstances_claimed = exigent;
        tip.legal_status = Some(legal_status);
    }

    /// Flag matched files and refresh the legal note.
    fn merge_hash_matches(tip: &mut Tip, hashes: &triage_agent::HashMatchResults, gate_degraded: bool) {
        if !hashes.any_match() {
            return;
        }
        for file in tip.files.iter_mut() {
            if hashes.matched(&file.file_id) {
                file.hash_match = true;
            }
        }
        // A fail-safe legal status keeps its note.
        if gate_degraded {
            return;
        }
        let exigent = tip
            .legal_status
            .as_ref()
            .map(|s| s.exigent_circumstances_claimed)
            .unwrap_or(false);
        let mut legal_status = build_legal_status(&tip.files, tip.state_code());
        legal_status.exigent_circumstances_claimed = exigent;
        tip.legal_status = Some(legal_status);
    }

    async fn record(&self, tip_id: &str, record: StageRecord) {
        let status = if record.degraded.is_some() {
            AuditStatus::Degraded
        } else {
            AuditStatus::Success
        };
        match &record.degraded {
            Some(reason) => warn!(
                tip_id,
                stage = record.stage,
                attempts = record.attempts,
                %reason,
                "Stage returned safe default"
            ),
            None => debug!(
                tip_id,
                stage = record.stage,
                attempts = record.attempts,
                duration_ms = record.duration_ms,
                "Stage complete"
            ),
        }

        let mut entry = NewAuditEntry::new(tip_id, record.stage, status, record.summary)
            .with_timing(record.attempts, record.duration_ms);
        if let Some(reason) = record.degraded {
            entry = entry.with_error(reason);
        }
        self.append_audit(entry).await;
        self.emit(record.stage, tip_id, record.payload).await;
    }

    async fn append_audit(&self, entry: NewAuditEntry) {
        let (tip_id, stage) = (entry.tip_id.clone(), entry.agent.clone());
        if let Err(e) = self.audit.append(entry).await {
            error!(tip_id = %tip_id, stage = %stage, error = %e, "Audit write failed");
        }
    }

    async fn emit(&self, step: &str, tip_id: &str, payload: serde_json::Value) {
        self.events
            .publish(PipelineEvent::new(step, tip_id, payload))
            .await;
    }
}

/// Builder for [`TriagePipeline`].
///
/// All seven stages are required. The audit sink defaults to an
/// [`InMemoryAuditLog`] and the event sink to a fresh [`EventBus`].
#[derive(Default)]
pub struct TriagePipelineBuilder {
    pipeline_id: Option<String>,
    intake: Option<Arc<dyn IntakeStage>>,
    gate: Option<Arc<dyn ComplianceStage>>,
    extraction: Option<Arc<dyn ExtractionStage>>,
    hash_osint: Option<Arc<dyn HashOsintStage>>,
    classifier: Option<Arc<dyn ClassificationStage>>,
    linker: Option<Arc<dyn LinkingStage>>,
    scorer: Option<Arc<dyn ScoringStage>>,
    audit: Option<Arc<dyn AuditSink>>,
    events: Option<Arc<dyn EventSink>>,
}

impl TriagePipelineBuilder {
    pub fn pipeline_id(mut self, id: impl Into<String>) -> Self {
        self.pipeline_id = Some(id.into());
        self
    }

    pub fn intake(mut self, stage: Arc<dyn IntakeStage>) -> Self {
        self.intake = Some(stage);
        self
    }

    pub fn gate(mut self, stage: Arc<dyn ComplianceStage>) -> Self {
        self.gate = Some(stage);
        self
    }

    pub fn extraction(mut self, stage: Arc<dyn ExtractionStage>) -> Self {
        self.extraction = Some(stage);
        self
    }

    pub fn hash_osint(mut self, stage: Arc<dyn HashOsintStage>) -> Self {
        self.hash_osint = Some(stage);
        self
    }

    pub fn classifier(mut self, stage: Arc<dyn ClassificationStage>) -> Self {
        self.classifier = Some(stage);
        self
    }

    pub fn linker(mut self, stage: Arc<dyn LinkingStage>) -> Self {
        self.linker = Some(stage);
        self
    }

    pub fn scorer(mut self, stage: Arc<dyn ScoringStage>) -> Self {
        self.scorer = Some(stage);
        self
    }

    pub fn audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Build the pipeline, failing if a stage is missing.
    pub fn build(self) -> Result<TriagePipeline, TriageError> {
        Ok(TriagePipeline {
            pipeline_id: self
                .pipeline_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            intake: self.intake.ok_or(TriageError::MissingCollaborator("intake"))?,
            gate: self.gate.ok_or(TriageError::MissingCollaborator("legal_gate"))?,
            extraction: self
                .extraction
                .ok_or(TriageError::MissingCollaborator("extraction"))?,
            hash_osint: self
                .hash_osint
                .ok_or(TriageError::MissingCollaborator("hash_osint"))?,
            classifier: self
                .classifier
                .ok_or(TriageError::MissingCollaborator("classifier"))?,
            linker: self.linker.ok_or(TriageError::MissingCollaborator("linker"))?,
            scorer: self.scorer.ok_or(TriageError::MissingCollaborator("priority"))?,
            audit: self
                .audit
                .unwrap_or_else(|| Arc::new(InMemoryAuditLog::new())),
            events: self.events.unwrap_or_else(|| Arc::new(EventBus::new())),
        })
    }
}
