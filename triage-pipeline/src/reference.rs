//! Reference wiring: deterministic intake, gate, hash lookup and linking,
//! with model-backed extraction, classification and scoring.

use std::sync::Arc;
use tracing::info;

use triage_agent::stage::{
    BasicIntake, CaseIndexLinker, DeterministicGate, KnownHashLookup, ModelClassifier,
    ModelExtraction, ModelScorer, ModelStage,
};
use triage_agent::{AuditSink, EventSink, LlmBackend};

use crate::config::PipelineConfig;
use crate::controller::TriagePipeline;
use crate::error::TriageError;

/// Shared indexes the reference stages read from.
#[derive(Default)]
pub struct ReferenceIndexes {
    pub known_hashes: Arc<KnownHashLookup>,
    pub cases: Arc<CaseIndexLinker>,
}

/// Build a pipeline from the reference stages.
pub fn reference_pipeline(
    config: &PipelineConfig,
    backend: Arc<dyn LlmBackend>,
    indexes: &ReferenceIndexes,
    audit: Arc<dyn AuditSink>,
    events: Arc<dyn EventSink>,
) -> Result<TriagePipeline, TriageError> {
    let model = ModelStage::new(backend)
        .with_retry(config.retry.clone())
        .with_generation(config.model.max_tokens, config.model.temperature)
        .with_json_mode(config.model.json_mode);
    info!(
        pipeline_id = %config.pipeline_id,
        backend = model.backend_id(),
        "Wiring reference stages"
    );

    TriagePipeline::builder()
        .pipeline_id(config.pipeline_id.clone())
        .intake(Arc::new(BasicIntake::new()))
        .gate(Arc::new(DeterministicGate::new()))
        .extraction(Arc::new(ModelExtraction::new(model.clone())))
        .hash_osint(indexes.known_hashes.clone())
        .classifier(Arc::new(ModelClassifier::new(model.clone())))
        .linker(indexes.cases.clone())
        .scorer(Arc::new(ModelScorer::new(model)))
        .audit(audit)
        .events(events)
        .build()
}
