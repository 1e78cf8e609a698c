//! Triage Agent - analysis stages for incoming exploitation reports
//!
//! Provides the collaborators the triage pipeline drives:
//! - Tip and analysis-result types
//! - Stage contracts with typed "never fails" outcomes
//! - Retry-with-backoff combinator and per-stage safe defaults
//! - Trait-based LLM backends (OpenAI-compatible, mock)
//! - Hash-chained audit log and stage-boundary event bus
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        TriagePipeline (controller)      │
//! └────────────────┬────────────────────────┘
//!                  │ &Tip snapshots
//!      ┌───────────┼───────────────┐
//!      ▼           ▼               ▼
//! ┌──────────┐ ┌──────────┐ ┌─────────────┐
//! │ Stages   │ │ AuditSink│ │ EventBus    │
//! │ (model / │ │ (SHA-256 │ │ (pattern    │
//! │  index)  │ │  chain)  │ │  callbacks) │
//! └────┬─────┘ └──────────┘ └─────────────┘
//!      ▼
//! ┌──────────┐
//! │LlmBackend│
//! └──────────┘
//! ```

pub mod analysis;
pub mod audit;
pub mod backend;
pub mod events;
pub mod retry;
pub mod stage;
pub mod tip;

// Re-export main types for convenience
pub use analysis::*;
pub use audit::{AuditEntry, AuditError, AuditSink, AuditStatus, InMemoryAuditLog, NewAuditEntry};
pub use backend::traits::{CompletionRequest, CompletionResponse, LlmBackend, LlmError};
pub use events::{EventBus, EventSink, PipelineEvent, Subscription};
pub use retry::{with_retry, RetryPolicy};
pub use stage::{
    ClassificationStage, ComplianceStage, ExtractionStage, HashOsintStage, IntakeStage,
    LinkingStage, ScoringStage, StageError, StageOutcome,
};
pub use tip::{Jurisdiction, RawTip, Reporter, Tip, TipSource, TipStatus};
