//! Tip Triage Pipeline - the orchestration kernel
//!
//! Drives a report through the analysis stages and applies the rules no
//! stage may override:
//!
//! - **Stage graph**: intake, compliance gate, two fork-join barriers,
//!   scoring
//! - **Fail-safe gate**: a failed compliance review blocks the tip and
//!   every file
//! - **Critical overrides**: hard score floors and deconfliction pauses
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use triage_pipeline::{reference_pipeline, PipelineConfig, ReferenceIndexes};
//! use triage_agent::backend::OpenAiBackend;
//! use triage_agent::{EventBus, InMemoryAuditLog, RawTip, TipSource};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = PipelineConfig::default();
//! let backend = Arc::new(OpenAiBackend::new(
//!     "http://localhost:8000/v1",
//!     "llama-3-70b",
//!     None,
//!     std::time::Duration::from_secs(120),
//! )?);
//! let pipeline = reference_pipeline(
//!     &config,
//!     backend,
//!     &ReferenceIndexes::default(),
//!     Arc::new(InMemoryAuditLog::new()),
//!     Arc::new(EventBus::new()),
//! )?;
//! let tip = pipeline.process_tip(RawTip::new(TipSource::Ncmec, "...")).await;
//! println!("{:?}", tip.status);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod override_engine;
pub mod reference;

// Re-export main types
pub use config::PipelineConfig;
pub use controller::{steps, TriagePipeline, TriagePipelineBuilder};
pub use error::TriageError;
pub use override_engine::{apply_critical_overrides, OverrideOutcome, OverrideRule};
pub use reference::{reference_pipeline, ReferenceIndexes};
