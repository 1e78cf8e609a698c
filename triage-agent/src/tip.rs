//! Tip types.
//!
//! A [`Tip`] is created by intake and then owned by exactly one pipeline
//! run. Stages read it; only the controller writes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use compliance::{LegalStatus, ReportedFile, WarrantStatus};

use crate::analysis::{Classification, ExtractedEntities, HashMatchResults, PriorityScore, TipLinks};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Lifecycle status of a tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum TipStatus {
    /// In flight or not yet started
    #[default]
    Pending,
    /// Pipeline completed normally
    Triaged,
    /// Compliance review failed; held for manual legal review
    #[serde(rename = "BLOCKED")]
    Blocked,
    /// Marked duplicate by the caller's deduplication
    Duplicate,
}

impl TipStatus {
    /// Whether the pipeline is finished with this tip.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Triaged | Self::Blocked | Self::Duplicate)
    }
}

/// Channel a tip arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum TipSource {
    /// NCMEC CyberTipline report
    #[default]
    Ncmec,
    /// Direct report from an electronic service provider
    Esp,
    /// Member of the public
    Public,
    /// Referral from another agency
    InterAgency,
}

/// Reporting party.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Reporter {
    /// ESP or organization name
    pub name: Option<String>,
    /// Reporter category, e.g. "esp", "parent", "school"
    pub kind: Option<String>,
    /// Contact details if supplied
    pub contact: Option<String>,
}

/// Where the incident is believed to have occurred.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Jurisdiction {
    /// Two-letter US state or territory code
    pub state_code: Option<String>,
    /// ISO country code
    pub country: Option<String>,
}

/// Raw report as handed to the pipeline by the queue worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct RawTip {
    /// Intake channel
    #[serde(default)]
    pub source: TipSource,
    /// Report body as received
    pub content: String,
    /// Structured fields supplied alongside the body (files, reporter, ...)
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Warrant states by `file_id`, set by the worker from the warrant
    /// workflow. Never read from the report itself.
    #[serde(default)]
    pub warrant_states: BTreeMap<String, WarrantStatus>,
}

impl RawTip {
    /// Create a raw tip with no metadata.
    pub fn new(source: TipSource, content: impl Into<String>) -> Self {
        Self {
            source,
            content: content.into(),
            metadata: serde_json::Value::Null,
            warrant_states: BTreeMap::new(),
        }
    }

    /// Builder: attach metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Builder: record a warrant state from the warrant workflow.
    pub fn with_warrant_state(mut self, file_id: impl Into<String>, status: WarrantStatus) -> Self {
        self.warrant_states.insert(file_id.into(), status);
        self
    }
}

/// One incoming report and everything the pipeline learned about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Tip {
    /// Unique tip ID
    pub tip_id: String,
    /// Intake channel
    pub source: TipSource,
    /// Report body as received
    pub raw_body: String,
    /// Normalized body produced by intake
    pub normalized_body: Option<String>,
    /// Lifecycle status
    pub status: TipStatus,
    /// Incident jurisdiction
    pub jurisdiction: Jurisdiction,
    /// Reporting party
    pub reporter: Reporter,
    /// Attached files
    pub files: Vec<ReportedFile>,
    /// How confident intake was in its parse (0.0 - 1.0)
    pub intake_confidence: f32,
    /// Compliance summary
    pub legal_status: Option<LegalStatus>,
    /// Extraction output
    pub entities: Option<ExtractedEntities>,
    /// Hash/OSINT output
    pub hash_matches: Option<HashMatchResults>,
    /// Classification output
    pub classification: Option<Classification>,
    /// Linking output
    pub links: Option<TipLinks>,
    /// Final priority (set once by the override engine)
    pub priority: Option<PriorityScore>,
    /// When the report was received
    pub received_at: DateTime<Utc>,
    /// When the pipeline finished
    pub triaged_at: Option<DateTime<Utc>>,
}

impl Tip {
    /// Create a pending tip from a raw body.
    pub fn new(source: TipSource, raw_body: impl Into<String>) -> Self {
        Self {
            tip_id: uuid::Uuid::new_v4().to_string(),
            source,
            raw_body: raw_body.into(),
            normalized_body: None,
            status: TipStatus::Pending,
            jurisdiction: Jurisdiction::default(),
            reporter: Reporter::default(),
            files: Vec::new(),
            intake_confidence: 1.0,
            legal_status: None,
            entities: None,
            hash_matches: None,
            classification: None,
            links: None,
            priority: None,
            received_at: Utc::now(),
            triaged_at: None,
        }
    }

    /// Builder: set files.
    pub fn with_files(mut self, files: Vec<ReportedFile>) -> Self {
        self.files = files;
        self
    }

    /// Builder: set jurisdiction state code.
    pub fn with_state(mut self, state_code: impl Into<String>) -> Self {
        self.jurisdiction.state_code = Some(state_code.into());
        self
    }

    /// Body to analyze: normalized if available, raw otherwise.
    pub fn body(&self) -> &str {
        self.normalized_body.as_deref().unwrap_or(&self.raw_body)
    }

    /// Jurisdiction state code, if known.
    pub fn state_code(&self) -> Option<&str> {
        self.jurisdiction.state_code.as_deref()
    }

    /// Files that may be read right now.
    ///
    /// Re-checks each file through the gate; a file stored as blocked stays
    /// out even when its typed facts would allow access.
    pub fn accessible_files(&self) -> impl Iterator<Item = &ReportedFile> {
        self.files
            .iter()
            .filter(|f| compliance::assert_accessible(f).is_ok())
    }
}
