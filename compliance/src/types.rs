//! Core types for the compliance gate.
//!
//! Every field the gate reads is a typed boolean or enum. Free text
//! (legal notes, filenames) is produced by the gate, never consumed by it.
//!
//! With the `typescript` feature enabled, these types can be exported to
//! TypeScript using ts-rs for the investigator dashboard.

use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Where a file sits in the warrant lifecycle.
///
/// `not_needed → pending_application → applied → granted | denied`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum WarrantStatus {
    /// No warrant has been sought
    #[default]
    NotNeeded,
    /// Investigator is preparing an application
    PendingApplication,
    /// Application submitted to the court
    Applied,
    /// Warrant granted; file may be opened
    Granted,
    /// Warrant denied; file must not be opened
    Denied,
}

impl WarrantStatus {
    /// Get string representation for notes and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotNeeded => "not_needed",
            Self::PendingApplication => "pending_application",
            Self::Applied => "applied",
            Self::Granted => "granted",
            Self::Denied => "denied",
        }
    }
}

/// Media type of a reported file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
    Document,
    Archive,
    Chat,
    #[default]
    Other,
}

/// One reported artifact attached to a tip.
///
/// `warrant_required` and `file_access_blocked` are derived fields. Any
/// value supplied for them upstream is discarded by [`crate::enforce_file`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ReportedFile {
    /// Unique identifier within the tip
    pub file_id: String,
    /// Original filename as reported, if any
    #[serde(default)]
    pub filename: Option<String>,
    /// Media type
    #[serde(default)]
    pub media_type: MediaType,
    /// Hex digest supplied by the ESP (MD5/SHA-1/PhotoDNA reference)
    #[serde(default)]
    pub hash: Option<String>,
    /// The ESP states a human at the ESP viewed this file
    #[serde(default)]
    pub esp_viewed: bool,
    /// The report did not state whether the ESP viewed the file
    #[serde(default)]
    pub esp_viewed_missing: bool,
    /// The ESP's own categorization label
    #[serde(default)]
    pub esp_categorized_as: Option<String>,
    /// The file was publicly reachable when reported
    #[serde(default)]
    pub publicly_available: bool,
    /// Derived: opening the file requires a warrant
    #[serde(default)]
    pub warrant_required: bool,
    /// Current warrant lifecycle state
    #[serde(default)]
    pub warrant_status: WarrantStatus,
    /// Derived: access is blocked right now
    #[serde(default)]
    pub file_access_blocked: bool,
    /// A known-hash match was found for this file
    #[serde(default)]
    pub hash_match: bool,
}

impl ReportedFile {
    /// Create a file with nothing known about it.
    ///
    /// `esp_viewed_missing` starts `true`: silence about viewing is treated
    /// as "not viewed".
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            filename: None,
            media_type: MediaType::Other,
            hash: None,
            esp_viewed: false,
            esp_viewed_missing: true,
            esp_categorized_as: None,
            publicly_available: false,
            warrant_required: true,
            warrant_status: WarrantStatus::NotNeeded,
            file_access_blocked: true,
            hash_match: false,
        }
    }

    /// Builder: record the ESP viewing facts.
    pub fn with_esp_viewed(mut self, esp_viewed: bool, esp_viewed_missing: bool) -> Self {
        self.esp_viewed = esp_viewed;
        self.esp_viewed_missing = esp_viewed_missing;
        self
    }

    /// Builder: set warrant status.
    pub fn with_warrant_status(mut self, status: WarrantStatus) -> Self {
        self.warrant_status = status;
        self
    }

    /// Builder: set media type.
    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = media_type;
        self
    }

    /// Builder: set reported hash.
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    /// Builder: set public availability.
    pub fn with_publicly_available(mut self, publicly_available: bool) -> Self {
        self.publicly_available = publicly_available;
        self
    }
}

/// Aggregate legal view over a tip's files.
///
/// Never authoritative on its own; always regenerable from the files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct LegalStatus {
    /// IDs of files that need a warrant before opening
    pub files_requiring_warrant: Vec<String>,
    /// No file is both warrant-required and still blocked
    pub all_warrants_resolved: bool,
    /// At least one file may be opened now
    pub any_files_accessible: bool,
    /// Generated guidance for the investigator
    pub legal_note: String,
    /// Federal circuit for the tip's jurisdiction
    pub relevant_circuit: Option<String>,
    /// Investigator asserted exigent circumstances
    #[serde(default)]
    pub exigent_circumstances_claimed: bool,
    /// 1.0 when derived from typed facts, 0.0 for the fail-safe output
    pub confidence: f32,
}

/// What the gate hands back: the recomputed files plus their summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct GateOutput {
    pub legal_status: LegalStatus,
    pub files: Vec<ReportedFile>,
}

/// Circuit lookup result for a jurisdiction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct CircuitInfo {
    /// Circuit name, e.g. "Ninth Circuit"
    pub name: String,
    /// Wilson is binding precedent in this circuit
    pub binding: bool,
    /// Guidance to include in the legal note
    pub note: String,
}

/// Error types for compliance operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComplianceError {
    /// Caller attempted to read a file that requires an unresolved warrant
    #[error("File access blocked pending warrant: {file_id}")]
    AccessBlocked { file_id: String },
}
