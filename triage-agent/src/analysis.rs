//! Analysis-stage result types.
//!
//! Each stage returns one of these. When a stage exhausts its retries it
//! returns the type's safe default with `degraded = true` instead of an
//! error.

use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// A person suspected of the offense.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Subject {
    pub name: Option<String>,
    #[serde(default)]
    pub usernames: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub ip_addresses: Vec<String>,
    pub estimated_age: Option<u8>,
}

/// A potential victim mentioned in the report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Victim {
    pub description: Option<String>,
    pub estimated_age: Option<u8>,
    #[serde(default)]
    pub identified: bool,
}

/// Output of the extraction stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ExtractedEntities {
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub victims: Vec<Victim>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub degraded: bool,
}

impl ExtractedEntities {
    /// Safe default: nothing extracted.
    pub fn degraded() -> Self {
        Self {
            degraded: true,
            ..Default::default()
        }
    }
}

/// Known-hash database that produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum HashSource {
    Ncmec,
    ProjectVic,
    Iwf,
    Local,
}

/// One known-hash match against a reported file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct HashMatch {
    pub file_id: String,
    pub hash: String,
    pub source: HashSource,
    /// Category assigned by the hash database
    pub category: Option<String>,
}

/// Output of the hash/OSINT stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct HashMatchResults {
    #[serde(default)]
    pub matches: Vec<HashMatch>,
    #[serde(default)]
    pub osint_findings: Vec<String>,
    #[serde(default)]
    pub degraded: bool,
}

impl HashMatchResults {
    /// Safe default: no matches.
    pub fn degraded() -> Self {
        Self {
            degraded: true,
            ..Default::default()
        }
    }

    /// Whether any file matched.
    pub fn any_match(&self) -> bool {
        !self.matches.is_empty()
    }

    /// Whether a specific file matched.
    pub fn matched(&self, file_id: &str) -> bool {
        self.matches.iter().any(|m| m.file_id == file_id)
    }
}

/// Offense category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum OffenseCategory {
    #[serde(rename = "CSAM", alias = "csam")]
    Csam,
    Sextortion,
    Enticement,
    Trafficking,
    Grooming,
    Other,
    #[default]
    Unknown,
}

/// Whether the report establishes a minor victim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum MinorVictimStatus {
    Confirmed,
    Suspected,
    #[default]
    Unknown,
}

/// Output of the classification stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Classification {
    #[serde(default)]
    pub offense_category: OffenseCategory,
    /// Material appears AI-generated (same severity as non-synthetic)
    #[serde(default)]
    pub aig_csam_flag: bool,
    #[serde(default)]
    pub sextortion_victim_in_crisis: bool,
    #[serde(default)]
    pub minor_victim: MinorVictimStatus,
    /// 0.0 - 1.0
    #[serde(default)]
    pub confidence: f32,
    pub rationale: Option<String>,
    #[serde(default)]
    pub degraded: bool,
}

impl Classification {
    /// Create a classification for a category.
    pub fn new(offense_category: OffenseCategory) -> Self {
        Self {
            offense_category,
            confidence: 1.0,
            ..Default::default()
        }
    }

    /// Builder: set minor victim status.
    pub fn with_minor_victim(mut self, status: MinorVictimStatus) -> Self {
        self.minor_victim = status;
        self
    }

    /// Builder: mark sextortion crisis.
    pub fn with_crisis(mut self, in_crisis: bool) -> Self {
        self.sextortion_victim_in_crisis = in_crisis;
        self
    }

    /// Builder: mark AI-generated material.
    pub fn with_aig_flag(mut self, flag: bool) -> Self {
        self.aig_csam_flag = flag;
        self
    }

    /// Safe default: category unknown, zero confidence.
    pub fn degraded() -> Self {
        Self {
            degraded: true,
            ..Default::default()
        }
    }
}

/// A cross-agency deconfliction hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct DeconflictionMatch {
    /// Agency holding the conflicting case
    pub agency: String,
    pub case_number: Option<String>,
    /// Agency has an open investigation on the same subject
    #[serde(default)]
    pub active_investigation: bool,
    /// Point of contact at the agency
    pub contact: Option<String>,
}

/// Output of the linking stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct TipLinks {
    #[serde(default)]
    pub related_tip_ids: Vec<String>,
    #[serde(default)]
    pub deconfliction_matches: Vec<DeconflictionMatch>,
    #[serde(default)]
    pub degraded: bool,
}

impl TipLinks {
    /// Safe default: no links found.
    pub fn degraded() -> Self {
        Self {
            degraded: true,
            ..Default::default()
        }
    }

    /// Matches with an open investigation.
    pub fn active_conflicts(&self) -> impl Iterator<Item = &DeconflictionMatch> {
        self.deconfliction_matches
            .iter()
            .filter(|m| m.active_investigation)
    }
}

/// Priority bucket driving queue ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorityTier {
    Immediate,
    Urgent,
    Standard,
    Monitor,
    /// Held for deconfliction with another agency
    Paused,
}

impl PriorityTier {
    /// Tier implied by a score alone.
    pub fn from_score(score: u8) -> Self {
        match score {
            85..=u8::MAX => Self::Immediate,
            60..=84 => Self::Urgent,
            30..=59 => Self::Standard,
            _ => Self::Monitor,
        }
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "IMMEDIATE",
            Self::Urgent => "URGENT",
            Self::Standard => "STANDARD",
            Self::Monitor => "MONITOR",
            Self::Paused => "PAUSED",
        }
    }
}

/// Score given when the scoring stage cannot produce one.
pub const FALLBACK_SCORE: u8 = 70;

/// Output of the scoring stage and, after overrides, the final verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct PriorityScore {
    /// 0 - 100
    pub score: u8,
    pub tier: PriorityTier,
    #[serde(default)]
    pub scoring_factors: Vec<String>,
    #[serde(default)]
    pub routing_unit: String,
    #[serde(default)]
    pub recommended_action: String,
    #[serde(default)]
    pub supervisor_alert: bool,
    pub supervisor_alert_reason: Option<String>,
    #[serde(default)]
    pub victim_crisis_alert: bool,
    #[serde(default)]
    pub degraded: bool,
}

impl PriorityScore {
    /// Create a score with the tier implied by the score.
    pub fn new(score: u8) -> Self {
        let score = score.min(100);
        Self {
            score,
            tier: PriorityTier::from_score(score),
            scoring_factors: Vec::new(),
            routing_unit: "ICAC".to_string(),
            recommended_action: String::new(),
            supervisor_alert: false,
            supervisor_alert_reason: None,
            victim_crisis_alert: false,
            degraded: false,
        }
    }

    /// Safe non-zero default: URGENT with a supervisor alert.
    ///
    /// A tip whose scoring failed is never silently dropped to the bottom
    /// of the queue.
    pub fn fallback(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            score: FALLBACK_SCORE,
            tier: PriorityTier::Urgent,
            scoring_factors: vec![format!("Scoring unavailable: {}", reason)],
            routing_unit: "ICAC".to_string(),
            recommended_action: "Manual review required: automated scoring failed".to_string(),
            supervisor_alert: true,
            supervisor_alert_reason: Some(format!("Automated scoring failed: {}", reason)),
            victim_crisis_alert: false,
            degraded: true,
        }
    }

    /// Builder: set the tier explicitly.
    pub fn with_tier(mut self, tier: PriorityTier) -> Self {
        self.tier = tier;
        self
    }
}
