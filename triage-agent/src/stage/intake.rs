//! Deterministic intake: normalize the body and read structured metadata.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use compliance::{ReportedFile, WarrantStatus};

use super::{IntakeStage, StageOutcome};
use crate::tip::{Jurisdiction, RawTip, Reporter, Tip};

/// Confidence lost per unreadable metadata field.
const CONFIDENCE_PENALTY: f32 = 0.25;

/// Intake stage that never calls a model.
///
/// Reads `tip_id`, `jurisdiction`, `reporter` and `files` from the raw
/// metadata. A field that fails to parse is skipped and lowers
/// `intake_confidence`; the draft is still produced.
///
/// Warrant states claimed inside the report are discarded. Each file starts
/// at `not_needed` unless the worker supplied a state for it in
/// [`RawTip::warrant_states`], and every derived flag starts blocked.
#[derive(Debug, Default, Clone)]
pub struct BasicIntake;

impl BasicIntake {
    pub fn new() -> Self {
        Self
    }

    /// Collapse whitespace runs and drop control characters.
    pub fn normalize(body: &str) -> String {
        body.split_whitespace()
            .map(|word| word.chars().filter(|c| !c.is_control()).collect::<String>())
            .filter(|word| !word.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn reset_lifecycle(mut file: ReportedFile, raw: &RawTip) -> ReportedFile {
        let claimed = file.warrant_status;
        file.warrant_status = raw
            .warrant_states
            .get(&file.file_id)
            .copied()
            .unwrap_or(WarrantStatus::NotNeeded);
        if claimed != file.warrant_status {
            warn!(
                file_id = %file.file_id,
                claimed = claimed.as_str(),
                "Ignoring warrant status claimed in report metadata"
            );
        }
        file.warrant_required = true;
        file.file_access_blocked = true;
        file
    }

    fn field<T: DeserializeOwned>(
        metadata: &serde_json::Value,
        key: &str,
        problems: &mut Vec<String>,
    ) -> Option<T> {
        let value = metadata.get(key)?;
        if value.is_null() {
            return None;
        }
        match serde_json::from_value(value.clone()) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                problems.push(format!("{}: {}", key, e));
                None
            }
        }
    }
}

#[async_trait]
impl IntakeStage for BasicIntake {
    async fn intake(&self, raw: &RawTip) -> StageOutcome<Tip> {
        let mut tip = Tip::new(raw.source, raw.content.clone());
        let mut problems = Vec::new();

        let normalized = Self::normalize(&raw.content);
        if normalized.is_empty() {
            problems.push("empty report body".to_string());
        }
        tip.normalized_body = Some(normalized);

        match &raw.metadata {
            serde_json::Value::Object(_) => {
                if let Some(id) = Self::field::<String>(&raw.metadata, "tip_id", &mut problems) {
                    tip.tip_id = id;
                }
                if let Some(j) = Self::field::<Jurisdiction>(&raw.metadata, "jurisdiction", &mut problems) {
                    tip.jurisdiction = j;
                }
                if let Some(r) = Self::field::<Reporter>(&raw.metadata, "reporter", &mut problems) {
                    tip.reporter = r;
                }
                if let Some(files) =
                    Self::field::<Vec<ReportedFile>>(&raw.metadata, "files", &mut problems)
                {
                    tip.files = files
                        .into_iter()
                        .map(|file| Self::reset_lifecycle(file, raw))
                        .collect();
                }
            }
            serde_json::Value::Null => {}
            other => problems.push(format!("metadata is not an object: {}", other)),
        }

        tip.intake_confidence =
            (1.0 - CONFIDENCE_PENALTY * problems.len() as f32).max(0.0);

        if problems.is_empty() {
            debug!(tip_id = %tip.tip_id, files = tip.files.len(), "Intake complete");
            StageOutcome::ok(tip, 1)
        } else {
            warn!(
                tip_id = %tip.tip_id,
                confidence = tip.intake_confidence,
                problems = ?problems,
                "Intake produced low-confidence draft"
            );
            StageOutcome::degraded(tip, 1, problems.join("; "))
        }
    }
}
