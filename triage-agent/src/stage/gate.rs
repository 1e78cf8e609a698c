//! Compliance-gate stage backed directly by the `compliance` crate.

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{info, warn};

use compliance::{build_blocked_output, gate_files, GateOutput};

use super::{ComplianceStage, StageError, StageOutcome};
use crate::tip::Tip;

/// Gate stage with its own fail-safe.
///
/// File sets it cannot reason about (duplicate or empty IDs) produce the
/// blocked output rather than an error.
#[derive(Debug, Default, Clone)]
pub struct DeterministicGate;

impl DeterministicGate {
    pub fn new() -> Self {
        Self
    }

    fn validate(draft: &Tip) -> Result<(), String> {
        let mut seen = HashSet::new();
        for file in &draft.files {
            if file.file_id.trim().is_empty() {
                return Err("file with empty file_id".to_string());
            }
            if !seen.insert(file.file_id.as_str()) {
                return Err(format!("duplicate file_id {}", file.file_id));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ComplianceStage for DeterministicGate {
    async fn review(&self, draft: &Tip) -> Result<StageOutcome<GateOutput>, StageError> {
        if let Err(reason) = Self::validate(draft) {
            warn!(tip_id = %draft.tip_id, %reason, "Gate input rejected, blocking all files");
            let output = build_blocked_output(&draft.files, &reason, draft.state_code());
            return Ok(StageOutcome::degraded(output, 1, reason));
        }

        let output = gate_files(draft.files.iter().cloned(), draft.state_code());
        info!(
            tip_id = %draft.tip_id,
            files = output.files.len(),
            requiring_warrant = output.legal_status.files_requiring_warrant.len(),
            any_accessible = output.legal_status.any_files_accessible,
            "Compliance gate evaluated"
        );
        Ok(StageOutcome::ok(output, 1))
    }
}
