//! Legal status aggregation and the fail-safe blocked output.

use crate::circuit::circuit_info;
use crate::types::{GateOutput, LegalStatus, ReportedFile, WarrantStatus};
use crate::warrant::{enforce_file, file_access_blocked, warrant_required};

/// Build the aggregate legal status for a set of files.
///
/// Derived from each file's typed facts, never from its stored flags, so the
/// result is identical whether or not the files were enforced first.
pub fn build_legal_status(files: &[ReportedFile], jurisdiction_code: Option<&str>) -> LegalStatus {
    let mut requiring = Vec::new();
    let mut blocked = Vec::new();
    let mut hash_matched_blocked = Vec::new();
    let mut denied = Vec::new();

    for file in files {
        let required = warrant_required(
            file.esp_viewed,
            file.esp_viewed_missing,
            file.publicly_available,
        );
        let is_blocked = file_access_blocked(file, file.warrant_status);

        if required {
            requiring.push(file.file_id.clone());
        }
        if is_blocked {
            blocked.push(file.file_id.clone());
            if file.hash_match {
                hash_matched_blocked.push(file.file_id.clone());
            }
        }
        if file.warrant_status == WarrantStatus::Denied {
            denied.push(file.file_id.clone());
        }
    }

    let accessible = files.len() - blocked.len();
    let circuit = jurisdiction_code.map(circuit_info);

    let mut note = Vec::new();
    if files.is_empty() {
        note.push("No files attached to this report.".to_string());
    } else {
        note.push(format!(
            "{} of {} file(s) accessible; {} blocked pending warrant.",
            accessible,
            files.len(),
            blocked.len()
        ));
        if requiring.is_empty() {
            note.push("The ESP viewed every file; no warrant is required.".to_string());
        }
    }
    if !hash_matched_blocked.is_empty() {
        note.push(format!(
            "Known-hash match on blocked file(s) {}: the match constitutes probable cause \
             to apply for a warrant. Do not open these files until a warrant is granted.",
            hash_matched_blocked.join(", ")
        ));
    }
    if !denied.is_empty() {
        note.push(format!(
            "Warrant DENIED for file(s) {}: do not open these files.",
            denied.join(", ")
        ));
    }
    match &circuit {
        Some(info) => note.push(info.note.clone()),
        None if !requiring.is_empty() => note.push(
            "Jurisdiction unknown; consult the U.S. Attorney's office before opening \
             unviewed files."
                .to_string(),
        ),
        None => {}
    }

    LegalStatus {
        files_requiring_warrant: requiring,
        all_warrants_resolved: blocked.is_empty(),
        any_files_accessible: accessible > 0,
        legal_note: note.join(" "),
        relevant_circuit: circuit.map(|c| c.name),
        exigent_circumstances_claimed: false,
        confidence: 1.0,
    }
}

/// Enforce every file and summarize them in one step.
pub fn gate_files(
    files: impl IntoIterator<Item = ReportedFile>,
    jurisdiction_code: Option<&str>,
) -> GateOutput {
    let files: Vec<ReportedFile> = files.into_iter().map(enforce_file).collect();
    let legal_status = build_legal_status(&files, jurisdiction_code);
    GateOutput {
        legal_status,
        files,
    }
}

/// Fail-safe output: every file blocked and warrant-required.
///
/// Used whenever the gate cannot produce a trustworthy result. Each file's
/// viewing statement is marked missing so a later recompute cannot reopen
/// it; only a granted warrant can.
pub fn build_blocked_output(
    files: &[ReportedFile],
    reason: &str,
    jurisdiction_code: Option<&str>,
) -> GateOutput {
    let files: Vec<ReportedFile> = files
        .iter()
        .cloned()
        .map(|mut file| {
            file.esp_viewed_missing = true;
            file.warrant_required = true;
            file.file_access_blocked = true;
            file
        })
        .collect();

    let legal_status = LegalStatus {
        files_requiring_warrant: files.iter().map(|f| f.file_id.clone()).collect(),
        all_warrants_resolved: false,
        any_files_accessible: false,
        legal_note: format!(
            "Compliance review failed: {}. All files blocked; consult legal counsel.",
            reason
        ),
        relevant_circuit: jurisdiction_code.map(|code| circuit_info(code).name),
        exigent_circumstances_claimed: false,
        confidence: 0.0,
    };

    GateOutput {
        legal_status,
        files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewed(id: &str) -> ReportedFile {
        ReportedFile::new(id).with_esp_viewed(true, false)
    }

    fn unviewed(id: &str) -> ReportedFile {
        ReportedFile::new(id).with_esp_viewed(false, false)
    }

    #[test]
    fn test_mixed_files() {
        let files = vec![viewed("a"), unviewed("b")];
        let status = build_legal_status(&files, Some("CA"));

        assert_eq!(status.files_requiring_warrant, vec!["b".to_string()]);
        assert!(status.any_files_accessible);
        assert!(!status.all_warrants_resolved);
        assert_eq!(status.relevant_circuit.as_deref(), Some("Ninth Circuit"));
        assert!(status.legal_note.contains("1 of 2 file(s) accessible"));
        assert!(status.legal_note.contains("binding"));
        assert_eq!(status.confidence, 1.0);
    }

    #[test]
    fn test_all_viewed() {
        let status = build_legal_status(&[viewed("a"), viewed("b")], None);
        assert!(status.files_requiring_warrant.is_empty());
        assert!(status.all_warrants_resolved);
        assert!(status.legal_note.contains("no warrant is required"));
    }

    #[test]
    fn test_granted_warrant_resolves() {
        let file = unviewed("a").with_warrant_status(WarrantStatus::Granted);
        let status = build_legal_status(&[file], Some("TX"));
        assert_eq!(status.files_requiring_warrant, vec!["a".to_string()]);
        assert!(status.all_warrants_resolved);
        assert!(status.any_files_accessible);
        assert!(status.legal_note.contains("U.S. Attorney"));
    }

    #[test]
    fn test_hash_match_on_blocked_file() {
        let mut file = unviewed("a");
        file.hash_match = true;
        let status = build_legal_status(&[file], Some("NY"));
        assert!(status.legal_note.contains("probable cause"));
    }

    #[test]
    fn test_hash_match_on_accessible_file_is_silent() {
        let mut file = viewed("a");
        file.hash_match = true;
        let status = build_legal_status(&[file], Some("NY"));
        assert!(!status.legal_note.contains("probable cause"));
    }

    #[test]
    fn test_denied_warrant_guidance() {
        let file = unviewed("a").with_warrant_status(WarrantStatus::Denied);
        let status = build_legal_status(&[file], None);
        assert!(status.legal_note.contains("do not open"));
        assert!(!status.any_files_accessible);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let files = vec![
            viewed("a"),
            unviewed("b").with_warrant_status(WarrantStatus::Applied),
            ReportedFile::new("c").with_esp_viewed(true, true),
        ];
        let first = gate_files(files, Some("OR"));
        let second = gate_files(first.files.clone(), Some("OR"));
        assert_eq!(first, second);
        assert_eq!(
            build_legal_status(&first.files, Some("OR")),
            build_legal_status(&first.files, Some("OR"))
        );
    }

    #[test]
    fn test_stored_flags_do_not_leak_into_status() {
        let mut lying = unviewed("b");
        lying.file_access_blocked = false;
        lying.warrant_required = false;
        let status = build_legal_status(&[lying], None);
        assert!(!status.any_files_accessible);
        assert_eq!(status.files_requiring_warrant, vec!["b".to_string()]);
    }

    #[test]
    fn test_blocked_output() {
        let output = build_blocked_output(&[viewed("a"), unviewed("b")], "stage crashed", Some("WA"));

        assert!(output.files.iter().all(|f| f.file_access_blocked && f.warrant_required));
        assert_eq!(output.legal_status.confidence, 0.0);
        assert!(!output.legal_status.any_files_accessible);
        assert!(!output.legal_status.all_warrants_resolved);
        assert_eq!(output.legal_status.files_requiring_warrant.len(), 2);
        assert!(output.legal_status.legal_note.contains("stage crashed"));
        assert!(output.legal_status.legal_note.contains("consult legal counsel."));
    }

    #[test]
    fn test_blocked_output_survives_recompute() {
        let output = build_blocked_output(&[viewed("a")], "timeout", None);
        let recomputed = gate_files(output.files, None);
        assert!(recomputed.files[0].file_access_blocked);
        assert!(!recomputed.legal_status.any_files_accessible);
    }
}
