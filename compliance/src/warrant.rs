//! Warrant requirement and access blocking.
//!
//! United States v. Wilson (9th Cir. 2021): law enforcement opening a file
//! the reporting ESP never viewed is a search requiring a warrant. A file
//! the ESP did view may be opened without one.

use tracing::warn;

use crate::types::{ComplianceError, ReportedFile, WarrantStatus};

/// Whether opening a file requires a warrant.
///
/// `publicly_available` is accepted but never relaxes the result. A missing
/// viewing statement overrides a claimed `esp_viewed`.
pub fn warrant_required(
    esp_viewed: bool,
    esp_viewed_missing: bool,
    _publicly_available: bool,
) -> bool {
    !(esp_viewed && !esp_viewed_missing)
}

/// Whether access to `file` is blocked given `warrant_status`.
///
/// Reads only the typed viewing facts of `file`; its stored derived flags
/// are ignored.
pub fn file_access_blocked(file: &ReportedFile, warrant_status: WarrantStatus) -> bool {
    warrant_required(
        file.esp_viewed,
        file.esp_viewed_missing,
        file.publicly_available,
    ) && warrant_status != WarrantStatus::Granted
}

/// Recompute both derived fields of a file from its typed facts.
///
/// Idempotent. Whatever an upstream step proposed for the derived fields is
/// discarded.
pub fn enforce_file(mut file: ReportedFile) -> ReportedFile {
    let required = warrant_required(
        file.esp_viewed,
        file.esp_viewed_missing,
        file.publicly_available,
    );
    let blocked = file_access_blocked(&file, file.warrant_status);

    if file.file_access_blocked != blocked || file.warrant_required != required {
        warn!(
            file_id = %file.file_id,
            proposed_blocked = file.file_access_blocked,
            proposed_required = file.warrant_required,
            blocked,
            required,
            "Discarding proposed access flags"
        );
    }

    file.warrant_required = required;
    file.file_access_blocked = blocked;
    file
}

/// Recompute every file in a set.
pub fn enforce_files(files: impl IntoIterator<Item = ReportedFile>) -> Vec<ReportedFile> {
    files.into_iter().map(enforce_file).collect()
}

/// Fail unless `file` may be read right now.
///
/// Call before touching file content or metadata beyond its typed facts.
/// A stored `file_access_blocked = false` is never trusted, and a stored
/// `true` is never overridden: only [`enforce_file`] may clear it.
pub fn assert_accessible(file: &ReportedFile) -> Result<(), ComplianceError> {
    if file.file_access_blocked || file_access_blocked(file, file.warrant_status) {
        return Err(ComplianceError::AccessBlocked {
            file_id: file.file_id.clone(),
        });
    }
    Ok(())
}
