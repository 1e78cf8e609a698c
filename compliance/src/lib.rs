//! File-access compliance gate for tip triage.
//!
//! Decides, from typed facts only, whether an investigator may open a file
//! attached to a report:
//!
//! - **Warrant requirement**: a file the reporting ESP did not view needs a
//!   warrant before opening
//! - **Access blocking**: required and not yet granted means blocked
//! - **Legal status**: aggregate summary with circuit guidance
//! - **Fail-safe output**: everything blocked when review cannot complete
//!
//! Nothing here parses report text, so embedded instructions in a report
//! cannot reach these functions.
//!
//! # Example
//!
//! ```
//! use compliance::{gate_files, ReportedFile, WarrantStatus};
//!
//! let files = vec![
//!     ReportedFile::new("a").with_esp_viewed(true, false),
//!     ReportedFile::new("b").with_warrant_status(WarrantStatus::Applied),
//! ];
//! let output = gate_files(files, Some("CA"));
//! assert!(output.legal_status.any_files_accessible);
//! assert!(output.files[1].file_access_blocked);
//! ```

pub mod circuit;
pub mod legal_status;
pub mod types;
pub mod warrant;

pub use circuit::circuit_info;
pub use legal_status::{build_blocked_output, build_legal_status, gate_files};
pub use types::*;
pub use warrant::{
    assert_accessible, enforce_file, enforce_files, file_access_blocked, warrant_required,
};
