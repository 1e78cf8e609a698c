//! Federal circuit lookup for a jurisdiction.

use crate::types::CircuitInfo;

/// Circuits where United States v. Wilson is binding precedent.
const BINDING_CIRCUITS: &[&str] = &["Ninth Circuit"];

/// State/territory postal code to federal circuit.
const CIRCUIT_TABLE: &[(&str, &str)] = &[
    ("ME", "First Circuit"),
    ("MA", "First Circuit"),
    ("NH", "First Circuit"),
    ("RI", "First Circuit"),
    ("PR", "First Circuit"),
    ("CT", "Second Circuit"),
    ("NY", "Second Circuit"),
    ("VT", "Second Circuit"),
    ("DE", "Third Circuit"),
    ("NJ", "Third Circuit"),
    ("PA", "Third Circuit"),
    ("VI", "Third Circuit"),
    ("MD", "Fourth Circuit"),
    ("NC", "Fourth Circuit"),
    ("SC", "Fourth Circuit"),
    ("VA", "Fourth Circuit"),
    ("WV", "Fourth Circuit"),
    ("LA", "Fifth Circuit"),
    ("MS", "Fifth Circuit"),
    ("TX", "Fifth Circuit"),
    ("KY", "Sixth Circuit"),
    ("MI", "Sixth Circuit"),
    ("OH", "Sixth Circuit"),
    ("TN", "Sixth Circuit"),
    ("IL", "Seventh Circuit"),
    ("IN", "Seventh Circuit"),
    ("WI", "Seventh Circuit"),
    ("AR", "Eighth Circuit"),
    ("IA", "Eighth Circuit"),
    ("MN", "Eighth Circuit"),
    ("MO", "Eighth Circuit"),
    ("NE", "Eighth Circuit"),
    ("ND", "Eighth Circuit"),
    ("SD", "Eighth Circuit"),
    ("AK", "Ninth Circuit"),
    ("AZ", "Ninth Circuit"),
    ("CA", "Ninth Circuit"),
    ("HI", "Ninth Circuit"),
    ("ID", "Ninth Circuit"),
    ("MT", "Ninth Circuit"),
    ("NV", "Ninth Circuit"),
    ("OR", "Ninth Circuit"),
    ("WA", "Ninth Circuit"),
    ("GU", "Ninth Circuit"),
    ("MP", "Ninth Circuit"),
    ("CO", "Tenth Circuit"),
    ("KS", "Tenth Circuit"),
    ("NM", "Tenth Circuit"),
    ("OK", "Tenth Circuit"),
    ("UT", "Tenth Circuit"),
    ("WY", "Tenth Circuit"),
    ("AL", "Eleventh Circuit"),
    ("FL", "Eleventh Circuit"),
    ("GA", "Eleventh Circuit"),
    ("DC", "D.C. Circuit"),
];

/// Look up the circuit for a state code (case-insensitive).
///
/// Unknown codes are treated like any non-binding circuit.
pub fn circuit_info(state_code: &str) -> CircuitInfo {
    let code = state_code.trim().to_ascii_uppercase();
    let name = CIRCUIT_TABLE
        .iter()
        .find(|(state, _)| *state == code)
        .map(|(_, circuit)| (*circuit).to_string())
        .unwrap_or_else(|| "Unknown circuit".to_string());

    if BINDING_CIRCUITS.contains(&name.as_str()) {
        CircuitInfo {
            note: format!(
                "United States v. Wilson (9th Cir. 2021) is binding in the {}: \
                 files the ESP did not view require a warrant before opening.",
                name
            ),
            name,
            binding: true,
        }
    } else {
        CircuitInfo {
            note: format!(
                "Wilson is not binding in the {} ({}); apply the same rule and \
                 consult the U.S. Attorney's office before opening unviewed files.",
                name, code
            ),
            name,
            binding: false,
        }
    }
}
