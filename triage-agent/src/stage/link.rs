//! Linking and deconfliction against an in-memory case index.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};

use super::{LinkingStage, StageOutcome};
use crate::analysis::{DeconflictionMatch, TipLinks};
use crate::tip::Tip;

/// A case held by another agency, registered for deconfliction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenCase {
    pub agency: String,
    pub case_number: String,
    /// Usernames, emails or IP addresses tied to the case subject
    pub identifiers: Vec<String>,
    /// Case is under active investigation
    pub active: bool,
    pub contact: Option<String>,
}

/// Links tips that share subject identifiers and checks them against
/// registered cases.
///
/// Identifiers come from the extraction output already merged into the
/// tip, compared case-insensitively. Every linked tip is indexed, so later
/// tips sharing an identifier link back to it.
#[derive(Debug, Default)]
pub struct CaseIndexLinker {
    cases: DashMap<String, OpenCase>,
    tips_by_identifier: DashMap<String, BTreeSet<String>>,
}

impl CaseIndexLinker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a case.
    pub fn register_case(&self, case: OpenCase) {
        self.cases.insert(case.case_number.clone(), case);
    }

    /// Index a tip so later tips can link to it.
    pub fn record_tip(&self, tip: &Tip) {
        for identifier in Self::identifiers(tip) {
            self.tips_by_identifier
                .entry(identifier)
                .or_default()
                .insert(tip.tip_id.clone());
        }
    }

    fn normalize(identifier: &str) -> String {
        identifier.trim().to_ascii_lowercase()
    }

    fn identifiers(tip: &Tip) -> BTreeSet<String> {
        let Some(entities) = &tip.entities else {
            return BTreeSet::new();
        };
        entities
            .subjects
            .iter()
            .flat_map(|s| s.usernames.iter().chain(&s.emails).chain(&s.ip_addresses))
            .map(|i| Self::normalize(i))
            .filter(|i| !i.is_empty())
            .collect()
    }
}

#[async_trait]
impl LinkingStage for CaseIndexLinker {
    async fn link(&self, tip: &Tip) -> StageOutcome<TipLinks> {
        let identifiers = Self::identifiers(tip);

        let mut related = BTreeSet::new();
        for identifier in &identifiers {
            if let Some(tips) = self.tips_by_identifier.get(identifier) {
                related.extend(tips.iter().filter(|id| **id != tip.tip_id).cloned());
            }
        }

        let mut deconfliction_matches: Vec<DeconflictionMatch> = self
            .cases
            .iter()
            .filter(|case| {
                case.identifiers
                    .iter()
                    .any(|i| identifiers.contains(&Self::normalize(i)))
            })
            .map(|case| DeconflictionMatch {
                agency: case.agency.clone(),
                case_number: Some(case.case_number.clone()),
                active_investigation: case.active,
                contact: case.contact.clone(),
            })
            .collect();
        deconfliction_matches.sort_by(|a, b| a.case_number.cmp(&b.case_number));
        self.record_tip(tip);

        for m in deconfliction_matches.iter().filter(|m| m.active_investigation) {
            warn!(tip_id = %tip.tip_id, agency = %m.agency, "Active investigation conflict");
        }
        info!(
            tip_id = %tip.tip_id,
            related = related.len(),
            conflicts = deconfliction_matches.len(),
            "Linking complete"
        );

        StageOutcome::ok(
            TipLinks {
                related_tip_ids: related.into_iter().collect(),
                deconfliction_matches,
                degraded: false,
            },
            1,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ExtractedEntities, Subject};
    use crate::tip::TipSource;

    fn tip_with_username(id: &str, username: &str) -> Tip {
        let mut tip = Tip::new(TipSource::Ncmec, "body");
        tip.tip_id = id.to_string();
        tip.entities = Some(ExtractedEntities {
            subjects: vec![Subject {
                usernames: vec![username.to_string()],
                ..Default::default()
            }],
            ..Default::default()
        });
        tip
    }

    #[tokio::test]
    async fn test_links_prior_tips() {
        let linker = CaseIndexLinker::new();
        linker.record_tip(&tip_with_username("t1", "Predator99"));
        linker.record_tip(&tip_with_username("t2", "someone_else"));

        let outcome = linker.link(&tip_with_username("t3", "predator99")).await;
        assert_eq!(outcome.value.related_tip_ids, vec!["t1".to_string()]);
        assert!(outcome.value.deconfliction_matches.is_empty());
    }

    #[tokio::test]
    async fn test_linked_tips_are_indexed() {
        let linker = CaseIndexLinker::new();
        let first = linker.link(&tip_with_username("t1", "shared_handle")).await;
        assert!(first.value.related_tip_ids.is_empty());

        let second = linker.link(&tip_with_username("t2", "Shared_Handle")).await;
        assert_eq!(second.value.related_tip_ids, vec!["t1".to_string()]);

        // Relinking a tip never links it to itself
        let again = linker.link(&tip_with_username("t1", "shared_handle")).await;
        assert_eq!(again.value.related_tip_ids, vec!["t2".to_string()]);
    }

    #[tokio::test]
    async fn test_deconfliction_hit() {
        let linker = CaseIndexLinker::new();
        linker.register_case(OpenCase {
            agency: "HSI Los Angeles".to_string(),
            case_number: "HSI-2024-01".to_string(),
            identifiers: vec!["PREDATOR99".to_string()],
            active: true,
            contact: Some("SA Doe".to_string()),
        });

        let outcome = linker.link(&tip_with_username("t9", "predator99")).await;
        let links = outcome.value;
        assert_eq!(links.deconfliction_matches.len(), 1);
        assert_eq!(links.active_conflicts().count(), 1);
        assert_eq!(links.deconfliction_matches[0].agency, "HSI Los Angeles");
    }

    #[tokio::test]
    async fn test_no_entities_no_links() {
        let linker = CaseIndexLinker::new();
        let outcome = linker.link(&Tip::new(TipSource::Public, "body")).await;
        assert!(outcome.value.related_tip_ids.is_empty());
        assert!(outcome.value.deconfliction_matches.is_empty());
    }
}
