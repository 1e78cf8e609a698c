//! Hash lookup stage against an in-memory known-hash set.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;

use super::{HashOsintStage, StageOutcome};
use crate::analysis::{HashMatch, HashMatchResults, HashSource};
use crate::tip::Tip;

#[derive(Debug, Clone)]
struct KnownHash {
    source: HashSource,
    category: Option<String>,
}

/// Matches ESP-supplied file digests against known hashes.
///
/// Only the digest reported by the ESP is compared; file content is never
/// read, so blocked files are looked up too. A match on a blocked file is
/// grounds to apply for a warrant, not to open the file.
#[derive(Debug, Default)]
pub struct KnownHashLookup {
    known: DashMap<String, KnownHash>,
}

impl KnownHashLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a known hash (case-insensitive).
    pub fn insert(&self, hash: &str, source: HashSource, category: Option<String>) {
        self.known
            .insert(hash.trim().to_ascii_lowercase(), KnownHash { source, category });
    }

    /// Builder: add a known hash.
    pub fn with_hash(self, hash: &str, source: HashSource, category: Option<&str>) -> Self {
        self.insert(hash, source, category.map(String::from));
        self
    }

    /// Number of known hashes.
    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

#[async_trait]
impl HashOsintStage for KnownHashLookup {
    async fn lookup(&self, tip: &Tip) -> StageOutcome<HashMatchResults> {
        let matches: Vec<HashMatch> = tip
            .files
            .iter()
            .filter_map(|file| {
                let hash = file.hash.as_ref()?;
                let known = self.known.get(&hash.trim().to_ascii_lowercase())?;
                Some(HashMatch {
                    file_id: file.file_id.clone(),
                    hash: hash.clone(),
                    source: known.source,
                    category: known.category.clone(),
                })
            })
            .collect();

        info!(tip_id = %tip.tip_id, matches = matches.len(), "Hash lookup complete");

        StageOutcome::ok(
            HashMatchResults {
                matches,
                ..Default::default()
            },
            1,
        )
    }
}
