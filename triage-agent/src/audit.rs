//! Audit trail for pipeline stage attempts.
//!
//! One entry per stage attempt per tip. Entries are append-only and chained
//! by SHA-256 so any later edit is detectable with [`InMemoryAuditLog::verify_chain`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Hash used as `prev_hash` for the first entry.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Outcome of one stage attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    /// Stage returned its safe default
    Degraded,
    Failed,
    /// Tip was blocked for manual legal review
    Blocked,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        }
    }
}

/// Entry as submitted by the controller, before the sink assigns id,
/// timestamp and hashes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditEntry {
    pub tip_id: String,
    /// Stage name
    pub agent: String,
    pub status: AuditStatus,
    pub summary: String,
    pub error_detail: Option<String>,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl NewAuditEntry {
    pub fn new(
        tip_id: impl Into<String>,
        agent: impl Into<String>,
        status: AuditStatus,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            tip_id: tip_id.into(),
            agent: agent.into(),
            status,
            summary: summary.into(),
            error_detail: None,
            attempts: 1,
            duration_ms: 0,
        }
    }

    /// Builder: attach error detail.
    pub fn with_error(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }

    /// Builder: set attempts and duration.
    pub fn with_timing(mut self, attempts: u32, duration_ms: u64) -> Self {
        self.attempts = attempts;
        self.duration_ms = duration_ms;
        self
    }
}

/// A stored audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct AuditEntry {
    /// Unique entry ID
    pub entry_id: String,
    pub tip_id: String,
    /// Stage name
    pub agent: String,
    pub timestamp: DateTime<Utc>,
    pub status: AuditStatus,
    pub summary: String,
    pub error_detail: Option<String>,
    pub attempts: u32,
    pub duration_ms: u64,
    /// Hash of the previous entry in the log
    pub prev_hash: String,
    /// Hash of this entry's content and `prev_hash`
    pub entry_hash: String,
}

impl AuditEntry {
    fn seal(new: NewAuditEntry, prev_hash: String) -> Self {
        let mut entry = Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            tip_id: new.tip_id,
            agent: new.agent,
            timestamp: Utc::now(),
            status: new.status,
            summary: new.summary,
            error_detail: new.error_detail,
            attempts: new.attempts,
            duration_ms: new.duration_ms,
            prev_hash,
            entry_hash: String::new(),
        };
        entry.entry_hash = entry.compute_hash();
        entry
    }

    /// Recompute the hash from the entry's content.
    pub fn compute_hash(&self) -> String {
        let timestamp = self.timestamp.to_rfc3339();
        let attempts = self.attempts.to_string();
        let duration = self.duration_ms.to_string();

        let mut hasher = Sha256::new();
        for part in [
            self.prev_hash.as_str(),
            self.entry_id.as_str(),
            self.tip_id.as_str(),
            self.agent.as_str(),
            timestamp.as_str(),
            self.status.as_str(),
            self.summary.as_str(),
            self.error_detail.as_deref().unwrap_or(""),
            attempts.as_str(),
            duration.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}

/// Audit errors.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("Audit chain broken at entry {index} ({entry_id})")]
    ChainBroken { index: usize, entry_id: String },
}

/// Destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one entry. Existing entries are never modified.
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry, AuditError>;

    /// All entries for a tip, in append order.
    async fn for_tip(&self, tip_id: &str) -> Vec<AuditEntry>;
}

/// In-process audit log.
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// All entries, oldest first.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    /// Get count.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check every link and every entry hash.
    pub async fn verify_chain(&self) -> Result<(), AuditError> {
        let entries = self.entries.read().await;
        let mut expected_prev: &str = GENESIS_HASH;
        for (index, entry) in entries.iter().enumerate() {
            if entry.prev_hash != expected_prev || entry.entry_hash != entry.compute_hash() {
                return Err(AuditError::ChainBroken {
                    index,
                    entry_id: entry.entry_id.clone(),
                });
            }
            expected_prev = entry.entry_hash.as_str();
        }
        Ok(())
    }

    /// Get statistics.
    pub async fn stats(&self) -> AuditStats {
        let entries = self.entries.read().await;
        let count = |status| entries.iter().filter(|e| e.status == status).count();

        let total = entries.len();
        let avg_duration_ms = if total > 0 {
            entries.iter().map(|e| e.duration_ms).sum::<u64>() / total as u64
        } else {
            0
        };

        AuditStats {
            total_entries: total,
            succeeded: count(AuditStatus::Success),
            degraded: count(AuditStatus::Degraded),
            failed: count(AuditStatus::Failed),
            blocked: count(AuditStatus::Blocked),
            avg_duration_ms,
        }
    }
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry, AuditError> {
        let mut entries = self.entries.write().await;
        let prev_hash = entries
            .last()
            .map(|e| e.entry_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let sealed = AuditEntry::seal(entry, prev_hash);
        entries.push(sealed.clone());
        Ok(sealed)
    }

    async fn for_tip(&self, tip_id: &str) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries.iter().filter(|e| e.tip_id == tip_id).cloned().collect()
    }
}

/// Statistics from the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditStats {
    pub total_entries: usize,
    pub succeeded: usize,
    pub degraded: usize,
    pub failed: usize,
    pub blocked: usize,
    pub avg_duration_ms: u64,
}
