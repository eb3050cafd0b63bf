//! Soft-delete tombstones and their audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MemoryId, MemoryRecord};

/// A retained, recoverable copy of a soft-deleted memory.
///
/// Every field of the original record is kept as a typed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tombstone {
    pub record: MemoryRecord,
    pub reason: String,
    pub deleted_at: DateTime<Utc>,
    /// Snapshot file written before the delete, or `tombstone:<id>`
    /// when no backup directory is configured.
    pub backup_ref: String,
}

impl Tombstone {
    pub fn memory_id(&self) -> MemoryId {
        self.record.id
    }
}

/// Kind of audited lifecycle action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SoftDelete,
    Restore,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SoftDelete => "soft_delete",
            Self::Restore => "restore",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "soft_delete" => Some(Self::SoftDelete),
            "restore" => Some(Self::Restore),
            _ => None,
        }
    }
}

/// One row of the deletion audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub memory_id: MemoryId,
    pub action: AuditAction,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}
