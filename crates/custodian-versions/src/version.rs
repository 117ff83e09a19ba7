use chrono::{DateTime, Utc};
use custodian_audit::AuditRecord;
use custodian_crypto::{ChainLink, ContentHasher};
use custodian_types::{AuditId, Checksum, EntityRef, Record, VersionId};
use serde::{Deserialize, Serialize};

use crate::error::VersionResult;

/// A full-state snapshot of one entity at a version boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataVersion {
    pub id: VersionId,
    /// The audited mutation that produced this version.
    pub audit_id: AuditId,
    pub entity_ref: EntityRef,
    /// Gap-free per entity, starting at 1.
    pub version_number: u64,
    pub data_snapshot: Record,
    /// `None` for version 1.
    pub parent_version_id: Option<VersionId>,
    pub merge_source_versions: Vec<u64>,
    pub is_current_version: bool,
    /// BLAKE3 of the canonical snapshot bytes.
    pub checksum: Checksum,
    pub chain_hash: Checksum,
    pub prev_chain_hash: Option<Checksum>,
    /// Produced by a deletion; `data_snapshot` is empty.
    pub tombstone: bool,
    /// Target version number when this version was produced by a rollback.
    pub rolled_back_from: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl DataVersion {
    /// The snapshot, or `None` if the entity was deleted at this version.
    pub fn snapshot(&self) -> Option<&Record> {
        (!self.tombstone).then_some(&self.data_snapshot)
    }

    pub fn is_merge(&self) -> bool {
        !self.merge_source_versions.is_empty()
    }

    pub fn is_rollback(&self) -> bool {
        self.rolled_back_from.is_some()
    }

    /// Returns `true` if the stored checksum matches the snapshot.
    pub fn snapshot_intact(&self) -> VersionResult<bool> {
        Ok(snapshot_checksum(&self.data_snapshot)? == self.checksum)
    }
}

impl ChainLink for DataVersion {
    fn chain_hash(&self) -> Checksum {
        self.chain_hash
    }

    fn prev_chain_hash(&self) -> Option<Checksum> {
        self.prev_chain_hash
    }

    fn payload_bytes(&self) -> Vec<u8> {
        chain_payload(self.version_number, &self.checksum, self.tombstone)
    }
}

pub(crate) fn snapshot_checksum(snapshot: &Record) -> VersionResult<Checksum> {
    Ok(ContentHasher::SNAPSHOT.hash(&snapshot.canonical_bytes()?))
}

pub(crate) fn chain_payload(version_number: u64, checksum: &Checksum, tombstone: bool) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(8 + 32 + 1);
    bytes.extend_from_slice(&version_number.to_be_bytes());
    bytes.extend_from_slice(checksum.as_bytes());
    bytes.push(u8::from(tombstone));
    bytes
}

/// A version together with the audit record written for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedVersion {
    pub version: DataVersion,
    pub audit: AuditRecord,
}
