use custodian_crypto::{ChainError, HashChainVerifier};
use custodian_types::EntityRef;

use crate::error::VersionResult;
use crate::version::DataVersion;

/// Result of validating one entity's version history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationReport {
    pub entity: EntityRef,
    pub version_count: u64,
    pub current_count: usize,
    pub numbering_gap_free: bool,
    pub hash_chain_valid: bool,
    pub snapshots_intact: bool,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A specific integrity violation detected during validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// `0` when the violation concerns the history as a whole.
    pub version_number: u64,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    NumberingGap,
    CurrentCount,
    ParentMismatch,
    HashChainBreak,
    SnapshotChecksum,
}

/// Full integrity check of an ordered version history.
pub fn validate_history(
    entity: &EntityRef,
    versions: &[DataVersion],
) -> VersionResult<ValidationReport> {
    let mut violations = Vec::new();
    let mut numbering_gap_free = true;
    let mut snapshots_intact = true;

    if let Some((kind, description)) = structural_violation(versions) {
        numbering_gap_free = kind != ViolationKind::NumberingGap;
        violations.push(Violation {
            version_number: 0,
            kind,
            description,
        });
    }

    for (index, version) in versions.iter().enumerate() {
        let expected_parent = index.checked_sub(1).map(|i| versions[i].id);
        if version.parent_version_id != expected_parent {
            violations.push(Violation {
                version_number: version.version_number,
                kind: ViolationKind::ParentMismatch,
                description: "parent does not point at the preceding version".into(),
            });
        }

        if !version.snapshot_intact()? {
            snapshots_intact = false;
            violations.push(Violation {
                version_number: version.version_number,
                kind: ViolationKind::SnapshotChecksum,
                description: "snapshot checksum does not match stored checksum".into(),
            });
        }
    }

    let hash_chain_valid = match HashChainVerifier::verify_chain(versions) {
        Ok(()) => true,
        Err(err) => {
            let index = match err {
                ChainError::GenesisHasPrevHash => 0,
                ChainError::BrokenLink { index }
                | ChainError::MissingPrevHash { index }
                | ChainError::HashMismatch { index } => index,
            };
            violations.push(Violation {
                version_number: versions.get(index).map_or(0, |v| v.version_number),
                kind: ViolationKind::HashChainBreak,
                description: err.to_string(),
            });
            false
        }
    };

    Ok(ValidationReport {
        entity: entity.clone(),
        version_count: versions.len() as u64,
        current_count: versions.iter().filter(|v| v.is_current_version).count(),
        numbering_gap_free,
        hash_chain_valid,
        snapshots_intact,
        violations,
    })
}

/// The cheap check run before every write: numbering starts at 1 with no
/// gaps and exactly one version is current.
pub(crate) fn structural_violation(versions: &[DataVersion]) -> Option<(ViolationKind, String)> {
    for (index, version) in versions.iter().enumerate() {
        let expected = index as u64 + 1;
        if version.version_number != expected {
            return Some((
                ViolationKind::NumberingGap,
                format!("expected version {expected}, found {}", version.version_number),
            ));
        }
    }

    if versions.is_empty() {
        return None;
    }
    let current = versions.iter().filter(|v| v.is_current_version).count();
    if current != 1 {
        return Some((
            ViolationKind::CurrentCount,
            format!("{current} current versions, expected exactly 1"),
        ));
    }
    None
}
