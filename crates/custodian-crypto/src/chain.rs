use custodian_types::Checksum;

/// An element of a hash-linked history (one data version).
pub trait ChainLink {
    /// The link's own chain hash.
    fn chain_hash(&self) -> Checksum;
    /// The previous link's chain hash (None for the first version).
    fn prev_chain_hash(&self) -> Option<Checksum>;
    /// Canonical payload bytes committed to by this link.
    fn payload_bytes(&self) -> Vec<u8>;
}

/// Hash chain integrity verifier.
///
/// Verifies that a sequence of links forms a valid chain: each link's
/// previous hash matches the preceding link's hash, and each link's hash is
/// correctly computed from its payload.
pub struct HashChainVerifier;

impl HashChainVerifier {
    /// Verify an ordered chain of links.
    ///
    /// Checks:
    /// 1. First link has no previous hash
    /// 2. Each subsequent link's previous hash matches the preceding chain hash
    /// 3. Each link's hash is correct for its payload
    pub fn verify_chain(links: &[impl ChainLink]) -> Result<(), ChainError> {
        let Some(first) = links.first() else {
            return Ok(());
        };

        if first.prev_chain_hash().is_some() {
            return Err(ChainError::GenesisHasPrevHash);
        }
        if Self::compute_hash(&first.payload_bytes(), None) != first.chain_hash() {
            return Err(ChainError::HashMismatch { index: 0 });
        }

        for i in 1..links.len() {
            let expected_prev = links[i - 1].chain_hash();
            match links[i].prev_chain_hash() {
                Some(prev) if prev == expected_prev => {}
                Some(_) => return Err(ChainError::BrokenLink { index: i }),
                None => return Err(ChainError::MissingPrevHash { index: i }),
            }

            let computed = Self::compute_hash(&links[i].payload_bytes(), Some(expected_prev));
            if computed != links[i].chain_hash() {
                return Err(ChainError::HashMismatch { index: i });
            }
        }

        Ok(())
    }

    /// Compute the chain hash for a payload and optional previous hash.
    pub fn compute_hash(payload: &[u8], prev_hash: Option<Checksum>) -> Checksum {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"custodian-chain-v1:");
        if let Some(prev) = prev_hash {
            hasher.update(prev.as_bytes());
        }
        hasher.update(payload);
        Checksum::from_hash(*hasher.finalize().as_bytes())
    }
}

/// Errors from chain verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("first version has a previous hash (should be None)")]
    GenesisHasPrevHash,

    #[error("broken link at index {index}: previous hash does not match")]
    BrokenLink { index: usize },

    #[error("missing previous hash at index {index}")]
    MissingPrevHash { index: usize },

    #[error("hash mismatch at index {index}: computed hash differs from stored")]
    HashMismatch { index: usize },
}
