use custodian_types::Checksum;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so an audit record and a snapshot with identical bytes never
/// share a checksum.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for audit record checksums.
    pub const AUDIT: Self = Self {
        domain: "custodian-audit-v1",
    };
    /// Hasher for data snapshot checksums.
    pub const SNAPSHOT: Self = Self {
        domain: "custodian-snapshot-v1",
    };
    /// Hasher for approval payloads that get signed.
    pub const APPROVAL: Self = Self {
        domain: "custodian-approval-v1",
    };
    /// Hasher for configuration fingerprints.
    pub const POLICY: Self = Self {
        domain: "custodian-policy-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Checksum {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        Checksum::from_hash(*hasher.finalize().as_bytes())
    }

    /// Hash a serializable value as JSON with domain separation.
    ///
    /// Deterministic as long as the value's maps are ordered (`BTreeMap`).
    pub fn hash_json<T: serde::Serialize>(&self, value: &T) -> Result<Checksum, HasherError> {
        let data =
            serde_json::to_vec(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
        Ok(self.hash(&data))
    }

    /// Verify that data produces the expected checksum.
    pub fn verify(&self, data: &[u8], expected: &Checksum) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}
