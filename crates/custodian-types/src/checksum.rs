use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// A 32-byte digest stored and serialized as a lowercase hex string.
///
/// The hex form keeps persisted checksums storage-engine neutral.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// Create from a pre-computed hash.
    pub const fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// The all-zero checksum. Used as a placeholder before hashing.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex characters.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.short_hex())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<[u8; 32]> for Checksum {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let sum = Checksum::from_hash([0xab; 32]);
        let parsed = Checksum::from_hex(&sum.to_hex()).unwrap();
        assert_eq!(parsed, sum);
    }

    #[test]
    fn serializes_as_hex_string() {
        let sum = Checksum::from_hash([1; 32]);
        let json = serde_json::to_string(&sum).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(32)));
        let parsed: Checksum = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, sum);
    }

    #[test]
    fn rejects_wrong_length() {
        let err = Checksum::from_hex("abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 32,
                actual: 2
            }
        );
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(matches!(
            Checksum::from_hex("zz"),
            Err(TypeError::InvalidHex(_))
        ));
    }

    #[test]
    fn zero_checksum() {
        assert!(Checksum::zero().is_zero());
        assert!(!Checksum::from_hash([2; 32]).is_zero());
        assert_eq!(Checksum::from_hash([2; 32]).short_hex().len(), 8);
    }
}
