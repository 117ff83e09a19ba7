//! Cryptographic primitives for Custodian.
//!
//! Provides domain-separated BLAKE3 checksums for audit records and
//! snapshots, hash-chain verification for version histories, and Ed25519
//! signing for approval decisions.
//!
//! All crypto operations wrap established libraries; no custom cryptography.

pub mod chain;
pub mod hasher;
pub mod signer;

pub use chain::{ChainError, ChainLink, HashChainVerifier};
pub use hasher::{ContentHasher, HasherError};
pub use signer::{Signature, SignatureError, SigningKey, VerifyingKey};
