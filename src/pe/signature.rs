//! Authenticode signatures and COFF symbols.
//!
//! Only the digest side of signature verification lives in the core:
//! [`crate::pe::Binary::verify_signature`] recomputes the authentihash and
//! compares it with the signed content-info digest. Certificate-chain and
//! counter-signature checks belong to an external verifier.

use crate::pe::authentihash::Algorithm;
use alloc::string::String;
use alloc::vec::Vec;
use bitflags::bitflags;

bitflags! {
    /// Outcome of a signature verification. Empty means OK.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VerificationFlags: u32 {
        const INVALID_SIGNER        = 1 << 0;
        const UNSUPPORTED_ALGORITHM = 1 << 1;
        const INCONSISTENT_DIGEST_ALGORITHM = 1 << 2;
        const BAD_DIGEST            = 1 << 3;
        const BAD_SIGNATURE         = 1 << 4;
        const NO_SIGNATURE          = 1 << 5;
    }
}

bitflags! {
    /// What [`crate::pe::Binary::verify_signature`] should check.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VerificationChecks: u32 {
        /// Only compare the authentihash with the signed digest.
        const HASH_ONLY = 1 << 0;
    }
}

/// One Authenticode signature: the digest algorithm and the digest signed
/// into the PKCS#7 content info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    digest_algorithm: Algorithm,
    content_digest: Vec<u8>,
}

impl Signature {
    pub fn new(digest_algorithm: Algorithm, content_digest: Vec<u8>) -> Self {
        Self {
            digest_algorithm,
            content_digest,
        }
    }

    #[inline]
    pub fn digest_algorithm(&self) -> Algorithm {
        self.digest_algorithm
    }

    /// The digest carried by the signed content info.
    #[inline]
    pub fn content_digest(&self) -> &[u8] {
        &self.content_digest
    }
}

/// One COFF symbol-table entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Symbol {
    name: String,
    value: u64,
    section_number: i16,
}

impl Symbol {
    pub fn new(name: impl Into<String>, value: u64) -> Self {
        Self {
            name: name.into(),
            value,
            section_number: 0,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn value(&self) -> u64 {
        self.value
    }

    #[inline]
    pub fn section_number(&self) -> i16 {
        self.section_number
    }

    pub fn set_section_number(&mut self, number: i16) {
        self.section_number = number;
    }
}
