//! Signature algorithm identifiers and the name → identifier registry.
//!
//! The registry is a static table. Lookups are case-insensitive and unknown
//! names are an error; there is no fallback algorithm.

use std::fmt;

use crate::domain::{constants, der};
use crate::infra::error::{SigningError, SigningResult};

/// Signature algorithms the packager knows how to describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    EcdsaWithSha256,
    RsaWithSha256,
    RsaWithSha1,
}

impl SignatureAlgorithm {
    /// Canonical display name.
    #[must_use]
    pub fn canonical_name(&self) -> &'static str {
        match self {
            SignatureAlgorithm::EcdsaWithSha256 => "ECDSA-with-SHA-256",
            SignatureAlgorithm::RsaWithSha256 => "RSA-with-SHA-256",
            SignatureAlgorithm::RsaWithSha1 => "RSA-with-SHA-1",
        }
    }

    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(
            self,
            SignatureAlgorithm::RsaWithSha256 | SignatureAlgorithm::RsaWithSha1
        )
    }

    /// Name of the digest this signature scheme hashes with.
    #[must_use]
    pub fn digest_name(&self) -> &'static str {
        match self {
            SignatureAlgorithm::EcdsaWithSha256 | SignatureAlgorithm::RsaWithSha256 => "SHA-256",
            SignatureAlgorithm::RsaWithSha1 => "SHA-1",
        }
    }
}

/// Algorithm identifier as required by the signed-data format.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmIdentifier {
    algorithm: SignatureAlgorithm,
    signature_oid: &'static [u8],
    digest_oid: &'static [u8],
}

impl AlgorithmIdentifier {
    const fn new(algorithm: SignatureAlgorithm) -> Self {
        let (signature_oid, digest_oid) = match algorithm {
            SignatureAlgorithm::EcdsaWithSha256 => (
                constants::ECDSA_WITH_SHA256_OID,
                constants::SHA256_ALGORITHM_OID,
            ),
            SignatureAlgorithm::RsaWithSha256 => (
                constants::SHA256_WITH_RSA_OID,
                constants::SHA256_ALGORITHM_OID,
            ),
            SignatureAlgorithm::RsaWithSha1 => (
                constants::SHA1_WITH_RSA_OID,
                constants::SHA1_ALGORITHM_OID,
            ),
        };
        Self {
            algorithm,
            signature_oid,
            digest_oid,
        }
    }

    #[must_use]
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Canonical signature OID content octets.
    #[must_use]
    pub fn signature_oid(&self) -> &'static [u8] {
        self.signature_oid
    }

    /// Canonical signature OID in dotted form, e.g. `1.2.840.10045.4.3.2`.
    #[must_use]
    pub fn signature_oid_dotted(&self) -> String {
        der::oid_to_dotted(self.signature_oid)
    }

    /// Digest OID content octets implied by the signature algorithm.
    #[must_use]
    pub fn digest_oid(&self) -> &'static [u8] {
        self.digest_oid
    }

    /// DER `AlgorithmIdentifier` for `digestAlgorithms` / `SignerInfo.digestAlgorithm`.
    #[must_use]
    pub fn digest_algorithm_der(&self) -> Vec<u8> {
        der::algorithm_identifier(self.digest_oid, true)
    }

    /// DER `AlgorithmIdentifier` for `SignerInfo.signatureAlgorithm`.
    ///
    /// RSA signers are described as `rsaEncryption` with NULL parameters;
    /// ECDSA keeps its combined OID and carries no parameters.
    #[must_use]
    pub fn signer_info_algorithm_der(&self) -> Vec<u8> {
        if self.algorithm.is_rsa() {
            der::algorithm_identifier(constants::RSA_ENCRYPTION_OID, true)
        } else {
            der::algorithm_identifier(self.signature_oid, false)
        }
    }
}

impl fmt::Debug for AlgorithmIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AlgorithmIdentifier({}, {})",
            self.algorithm.canonical_name(),
            self.signature_oid_dotted()
        )
    }
}

impl fmt::Display for AlgorithmIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.algorithm.canonical_name())
    }
}

/// Registered names, canonical spellings first, then JCA-style aliases.
const REGISTRY: &[(&str, SignatureAlgorithm)] = &[
    ("ECDSA-with-SHA-256", SignatureAlgorithm::EcdsaWithSha256),
    ("RSA-with-SHA-256", SignatureAlgorithm::RsaWithSha256),
    ("RSA-with-SHA-1", SignatureAlgorithm::RsaWithSha1),
    ("SHA256withECDSA", SignatureAlgorithm::EcdsaWithSha256),
    ("SHA256withRSA", SignatureAlgorithm::RsaWithSha256),
    ("SHA1withRSA", SignatureAlgorithm::RsaWithSha1),
];

/// Static name → identifier lookup.
pub struct AlgorithmRegistry;

impl AlgorithmRegistry {
    /// Resolve an algorithm name (case-insensitive).
    ///
    /// # Errors
    /// `SigningError::AlgorithmNotFound` for any unregistered name.
    pub fn resolve(name: &str) -> SigningResult<AlgorithmIdentifier> {
        let needle = name.trim();
        REGISTRY
            .iter()
            .find(|(registered, _)| registered.eq_ignore_ascii_case(needle))
            .map(|(_, algorithm)| AlgorithmIdentifier::new(*algorithm))
            .ok_or_else(|| {
                SigningError::AlgorithmNotFound(format!(
                    "AlgorithmIdentifier '{name}' is not registered"
                ))
            })
    }

    /// All names the registry accepts.
    pub fn supported_names() -> impl Iterator<Item = &'static str> {
        REGISTRY.iter().map(|(name, _)| *name)
    }

    /// Identifier for a known algorithm variant.
    #[must_use]
    pub fn identifier_for(algorithm: SignatureAlgorithm) -> AlgorithmIdentifier {
        AlgorithmIdentifier::new(algorithm)
    }
}
