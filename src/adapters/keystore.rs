//! Hardware-backed key store interface.
//!
//! The orchestrator and the provisioner depend on this trait, never on a
//! concrete store. Implementations classify their failures at this
//! boundary: missing isolation hardware is reported as
//! `SigningError::CapabilityUnavailable`, everything else as a fatal kind.

use std::collections::BTreeSet;

use crate::domain::crypto::{CertificateChain, RawSignature};
use crate::domain::keys::{AuthorizationRequirement, ProtectionLevel, SigningKeyDescriptor};
use crate::infra::error::SigningResult;

/// Use of one stored private key.
///
/// Private key material never leaves the store; a handle can only produce
/// signatures.
pub trait KeyHandle: Send + Sync {
    fn alias(&self) -> &str;

    /// Registered name of the algorithm [`Self::sign`] uses.
    fn algorithm_name(&self) -> &str;

    /// Protection level the key was actually generated at.
    fn protection_level(&self) -> ProtectionLevel;

    /// Conditions the store enforces before signing.
    fn requirements(&self) -> &BTreeSet<AuthorizationRequirement>;

    fn requires(&self, requirement: AuthorizationRequirement) -> bool {
        self.requirements().contains(&requirement)
    }

    /// Sign `data` (hash-and-sign with the key's algorithm).
    ///
    /// # Errors
    /// `SignatureError` if the store refuses or fails the operation.
    fn sign(&self, data: &[u8]) -> SigningResult<RawSignature>;
}

/// Capability-based secure key store.
pub trait KeyStore: Send + Sync {
    /// Generate a key as described, replacing any key under the same alias.
    ///
    /// # Errors
    /// `CapabilityUnavailable` when the requested protection level is not
    /// available on this device; `KeyStoreError`/`ValidationError` otherwise.
    fn generate(&self, descriptor: &SigningKeyDescriptor) -> SigningResult<Box<dyn KeyHandle>>;

    /// Certificate chain of `alias`, leaf first.
    fn get_chain(&self, alias: &str) -> SigningResult<CertificateChain>;

    /// Remove `alias`; `false` if it did not exist.
    fn delete(&self, alias: &str) -> SigningResult<bool>;

    fn list_aliases(&self) -> SigningResult<Vec<String>>;

    /// Signing handle for an existing key.
    fn key_handle(&self, alias: &str) -> SigningResult<Box<dyn KeyHandle>>;

    fn has_key(&self, alias: &str) -> SigningResult<bool> {
        Ok(self.list_aliases()?.iter().any(|a| a == alias))
    }
}
