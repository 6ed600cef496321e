//! Signer capability consumed by the packager, and the adapter that turns a
//! signature produced elsewhere into such a signer.

use crate::domain::crypto::{AlgorithmIdentifier, AlgorithmRegistry, RawSignature};
use crate::infra::error::SigningResult;

/// What the packager needs from a signer: an algorithm identifier and the
/// signature over the content.
pub trait ContentSigner {
    fn algorithm_identifier(&self) -> &AlgorithmIdentifier;

    /// Signature covering `content` directly (no signed attributes).
    fn signature(&self, content: &[u8]) -> SigningResult<Vec<u8>>;
}

/// Signer backed by bytes computed outside the packager.
///
/// Holds no key and performs no cryptography; the content passed to
/// [`ContentSigner::signature`] is ignored and the stored bytes returned
/// as-is.
#[derive(Debug, Clone)]
pub struct ExternalSignatureAdapter {
    algorithm: AlgorithmIdentifier,
    signature: RawSignature,
}

impl ExternalSignatureAdapter {
    /// # Errors
    /// `AlgorithmNotFound` if the signature's algorithm name is not registered.
    pub fn new(signature: RawSignature) -> SigningResult<Self> {
        let algorithm = AlgorithmRegistry::resolve(signature.algorithm())?;
        Ok(Self {
            algorithm,
            signature,
        })
    }

    /// # Errors
    /// `AlgorithmNotFound` if `algorithm_name` is not registered.
    pub fn from_parts(algorithm_name: &str, signature: Vec<u8>) -> SigningResult<Self> {
        Self::new(RawSignature::new(algorithm_name, signature))
    }

    #[must_use]
    pub fn raw_signature(&self) -> &RawSignature {
        &self.signature
    }
}

impl ContentSigner for ExternalSignatureAdapter {
    fn algorithm_identifier(&self) -> &AlgorithmIdentifier {
        &self.algorithm
    }

    fn signature(&self, _content: &[u8]) -> SigningResult<Vec<u8>> {
        Ok(self.signature.as_slice().to_vec())
    }
}
