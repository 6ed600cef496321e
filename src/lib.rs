//! Confirm Signer Library
//!
//! Produces detached PKCS#7 signed messages over text a user confirmed on a
//! trusted display. A hardware-held key signs the confirmed bytes directly;
//! the container is assembled afterwards around that raw signature and the
//! key's certificate chain.
//!
//! Layers:
//! - [`domain`]: data types, DER/CBOR helpers, protocol states
//! - [`services`]: packaging, PEM framing, key provisioning, inspection
//! - [`adapters`]: key store, confirmation, authorization and delivery
//! - [`pipelines`]: the signing protocol and the registration flow
//! - [`infra`]: errors and configuration

pub mod adapters;
pub mod domain;
pub mod infra;
pub mod pipelines;
pub mod services;

pub use domain::crypto::{
    AlgorithmIdentifier, AlgorithmRegistry, CertificateChain, ChainCertificate, RawSignature,
    SignatureAlgorithm,
};
pub use domain::keys::{
    AuthorizationRequirement, KeyKind, ProtectionLevel, SigningKeyDescriptor, ValidityWindow,
};
pub use domain::pkcs7::SignedMessage;
pub use domain::protocol::{FailureReason, ProtocolState};
pub use domain::questionnaire::Question;
pub use infra::config::{AppConfiguration, ConfigManager};
pub use infra::error::{SigningError, SigningResult};
pub use pipelines::{ConfirmationSigningProtocol, RegistrationFlow, SigningOutcome};
pub use services::pkcs7_builder::DetachedSignaturePackager;
pub use services::provisioner::KeyProvisioner;

/// Package an externally produced signature over `content` as detached
/// PKCS#7 PEM text.
///
/// # Errors
/// `PackagingError` for an empty chain, an empty signature or an
/// unregistered algorithm name.
pub fn package_detached_pem(
    content: &[u8],
    signature: &RawSignature,
    chain: &CertificateChain,
) -> SigningResult<String> {
    let message = DetachedSignaturePackager::new().package_bytes(content, signature, chain)?;
    Ok(services::pem::encode_pkcs7_pem(message.as_der()))
}
