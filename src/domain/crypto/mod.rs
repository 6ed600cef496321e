//! Foundational cryptographic domain types.
//!
//! Provides strongly-typed wrappers for cryptographic artifacts:
//! - Certificate chains (leaf first) as handed out by the key store
//! - Raw signature values with the name of the producing algorithm
//! - Signature algorithm identifiers and their registry
//!
//! Nothing here performs signing; signatures are produced elsewhere and
//! only described by these types.

mod algorithm;
mod cert;
mod signature;

pub use algorithm::{AlgorithmIdentifier, AlgorithmRegistry, SignatureAlgorithm};
pub use cert::{CertificateChain, ChainCertificate};
pub use signature::RawSignature;
