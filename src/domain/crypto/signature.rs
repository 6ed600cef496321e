use std::fmt;

/// Opaque signature bytes plus the name of the algorithm that produced them.
///
/// No internal structure is assumed; for ECDSA the bytes are typically the
/// DER `Ecdsa-Sig-Value` returned by the key store.
#[derive(Clone, Eq, PartialEq)]
pub struct RawSignature {
    algorithm: String,
    bytes: Box<[u8]>,
}

impl RawSignature {
    #[must_use]
    pub fn new(algorithm: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            algorithm: algorithm.into(),
            bytes: bytes.into_boxed_slice(),
        }
    }
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for RawSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RawSignature(algo={}, len={})",
            self.algorithm,
            self.bytes.len()
        )
    }
}
