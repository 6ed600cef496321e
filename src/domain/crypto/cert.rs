use std::fmt;

use der::Decode;

use crate::infra::error::{SigningError, SigningResult};

/// One DER-encoded certificate of a chain.
#[derive(Clone, PartialEq, Eq)]
pub struct ChainCertificate {
    der: Box<[u8]>,
}

/// Ordered certificate chain, leaf first, ending at the root.
///
/// Owned by the key store; the core only reads it. Empty chains can be
/// represented so that callers fail loudly instead of panicking.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CertificateChain {
    certs: Vec<ChainCertificate>,
}

impl ChainCertificate {
    #[must_use]
    pub fn from_der(der: Vec<u8>) -> Self {
        Self {
            der: der.into_boxed_slice(),
        }
    }
    #[must_use]
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    /// Parse into a structured X.509 certificate.
    pub fn parse(&self) -> SigningResult<x509_cert::Certificate> {
        x509_cert::Certificate::from_der(&self.der).map_err(|e| {
            SigningError::CertificateError(format!("Failed to parse certificate: {e}"))
        })
    }
}

impl CertificateChain {
    #[must_use]
    pub fn new(certs: Vec<ChainCertificate>) -> Self {
        Self { certs }
    }

    /// Build from raw DER blobs, leaf first.
    #[must_use]
    pub fn from_der_list(list: Vec<Vec<u8>>) -> Self {
        Self {
            certs: list.into_iter().map(ChainCertificate::from_der).collect(),
        }
    }

    #[must_use]
    pub fn leaf(&self) -> Option<&ChainCertificate> {
        self.certs.first()
    }
    #[must_use]
    pub fn root(&self) -> Option<&ChainCertificate> {
        self.certs.last()
    }
    #[must_use]
    pub fn certificates(&self) -> &[ChainCertificate] {
        &self.certs
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.certs.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }
}

impl fmt::Debug for ChainCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainCertificate(len={})", self.der.len())
    }
}
impl fmt::Debug for CertificateChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CertificateChain(certs={}, leaf_len={})",
            self.certs.len(),
            self.leaf().map_or(0, |c| c.der.len())
        )
    }
}
