//! PKCS#7 `SignedData` domain wrappers.
//!
//! [`SignedMessage`] keeps the encoded container together with the logical
//! fields it was built from, so callers can inspect the signer identifier,
//! algorithm and signature without re-parsing the DER.

use std::fmt;

use crate::domain::crypto::{AlgorithmIdentifier, CertificateChain, RawSignature};
use crate::domain::{constants, der};

// Incremental component wrappers to decouple assembly steps.
pub struct Pkcs7DigestAlgorithms {
    der: Vec<u8>,
} // SET OF AlgorithmIdentifier
pub struct Pkcs7EncapsulatedContentInfo {
    der: Vec<u8>,
} // id-data, content present or detached
pub struct Pkcs7Certificates {
    der: Vec<u8>,
} // [0] IMPLICIT SET OF Certificate
pub struct Pkcs7SignerInfos {
    der: Vec<u8>,
} // SET OF SignerInfo

macro_rules! der_component {
    ($($ty:ty),*) => {$(
        impl $ty {
            #[must_use]
            pub fn from_der(der: Vec<u8>) -> Self {
                Self { der }
            }
            #[must_use]
            pub fn as_der(&self) -> &[u8] {
                &self.der
            }
        }
    )*};
}

der_component!(
    Pkcs7DigestAlgorithms,
    Pkcs7EncapsulatedContentInfo,
    Pkcs7Certificates,
    Pkcs7SignerInfos
);

/// Issuer name + serial number of the leaf certificate.
#[derive(Clone, PartialEq, Eq)]
pub struct SignerIdentifier {
    issuer_der: Vec<u8>,
    serial_der: Vec<u8>,
}

impl SignerIdentifier {
    /// From the DER of the issuer `Name` and of the serial `INTEGER`.
    #[must_use]
    pub fn new(issuer_der: Vec<u8>, serial_der: Vec<u8>) -> Self {
        Self {
            issuer_der,
            serial_der,
        }
    }

    #[must_use]
    pub fn issuer_der(&self) -> &[u8] {
        &self.issuer_der
    }

    #[must_use]
    pub fn serial_der(&self) -> &[u8] {
        &self.serial_der
    }

    /// `IssuerAndSerialNumber` SEQUENCE.
    #[must_use]
    pub fn to_der(&self) -> Vec<u8> {
        der::constructed(
            constants::ASN1_SEQUENCE_TAG,
            &[&self.issuer_der, &self.serial_der],
        )
    }
}

impl fmt::Debug for SignerIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SignerIdentifier(issuer_len={}, serial={})",
            self.issuer_der.len(),
            hex::encode(&self.serial_der)
        )
    }
}

/// Finished detached-signature container.
pub struct SignedMessage {
    der: Vec<u8>,
    certificates: CertificateChain,
    signer: SignerIdentifier,
    algorithm: AlgorithmIdentifier,
    signature: RawSignature,
    content: Option<Vec<u8>>,
}

impl SignedMessage {
    #[must_use]
    pub fn new(
        der: Vec<u8>,
        certificates: CertificateChain,
        signer: SignerIdentifier,
        algorithm: AlgorithmIdentifier,
        signature: RawSignature,
        content: Option<Vec<u8>>,
    ) -> Self {
        Self {
            der,
            certificates,
            signer,
            algorithm,
            signature,
            content,
        }
    }

    /// Encoded `ContentInfo`.
    #[must_use]
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.der.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.der.is_empty()
    }
    #[must_use]
    pub fn certificates(&self) -> &CertificateChain {
        &self.certificates
    }
    #[must_use]
    pub fn signer(&self) -> &SignerIdentifier {
        &self.signer
    }
    #[must_use]
    pub fn algorithm(&self) -> &AlgorithmIdentifier {
        &self.algorithm
    }
    #[must_use]
    pub fn signature(&self) -> &RawSignature {
        &self.signature
    }
    /// Embedded content, `None` when detached.
    #[must_use]
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.content.is_none()
    }
}

impl fmt::Debug for SignedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SignedMessage(len={}, certs={}, alg={}, detached={})",
            self.der.len(),
            self.certificates.len(),
            self.algorithm,
            self.is_detached()
        )
    }
}
