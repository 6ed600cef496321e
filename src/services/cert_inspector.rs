//! Certificate inspection service.
//!
//! Extracts the read-only fields shown to the user and consulted by the
//! signing flow: key type and size, key usage, thumbprints and the
//! attestation flags of a key-store certificate.

use std::time::SystemTime;

use der::Decode;
use openssl::hash::MessageDigest;
use openssl::pkey::Id;
use openssl::x509::X509;
use sha2::{Digest, Sha256};
use x509_cert::ext::pkix::KeyUsage;
use x509_cert::Certificate;

use crate::domain::attestation::AttestationRecord;
use crate::domain::crypto::ChainCertificate;
use crate::infra::error::{SigningError, SigningResult};

const KEY_USAGE_OID: &str = "2.5.29.15";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKeyType {
    Ec,
    Rsa,
    Other(String),
}

impl PublicKeyType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            PublicKeyType::Ec => "EC",
            PublicKeyType::Rsa => "RSA",
            PublicKeyType::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CertificateDetails {
    pub subject: String,
    pub issuer: String,
    pub serial_number: String,
    pub not_before: SystemTime,
    pub not_after: SystemTime,
    pub key_type: PublicKeyType,
    /// Modulus size for RSA, field size for EC.
    pub key_bits: u32,
    pub ec_curve: Option<String>,
    pub key_usage: String,
    pub sha1_thumbprint: String,
    pub sha256_thumbprint: String,
    pub attestation: Option<AttestationRecord>,
}

impl CertificateDetails {
    /// `"256 bits"`-style key length.
    #[must_use]
    pub fn key_length(&self) -> String {
        format!("{} bits", self.key_bits)
    }

    /// `None` when the certificate carries no attestation record.
    #[must_use]
    pub fn requires_authentication(&self) -> Option<bool> {
        self.attestation
            .as_ref()
            .map(AttestationRecord::requires_authentication)
    }

    #[must_use]
    pub fn requires_protected_confirmation(&self) -> Option<bool> {
        self.attestation
            .as_ref()
            .map(AttestationRecord::requires_protected_confirmation)
    }
}

pub struct CertificateInspector;

impl CertificateInspector {
    pub fn inspect(certificate: &ChainCertificate) -> SigningResult<CertificateDetails> {
        let der = certificate.as_der();
        let cert = certificate.parse()?;
        let tbs = &cert.tbs_certificate;

        let (key_type, key_bits, ec_curve) = Self::public_key_info(der)?;
        let attestation = match AttestationRecord::from_certificate(&cert) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Ignoring unreadable attestation record: {e}");
                None
            }
        };

        let details = CertificateDetails {
            subject: tbs.subject.to_string(),
            issuer: tbs.issuer.to_string(),
            serial_number: hex::encode_upper(tbs.serial_number.as_bytes()),
            not_before: tbs.validity.not_before.to_system_time(),
            not_after: tbs.validity.not_after.to_system_time(),
            key_type,
            key_bits,
            ec_curve,
            key_usage: Self::key_usage_string(&cert)?,
            sha1_thumbprint: Self::sha1_thumbprint(der)?,
            sha256_thumbprint: Self::sha256_thumbprint(der),
            attestation,
        };
        log::debug!(
            "Inspected certificate {} ({} {})",
            details.subject,
            details.key_type.as_str(),
            details.key_length()
        );
        Ok(details)
    }

    /// Parse DER and inspect in one go.
    pub fn inspect_der(der: &[u8]) -> SigningResult<CertificateDetails> {
        Self::inspect(&ChainCertificate::from_der(der.to_vec()))
    }

    fn public_key_info(der: &[u8]) -> SigningResult<(PublicKeyType, u32, Option<String>)> {
        let cert = X509::from_der(der)
            .map_err(|e| SigningError::CertificateError(format!("Failed to parse certificate: {e}")))?;
        let key = cert
            .public_key()
            .map_err(|e| SigningError::CertificateError(format!("Unsupported public key: {e}")))?;
        let bits = key.bits();
        match key.id() {
            Id::EC => {
                let curve = key
                    .ec_key()
                    .ok()
                    .and_then(|ec| ec.group().curve_name())
                    .and_then(|nid| nid.short_name().ok())
                    .map(|name| match name {
                        "prime256v1" => "secp256r1".to_string(),
                        other => other.to_string(),
                    });
                Ok((PublicKeyType::Ec, bits, curve))
            }
            Id::RSA => Ok((PublicKeyType::Rsa, bits, None)),
            other => Ok((PublicKeyType::Other(format!("{other:?}")), bits, None)),
        }
    }

    /// Comma-separated key usage names, empty when the extension is absent.
    pub fn key_usage_string(certificate: &Certificate) -> SigningResult<String> {
        let Some(extensions) = certificate.tbs_certificate.extensions.as_ref() else {
            return Ok(String::new());
        };
        let Some(ext) = extensions
            .iter()
            .find(|e| e.extn_id.to_string() == KEY_USAGE_OID)
        else {
            return Ok(String::new());
        };
        let usage = KeyUsage::from_der(ext.extn_value.as_bytes())?;
        let names: Vec<&str> = [
            (usage.digital_signature(), "Digital Signature"),
            (usage.non_repudiation(), "Non Repudiation"),
            (usage.key_encipherment(), "Key Encipherment"),
            (usage.data_encipherment(), "Data Encipherment"),
            (usage.key_agreement(), "Key Agreement"),
            (usage.key_cert_sign(), "Key Cert Sign"),
            (usage.crl_sign(), "CRL Sign"),
            (usage.encipher_only(), "Encipher Only"),
            (usage.decipher_only(), "Decipher Only"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect();
        Ok(names.join(", "))
    }

    /// Uppercase hex SHA-256 over the DER encoding.
    #[must_use]
    pub fn sha256_thumbprint(der: &[u8]) -> String {
        hex::encode_upper(Sha256::digest(der))
    }

    /// Uppercase hex SHA-1 over the DER encoding.
    pub fn sha1_thumbprint(der: &[u8]) -> SigningResult<String> {
        let digest = openssl::hash::hash(MessageDigest::sha1(), der)
            .map_err(|e| SigningError::CertificateError(format!("SHA-1 unavailable: {e}")))?;
        Ok(hex::encode_upper(digest))
    }
}
