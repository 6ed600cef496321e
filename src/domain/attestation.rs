//! Read-only view of the key attestation record embedded in a leaf
//! certificate (extension `1.3.6.1.4.1.11129.2.1.17`).
//!
//! Only the fields the signing flow consults are decoded. Unknown
//! authorization tags are skipped.

use x509_cert::Certificate;

use crate::domain::constants;
use crate::domain::der::{DerReader, TagClass, Tlv};
use crate::infra::error::{SigningError, SigningResult};

/// Where an attested property is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityLevel {
    Software,
    TrustedEnvironment,
    StrongBox,
    Unknown(u64),
}

impl From<u64> for SecurityLevel {
    fn from(value: u64) -> Self {
        match value {
            0 => SecurityLevel::Software,
            1 => SecurityLevel::TrustedEnvironment,
            2 => SecurityLevel::StrongBox,
            other => SecurityLevel::Unknown(other),
        }
    }
}

/// Subset of a keymaster `AuthorizationList`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationList {
    pub purposes: Vec<u64>,
    pub algorithm: Option<u64>,
    pub key_size: Option<u64>,
    pub ec_curve: Option<u64>,
    pub no_auth_required: bool,
    pub user_auth_type: Option<u64>,
    pub trusted_confirmation_required: bool,
    pub unlocked_device_required: bool,
}

impl AuthorizationList {
    fn parse(list: &Tlv<'_>) -> SigningResult<Self> {
        let mut out = AuthorizationList::default();
        let mut reader = list.children();
        while !reader.is_empty() {
            let entry = reader.read()?;
            if entry.class != TagClass::ContextSpecific {
                continue;
            }
            match entry.number {
                constants::KM_TAG_PURPOSE => {
                    let set = inner(&entry)?;
                    let mut items = set.children();
                    while !items.is_empty() {
                        out.purposes.push(items.read()?.as_u64()?);
                    }
                }
                constants::KM_TAG_ALGORITHM => out.algorithm = Some(inner(&entry)?.as_u64()?),
                constants::KM_TAG_KEY_SIZE => out.key_size = Some(inner(&entry)?.as_u64()?),
                constants::KM_TAG_EC_CURVE => out.ec_curve = Some(inner(&entry)?.as_u64()?),
                constants::KM_TAG_NO_AUTH_REQUIRED => out.no_auth_required = true,
                constants::KM_TAG_USER_AUTH_TYPE => {
                    out.user_auth_type = Some(inner(&entry)?.as_u64()?);
                }
                constants::KM_TAG_TRUSTED_CONFIRMATION_REQUIRED => {
                    out.trusted_confirmation_required = true;
                }
                constants::KM_TAG_UNLOCKED_DEVICE_REQUIRED => out.unlocked_device_required = true,
                _ => {}
            }
        }
        Ok(out)
    }
}

/// Explicitly tagged entries wrap exactly one inner element.
fn inner<'a>(entry: &Tlv<'a>) -> SigningResult<Tlv<'a>> {
    entry.children().read()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationRecord {
    pub attestation_version: u64,
    pub attestation_security_level: SecurityLevel,
    pub keymaster_version: u64,
    pub keymaster_security_level: SecurityLevel,
    pub challenge: Vec<u8>,
    pub software_enforced: AuthorizationList,
    pub tee_enforced: AuthorizationList,
}

impl AttestationRecord {
    /// Decode a `KeyDescription` from the extension's OCTET STRING content.
    ///
    /// # Errors
    /// `CertificateError` if the record is not the expected SEQUENCE, or
    /// `Asn1Error` for malformed DER.
    pub fn parse(extension_value: &[u8]) -> SigningResult<Self> {
        let mut outer = DerReader::new(extension_value);
        let seq = outer.read()?;
        if !seq.is_universal(0x10) || !seq.constructed {
            return Err(SigningError::CertificateError(
                "attestation record is not a SEQUENCE".to_string(),
            ));
        }
        let mut fields = seq.children();
        let attestation_version = fields.read()?.as_u64()?;
        let attestation_security_level = SecurityLevel::from(fields.read()?.as_u64()?);
        let keymaster_version = fields.read()?.as_u64()?;
        let keymaster_security_level = SecurityLevel::from(fields.read()?.as_u64()?);
        let challenge = fields.read()?.value.to_vec();
        let _unique_id = fields.read()?;
        let software_enforced = AuthorizationList::parse(&fields.read()?)?;
        let tee_enforced = AuthorizationList::parse(&fields.read()?)?;
        Ok(Self {
            attestation_version,
            attestation_security_level,
            keymaster_version,
            keymaster_security_level,
            challenge,
            software_enforced,
            tee_enforced,
        })
    }

    /// Locate and decode the record in `cert`; `Ok(None)` if it has none.
    pub fn from_certificate(cert: &Certificate) -> SigningResult<Option<Self>> {
        let Some(extensions) = cert.tbs_certificate.extensions.as_ref() else {
            return Ok(None);
        };
        for ext in extensions {
            if ext.extn_id.to_string() == constants::KEY_ATTESTATION_EXTENSION_OID {
                return Self::parse(ext.extn_value.as_bytes()).map(Some);
            }
        }
        Ok(None)
    }

    /// Signing needs user authentication unless the hardware-enforced list
    /// says `noAuthRequired`.
    #[must_use]
    pub fn requires_authentication(&self) -> bool {
        !self.tee_enforced.no_auth_required
    }

    #[must_use]
    pub fn requires_protected_confirmation(&self) -> bool {
        self.tee_enforced.trusted_confirmation_required
    }

    #[must_use]
    pub fn requires_unlocked_device(&self) -> bool {
        self.tee_enforced.unlocked_device_required
    }
}
