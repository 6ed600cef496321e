//! Signing key descriptors and their building blocks.
//!
//! A [`SigningKeyDescriptor`] is what the registration flow submits to the
//! key store. Once built it is immutable; a provisioning downgrade produces
//! a new descriptor via [`SigningKeyDescriptor::with_protection_level`].

use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::infra::error::{SigningError, SigningResult};

/// Isolation strength of key storage, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtectionLevel {
    /// Ordinary OS-protected storage.
    Standard,
    /// Isolated execution environment (TEE).
    HardwareIsolated,
    /// Dedicated secure element (StrongBox).
    #[serde(rename = "secure-element")]
    HardwareIsolatedWithDedicatedSecureElement,
}

impl ProtectionLevel {
    /// The next weaker level, if any.
    #[must_use]
    pub fn downgrade(self) -> Option<Self> {
        match self {
            ProtectionLevel::HardwareIsolatedWithDedicatedSecureElement => {
                Some(ProtectionLevel::HardwareIsolated)
            }
            ProtectionLevel::HardwareIsolated => Some(ProtectionLevel::Standard),
            ProtectionLevel::Standard => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtectionLevel::Standard => "standard",
            ProtectionLevel::HardwareIsolated => "hardware-isolated",
            ProtectionLevel::HardwareIsolatedWithDedicatedSecureElement => "secure-element",
        }
    }
}

impl fmt::Display for ProtectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProtectionLevel {
    type Err = SigningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(ProtectionLevel::Standard),
            "hardware-isolated" | "tee" => Ok(ProtectionLevel::HardwareIsolated),
            "secure-element" | "strongbox" => {
                Ok(ProtectionLevel::HardwareIsolatedWithDedicatedSecureElement)
            }
            other => Err(SigningError::ValidationError(format!(
                "unknown protection level: {other}"
            ))),
        }
    }
}

/// Asymmetric key type and size.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KeyKind {
    Ec { curve: String },
    Rsa { bits: u32 },
}

impl KeyKind {
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, KeyKind::Rsa { .. })
    }

    /// Default signature algorithm name for keys of this kind.
    #[must_use]
    pub fn signature_algorithm_name(&self) -> &'static str {
        signature_algorithm_for(self)
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Ec { curve } => write!(f, "EC ({curve})"),
            KeyKind::Rsa { bits } => write!(f, "RSA ({bits} bits)"),
        }
    }
}

/// RSA keys sign with SHA256withRSA, everything else with SHA256withECDSA.
#[must_use]
pub fn signature_algorithm_for(kind: &KeyKind) -> &'static str {
    match kind {
        KeyKind::Rsa { .. } => "SHA256withRSA",
        KeyKind::Ec { .. } => "SHA256withECDSA",
    }
}

/// Conditions the key store enforces before the key may sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthorizationRequirement {
    RequiresUnlockedDevice,
    RequiresUserAuthentication,
    RequiresTrustedConfirmation,
}

/// Validity period placed into the key's certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityWindow {
    not_before: SystemTime,
    not_after: SystemTime,
}

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

impl ValidityWindow {
    /// # Errors
    /// `ValidationError` when `not_after` is not later than `not_before`.
    pub fn new(not_before: SystemTime, not_after: SystemTime) -> SigningResult<Self> {
        if not_after <= not_before {
            return Err(SigningError::ValidationError(
                "validity end must be after its start".to_string(),
            ));
        }
        Ok(Self {
            not_before,
            not_after,
        })
    }

    /// `years` calendar years (365 days each) from `start`; zero means 24 hours.
    #[must_use]
    pub fn years_from(start: SystemTime, years: u32) -> Self {
        let span = if years == 0 {
            Duration::from_secs(SECONDS_PER_DAY)
        } else {
            Duration::from_secs(u64::from(years) * 365 * SECONDS_PER_DAY)
        };
        Self {
            not_before: start,
            not_after: start + span,
        }
    }

    #[must_use]
    pub fn not_before(&self) -> SystemTime {
        self.not_before
    }

    #[must_use]
    pub fn not_after(&self) -> SystemTime {
        self.not_after
    }

    /// Length of the window.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.not_after
            .duration_since(self.not_before)
            .unwrap_or_default()
    }
}

/// Everything the key store needs to generate one signing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKeyDescriptor {
    alias: String,
    subject: String,
    protection_level: ProtectionLevel,
    key_kind: KeyKind,
    requirements: BTreeSet<AuthorizationRequirement>,
    validity: ValidityWindow,
    challenge: Vec<u8>,
}

impl SigningKeyDescriptor {
    #[must_use]
    pub fn builder(alias: impl Into<String>) -> SigningKeyDescriptorBuilder {
        SigningKeyDescriptorBuilder::new(alias)
    }

    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Distinguished name of the generated certificate.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn protection_level(&self) -> ProtectionLevel {
        self.protection_level
    }

    #[must_use]
    pub fn key_kind(&self) -> &KeyKind {
        &self.key_kind
    }

    #[must_use]
    pub fn requirements(&self) -> &BTreeSet<AuthorizationRequirement> {
        &self.requirements
    }

    #[must_use]
    pub fn requires(&self, requirement: AuthorizationRequirement) -> bool {
        self.requirements.contains(&requirement)
    }

    #[must_use]
    pub fn validity(&self) -> &ValidityWindow {
        &self.validity
    }

    /// Attestation challenge embedded at generation time.
    #[must_use]
    pub fn challenge(&self) -> &[u8] {
        &self.challenge
    }

    /// Copy of this descriptor at a different protection level.
    #[must_use]
    pub fn with_protection_level(&self, level: ProtectionLevel) -> Self {
        Self {
            protection_level: level,
            ..self.clone()
        }
    }
}

/// Certificate subject used for generated keys.
#[must_use]
pub fn subject_for(display_name: &str) -> String {
    format!("CN={display_name}, OU=SecureVote, OU=BFH, C=CH")
}

pub struct SigningKeyDescriptorBuilder {
    alias: String,
    subject: Option<String>,
    protection_level: ProtectionLevel,
    key_kind: KeyKind,
    requirements: BTreeSet<AuthorizationRequirement>,
    validity: Option<ValidityWindow>,
    challenge: Vec<u8>,
}

impl SigningKeyDescriptorBuilder {
    fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            subject: None,
            protection_level: ProtectionLevel::HardwareIsolated,
            key_kind: KeyKind::Ec {
                curve: "secp256r1".to_string(),
            },
            requirements: BTreeSet::new(),
            validity: None,
            challenge: Vec::new(),
        }
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[must_use]
    pub fn protection_level(mut self, level: ProtectionLevel) -> Self {
        self.protection_level = level;
        self
    }

    #[must_use]
    pub fn key_kind(mut self, kind: KeyKind) -> Self {
        self.key_kind = kind;
        self
    }

    #[must_use]
    pub fn require(mut self, requirement: AuthorizationRequirement) -> Self {
        self.requirements.insert(requirement);
        self
    }

    #[must_use]
    pub fn validity(mut self, validity: ValidityWindow) -> Self {
        self.validity = Some(validity);
        self
    }

    #[must_use]
    pub fn challenge(mut self, challenge: impl Into<Vec<u8>>) -> Self {
        self.challenge = challenge.into();
        self
    }

    /// # Errors
    /// `ValidationError` for an empty alias, an empty curve name or an RSA
    /// modulus below 1024 bits.
    pub fn build(self) -> SigningResult<SigningKeyDescriptor> {
        if self.alias.trim().is_empty() {
            return Err(SigningError::ValidationError(
                "key alias must not be empty".to_string(),
            ));
        }
        match &self.key_kind {
            KeyKind::Ec { curve } if curve.trim().is_empty() => {
                return Err(SigningError::ValidationError(
                    "EC curve name must not be empty".to_string(),
                ));
            }
            KeyKind::Rsa { bits } if *bits < 1024 => {
                return Err(SigningError::ValidationError(format!(
                    "RSA modulus of {bits} bits is too small"
                )));
            }
            _ => {}
        }
        let subject = self
            .subject
            .unwrap_or_else(|| subject_for(&self.alias));
        let validity = self
            .validity
            .unwrap_or_else(|| ValidityWindow::years_from(SystemTime::now(), 0));
        Ok(SigningKeyDescriptor {
            alias: self.alias,
            subject,
            protection_level: self.protection_level,
            key_kind: self.key_kind,
            requirements: self.requirements,
            validity,
            challenge: self.challenge,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downgrade_walks_one_step_at_a_time() {
        let top = ProtectionLevel::HardwareIsolatedWithDedicatedSecureElement;
        assert_eq!(top.downgrade(), Some(ProtectionLevel::HardwareIsolated));
        assert_eq!(
            ProtectionLevel::HardwareIsolated.downgrade(),
            Some(ProtectionLevel::Standard)
        );
        assert_eq!(ProtectionLevel::Standard.downgrade(), None);
        assert!(top > ProtectionLevel::HardwareIsolated);
    }

    #[test]
    fn zero_years_is_one_day() {
        let start = SystemTime::UNIX_EPOCH;
        let w = ValidityWindow::years_from(start, 0);
        assert_eq!(w.duration(), Duration::from_secs(SECONDS_PER_DAY));
        let w3 = ValidityWindow::years_from(start, 3);
        assert_eq!(w3.duration(), Duration::from_secs(3 * 365 * SECONDS_PER_DAY));
    }

    #[test]
    fn inverted_window_rejected() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        assert!(ValidityWindow::new(t, SystemTime::UNIX_EPOCH).is_err());
        assert!(ValidityWindow::new(t, t).is_err());
    }

    #[test]
    fn builder_defaults_and_validation() {
        let d = SigningKeyDescriptor::builder("alias")
            .subject(subject_for("APC Demo App"))
            .require(AuthorizationRequirement::RequiresTrustedConfirmation)
            .challenge(b"abc".to_vec())
            .build()
            .unwrap();
        assert_eq!(d.subject(), "CN=APC Demo App, OU=SecureVote, OU=BFH, C=CH");
        assert!(d.requires(AuthorizationRequirement::RequiresTrustedConfirmation));
        assert!(!d.requires(AuthorizationRequirement::RequiresUserAuthentication));
        assert_eq!(d.challenge(), b"abc");

        assert!(SigningKeyDescriptor::builder(" ").build().is_err());
        assert!(SigningKeyDescriptor::builder("a")
            .key_kind(KeyKind::Rsa { bits: 512 })
            .build()
            .is_err());
    }

    #[test]
    fn relaxed_copy_keeps_everything_else() {
        let d = SigningKeyDescriptor::builder("alias")
            .protection_level(ProtectionLevel::HardwareIsolatedWithDedicatedSecureElement)
            .key_kind(KeyKind::Rsa { bits: 2048 })
            .build()
            .unwrap();
        let relaxed = d.with_protection_level(ProtectionLevel::HardwareIsolated);
        assert_eq!(relaxed.protection_level(), ProtectionLevel::HardwareIsolated);
        assert_eq!(relaxed.key_kind(), d.key_kind());
        assert_eq!(relaxed.alias(), d.alias());
        assert_eq!(relaxed.validity(), d.validity());
    }

    #[test]
    fn algorithm_follows_key_kind() {
        assert_eq!(
            signature_algorithm_for(&KeyKind::Rsa { bits: 2048 }),
            "SHA256withRSA"
        );
        assert_eq!(
            KeyKind::Ec {
                curve: "secp256r1".into()
            }
            .signature_algorithm_name(),
            "SHA256withECDSA"
        );
    }
}
