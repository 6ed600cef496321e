//! Key provisioning with a bounded protection fallback.
//!
//! The policy is an ordered list of acceptable protection levels, tried
//! top-down. Only a capability-unavailable failure moves on to the next
//! level; any other error stops immediately. The list never holds more than
//! two levels, so a key is weakened by at most one step.

use std::fmt;

use crate::adapters::keystore::{KeyHandle, KeyStore};
use crate::domain::keys::{ProtectionLevel, SigningKeyDescriptor};
use crate::infra::error::SigningError;

/// One generation attempt, kept for the provisioning log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionAttempt {
    pub level: ProtectionLevel,
    pub error: Option<SigningError>,
}

impl fmt::Display for ProvisionAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(f, "generated key at {} level", self.level),
            Some(e) => write!(f, "generation at {} level failed: {e}", self.level),
        }
    }
}

/// Successful provisioning.
pub struct Provisioned {
    /// Descriptor as realized, reflecting any downgrade.
    pub descriptor: SigningKeyDescriptor,
    pub key: Box<dyn KeyHandle>,
    pub attempts: Vec<ProvisionAttempt>,
}

impl Provisioned {
    /// Whether the key ended up below the requested level.
    #[must_use]
    pub fn downgraded(&self) -> bool {
        self.attempts
            .first()
            .is_some_and(|first| first.level != self.descriptor.protection_level())
    }

    /// Human-readable attempt log, one line per attempt.
    #[must_use]
    pub fn log(&self) -> String {
        render_log(&self.attempts)
    }
}

impl fmt::Debug for Provisioned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provisioned")
            .field("alias", &self.descriptor.alias())
            .field("level", &self.descriptor.protection_level())
            .field("attempts", &self.attempts.len())
            .finish()
    }
}

/// Failed provisioning with everything that was tried.
#[derive(Debug, Clone, thiserror::Error)]
#[error("key provisioning failed: {error}")]
pub struct ProvisionError {
    pub error: SigningError,
    pub attempts: Vec<ProvisionAttempt>,
}

impl ProvisionError {
    #[must_use]
    pub fn log(&self) -> String {
        render_log(&self.attempts)
    }
}

impl From<ProvisionError> for SigningError {
    fn from(e: ProvisionError) -> Self {
        e.error
    }
}

pub type ProvisionResult = Result<Provisioned, ProvisionError>;

fn render_log(attempts: &[ProvisionAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ordered acceptable protection levels, strongest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningPolicy {
    levels: Vec<ProtectionLevel>,
}

impl ProvisioningPolicy {
    /// Requested level, then one step down only when the request is a
    /// dedicated secure element.
    #[must_use]
    pub fn for_level(requested: ProtectionLevel) -> Self {
        let mut levels = vec![requested];
        if requested == ProtectionLevel::HardwareIsolatedWithDedicatedSecureElement {
            levels.extend(requested.downgrade());
        }
        Self { levels }
    }

    /// Exactly the requested level.
    #[must_use]
    pub fn strict(requested: ProtectionLevel) -> Self {
        Self {
            levels: vec![requested],
        }
    }

    #[must_use]
    pub fn levels(&self) -> &[ProtectionLevel] {
        &self.levels
    }
}

pub struct KeyProvisioner<'a> {
    store: &'a dyn KeyStore,
}

impl<'a> KeyProvisioner<'a> {
    #[must_use]
    pub fn new(store: &'a dyn KeyStore) -> Self {
        Self { store }
    }

    /// Generate a key for `descriptor` using the default policy.
    pub fn provision(&self, descriptor: &SigningKeyDescriptor) -> ProvisionResult {
        self.provision_with_policy(
            descriptor,
            &ProvisioningPolicy::for_level(descriptor.protection_level()),
        )
    }

    pub fn provision_with_policy(
        &self,
        descriptor: &SigningKeyDescriptor,
        policy: &ProvisioningPolicy,
    ) -> ProvisionResult {
        let mut attempts = Vec::with_capacity(policy.levels().len());
        let mut last_error = None;

        for &level in policy.levels() {
            let candidate = descriptor.with_protection_level(level);
            log::info!(
                "Generating key '{}' at {level} level",
                candidate.alias()
            );
            match self.store.generate(&candidate) {
                Ok(key) => {
                    attempts.push(ProvisionAttempt { level, error: None });
                    if level != descriptor.protection_level() {
                        log::warn!(
                            "Key '{}' provisioned at {level} instead of {}",
                            candidate.alias(),
                            descriptor.protection_level()
                        );
                    }
                    return Ok(Provisioned {
                        descriptor: candidate,
                        key,
                        attempts,
                    });
                }
                Err(error) => {
                    log::warn!("Key generation at {level} level failed: {error}");
                    attempts.push(ProvisionAttempt {
                        level,
                        error: Some(error.clone()),
                    });
                    let recoverable = error.is_recoverable();
                    last_error = Some(error);
                    if !recoverable {
                        break;
                    }
                }
            }
        }

        Err(ProvisionError {
            error: last_error.unwrap_or_else(|| {
                SigningError::ValidationError("provisioning policy has no levels".to_string())
            }),
            attempts,
        })
    }
}
