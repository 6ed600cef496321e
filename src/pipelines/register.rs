//! `RegistrationFlow` provisions the signing key from persisted preferences.
//!
//! Steps: obtain an attestation challenge, build the key descriptor,
//! provision with the bounded fallback, and persist the realized settings
//! so later registrations do not retry hardware the device lacks.
//!
//! This is the only writer of `key_generation`: new preferences passed to
//! [`RegistrationFlow::with_preferences`] are saved once a key was made
//! with them.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::adapters::backend_client::BackendClient;
use crate::adapters::keystore::KeyStore;
use crate::domain::crypto::CertificateChain;
use crate::domain::keys::ProtectionLevel;
use crate::infra::config::{AppConfiguration, ConfigManager, KeyGenerationConfig};
use crate::services::provisioner::KeyProvisioner;
use crate::SigningResult;

#[derive(Debug)]
pub struct RegistrationReport {
    pub alias: String,
    pub challenge: String,
    pub protection_level: ProtectionLevel,
    pub downgraded: bool,
    /// One line per generation attempt.
    pub attempts_log: String,
    pub chain: CertificateChain,
}

pub struct RegistrationFlow<'a> {
    store: &'a dyn KeyStore,
    config_manager: &'a ConfigManager,
    backend: Option<BackendClient>,
    preferences: Option<KeyGenerationConfig>,
}

impl<'a> RegistrationFlow<'a> {
    #[must_use]
    pub fn new(store: &'a dyn KeyStore, config_manager: &'a ConfigManager) -> Self {
        Self {
            store,
            config_manager,
            backend: None,
            preferences: None,
        }
    }

    /// Generate with these key preferences instead of the persisted ones.
    #[must_use]
    pub fn with_preferences(mut self, preferences: KeyGenerationConfig) -> Self {
        self.preferences = Some(preferences);
        self
    }

    /// Fetch challenges from `backend` instead of generating them locally.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendClient) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Generate the key described by `config`.
    ///
    /// On success the preferences used are saved, with
    /// `strong_box_required` cleared after a protection downgrade. Nothing
    /// is saved when provisioning fails.
    ///
    /// # Errors
    /// The provisioning error after the attempt log has been written, or a
    /// configuration/key store error.
    pub async fn register(
        &self,
        config: &mut AppConfiguration,
        challenge: Option<String>,
    ) -> SigningResult<RegistrationReport> {
        let challenge = match (challenge, &self.backend) {
            (Some(challenge), _) => challenge,
            (None, Some(backend)) => backend.fetch_challenge().await,
            (None, None) => uuid::Uuid::new_v4().to_string(),
        };

        let mut realized = config.clone();
        if let Some(preferences) = &self.preferences {
            realized.key_generation = preferences.clone();
            ConfigManager::validate_config(&realized)?;
        }

        let descriptor = realized.key_descriptor(challenge.as_bytes())?;
        let provisioned = match KeyProvisioner::new(self.store).provision(&descriptor) {
            Ok(provisioned) => provisioned,
            Err(e) => {
                log::error!("Key registration failed:\n{}", e.log());
                return Err(e.into());
            }
        };
        log::info!("Provisioning log:\n{}", provisioned.log());

        let downgraded = provisioned.downgraded();
        if downgraded && realized.key_generation.strong_box_required {
            realized.key_generation.strong_box_required = false;
            log::info!("Secure element unavailable; future keys use hardware isolation");
        }
        if realized.key_generation != config.key_generation {
            self.config_manager.save(&realized)?;
            *config = realized;
        }

        let chain = self.store.get_chain(descriptor.alias())?;
        log_chain(&chain);

        Ok(RegistrationReport {
            alias: descriptor.alias().to_string(),
            challenge,
            protection_level: provisioned.descriptor.protection_level(),
            downgraded,
            attempts_log: provisioned.log(),
            chain,
        })
    }
}

fn log_chain(chain: &CertificateChain) {
    for (index, cert) in chain.certificates().iter().enumerate() {
        match cert.parse() {
            Ok(parsed) => {
                let tbs = &parsed.tbs_certificate;
                log::info!(
                    "Chain[{index}] subject: {}, public key: {}",
                    tbs.subject,
                    STANDARD.encode(tbs.subject_public_key_info.subject_public_key.raw_bytes())
                );
            }
            Err(e) => log::warn!("Chain[{index}] unparsable: {e}"),
        }
    }
}
