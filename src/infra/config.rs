//! Configuration management infrastructure.
//!
//! Persists key-generation preferences, backend endpoints and packaging
//! options. Only the registration flow writes `key_generation`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::domain::constants::{DEFAULT_KEY_ALIAS, DEFAULT_KEY_DISPLAY_NAME};
use crate::domain::keys::{
    subject_for, AuthorizationRequirement, KeyKind, ProtectionLevel, SigningKeyDescriptor,
    ValidityWindow,
};
use crate::infra::error::{SigningError, SigningResult};

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfiguration {
    /// Key store alias of the signing key
    pub key_alias: String,

    /// Name placed into the certificate subject CN
    pub key_display_name: String,

    pub key_generation: KeyGenerationConfig,

    pub backend: BackendConfig,

    pub packaging: PackagingConfig,

    pub key_store: KeyStoreConfig,
}

/// Preferences read when a key is generated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyGenerationConfig {
    /// "EC" or "RSA"
    pub key_type: String,
    pub ec_curve: String,
    pub rsa_key_bits: u32,
    /// Certificate validity in years; 0 means 24 hours
    pub validity_years: u32,
    pub user_confirmation_required: bool,
    pub unlock_device_required: bool,
    pub user_authentication_required: bool,
    /// Request a dedicated secure element; cleared after a downgrade
    pub strong_box_required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub uuid_path: String,
    pub p7m_path: String,
    pub failure_path: String,
    pub questions_path: String,
    pub post_timeout_ms: u64,
    pub challenge_timeout_ms: u64,
    /// Network delivery configured; otherwise results go to the clipboard
    pub connected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagingConfig {
    /// Embed the confirmed content instead of leaving it detached
    pub encapsulate_content: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyStoreConfig {
    /// Directory of the software key store; empty means next to the config
    pub directory: String,
    /// Strongest level the software store claims to offer
    pub max_protection_level: ProtectionLevel,
}

impl Default for AppConfiguration {
    fn default() -> Self {
        Self {
            key_alias: DEFAULT_KEY_ALIAS.to_string(),
            key_display_name: DEFAULT_KEY_DISPLAY_NAME.to_string(),
            key_generation: KeyGenerationConfig::default(),
            backend: BackendConfig::default(),
            packaging: PackagingConfig::default(),
            key_store: KeyStoreConfig::default(),
        }
    }
}

impl Default for KeyGenerationConfig {
    fn default() -> Self {
        Self {
            key_type: "EC".to_string(),
            ec_curve: "secp256r1".to_string(),
            rsa_key_bits: 2048,
            validity_years: 3,
            user_confirmation_required: true,
            unlock_device_required: true,
            user_authentication_required: false,
            strong_box_required: true,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://apc.ti.bfh.ch".to_string(),
            uuid_path: "/api/uuid".to_string(),
            p7m_path: "/api/p7m".to_string(),
            failure_path: "/api/failure".to_string(),
            questions_path: "/api/questions".to_string(),
            post_timeout_ms: 2000,
            challenge_timeout_ms: 400,
            connected: false,
        }
    }
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            directory: String::new(),
            max_protection_level: ProtectionLevel::HardwareIsolated,
        }
    }
}

impl KeyGenerationConfig {
    /// Key kind from `key_type` and the matching size field.
    pub fn key_kind(&self) -> SigningResult<KeyKind> {
        match self.key_type.to_ascii_uppercase().as_str() {
            "EC" => Ok(KeyKind::Ec {
                curve: self.ec_curve.clone(),
            }),
            "RSA" => Ok(KeyKind::Rsa {
                bits: self.rsa_key_bits,
            }),
            other => Err(SigningError::ConfigurationError(format!(
                "Unsupported key type: {other} (expected EC or RSA)"
            ))),
        }
    }

    #[must_use]
    pub fn protection_level(&self) -> ProtectionLevel {
        if self.strong_box_required {
            ProtectionLevel::HardwareIsolatedWithDedicatedSecureElement
        } else {
            ProtectionLevel::HardwareIsolated
        }
    }
}

impl BackendConfig {
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    #[must_use]
    pub fn uuid_url(&self) -> String {
        self.endpoint(&self.uuid_path)
    }

    #[must_use]
    pub fn p7m_url(&self) -> String {
        self.endpoint(&self.p7m_path)
    }

    #[must_use]
    pub fn failure_url(&self) -> String {
        self.endpoint(&self.failure_path)
    }

    #[must_use]
    pub fn questions_url(&self) -> String {
        self.endpoint(&self.questions_path)
    }

    #[must_use]
    pub fn post_timeout(&self) -> Duration {
        Duration::from_millis(self.post_timeout_ms)
    }

    #[must_use]
    pub fn challenge_timeout(&self) -> Duration {
        Duration::from_millis(self.challenge_timeout_ms)
    }
}

impl AppConfiguration {
    /// Descriptor for a new key generated now with `challenge` embedded.
    pub fn key_descriptor(&self, challenge: &[u8]) -> SigningResult<SigningKeyDescriptor> {
        let generation = &self.key_generation;
        let mut builder = SigningKeyDescriptor::builder(&self.key_alias)
            .subject(subject_for(&self.key_display_name))
            .protection_level(generation.protection_level())
            .key_kind(generation.key_kind()?)
            .validity(ValidityWindow::years_from(
                SystemTime::now(),
                generation.validity_years,
            ))
            .challenge(challenge.to_vec());
        if generation.user_confirmation_required {
            builder = builder.require(AuthorizationRequirement::RequiresTrustedConfirmation);
        }
        if generation.unlock_device_required {
            builder = builder.require(AuthorizationRequirement::RequiresUnlockedDevice);
        }
        if generation.user_authentication_required {
            builder = builder.require(AuthorizationRequirement::RequiresUserAuthentication);
        }
        builder.build()
    }
}

/// Configuration manager for handling config files
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new configuration manager with default path
    pub fn new() -> SigningResult<Self> {
        let config_path = Self::default_config_path()?;
        Ok(Self { config_path })
    }

    /// Create a configuration manager with custom path
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    pub fn default_config_path() -> SigningResult<PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            Ok(config_dir.join("confirm-signer").join("config.toml"))
        } else {
            Ok(PathBuf::from("confirm-signer-config.toml"))
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub fn load_or_create_default(&self) -> SigningResult<AppConfiguration> {
        if self.config_path.exists() {
            self.load()
        } else {
            log::info!(
                "Configuration file not found, creating default: {}",
                self.config_path.display()
            );
            let default_config = AppConfiguration::default();
            self.save(&default_config)?;
            Ok(default_config)
        }
    }

    pub fn load(&self) -> SigningResult<AppConfiguration> {
        log::debug!("Loading configuration from: {}", self.config_path.display());

        let content = fs::read_to_string(&self.config_path).map_err(|e| {
            SigningError::ConfigurationError(format!(
                "Failed to read config file {}: {}",
                self.config_path.display(),
                e
            ))
        })?;

        let config: AppConfiguration = toml::from_str(&content).map_err(|e| {
            SigningError::ConfigurationError(format!("Failed to parse config file: {e}"))
        })?;

        Self::validate_config(&config)?;
        Ok(config)
    }

    pub fn save(&self, config: &AppConfiguration) -> SigningResult<()> {
        Self::validate_config(config)?;
        log::info!("Saving configuration to: {}", self.config_path.display());

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SigningError::ConfigurationError(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let content = toml::to_string_pretty(config).map_err(|e| {
            SigningError::ConfigurationError(format!("Failed to serialize config: {e}"))
        })?;

        fs::write(&self.config_path, content).map_err(|e| {
            SigningError::ConfigurationError(format!(
                "Failed to write config file {}: {}",
                self.config_path.display(),
                e
            ))
        })?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate_config(config: &AppConfiguration) -> SigningResult<()> {
        if config.key_alias.trim().is_empty() {
            return Err(SigningError::ConfigurationError(
                "key_alias must not be empty".to_string(),
            ));
        }

        match config.key_generation.key_kind()? {
            KeyKind::Ec { curve } if curve.trim().is_empty() => {
                return Err(SigningError::ConfigurationError(
                    "ec_curve must not be empty".to_string(),
                ));
            }
            KeyKind::Rsa { bits } if bits < 1024 => {
                return Err(SigningError::ConfigurationError(format!(
                    "rsa_key_bits must be at least 1024, got {bits}"
                )));
            }
            _ => {}
        }

        let base = &config.backend.base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(SigningError::ConfigurationError(format!(
                "backend.base_url must be an http(s) URL: {base}"
            )));
        }

        if config.backend.post_timeout_ms == 0 || config.backend.challenge_timeout_ms == 0 {
            return Err(SigningError::ConfigurationError(
                "Network timeouts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Update a specific configuration value
    pub fn update_value(&self, key: &str, value: &str) -> SigningResult<()> {
        let mut config = self.load_or_create_default()?;

        match key {
            "key_alias" => config.key_alias = value.to_string(),
            "key_display_name" => config.key_display_name = value.to_string(),
            _ if key.starts_with("key_generation.") => {
                return Err(SigningError::ConfigurationError(format!(
                    "{key} is written by registration; pass it to 'confirm-signer register'"
                )));
            }
            "backend.base_url" => config.backend.base_url = value.to_string(),
            "backend.connected" => config.backend.connected = parse_bool(value)?,
            "backend.post_timeout_ms" => config.backend.post_timeout_ms = parse_number(key, value)?,
            "backend.challenge_timeout_ms" => {
                config.backend.challenge_timeout_ms = parse_number(key, value)?;
            }
            "packaging.encapsulate_content" => {
                config.packaging.encapsulate_content = parse_bool(value)?;
            }
            "key_store.directory" => config.key_store.directory = value.to_string(),
            "key_store.max_protection_level" => {
                config.key_store.max_protection_level = value
                    .parse()
                    .map_err(|e: SigningError| SigningError::ConfigurationError(e.to_string()))?;
            }
            _ => {
                return Err(SigningError::ConfigurationError(format!(
                    "Unknown configuration key: {key}"
                )));
            }
        }

        self.save(&config)
    }

    /// Get the configuration file path
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Directory of the software key store for `config`.
    #[must_use]
    pub fn key_store_dir(&self, config: &AppConfiguration) -> PathBuf {
        if config.key_store.directory.is_empty() {
            self.config_path
                .parent()
                .map_or_else(|| PathBuf::from("keys"), |dir| dir.join("keys"))
        } else {
            PathBuf::from(&config.key_store.directory)
        }
    }

    pub fn export_config(&self, format: ExportFormat) -> SigningResult<String> {
        let config = self.load_or_create_default()?;

        match format {
            ExportFormat::Toml => toml::to_string_pretty(&config)
                .map_err(|e| SigningError::ConfigurationError(format!("TOML export failed: {e}"))),
            ExportFormat::Json => serde_json::to_string_pretty(&config)
                .map_err(|e| SigningError::ConfigurationError(format!("JSON export failed: {e}"))),
            ExportFormat::Yaml => serde_yaml::to_string(&config)
                .map_err(|e| SigningError::ConfigurationError(format!("YAML export failed: {e}"))),
        }
    }

    pub fn import_config(&self, content: &str, format: ExportFormat) -> SigningResult<()> {
        let mut config: AppConfiguration = match format {
            ExportFormat::Toml => toml::from_str(content).map_err(|e| {
                SigningError::ConfigurationError(format!("TOML import failed: {e}"))
            })?,
            ExportFormat::Json => serde_json::from_str(content).map_err(|e| {
                SigningError::ConfigurationError(format!("JSON import failed: {e}"))
            })?,
            ExportFormat::Yaml => serde_yaml::from_str(content).map_err(|e| {
                SigningError::ConfigurationError(format!("YAML import failed: {e}"))
            })?,
        };

        // Key preferences belong to the registration that produced the key.
        let current = self.load_or_create_default()?;
        if config.key_generation != current.key_generation {
            log::warn!("Imported key_generation ignored; use 'confirm-signer register' to change it");
            config.key_generation = current.key_generation;
        }
        self.save(&config)
    }
}

/// Configuration export/import formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Toml,
    Json,
    Yaml,
}

impl std::str::FromStr for ExportFormat {
    type Err = SigningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "toml" => Ok(ExportFormat::Toml),
            "json" => Ok(ExportFormat::Json),
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            other => Err(SigningError::ConfigurationError(format!(
                "Unknown export format: {other}"
            ))),
        }
    }
}

fn parse_bool(value: &str) -> SigningResult<bool> {
    value
        .parse()
        .map_err(|_| SigningError::ConfigurationError(format!("Invalid boolean value: {value}")))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> SigningResult<T> {
    value
        .parse()
        .map_err(|_| SigningError::ConfigurationError(format!("Invalid number for {key}: {value}")))
}
