//! Confirm Signer CLI
//!
//! Registers a signing key, runs confirmation signing cycles and manages
//! keys and configuration. Uses the software key store and console
//! stand-ins for the trusted display and the authorization dialog.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};

use confirm_signer::adapters::{
    device_information, BackendClient, Clipboard, ConsoleAuthorizer, ConsoleConfirmation,
    Delivery, DeliveryConfig, DeliveryService, DeliveryStatus, FileClipboard, KeyStore,
    ReqwestTransport, SoftwareKeyStore, StdoutClipboard,
};
use confirm_signer::domain::questionnaire::bundled_questions;
use confirm_signer::infra::config::{
    AppConfiguration, ConfigManager, ExportFormat, KeyGenerationConfig,
};
use confirm_signer::services::{pem, CertificateDetails, CertificateInspector};
use confirm_signer::{
    ChainCertificate, ConfirmationSigningProtocol, DetachedSignaturePackager, RegistrationFlow,
};

#[derive(Parser)]
#[command(name = "confirm-signer")]
#[command(about = "Sign confirmed text with a protected key and package it as detached PKCS#7")]
#[command(long_about = "
Confirm Signer - trusted-confirmation signing utility

EXAMPLES:
    # Generate the signing key (challenge fetched from the backend)
    confirm-signer register

    # Confirm and sign a message; PEM goes to the backend or stdout
    confirm-signer sign \"vote=yes\"

    # Show the signing certificate and its attestation flags
    confirm-signer inspect

ENVIRONMENT VARIABLES:
    RUST_LOG        Logging level (debug, info, warn, error)
")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, env = "CONFIRM_SIGNER_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the signing key from the configured preferences
    Register {
        /// Attestation challenge (skips the backend request)
        #[arg(long)]
        challenge: Option<String>,

        #[command(flatten)]
        preferences: KeyPreferenceArgs,
    },

    /// Confirm a message and produce a detached PKCS#7 signature
    Sign {
        /// Text shown for confirmation
        text: String,

        /// Approve the confirmation and authorization prompts without asking
        #[arg(short, long)]
        yes: bool,

        /// Write the PEM here when it is not delivered to the backend
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the questionnaire (backend when connected, bundled otherwise)
    Questions,

    /// Key store management
    #[command(subcommand)]
    Keys(KeyCommands),

    /// Show certificate details of a stored key or a certificate file
    Inspect {
        /// Key alias (defaults to the configured alias)
        #[arg(short, long)]
        alias: Option<String>,

        /// Certificate file (PEM or DER) instead of a stored key
        #[arg(long, conflicts_with = "alias")]
        cert: Option<PathBuf>,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Key preferences; saved by a successful registration.
#[derive(Args)]
struct KeyPreferenceArgs {
    /// Key type: EC or RSA
    #[arg(long)]
    key_type: Option<String>,

    /// EC curve name, e.g. secp256r1
    #[arg(long)]
    ec_curve: Option<String>,

    /// RSA modulus size in bits
    #[arg(long)]
    rsa_key_bits: Option<u32>,

    /// Certificate validity in years (0 = 24 hours)
    #[arg(long)]
    validity_years: Option<u32>,

    /// Require trusted confirmation for every signature
    #[arg(long)]
    user_confirmation: Option<bool>,

    /// Require an unlocked device
    #[arg(long)]
    unlock_device: Option<bool>,

    /// Require secondary user authentication
    #[arg(long)]
    user_authentication: Option<bool>,

    /// Request a dedicated secure element
    #[arg(long)]
    strong_box: Option<bool>,
}

impl KeyPreferenceArgs {
    fn apply(self, mut generation: KeyGenerationConfig) -> KeyGenerationConfig {
        if let Some(key_type) = self.key_type {
            generation.key_type = key_type.to_ascii_uppercase();
        }
        if let Some(curve) = self.ec_curve {
            generation.ec_curve = curve;
        }
        if let Some(bits) = self.rsa_key_bits {
            generation.rsa_key_bits = bits;
        }
        if let Some(years) = self.validity_years {
            generation.validity_years = years;
        }
        if let Some(flag) = self.user_confirmation {
            generation.user_confirmation_required = flag;
        }
        if let Some(flag) = self.unlock_device {
            generation.unlock_device_required = flag;
        }
        if let Some(flag) = self.user_authentication {
            generation.user_authentication_required = flag;
        }
        if let Some(flag) = self.strong_box {
            generation.strong_box_required = flag;
        }
        generation
    }
}

#[derive(Subcommand)]
enum KeyCommands {
    /// List stored key aliases
    List,

    /// Delete a stored key
    Delete {
        alias: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Set a configuration value
    Set {
        /// Configuration key, e.g. backend.connected (key_generation.* is set by register)
        key: String,
        /// Configuration value
        value: String,
    },

    /// Export configuration
    Export {
        #[arg(short, long, value_enum, default_value = "toml")]
        format: ExportFormatArg,
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import configuration
    Import {
        file: PathBuf,
        #[arg(short, long, value_enum, default_value = "toml")]
        format: ExportFormatArg,
    },
}

#[derive(ValueEnum, Clone)]
enum ExportFormatArg {
    Toml,
    Json,
    Yaml,
}

impl From<ExportFormatArg> for ExportFormat {
    fn from(arg: ExportFormatArg) -> Self {
        match arg {
            ExportFormatArg::Toml => ExportFormat::Toml,
            ExportFormatArg::Json => ExportFormat::Json,
            ExportFormatArg::Yaml => ExportFormat::Yaml,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new().into_diagnostic()?,
    };

    match cli.command {
        Commands::Register {
            challenge,
            preferences,
        } => handle_register_command(&manager, challenge, preferences).await,
        Commands::Sign { text, yes, output } => {
            handle_sign_command(&manager, &text, yes, output).await
        }
        Commands::Questions => handle_questions_command(&manager).await,
        Commands::Keys(cmd) => handle_keys_command(&manager, cmd),
        Commands::Inspect { alias, cert } => handle_inspect_command(&manager, alias, cert),
        Commands::Config(cmd) => handle_config_command(&manager, cmd),
    }
}

fn open_store(manager: &ConfigManager, config: &AppConfiguration) -> Result<SoftwareKeyStore> {
    let dir = manager.key_store_dir(config);
    SoftwareKeyStore::open(&dir, config.key_store.max_protection_level)
        .into_diagnostic()
        .with_context(|| format!("cannot open key store at {}", dir.display()))
}

async fn handle_register_command(
    manager: &ConfigManager,
    challenge: Option<String>,
    preferences: KeyPreferenceArgs,
) -> Result<()> {
    let mut config = manager.load_or_create_default().into_diagnostic()?;
    let store = open_store(manager, &config)?;

    let generation = preferences.apply(config.key_generation.clone());
    let mut flow = RegistrationFlow::new(&store, manager);
    if generation != config.key_generation {
        flow = flow.with_preferences(generation);
    }
    if challenge.is_none() && config.backend.connected {
        let transport = Arc::new(ReqwestTransport::new().into_diagnostic()?);
        flow = flow.with_backend(BackendClient::new(
            transport,
            config.backend.uuid_url(),
            config.backend.challenge_timeout(),
        ));
    }

    let report = flow
        .register(&mut config, challenge)
        .await
        .into_diagnostic()
        .context("key registration failed")?;

    println!("✅ Key '{}' registered", report.alias);
    println!("  Protection level: {}", report.protection_level);
    if report.downgraded {
        println!("  ⚠️  Secure element unavailable; key uses hardware isolation");
    }
    println!("  Challenge: {}", report.challenge);
    println!("  Certificates in chain: {}", report.chain.len());
    Ok(())
}

async fn handle_sign_command(
    manager: &ConfigManager,
    text: &str,
    yes: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = manager.load_or_create_default().into_diagnostic()?;
    let store = Arc::new(open_store(manager, &config)?);
    if !store.has_key(&config.key_alias).into_diagnostic()? {
        miette::bail!(
            "no key '{}' in the key store; run 'confirm-signer register' first",
            config.key_alias
        );
    }

    let clipboard: Arc<dyn Clipboard> = match output {
        Some(path) => Arc::new(FileClipboard::new(path)),
        None => Arc::new(StdoutClipboard),
    };
    let delivery = DeliveryService::new(
        Arc::new(ReqwestTransport::new().into_diagnostic()?),
        clipboard,
        DeliveryConfig {
            connected: config.backend.connected,
            p7m_url: config.backend.p7m_url(),
            failure_url: config.backend.failure_url(),
            post_timeout: config.backend.post_timeout(),
            device_info: device_information(),
        },
    );
    let confirmation = if yes {
        ConsoleConfirmation::auto_confirm()
    } else {
        ConsoleConfirmation::interactive()
    };

    let protocol = ConfirmationSigningProtocol::new(
        Arc::new(confirmation),
        Arc::new(ConsoleAuthorizer::new(yes)),
        store,
        delivery,
        config.key_alias.clone(),
    )
    .with_packager(
        DetachedSignaturePackager::new()
            .with_encapsulated_content(config.packaging.encapsulate_content),
    );

    let outcome = match protocol.run(text).await {
        Ok(outcome) => outcome,
        Err(e) => {
            // Reports are spawned; the runtime ends with this function.
            protocol.flush_reports().await;
            return Err(e).into_diagnostic();
        }
    };
    log::debug!("Signed message: {:?}", outcome.message);

    match outcome.delivery {
        Delivery::Clipboard => {}
        // Keep the process alive until the POST (or its fallback) finishes.
        Delivery::Network(task) => match task.await.into_diagnostic()? {
            DeliveryStatus::Posted => {
                eprintln!("✅ Signed message delivered to {}", config.backend.p7m_url());
            }
            DeliveryStatus::FellBackToClipboard(reason) => {
                eprintln!("⚠️  Delivery failed ({reason}); message written locally");
            }
        },
    }
    Ok(())
}

async fn handle_questions_command(manager: &ConfigManager) -> Result<()> {
    let config = manager.load_or_create_default().into_diagnostic()?;
    let questions = if config.backend.connected {
        let transport = Arc::new(ReqwestTransport::new().into_diagnostic()?);
        BackendClient::new(
            transport,
            config.backend.uuid_url(),
            config.backend.challenge_timeout(),
        )
        .with_questions_url(config.backend.questions_url())
        .fetch_questions()
        .await
    } else {
        bundled_questions()
    };

    for (index, question) in questions.iter().enumerate() {
        println!("{}. {} [{}]", index + 1, question.question, question.question_type);
        for choice in &question.selection {
            println!("   - {choice}");
        }
    }
    Ok(())
}

fn handle_keys_command(manager: &ConfigManager, cmd: KeyCommands) -> Result<()> {
    let config = manager.load_or_create_default().into_diagnostic()?;
    let store = open_store(manager, &config)?;

    match cmd {
        KeyCommands::List => {
            let aliases = store.list_aliases().into_diagnostic()?;
            if aliases.is_empty() {
                println!("No keys stored.");
            }
            for alias in aliases {
                let marker = if alias == config.key_alias { " (active)" } else { "" };
                println!("{alias}{marker}");
            }
        }
        KeyCommands::Delete { alias } => {
            if store.delete(&alias).into_diagnostic()? {
                println!("✅ Deleted key '{alias}'");
            } else {
                println!("No key named '{alias}'");
            }
        }
    }
    Ok(())
}

fn handle_inspect_command(
    manager: &ConfigManager,
    alias: Option<String>,
    cert: Option<PathBuf>,
) -> Result<()> {
    if let Some(path) = cert {
        let bytes = std::fs::read(&path).into_diagnostic()?;
        let der = if bytes.starts_with(b"-----BEGIN") {
            openssl::x509::X509::from_pem(&bytes)
                .and_then(|x| x.to_der())
                .into_diagnostic()?
        } else {
            bytes
        };
        let details = CertificateInspector::inspect_der(&der).into_diagnostic()?;
        print_details(&details);
        return Ok(());
    }

    let config = manager.load_or_create_default().into_diagnostic()?;
    let store = open_store(manager, &config)?;
    let alias = alias.unwrap_or_else(|| config.key_alias.clone());
    let chain = store.get_chain(&alias).into_diagnostic()?;

    for (index, certificate) in chain.certificates().iter().enumerate() {
        println!("Certificate [{index}]");
        let details = CertificateInspector::inspect(certificate).into_diagnostic()?;
        print_details(&details);
        if index == 0 {
            print_pem(certificate);
        }
        println!();
    }
    Ok(())
}

fn print_details(details: &CertificateDetails) {
    println!("  Subject: {}", details.subject);
    println!("  Issuer: {}", details.issuer);
    println!("  Serial: {}", details.serial_number);
    println!("  Key: {} {}", details.key_type.as_str(), details.key_length());
    if let Some(curve) = &details.ec_curve {
        println!("  Curve: {curve}");
    }
    println!("  Key usage: {}", details.key_usage);
    println!("  SHA-1: {}", details.sha1_thumbprint);
    println!("  SHA-256: {}", details.sha256_thumbprint);
    if let Some(record) = &details.attestation {
        println!("  Attestation security level: {:?}", record.attestation_security_level);
        println!(
            "  Attestation challenge: {}",
            String::from_utf8_lossy(&record.challenge)
        );
        println!("  Requires authentication: {}", record.requires_authentication());
        println!(
            "  Requires protected confirmation: {}",
            record.requires_protected_confirmation()
        );
        println!("  Requires unlocked device: {}", record.requires_unlocked_device());
    }
}

fn print_pem(certificate: &ChainCertificate) {
    print!("{}", pem::encode_certificate_pem(certificate.as_der()));
}

fn handle_config_command(manager: &ConfigManager, cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            let config = manager.load_or_create_default().into_diagnostic()?;
            let generation = &config.key_generation;
            println!("📋 Current Configuration:");
            println!("  Key alias: {} ({})", config.key_alias, config.key_display_name);
            println!(
                "  Key type: {}",
                generation.key_kind().into_diagnostic()?
            );
            println!("  Validity: {} year(s)", generation.validity_years);
            println!("  Protection level: {}", generation.protection_level());
            println!(
                "  Requires confirmation/unlock/authentication: {}/{}/{}",
                generation.user_confirmation_required,
                generation.unlock_device_required,
                generation.user_authentication_required
            );
            println!("  Backend: {}", config.backend.base_url);
            println!("  Network delivery: {}", config.backend.connected);
            println!(
                "  Encapsulate content: {}",
                config.packaging.encapsulate_content
            );
            println!("  Key store: {}", manager.key_store_dir(&config).display());
        }

        ConfigCommands::Path => {
            println!("{}", manager.config_path().display());
        }

        ConfigCommands::Set { key, value } => {
            manager.update_value(&key, &value).into_diagnostic()?;
            println!("✅ Configuration updated: {key} = {value}");
        }

        ConfigCommands::Export { format, output } => {
            let content = manager.export_config(format.into()).into_diagnostic()?;
            if let Some(output_path) = output {
                std::fs::write(&output_path, content).into_diagnostic()?;
                println!("✅ Configuration exported to: {}", output_path.display());
            } else {
                println!("{content}");
            }
        }

        ConfigCommands::Import { file, format } => {
            let content = std::fs::read_to_string(&file).into_diagnostic()?;
            manager
                .import_config(&content, format.into())
                .into_diagnostic()?;
            println!("✅ Configuration imported from: {}", file.display());
        }
    }
    Ok(())
}
