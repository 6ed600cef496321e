//! OpenSSL-backed key store for development machines and tests.
//!
//! Keys live in memory and, when opened on a directory, are mirrored to
//! `<alias>.key.pem`, `<alias>.chain.pem` and `<alias>.json`. Leaf
//! certificates are issued by a local root created on first use, so every
//! chain has two entries. The store advertises a maximum protection level;
//! requests above it fail with `CapabilityUnavailable`, which is how a
//! device without a secure element behaves.
//!
//! Software keys do not enforce their authorization requirements; those are
//! recorded and reported through [`KeyHandle::requirements`] only.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::sign::Signer;
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509Name, X509NameBuilder, X509};
use serde::{Deserialize, Serialize};

use crate::adapters::keystore::{KeyHandle, KeyStore};
use crate::domain::crypto::{
    AlgorithmRegistry, CertificateChain, ChainCertificate, RawSignature, SignatureAlgorithm,
};
use crate::domain::keys::{
    signature_algorithm_for, AuthorizationRequirement, KeyKind, ProtectionLevel,
    SigningKeyDescriptor,
};
use crate::infra::error::{SigningError, SigningResult};

const ISSUER_SUBJECT: &str = "CN=confirm-signer software root, O=confirm-signer";
const ISSUER_KEY_FILE: &str = "issuer.key.pem";
const ISSUER_CERT_FILE: &str = "issuer.crt.pem";
const ISSUER_VALIDITY_DAYS: u32 = 3650;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeyMetadata {
    algorithm: String,
    protection_level: ProtectionLevel,
    key_kind: KeyKind,
    requirements: BTreeSet<AuthorizationRequirement>,
    #[serde(default)]
    challenge: String,
}

struct StoredKey {
    key: PKey<Private>,
    chain: CertificateChain,
    metadata: KeyMetadata,
}

struct Issuer {
    key: PKey<Private>,
    cert: X509,
}

pub struct SoftwareKeyStore {
    max_level: ProtectionLevel,
    directory: Option<PathBuf>,
    keys: Mutex<BTreeMap<String, StoredKey>>,
    issuer: Mutex<Option<Issuer>>,
}

impl SoftwareKeyStore {
    /// Volatile store.
    #[must_use]
    pub fn in_memory(max_level: ProtectionLevel) -> Self {
        Self {
            max_level,
            directory: None,
            keys: Mutex::new(BTreeMap::new()),
            issuer: Mutex::new(None),
        }
    }

    /// Store persisted under `directory`, loading existing keys.
    pub fn open(directory: impl AsRef<Path>, max_level: ProtectionLevel) -> SigningResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;

        let mut keys = BTreeMap::new();
        for entry in fs::read_dir(&directory)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(alias) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match Self::load_key(&directory, alias) {
                Ok(stored) => {
                    keys.insert(alias.to_string(), stored);
                }
                Err(e) => log::warn!("Skipping unreadable key '{alias}': {e}"),
            }
        }

        let issuer = Self::load_issuer(&directory)?;
        log::debug!(
            "Opened software key store at {} ({} key(s), max level {max_level})",
            directory.display(),
            keys.len()
        );
        Ok(Self {
            max_level,
            directory: Some(directory),
            keys: Mutex::new(keys),
            issuer: Mutex::new(issuer),
        })
    }

    #[must_use]
    pub fn max_protection_level(&self) -> ProtectionLevel {
        self.max_level
    }

    fn load_key(directory: &Path, alias: &str) -> SigningResult<StoredKey> {
        let metadata: KeyMetadata =
            serde_json::from_slice(&fs::read(directory.join(format!("{alias}.json")))?)
                .map_err(|e| SigningError::KeyStoreError(format!("bad key metadata: {e}")))?;
        let key = PKey::private_key_from_pem(&fs::read(
            directory.join(format!("{alias}.key.pem")),
        )?)?;
        let certs = X509::stack_from_pem(&fs::read(directory.join(format!("{alias}.chain.pem")))?)?;
        let der_list = certs
            .iter()
            .map(|cert| cert.to_der())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StoredKey {
            key,
            chain: CertificateChain::from_der_list(der_list),
            metadata,
        })
    }

    fn load_issuer(directory: &Path) -> SigningResult<Option<Issuer>> {
        let key_path = directory.join(ISSUER_KEY_FILE);
        let cert_path = directory.join(ISSUER_CERT_FILE);
        if !key_path.exists() || !cert_path.exists() {
            return Ok(None);
        }
        Ok(Some(Issuer {
            key: PKey::private_key_from_pem(&fs::read(key_path)?)?,
            cert: X509::from_pem(&fs::read(cert_path)?)?,
        }))
    }

    fn lock_keys(&self) -> SigningResult<MutexGuard<'_, BTreeMap<String, StoredKey>>> {
        self.keys
            .lock()
            .map_err(|_| SigningError::KeyStoreError("key store lock poisoned".to_string()))
    }

    /// Issue a leaf certificate with the local root, creating it if needed.
    fn issue_certificate(
        &self,
        descriptor: &SigningKeyDescriptor,
        key: &PKey<Private>,
    ) -> SigningResult<(X509, X509)> {
        let mut guard = self
            .issuer
            .lock()
            .map_err(|_| SigningError::KeyStoreError("issuer lock poisoned".to_string()))?;
        if guard.is_none() {
            let issuer = create_issuer()?;
            if let Some(dir) = &self.directory {
                fs::write(dir.join(ISSUER_KEY_FILE), issuer.key.private_key_to_pem_pkcs8()?)?;
                fs::write(dir.join(ISSUER_CERT_FILE), issuer.cert.to_pem()?)?;
            }
            *guard = Some(issuer);
        }
        let issuer = guard
            .as_ref()
            .ok_or_else(|| SigningError::KeyStoreError("issuer unavailable".to_string()))?;

        let mut builder = X509::builder()?;
        builder.set_version(2)?;
        let serial = BigNum::from_slice(&((rand::random::<u64>() >> 1) | 1).to_be_bytes())?;
        let serial = serial.to_asn1_integer()?;
        let subject = parse_subject(descriptor.subject())?;
        let not_before = asn1_time(descriptor.validity().not_before())?;
        let not_after = asn1_time(descriptor.validity().not_after())?;
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(&subject)?;
        builder.set_issuer_name(issuer.cert.subject_name())?;
        builder.set_pubkey(key)?;
        builder.set_not_before(&not_before)?;
        builder.set_not_after(&not_after)?;
        builder.append_extension(KeyUsage::new().critical().digital_signature().build()?)?;
        builder.sign(&issuer.key, MessageDigest::sha256())?;
        Ok((builder.build(), issuer.cert.clone()))
    }

    fn persist(&self, alias: &str, stored: &StoredKey) -> SigningResult<()> {
        let Some(dir) = &self.directory else {
            return Ok(());
        };
        let mut chain_pem = Vec::new();
        for cert in stored.chain.certificates() {
            chain_pem.extend_from_slice(&X509::from_der(cert.as_der())?.to_pem()?);
        }
        let metadata = serde_json::to_vec_pretty(&stored.metadata)
            .map_err(|e| SigningError::KeyStoreError(format!("cannot encode metadata: {e}")))?;
        fs::write(dir.join(format!("{alias}.key.pem")), stored.key.private_key_to_pem_pkcs8()?)?;
        fs::write(dir.join(format!("{alias}.chain.pem")), chain_pem)?;
        fs::write(dir.join(format!("{alias}.json")), metadata)?;
        Ok(())
    }
}

impl KeyStore for SoftwareKeyStore {
    fn generate(&self, descriptor: &SigningKeyDescriptor) -> SigningResult<Box<dyn KeyHandle>> {
        let alias = descriptor.alias();
        validate_alias(alias)?;
        if descriptor.protection_level() > self.max_level {
            return Err(SigningError::CapabilityUnavailable(format!(
                "{} key storage is not available (device maximum: {})",
                descriptor.protection_level(),
                self.max_level
            )));
        }

        let key = generate_key(descriptor.key_kind())?;
        let (leaf, root) = self.issue_certificate(descriptor, &key)?;
        let chain = CertificateChain::new(vec![
            ChainCertificate::from_der(leaf.to_der()?),
            ChainCertificate::from_der(root.to_der()?),
        ]);
        let metadata = KeyMetadata {
            algorithm: signature_algorithm_for(descriptor.key_kind()).to_string(),
            protection_level: descriptor.protection_level(),
            key_kind: descriptor.key_kind().clone(),
            requirements: descriptor.requirements().clone(),
            challenge: hex::encode(descriptor.challenge()),
        };
        let stored = StoredKey {
            key: key.clone(),
            chain,
            metadata: metadata.clone(),
        };
        self.persist(alias, &stored)?;
        self.lock_keys()?.insert(alias.to_string(), stored);

        log::info!(
            "Generated {} key '{alias}' at {} level",
            descriptor.key_kind(),
            descriptor.protection_level()
        );
        Ok(Box::new(SoftwareKeyHandle {
            alias: alias.to_string(),
            key,
            metadata,
        }))
    }

    fn get_chain(&self, alias: &str) -> SigningResult<CertificateChain> {
        self.lock_keys()?
            .get(alias)
            .map(|k| k.chain.clone())
            .ok_or_else(|| SigningError::KeyStoreError(format!("no key under alias '{alias}'")))
    }

    fn delete(&self, alias: &str) -> SigningResult<bool> {
        validate_alias(alias)?;
        let removed = self.lock_keys()?.remove(alias).is_some();
        if let Some(dir) = &self.directory {
            for suffix in ["key.pem", "chain.pem", "json"] {
                let path = dir.join(format!("{alias}.{suffix}"));
                if path.exists() {
                    fs::remove_file(path)?;
                }
            }
        }
        Ok(removed)
    }

    fn list_aliases(&self) -> SigningResult<Vec<String>> {
        Ok(self.lock_keys()?.keys().cloned().collect())
    }

    fn key_handle(&self, alias: &str) -> SigningResult<Box<dyn KeyHandle>> {
        let keys = self.lock_keys()?;
        let stored = keys
            .get(alias)
            .ok_or_else(|| SigningError::KeyStoreError(format!("no key under alias '{alias}'")))?;
        Ok(Box::new(SoftwareKeyHandle {
            alias: alias.to_string(),
            key: stored.key.clone(),
            metadata: stored.metadata.clone(),
        }))
    }
}

struct SoftwareKeyHandle {
    alias: String,
    key: PKey<Private>,
    metadata: KeyMetadata,
}

impl KeyHandle for SoftwareKeyHandle {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn algorithm_name(&self) -> &str {
        &self.metadata.algorithm
    }

    fn protection_level(&self) -> ProtectionLevel {
        self.metadata.protection_level
    }

    fn requirements(&self) -> &BTreeSet<AuthorizationRequirement> {
        &self.metadata.requirements
    }

    fn sign(&self, data: &[u8]) -> SigningResult<RawSignature> {
        let algorithm = AlgorithmRegistry::resolve(&self.metadata.algorithm)?;
        let digest = match algorithm.algorithm() {
            SignatureAlgorithm::RsaWithSha1 => MessageDigest::sha1(),
            SignatureAlgorithm::EcdsaWithSha256 | SignatureAlgorithm::RsaWithSha256 => {
                MessageDigest::sha256()
            }
        };
        let signature = Signer::new(digest, &self.key)
            .and_then(|mut signer| {
                signer.update(data)?;
                signer.sign_to_vec()
            })
            .map_err(|e| SigningError::SignatureError(format!("software signing failed: {e}")))?;
        log::debug!("Signed {} bytes with '{}'", data.len(), self.alias);
        Ok(RawSignature::new(self.metadata.algorithm.clone(), signature))
    }
}

fn validate_alias(alias: &str) -> SigningResult<()> {
    if alias.is_empty()
        || alias.starts_with('.')
        || alias.contains(['/', '\\'])
        || alias.eq_ignore_ascii_case("issuer")
    {
        return Err(SigningError::ValidationError(format!(
            "'{alias}' cannot be used as a key alias"
        )));
    }
    Ok(())
}

fn curve_nid(curve: &str) -> SigningResult<Nid> {
    match curve.to_ascii_lowercase().as_str() {
        "secp256r1" | "prime256v1" | "p-256" => Ok(Nid::X9_62_PRIME256V1),
        "secp384r1" | "p-384" => Ok(Nid::SECP384R1),
        "secp521r1" | "p-521" => Ok(Nid::SECP521R1),
        other => Err(SigningError::ValidationError(format!(
            "unsupported EC curve '{other}'"
        ))),
    }
}

fn generate_key(kind: &KeyKind) -> SigningResult<PKey<Private>> {
    match kind {
        KeyKind::Ec { curve } => {
            let group = EcGroup::from_curve_name(curve_nid(curve)?)?;
            Ok(PKey::from_ec_key(EcKey::generate(&group)?)?)
        }
        KeyKind::Rsa { bits } => Ok(PKey::from_rsa(Rsa::generate(*bits)?)?),
    }
}

fn create_issuer() -> SigningResult<Issuer> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
    let key = PKey::from_ec_key(EcKey::generate(&group)?)?;
    let name = parse_subject(ISSUER_SUBJECT)?;

    let mut builder = X509::builder()?;
    builder.set_version(2)?;
    let serial = BigNum::from_u32(1)?.to_asn1_integer()?;
    let not_before = Asn1Time::days_from_now(0)?;
    let not_after = Asn1Time::days_from_now(ISSUER_VALIDITY_DAYS)?;
    builder.set_serial_number(&serial)?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_pubkey(&key)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;
    builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
    builder.append_extension(KeyUsage::new().critical().key_cert_sign().build()?)?;
    builder.sign(&key, MessageDigest::sha256())?;
    log::debug!("Created software key store issuer");
    Ok(Issuer {
        key,
        cert: builder.build(),
    })
}

/// `"CN=x, OU=y, C=z"` (most specific first) to an X.509 name (country first).
fn parse_subject(subject: &str) -> SigningResult<X509Name> {
    let mut builder = X509NameBuilder::new()?;
    let mut parts = Vec::new();
    for part in subject.split(',') {
        let (field, value) = part.trim().split_once('=').ok_or_else(|| {
            SigningError::ValidationError(format!("malformed subject component '{part}'"))
        })?;
        parts.push((field.trim().to_string(), value.trim().to_string()));
    }
    for (field, value) in parts.iter().rev() {
        builder.append_entry_by_text(field, value)?;
    }
    Ok(builder.build())
}

fn asn1_time(time: SystemTime) -> SigningResult<Asn1Time> {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map_err(|_| SigningError::ValidationError("validity before 1970".to_string()))?
        .as_secs();
    let secs = i64::try_from(secs)
        .map_err(|_| SigningError::ValidationError("validity out of range".to_string()))?;
    Ok(Asn1Time::from_unix(secs)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::keys::ValidityWindow;

    fn descriptor(level: ProtectionLevel) -> SigningKeyDescriptor {
        SigningKeyDescriptor::builder("test-key")
            .protection_level(level)
            .validity(ValidityWindow::years_from(SystemTime::now(), 1))
            .require(AuthorizationRequirement::RequiresTrustedConfirmation)
            .build()
            .unwrap()
    }

    #[test]
    fn refuses_levels_above_maximum() {
        let store = SoftwareKeyStore::in_memory(ProtectionLevel::HardwareIsolated);
        let err = store
            .generate(&descriptor(
                ProtectionLevel::HardwareIsolatedWithDedicatedSecureElement,
            ))
            .err()
            .unwrap();
        assert!(err.is_capability_unavailable());
        assert!(store.list_aliases().unwrap().is_empty());
    }

    #[test]
    fn generated_key_has_two_certificate_chain() {
        let store = SoftwareKeyStore::in_memory(ProtectionLevel::HardwareIsolated);
        let handle = store
            .generate(&descriptor(ProtectionLevel::HardwareIsolated))
            .unwrap();
        assert_eq!(handle.algorithm_name(), "SHA256withECDSA");
        assert!(handle.requires(AuthorizationRequirement::RequiresTrustedConfirmation));

        let chain = store.get_chain("test-key").unwrap();
        assert_eq!(chain.len(), 2);
        let leaf = X509::from_der(chain.leaf().unwrap().as_der()).unwrap();
        let root = X509::from_der(chain.root().unwrap().as_der()).unwrap();
        assert!(leaf.verify(&root.public_key().unwrap()).unwrap());
        let cn = leaf
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .unwrap()
            .data()
            .as_slice()
            .to_vec();
        let cn = String::from_utf8(cn).unwrap();
        assert_eq!(cn, "test-key");
    }

    #[test]
    fn signatures_verify_with_leaf_key() {
        let store = SoftwareKeyStore::in_memory(ProtectionLevel::Standard);
        let d = SigningKeyDescriptor::builder("rsa")
            .protection_level(ProtectionLevel::Standard)
            .key_kind(KeyKind::Rsa { bits: 2048 })
            .build()
            .unwrap();
        let handle = store.generate(&d).unwrap();
        let sig = handle.sign(b"vote=yes").unwrap();
        assert_eq!(sig.algorithm(), "SHA256withRSA");

        let chain = store.get_chain("rsa").unwrap();
        let leaf = X509::from_der(chain.leaf().unwrap().as_der()).unwrap();
        let pkey = leaf.public_key().unwrap();
        let mut verifier =
            openssl::sign::Verifier::new(MessageDigest::sha256(), &pkey).unwrap();
        verifier.update(b"vote=yes").unwrap();
        assert!(verifier.verify(sig.as_slice()).unwrap());
    }

    #[test]
    fn directory_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SoftwareKeyStore::open(dir.path(), ProtectionLevel::HardwareIsolated).unwrap();
            store
                .generate(&descriptor(ProtectionLevel::HardwareIsolated))
                .unwrap();
        }
        let store = SoftwareKeyStore::open(dir.path(), ProtectionLevel::HardwareIsolated).unwrap();
        assert_eq!(store.list_aliases().unwrap(), vec!["test-key".to_string()]);
        assert!(store.has_key("test-key").unwrap());
        let handle = store.key_handle("test-key").unwrap();
        assert_eq!(handle.protection_level(), ProtectionLevel::HardwareIsolated);

        assert!(store.delete("test-key").unwrap());
        assert!(!store.delete("test-key").unwrap());
        assert!(!dir.path().join("test-key.json").exists());
    }

    #[test]
    fn rejects_path_like_aliases() {
        let store = SoftwareKeyStore::in_memory(ProtectionLevel::Standard);
        assert!(store.delete("../x").is_err());
        assert!(store.delete("issuer").is_err());
    }

    #[test]
    fn subject_order_is_country_first() {
        let name = parse_subject("CN=APC Demo App, OU=SecureVote, OU=BFH, C=CH").unwrap();
        let first = name.entries().next().unwrap();
        assert_eq!(first.object().nid(), Nid::COUNTRYNAME);
    }
}
