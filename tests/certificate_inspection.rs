//! Field extraction from key-store certificates, including the attestation
//! record of a device-issued sample.

mod common;

use std::time::{Duration, UNIX_EPOCH};

use confirm_signer::adapters::{KeyStore, SoftwareKeyStore};
use confirm_signer::domain::attestation::SecurityLevel;
use confirm_signer::services::pem::encode_certificate_pem;
use confirm_signer::services::{CertificateInspector, PublicKeyType};
use confirm_signer::{ProtectionLevel, SigningKeyDescriptor};

use common::{sample_attestation_cert_der, SAMPLE_ATTESTATION_CHALLENGE};

#[test]
fn scenario_d_sample_certificate_flags() {
    let details = CertificateInspector::inspect_der(&sample_attestation_cert_der()).unwrap();

    assert_eq!(details.key_type, PublicKeyType::Ec);
    assert_eq!(details.key_type.as_str(), "EC");
    assert_eq!(details.key_length(), "256 bits");
    assert_eq!(details.ec_curve.as_deref(), Some("secp256r1"));
    assert_eq!(details.key_usage, "Digital Signature");
    assert_eq!(details.requires_authentication(), Some(false));
    assert_eq!(details.requires_protected_confirmation(), Some(true));
}

#[test]
fn sample_attestation_record_fields() {
    let details = CertificateInspector::inspect_der(&sample_attestation_cert_der()).unwrap();
    let record = details.attestation.expect("attestation extension present");

    assert_eq!(record.attestation_security_level, SecurityLevel::StrongBox);
    assert_eq!(record.challenge, SAMPLE_ATTESTATION_CHALLENGE.as_bytes());
    assert!(record.tee_enforced.no_auth_required);
    assert!(record.tee_enforced.trusted_confirmation_required);
}

#[test]
fn sample_certificate_identity_fields() {
    let details = CertificateInspector::inspect_der(&sample_attestation_cert_der()).unwrap();

    assert!(details.subject.contains("CN=BFH APC Demo App"));
    assert!(details.subject.contains("OU=SecureVote"));
    assert!(details.issuer.contains("StrongBox"));
    assert_eq!(details.serial_number, "01");
    // 2023-03-29T08:38:36Z
    assert_eq!(
        details.not_before,
        UNIX_EPOCH + Duration::from_secs(1_680_079_116)
    );
    assert_eq!(details.sha256_thumbprint.len(), 64);
    assert_eq!(details.sha1_thumbprint.len(), 40);
    assert_eq!(details.sha1_thumbprint, details.sha1_thumbprint.to_uppercase());
}

#[test]
fn software_certificates_have_no_attestation() {
    let store = SoftwareKeyStore::in_memory(ProtectionLevel::HardwareIsolated);
    store
        .generate(&SigningKeyDescriptor::builder("inspect-me").build().unwrap())
        .unwrap();
    let chain = store.get_chain("inspect-me").unwrap();

    let details = CertificateInspector::inspect(chain.leaf().unwrap()).unwrap();
    assert_eq!(details.requires_authentication(), None);
    assert!(details.subject.contains("CN=inspect-me"));
    assert!(details.key_usage.contains("Digital Signature"));

    let pem = encode_certificate_pem(chain.leaf().unwrap().as_der());
    assert!(pem.starts_with("-----BEGIN CERTIFICATE-----\n"));
    assert!(openssl::x509::X509::from_pem(pem.as_bytes()).is_ok());
}
