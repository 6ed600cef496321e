//! Key provisioning against the software store at different capability
//! ceilings.

mod common;

use confirm_signer::adapters::{KeyStore, SoftwareKeyStore};
use confirm_signer::services::{KeyProvisioner, ProvisioningPolicy};
use confirm_signer::{
    AuthorizationRequirement, KeyKind, ProtectionLevel, SigningError, SigningKeyDescriptor,
};

fn secure_element_descriptor() -> SigningKeyDescriptor {
    SigningKeyDescriptor::builder("provisioned")
        .protection_level(ProtectionLevel::HardwareIsolatedWithDedicatedSecureElement)
        .require(AuthorizationRequirement::RequiresTrustedConfirmation)
        .challenge(b"challenge".to_vec())
        .build()
        .unwrap()
}

#[test]
fn secure_element_available_no_downgrade() {
    let store =
        SoftwareKeyStore::in_memory(ProtectionLevel::HardwareIsolatedWithDedicatedSecureElement);
    let provisioned = KeyProvisioner::new(&store)
        .provision(&secure_element_descriptor())
        .unwrap();

    assert!(!provisioned.downgraded());
    assert_eq!(provisioned.attempts.len(), 1);
    assert_eq!(
        provisioned.key.protection_level(),
        ProtectionLevel::HardwareIsolatedWithDedicatedSecureElement
    );
}

#[test]
fn missing_secure_element_downgrades_exactly_once() {
    let store = SoftwareKeyStore::in_memory(ProtectionLevel::HardwareIsolated);
    let provisioned = KeyProvisioner::new(&store)
        .provision(&secure_element_descriptor())
        .unwrap();

    assert!(provisioned.downgraded());
    assert_eq!(
        provisioned.descriptor.protection_level(),
        ProtectionLevel::HardwareIsolated
    );
    assert_eq!(provisioned.attempts.len(), 2);
    assert!(provisioned.log().lines().count() == 2);
    // everything but the level is kept
    assert!(provisioned
        .descriptor
        .requires(AuthorizationRequirement::RequiresTrustedConfirmation));
    assert_eq!(provisioned.descriptor.challenge(), b"challenge");
    assert!(store.has_key("provisioned").unwrap());
}

#[test]
fn never_downgrades_twice() {
    let store = SoftwareKeyStore::in_memory(ProtectionLevel::Standard);
    let err = KeyProvisioner::new(&store)
        .provision(&secure_element_descriptor())
        .unwrap_err();

    assert_eq!(err.attempts.len(), 2);
    assert!(err.error.is_capability_unavailable());
    assert!(!store.has_key("provisioned").unwrap());
}

#[test]
fn strict_policy_does_not_fall_back() {
    let store = SoftwareKeyStore::in_memory(ProtectionLevel::HardwareIsolated);
    let descriptor = secure_element_descriptor();
    let err = KeyProvisioner::new(&store)
        .provision_with_policy(
            &descriptor,
            &ProvisioningPolicy::strict(descriptor.protection_level()),
        )
        .unwrap_err();
    assert_eq!(err.attempts.len(), 1);
}

#[test]
fn unsupported_curve_is_fatal_on_first_attempt() {
    let store =
        SoftwareKeyStore::in_memory(ProtectionLevel::HardwareIsolatedWithDedicatedSecureElement);
    let descriptor = SigningKeyDescriptor::builder("provisioned")
        .protection_level(ProtectionLevel::HardwareIsolatedWithDedicatedSecureElement)
        .key_kind(KeyKind::Ec {
            curve: "brainpoolP999".into(),
        })
        .build()
        .unwrap();

    let err = KeyProvisioner::new(&store).provision(&descriptor).unwrap_err();

    // the policy allows a fallback level, but it is not tried
    assert_eq!(err.attempts.len(), 1);
    assert!(!err.error.is_capability_unavailable());
    let converted: SigningError = err.into();
    assert!(!converted.is_recoverable());
}
