//! Service layer module root.
//! Stateless packaging, framing, provisioning and inspection services.

pub mod cert_inspector;
pub mod pem;
pub mod pkcs7_builder;
pub mod provisioner;
pub mod signer;

pub use cert_inspector::{CertificateDetails, CertificateInspector, PublicKeyType};
pub use pkcs7_builder::DetachedSignaturePackager;
pub use provisioner::{
    KeyProvisioner, ProvisionAttempt, ProvisionError, ProvisionResult, Provisioned,
    ProvisioningPolicy,
};
pub use signer::{ContentSigner, ExternalSignatureAdapter};
