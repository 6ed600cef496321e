//! Adapter layer modules for external system integration.
//!
//! Provides adapters for:
//! - Key storage with protection levels (software store, on disk or in memory)
//! - Trusted confirmation prompts and secondary user authorization
//! - Backend communication: challenge retrieval, delivery and failure reports

pub mod authorization;
pub mod backend_client;
pub mod confirmation;
pub mod delivery;
pub mod keystore;
pub mod software_keystore;

pub use authorization::{
    AuthorizationOutcome, ConsoleAuthorizer, PromptInfo, SecondaryAuthorizer,
};
pub use backend_client::BackendClient;
pub use confirmation::{ConfirmationOutcome, ConsoleConfirmation, TrustedConfirmation};
pub use delivery::{
    device_information, Clipboard, Delivery, DeliveryConfig, DeliveryService, DeliveryStatus,
    FileClipboard, HttpTransport, MemoryClipboard, ReqwestTransport, StdoutClipboard,
};
pub use keystore::{KeyHandle, KeyStore};
pub use software_keystore::SoftwareKeyStore;
