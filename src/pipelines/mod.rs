//! Workflow pipelines orchestrating adapters and stateless services.

pub mod register;
pub mod sign;

pub use register::{RegistrationFlow, RegistrationReport};
pub use sign::{ConfirmationSigningProtocol, SigningOutcome};
