//! Error types for confirmation signing operations.
//!
//! Hardware and collaborator errors are classified into these kinds at the
//! adapter boundary; the orchestrator never sees an unclassified error.

use thiserror::Error;

/// Result type for signing operations
pub type SigningResult<T> = Result<T, SigningError>;

/// Comprehensive error types for confirm/sign/package operations
#[derive(Error, Debug, Clone, PartialEq, Eq, miette::Diagnostic)]
pub enum SigningError {
    #[error("Capability unavailable: {0}")]
    #[diagnostic(help("this device lacks the required trusted-UI or secure-element hardware"))]
    CapabilityUnavailable(String),

    #[error("Capability busy: {0}")]
    CapabilityBusy(String),

    #[error("Confirmation dismissed by user")]
    UserDismissed,

    #[error("Confirmation canceled")]
    UserCanceled,

    #[error("Confirmed data does not match the presented payload: {0}")]
    PayloadMismatch(String),

    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("Packaging error: {0}")]
    PackagingError(String),

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Signature algorithm not registered: {0}")]
    AlgorithmNotFound(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Key store error: {0}")]
    KeyStoreError(String),

    #[error("Certificate error: {0}")]
    CertificateError(String),

    #[error("Signature creation error: {0}")]
    SignatureError(String),

    #[error("ASN.1 encoding/decoding error: {0}")]
    Asn1Error(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl SigningError {
    /// Whether the error only reports missing hardware capability.
    ///
    /// The key provisioner relaxes protection by one level on these and
    /// treats everything else as fatal.
    #[must_use]
    pub fn is_capability_unavailable(&self) -> bool {
        matches!(self, SigningError::CapabilityUnavailable(_))
    }

    /// Alias of [`Self::is_capability_unavailable`]; the only class of error a
    /// caller may recover from by retrying with weaker constraints.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.is_capability_unavailable()
    }

    /// Expected user actions that end a cycle without being faults.
    #[must_use]
    pub fn is_user_action(&self) -> bool {
        matches!(self, SigningError::UserDismissed | SigningError::UserCanceled)
    }
}

impl From<der::Error> for SigningError {
    fn from(error: der::Error) -> Self {
        SigningError::Asn1Error(error.to_string())
    }
}

impl From<reqwest::Error> for SigningError {
    fn from(error: reqwest::Error) -> Self {
        SigningError::NetworkError(error.to_string())
    }
}

impl From<openssl::error::ErrorStack> for SigningError {
    fn from(error: openssl::error::ErrorStack) -> Self {
        SigningError::KeyStoreError(error.to_string())
    }
}

impl From<std::io::Error> for SigningError {
    fn from(error: std::io::Error) -> Self {
        SigningError::IoError(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SigningError::CapabilityBusy("prompt already presenting".to_string());
        assert_eq!(
            error.to_string(),
            "Capability busy: prompt already presenting"
        );

        let error = SigningError::UserDismissed;
        assert_eq!(error.to_string(), "Confirmation dismissed by user");
    }

    #[test]
    fn test_error_classification() {
        assert!(SigningError::CapabilityUnavailable("strongbox".into()).is_capability_unavailable());
        assert!(!SigningError::KeyStoreError("bad curve".into()).is_capability_unavailable());
        assert!(SigningError::UserCanceled.is_user_action());
        assert!(!SigningError::PayloadMismatch("x".into()).is_user_action());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        match SigningError::from(io) {
            SigningError::IoError(msg) => assert!(msg.contains("missing")),
            other => panic!("Wrong error type: {other:?}"),
        }
    }
}
