//! States of one confirm → authenticate → sign → package → deliver cycle.

use std::fmt;

use crate::infra::error::SigningError;

/// Why a cycle ended in [`ProtocolState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Another prompt is already presenting.
    CapabilityBusy,
    /// The device has no trusted confirmation display.
    CapabilityUnavailable,
    UserDismissed,
    UserCanceled,
    /// The trusted display reported an error.
    ConfirmationError(String),
    PayloadMismatch(String),
    AuthorizationFailed(String),
    SigningFailed(String),
    PackagingFailed(String),
    /// The caller dropped the cycle before it reached a terminal state.
    Abandoned,
    Unexpected(String),
}

impl FailureReason {
    /// Human-readable message shown to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            FailureReason::CapabilityBusy => {
                "A protected confirmation is already being presented.".to_string()
            }
            FailureReason::CapabilityUnavailable => {
                "Protected confirmation is not supported on this device.".to_string()
            }
            FailureReason::UserDismissed => "The confirmation was dismissed.".to_string(),
            FailureReason::UserCanceled => "The confirmation was cancelled.".to_string(),
            FailureReason::ConfirmationError(e) => format!("Confirmation failed: {e}"),
            FailureReason::PayloadMismatch(e) => {
                format!("The confirmed data does not match what was shown: {e}")
            }
            FailureReason::AuthorizationFailed(e) => format!("Authentication failed: {e}"),
            FailureReason::SigningFailed(e) => format!("Signing failed: {e}"),
            FailureReason::PackagingFailed(e) => {
                format!("The signed message could not be built: {e}")
            }
            FailureReason::Abandoned => "The signing cycle was interrupted.".to_string(),
            FailureReason::Unexpected(e) => format!("Cannot sign the message: {e}"),
        }
    }

    /// Error carried back to the caller for this reason.
    #[must_use]
    pub fn to_error(&self) -> SigningError {
        match self {
            FailureReason::CapabilityBusy => {
                SigningError::CapabilityBusy("confirmation already presenting".to_string())
            }
            FailureReason::CapabilityUnavailable => SigningError::CapabilityUnavailable(
                "trusted confirmation not supported".to_string(),
            ),
            FailureReason::UserDismissed => SigningError::UserDismissed,
            FailureReason::UserCanceled => SigningError::UserCanceled,
            FailureReason::ConfirmationError(e) => SigningError::ProtocolViolation(e.clone()),
            FailureReason::PayloadMismatch(e) => SigningError::PayloadMismatch(e.clone()),
            FailureReason::AuthorizationFailed(e) => SigningError::AuthorizationFailed(e.clone()),
            FailureReason::SigningFailed(e) => SigningError::SignatureError(e.clone()),
            FailureReason::PackagingFailed(e) => SigningError::PackagingError(e.clone()),
            FailureReason::Abandoned => {
                SigningError::ProtocolViolation("signing cycle abandoned".to_string())
            }
            FailureReason::Unexpected(e) => SigningError::ProtocolViolation(e.clone()),
        }
    }

    /// Expected user action rather than a fault; not reported remotely.
    #[must_use]
    pub fn is_user_action(&self) -> bool {
        matches!(self, FailureReason::UserDismissed | FailureReason::UserCanceled)
    }
}

impl From<&SigningError> for FailureReason {
    fn from(error: &SigningError) -> Self {
        match error {
            SigningError::CapabilityBusy(_) => FailureReason::CapabilityBusy,
            SigningError::CapabilityUnavailable(_) => FailureReason::CapabilityUnavailable,
            SigningError::UserDismissed => FailureReason::UserDismissed,
            SigningError::UserCanceled => FailureReason::UserCanceled,
            SigningError::PayloadMismatch(e) => FailureReason::PayloadMismatch(e.clone()),
            SigningError::AuthorizationFailed(e) => FailureReason::AuthorizationFailed(e.clone()),
            SigningError::SignatureError(e) | SigningError::KeyStoreError(e) => {
                FailureReason::SigningFailed(e.clone())
            }
            SigningError::PackagingError(e) | SigningError::AlgorithmNotFound(e) => {
                FailureReason::PackagingFailed(e.clone())
            }
            other => FailureReason::Unexpected(other.to_string()),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolState {
    Idle,
    PromptPresented,
    Confirmed,
    AwaitingSecondaryAuth,
    Signed,
    Packaged,
    Delivered,
    Failed(FailureReason),
}

impl ProtocolState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProtocolState::Delivered | ProtocolState::Failed(_))
    }

    /// A new cycle may start from here.
    #[must_use]
    pub fn is_restartable(&self) -> bool {
        matches!(self, ProtocolState::Idle) || self.is_terminal()
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolState::Idle => "Idle",
            ProtocolState::PromptPresented => "PromptPresented",
            ProtocolState::Confirmed => "Confirmed",
            ProtocolState::AwaitingSecondaryAuth => "AwaitingSecondaryAuth",
            ProtocolState::Signed => "Signed",
            ProtocolState::Packaged => "Packaged",
            ProtocolState::Delivered => "Delivered",
            ProtocolState::Failed(_) => "Failed",
        }
    }

    /// Whether `self → next` is an edge of the cycle graph.
    ///
    /// Any non-terminal state may fail; terminal states only lead back to
    /// `Idle`.
    #[must_use]
    pub fn can_transition_to(&self, next: &ProtocolState) -> bool {
        use ProtocolState::{
            AwaitingSecondaryAuth, Confirmed, Delivered, Failed, Idle, Packaged,
            PromptPresented, Signed,
        };
        match (self, next) {
            (Delivered | Failed(_), Idle) => true,
            (Delivered | Failed(_), _) => false,
            (_, Failed(_)) => true,
            (Idle, PromptPresented)
            | (PromptPresented, Confirmed)
            | (Confirmed, AwaitingSecondaryAuth | Signed)
            | (AwaitingSecondaryAuth, Signed)
            | (Signed, Packaged)
            | (Packaged, Delivered) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolState::Failed(reason) => write!(f, "Failed({reason})"),
            other => f.write_str(other.name()),
        }
    }
}
