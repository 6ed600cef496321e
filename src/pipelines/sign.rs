//! `ConfirmationSigningProtocol` drives one confirm → authorize → sign →
//! package → deliver cycle.
//!
//! The three suspension points are the trusted confirmation prompt, the
//! secondary authorization dialog and network delivery. Everything between
//! them is synchronous. Every exit path ends in `Delivered` or
//! `Failed(reason)`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::adapters::authorization::{
    AuthorizationOutcome, PromptInfo, SecondaryAuthorizer, AUTH_ERROR_NEGATIVE_BUTTON,
};
use crate::adapters::confirmation::{ConfirmationOutcome, TrustedConfirmation};
use crate::adapters::delivery::{Delivery, DeliveryService};
use crate::adapters::keystore::{KeyHandle, KeyStore};
use crate::domain::confirmation::{ConfirmedPayload, Nonce, PresentedPrompt};
use crate::domain::crypto::RawSignature;
use crate::domain::keys::AuthorizationRequirement;
use crate::domain::pkcs7::SignedMessage;
use crate::domain::protocol::{FailureReason, ProtocolState};
use crate::services::pem;
use crate::services::pkcs7_builder::DetachedSignaturePackager;
use crate::{SigningError, SigningResult};

/// Result of a completed cycle.
#[derive(Debug)]
pub struct SigningOutcome {
    pub message: SignedMessage,
    pub pem: String,
    pub delivery: Delivery,
}

pub struct ConfirmationSigningProtocol {
    confirmation: Arc<dyn TrustedConfirmation>,
    authorizer: Arc<dyn SecondaryAuthorizer>,
    key_store: Arc<dyn KeyStore>,
    delivery: DeliveryService,
    alias: String,
    packager: DetachedSignaturePackager,
    prompt_info: PromptInfo,
    state: Mutex<ProtocolState>,
    history: Mutex<Vec<ProtocolState>>,
    last_nonce: Mutex<Option<String>>,
    cycle_active: AtomicBool,
}

/// Releases the single-cycle guard, also when the `run` future is dropped.
///
/// A cycle dropped before `run` returned is moved to
/// `Failed(Abandoned)` so the next `run` starts cleanly.
struct CycleGuard<'a> {
    protocol: &'a ConfirmationSigningProtocol,
    finished: bool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.protocol.abandon();
        }
        self.protocol.cycle_active.store(false, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConfirmationSigningProtocol {
    #[must_use]
    pub fn new(
        confirmation: Arc<dyn TrustedConfirmation>,
        authorizer: Arc<dyn SecondaryAuthorizer>,
        key_store: Arc<dyn KeyStore>,
        delivery: DeliveryService,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            confirmation,
            authorizer,
            key_store,
            delivery,
            alias: alias.into(),
            packager: DetachedSignaturePackager::new(),
            prompt_info: PromptInfo::default(),
            state: Mutex::new(ProtocolState::Idle),
            history: Mutex::new(vec![ProtocolState::Idle]),
            last_nonce: Mutex::new(None),
            cycle_active: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_packager(mut self, packager: DetachedSignaturePackager) -> Self {
        self.packager = packager;
        self
    }

    #[must_use]
    pub fn with_prompt_info(mut self, prompt_info: PromptInfo) -> Self {
        self.prompt_info = prompt_info;
        self
    }

    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    #[must_use]
    pub fn state(&self) -> ProtocolState {
        lock(&self.state).clone()
    }

    /// States visited by the current (or last) cycle, starting at `Idle`.
    #[must_use]
    pub fn history(&self) -> Vec<ProtocolState> {
        lock(&self.history).clone()
    }

    /// Run a full cycle for `text`.
    ///
    /// # Errors
    /// `CapabilityBusy` without touching the state when a cycle is already
    /// in flight. Otherwise the error matching the `Failed` reason the
    /// cycle ended in.
    pub async fn run(&self, text: &str) -> SigningResult<SigningOutcome> {
        let mut guard = self.begin_cycle()?;
        let result = match self.drive(text).await {
            Ok(outcome) => Ok(outcome),
            Err(reason) => Err(self.fail(reason)),
        };
        guard.finished = true;
        result
    }

    /// Wait for failure reports still in flight, bounded by the POST timeout.
    pub async fn flush_reports(&self) {
        self.delivery.flush().await;
    }

    fn begin_cycle(&self) -> SigningResult<CycleGuard<'_>> {
        if self.cycle_active.swap(true, Ordering::SeqCst) {
            return Err(SigningError::CapabilityBusy(format!(
                "a signing cycle for '{}' is already in progress",
                self.alias
            )));
        }
        let mut guard = CycleGuard {
            protocol: self,
            finished: false,
        };
        let mut state = lock(&self.state);
        if !state.is_restartable() {
            guard.finished = true;
            return Err(SigningError::ProtocolViolation(format!(
                "cannot start a cycle from {state}"
            )));
        }
        if *state != ProtocolState::Idle {
            log::debug!("protocol: {} -> Idle", *state);
        }
        *state = ProtocolState::Idle;
        *lock(&self.history) = vec![ProtocolState::Idle];
        Ok(guard)
    }

    async fn drive(&self, text: &str) -> Result<SigningOutcome, FailureReason> {
        if !self.confirmation.is_supported() {
            return Err(FailureReason::CapabilityUnavailable);
        }

        let prompt = PresentedPrompt::new(text, self.fresh_nonce());
        let pending = self
            .confirmation
            .present_prompt(prompt.text(), prompt.extra_data())
            .map_err(|e| FailureReason::from(&e))?;
        self.transition(ProtocolState::PromptPresented)?;

        let confirmed = match pending.await {
            Ok(ConfirmationOutcome::Confirmed(bytes)) => bytes,
            Ok(ConfirmationOutcome::Dismissed) => return Err(FailureReason::UserDismissed),
            Ok(ConfirmationOutcome::Canceled) => return Err(FailureReason::UserCanceled),
            Ok(ConfirmationOutcome::Error(e)) => return Err(FailureReason::ConfirmationError(e)),
            Err(_) => {
                return Err(FailureReason::ConfirmationError(
                    "confirmation closed without an answer".to_string(),
                ))
            }
        };
        let payload = prompt
            .accept(confirmed)
            .map_err(|e| FailureReason::from(&e))?;
        self.transition(ProtocolState::Confirmed)?;

        let key = self
            .key_store
            .key_handle(&self.alias)
            .map_err(|e| FailureReason::from(&e))?;
        let signature = if key.requires(AuthorizationRequirement::RequiresUserAuthentication) {
            self.transition(ProtocolState::AwaitingSecondaryAuth)?;
            let key = self.authorize(key).await?;
            Self::sign(key.as_ref(), &payload)?
        } else {
            Self::sign(key.as_ref(), &payload)?
        };
        self.transition(ProtocolState::Signed)?;

        let chain = self
            .key_store
            .get_chain(&self.alias)
            .map_err(|e| FailureReason::PackagingFailed(e.to_string()))?;
        let message = self
            .packager
            .package(&payload, &signature, &chain)
            .map_err(|e| FailureReason::from(&e))?;
        let pem = pem::encode_pkcs7_pem(message.as_der());
        self.transition(ProtocolState::Packaged)?;
        log::info!(
            "Packaged signed message: {} byte(s) DER, {} byte(s) PEM",
            message.len(),
            pem.len()
        );

        let delivery = self
            .delivery
            .deliver(&pem)
            .map_err(|e| FailureReason::Unexpected(e.to_string()))?;
        self.transition(ProtocolState::Delivered)?;

        Ok(SigningOutcome {
            message,
            pem,
            delivery,
        })
    }

    async fn authorize(&self, key: Box<dyn KeyHandle>) -> Result<Box<dyn KeyHandle>, FailureReason> {
        match self.authorizer.authenticate(&self.prompt_info, key).await {
            Ok(AuthorizationOutcome::Succeeded(key)) => Ok(key),
            Ok(AuthorizationOutcome::Failed) => Err(FailureReason::AuthorizationFailed(
                "authentication not recognized".to_string(),
            )),
            Ok(AuthorizationOutcome::Error { code, .. }) if code == AUTH_ERROR_NEGATIVE_BUTTON => {
                Err(FailureReason::UserCanceled)
            }
            Ok(AuthorizationOutcome::Error { code, message }) => Err(
                FailureReason::AuthorizationFailed(format!("{message} (code {code})")),
            ),
            Err(_) => Err(FailureReason::AuthorizationFailed(
                "authorization closed without an answer".to_string(),
            )),
        }
    }

    fn sign(key: &dyn KeyHandle, payload: &ConfirmedPayload) -> Result<RawSignature, FailureReason> {
        log::debug!(
            "Signing {} confirmed byte(s) with '{}' ({})",
            payload.as_bytes().len(),
            key.alias(),
            key.algorithm_name()
        );
        key.sign(payload.as_bytes())
            .map_err(|e| FailureReason::SigningFailed(e.to_string()))
    }

    /// A nonce different from the previous cycle's.
    fn fresh_nonce(&self) -> Nonce {
        let mut last = lock(&self.last_nonce);
        loop {
            let nonce = Nonce::generate();
            if last.as_deref() != Some(nonce.as_str()) {
                *last = Some(nonce.as_str().to_string());
                return nonce;
            }
        }
    }

    fn transition(&self, next: ProtocolState) -> Result<(), FailureReason> {
        let mut state = lock(&self.state);
        if !state.can_transition_to(&next) {
            return Err(FailureReason::Unexpected(format!(
                "illegal transition {} -> {}",
                *state, next
            )));
        }
        log::debug!("protocol: {} -> {}", *state, next);
        lock(&self.history).push(next.clone());
        *state = next;
        Ok(())
    }

    /// Move a dropped cycle out of its intermediate state.
    fn abandon(&self) {
        let mut state = lock(&self.state);
        if state.is_restartable() {
            return;
        }
        let failed = ProtocolState::Failed(FailureReason::Abandoned);
        log::warn!("Signing cycle abandoned in {}", *state);
        lock(&self.history).push(failed.clone());
        *state = failed;
    }

    /// Land in `Failed(reason)`, report it, and hand back the caller's error.
    fn fail(&self, reason: FailureReason) -> SigningError {
        {
            let mut state = lock(&self.state);
            let failed = ProtocolState::Failed(reason.clone());
            log::debug!("protocol: {} -> {}", *state, failed);
            lock(&self.history).push(failed.clone());
            *state = failed;
        }
        if reason.is_user_action() {
            log::info!("{}", reason.user_message());
        } else {
            log::warn!("Signing cycle failed: {}", reason.user_message());
            self.delivery.report_failure(&reason.user_message());
        }
        reason.to_error()
    }
}
