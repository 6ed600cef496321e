//! Trusted confirmation capability.
//!
//! Presentation errors (busy, unsupported) are returned synchronously; the
//! user's answer arrives once on a oneshot channel.

use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::domain::confirmation::encode_confirmed_record;
use crate::infra::error::{SigningError, SigningResult};

/// Single resolution of a presented prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    /// Data the display vouches for (raw extra data or a prompt record).
    Confirmed(Vec<u8>),
    Dismissed,
    Canceled,
    Error(String),
}

pub trait TrustedConfirmation: Send + Sync {
    fn is_supported(&self) -> bool;

    /// Show `text` and bind `extra_data` to the user's approval.
    ///
    /// # Errors
    /// `CapabilityBusy` while another prompt is presenting,
    /// `CapabilityUnavailable` when the device has no trusted display.
    fn present_prompt(
        &self,
        text: &str,
        extra_data: &[u8],
    ) -> SigningResult<oneshot::Receiver<ConfirmationOutcome>>;
}

/// Terminal stand-in for a trusted display.
///
/// Not isolated from the host, so only suitable for development. Answers
/// are read from stdin unless constructed with [`Self::auto_confirm`].
pub struct ConsoleConfirmation {
    auto_confirm: bool,
    presenting: Arc<AtomicBool>,
}

impl ConsoleConfirmation {
    #[must_use]
    pub fn interactive() -> Self {
        Self {
            auto_confirm: false,
            presenting: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Approve every prompt without asking.
    #[must_use]
    pub fn auto_confirm() -> Self {
        Self {
            auto_confirm: true,
            presenting: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl TrustedConfirmation for ConsoleConfirmation {
    fn is_supported(&self) -> bool {
        true
    }

    fn present_prompt(
        &self,
        text: &str,
        extra_data: &[u8],
    ) -> SigningResult<oneshot::Receiver<ConfirmationOutcome>> {
        if self.presenting.swap(true, Ordering::SeqCst) {
            return Err(SigningError::CapabilityBusy(
                "a confirmation prompt is already presenting".to_string(),
            ));
        }
        let record = match encode_confirmed_record(text, extra_data) {
            Ok(record) => record,
            Err(e) => {
                self.presenting.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        let (tx, rx) = oneshot::channel();
        let presenting = Arc::clone(&self.presenting);

        if self.auto_confirm {
            log::info!("Auto-confirming prompt ({} chars)", text.len());
            presenting.store(false, Ordering::SeqCst);
            let _ = tx.send(ConfirmationOutcome::Confirmed(record));
            return Ok(rx);
        }

        let text = text.to_string();
        std::thread::spawn(move || {
            let outcome = ask(&text).map_or_else(
                |e| ConfirmationOutcome::Error(e.to_string()),
                |answer| match answer.as_str() {
                    "y" | "yes" => ConfirmationOutcome::Confirmed(record),
                    "c" | "cancel" => ConfirmationOutcome::Canceled,
                    _ => ConfirmationOutcome::Dismissed,
                },
            );
            presenting.store(false, Ordering::SeqCst);
            let _ = tx.send(outcome);
        });
        Ok(rx)
    }
}

fn ask(text: &str) -> std::io::Result<String> {
    let mut stderr = std::io::stderr().lock();
    writeln!(stderr, "\n----- Please confirm -----\n{text}\n--------------------------")?;
    write!(stderr, "Confirm? [y]es / [n]o / [c]ancel: ")?;
    stderr.flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::confirmation::decode_confirmed_record;

    #[tokio::test]
    async fn auto_confirm_returns_prompt_record() {
        let console = ConsoleConfirmation::auto_confirm();
        let rx = console.present_prompt("vote=yes", b"nonce").unwrap();
        match rx.await.unwrap() {
            ConfirmationOutcome::Confirmed(bytes) => {
                let record = decode_confirmed_record(&bytes).unwrap();
                assert_eq!(record.prompt, "vote=yes");
                assert_eq!(record.extra, b"nonce");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        // presenting flag released
        assert!(console.present_prompt("again", b"n2").is_ok());
    }
}
