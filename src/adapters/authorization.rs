//! Secondary (biometric or equivalent) authorization capability.

use std::io::{BufRead, Write};

use tokio::sync::oneshot;

use crate::adapters::keystore::KeyHandle;

/// Text shown by the authorization dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptInfo {
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub negative_button: String,
}

impl Default for PromptInfo {
    fn default() -> Self {
        Self {
            title: "Protected confirmation".to_string(),
            subtitle: "Authenticate to sign".to_string(),
            description: "Protected confirmation".to_string(),
            negative_button: "Cancel".to_string(),
        }
    }
}

/// Single resolution of an authorization request.
pub enum AuthorizationOutcome {
    /// The bound signer, now usable.
    Succeeded(Box<dyn KeyHandle>),
    Failed,
    Error { code: i32, message: String },
}

impl std::fmt::Debug for AuthorizationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthorizationOutcome::Succeeded(key) => write!(f, "Succeeded({})", key.alias()),
            AuthorizationOutcome::Failed => f.write_str("Failed"),
            AuthorizationOutcome::Error { code, message } => {
                write!(f, "Error({code}: {message})")
            }
        }
    }
}

pub trait SecondaryAuthorizer: Send + Sync {
    /// Authorize use of `signer`; it is handed back on success.
    fn authenticate(
        &self,
        prompt: &PromptInfo,
        signer: Box<dyn KeyHandle>,
    ) -> oneshot::Receiver<AuthorizationOutcome>;
}

/// Error code reported when the user backs out of the dialog.
pub const AUTH_ERROR_NEGATIVE_BUTTON: i32 = 13;

/// Terminal stand-in asking for a yes/no answer on stdin.
#[derive(Debug, Default)]
pub struct ConsoleAuthorizer {
    auto_approve: bool,
}

impl ConsoleAuthorizer {
    #[must_use]
    pub fn new(auto_approve: bool) -> Self {
        Self { auto_approve }
    }
}

impl SecondaryAuthorizer for ConsoleAuthorizer {
    fn authenticate(
        &self,
        prompt: &PromptInfo,
        signer: Box<dyn KeyHandle>,
    ) -> oneshot::Receiver<AuthorizationOutcome> {
        let (tx, rx) = oneshot::channel();
        if self.auto_approve {
            let _ = tx.send(AuthorizationOutcome::Succeeded(signer));
            return rx;
        }
        let prompt = prompt.clone();
        std::thread::spawn(move || {
            let outcome = match ask(&prompt) {
                Ok(answer) if answer == "y" || answer == "yes" => {
                    AuthorizationOutcome::Succeeded(signer)
                }
                Ok(answer) if answer.is_empty() || answer == "n" || answer == "no" => {
                    AuthorizationOutcome::Error {
                        code: AUTH_ERROR_NEGATIVE_BUTTON,
                        message: prompt.negative_button.clone(),
                    }
                }
                Ok(_) => AuthorizationOutcome::Failed,
                Err(e) => AuthorizationOutcome::Error {
                    code: -1,
                    message: e.to_string(),
                },
            };
            let _ = tx.send(outcome);
        });
        rx
    }
}

fn ask(prompt: &PromptInfo) -> std::io::Result<String> {
    let mut stderr = std::io::stderr().lock();
    writeln!(stderr, "\n{} - {}\n{}", prompt.title, prompt.subtitle, prompt.description)?;
    write!(stderr, "Authorize signing? [y/N]: ")?;
    stderr.flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_ascii_lowercase())
}
