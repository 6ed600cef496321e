//! Challenge and questionnaire retrieval from the backend.

use std::sync::Arc;
use std::time::Duration;

use super::delivery::HttpTransport;
use crate::domain::questionnaire::{bundled_questions, parse_questions, Question};

/// Fetches the attestation challenge from `GET <uuid_url>` (`{"uuid": "..."}`).
/// Any failure falls back to a locally generated UUID.
pub struct BackendClient {
    transport: Arc<dyn HttpTransport>,
    uuid_url: String,
    questions_url: Option<String>,
    timeout: Duration,
}

impl BackendClient {
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, uuid_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            transport,
            uuid_url: uuid_url.into(),
            questions_url: None,
            timeout,
        }
    }

    #[must_use]
    pub fn with_questions_url(mut self, url: impl Into<String>) -> Self {
        self.questions_url = Some(url.into());
        self
    }

    /// Questionnaire from the backend; the bundled set when the backend is
    /// unreachable, malformed or empty.
    pub async fn fetch_questions(&self) -> Vec<Question> {
        let Some(url) = &self.questions_url else {
            return bundled_questions();
        };
        match self.transport.get_json(url, self.timeout).await {
            Ok(body) => match parse_questions(body) {
                Ok(questions) if !questions.is_empty() => {
                    log::info!("{} question(s) loaded from {url}", questions.len());
                    return questions;
                }
                Ok(_) => log::warn!("Backend returned no questions"),
                Err(e) => log::warn!("{e}"),
            },
            Err(e) => log::warn!("Could not fetch questions from {url}: {e}"),
        }
        log::debug!("Using bundled questions");
        bundled_questions()
    }

    pub async fn fetch_challenge(&self) -> String {
        match self.transport.get_json(&self.uuid_url, self.timeout).await {
            Ok(body) => match body.get("uuid").and_then(serde_json::Value::as_str) {
                Some(uuid) if !uuid.is_empty() => {
                    log::info!("Using backend challenge {uuid}");
                    return uuid.to_string();
                }
                _ => log::warn!("Backend response has no 'uuid' field"),
            },
            Err(e) => log::warn!("Could not fetch challenge from {}: {e}", self.uuid_url),
        }
        let local = uuid::Uuid::new_v4().to_string();
        log::info!("Using local challenge {local}");
        local
    }
}
