//! Questionnaire shown before a vote is confirmed.
//!
//! The backend serves a JSON array of questions; a bundled set is used
//! when it cannot be reached or returns nothing usable.

use serde::{Deserialize, Serialize};

use crate::infra::error::{SigningError, SigningResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question: String,
    /// Presentation hint from the backend, e.g. "single" or "multiple".
    pub question_type: String,
    #[serde(default)]
    pub selection: Vec<String>,
}

impl Question {
    /// Whether `answer` is one of the offered choices. Free-text
    /// questions (no choices) accept anything non-empty.
    #[must_use]
    pub fn accepts(&self, answer: &str) -> bool {
        if self.selection.is_empty() {
            return !answer.trim().is_empty();
        }
        self.selection.iter().any(|choice| choice == answer)
    }
}

const BUNDLED_QUESTIONS: &str = r#"[
  {
    "question": "Should the university join the SecureVote alliance?",
    "questionType": "single",
    "selection": ["Yes", "No", "Abstain"]
  },
  {
    "question": "Which channels should be used to announce results?",
    "questionType": "multiple",
    "selection": ["E-mail", "Intranet", "Notice board"]
  },
  {
    "question": "Comments for the organisers",
    "questionType": "text",
    "selection": []
  }
]"#;

/// Decode the backend's question list.
///
/// # Errors
/// `ValidationError` if `value` is not an array of questions.
pub fn parse_questions(value: serde_json::Value) -> SigningResult<Vec<Question>> {
    serde_json::from_value(value)
        .map_err(|e| SigningError::ValidationError(format!("malformed question list: {e}")))
}

/// Questions shipped with the crate.
#[must_use]
pub fn bundled_questions() -> Vec<Question> {
    serde_json::from_str(BUNDLED_QUESTIONS).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_set_is_not_empty() {
        let questions = bundled_questions();
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0].question_type, "single");
        assert!(questions[2].selection.is_empty());
    }

    #[test]
    fn parses_backend_field_names() {
        let value = serde_json::json!([
            {"question": "Q?", "questionType": "single", "selection": ["a", "b"]},
            {"question": "Free?", "questionType": "text"}
        ]);
        let questions = parse_questions(value).unwrap();
        assert_eq!(questions[0].selection, vec!["a", "b"]);
        assert!(questions[1].selection.is_empty());
    }

    #[test]
    fn rejects_non_list() {
        assert!(matches!(
            parse_questions(serde_json::json!({"uuid": "x"})),
            Err(SigningError::ValidationError(_))
        ));
    }

    #[test]
    fn answers_must_match_a_choice() {
        let questions = bundled_questions();
        assert!(questions[0].accepts("Yes"));
        assert!(!questions[0].accepts("yes please"));
        assert!(questions[2].accepts("more coffee"));
        assert!(!questions[2].accepts("  "));
    }
}
