//! Failure classification for provider-reported errors
//!
//! The provider does not always supply a structured reason code, so the
//! classifier is deliberately heuristic: a case-insensitive substring
//! scan of the raw error text against a configurable term list. A match
//! means the content itself was refused (the user should rephrase, not
//! retry); no match means a technical failure (a retry may succeed).

use crate::config::ClassificationConfig;
use crate::types::Verdict;

/// Classify a raw provider error string into a terminal verdict
pub fn classify_failure(error_message: &str, config: &ClassificationConfig) -> Verdict {
    let lowered = error_message.to_lowercase();

    let is_rejection = config
        .rejection_terms
        .iter()
        .any(|term| !term.is_empty() && lowered.contains(&term.to_lowercase()));

    if is_rejection {
        Verdict::Rejected
    } else {
        Verdict::Failed
    }
}
