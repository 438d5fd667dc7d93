use std::sync::LazyLock;

use nomad_common::{Error, Result};
use regex::RegexSet;
use tracing::warn;

const MAX_SESSION_ID_LEN: usize = 128;

static INJECTION_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)ignore\s+(all\s+)?(previous|prior|above)\s+instructions",
        r"(?i)disregard\s+(the\s+)?(system|previous)\s+prompt",
        r"(?i)you\s+are\s+now\s+(a|an|in)\b",
        r"(?i)reveal\s+(your|the)\s+(system\s+prompt|instructions)",
        r"(?i)\bjailbreak\b",
        r"(?i)developer\s+mode",
    ])
    .expect("injection patterns should compile")
});

/// Checks and normalizes client-supplied text before it reaches the model.
///
/// Suspected prompt injection is logged but never blocked.
#[derive(Debug, Clone)]
pub struct InputValidator {
    max_chars: usize,
}

impl InputValidator {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// Trim, reject empty input, truncate to the configured length, and log
    /// injection-looking phrases.
    pub fn sanitize_message(&self, text: &str) -> Result<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(Error::Validation("message must not be empty".to_string()));
        }

        let clean = truncate_chars(trimmed, self.max_chars);
        if clean.len() < trimmed.len() {
            warn!(
                max_chars = self.max_chars,
                "client message truncated to configured length"
            );
        }

        let hits = self.injection_markers(&clean);
        if !hits.is_empty() {
            warn!(patterns = ?hits, "possible prompt injection in client message");
        }
        Ok(clean)
    }

    /// Indices of the injection patterns that matched.
    pub fn injection_markers(&self, text: &str) -> Vec<usize> {
        INJECTION_PATTERNS.matches(text).into_iter().collect()
    }

    pub fn validate_session_id(&self, session_id: &str) -> Result<()> {
        if session_id.is_empty() || session_id.len() > MAX_SESSION_ID_LEN {
            return Err(Error::Validation(format!(
                "session_id must be 1 to {MAX_SESSION_ID_LEN} characters"
            )));
        }
        let valid = session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
        if !valid {
            return Err(Error::Validation(
                "session_id may only contain letters, digits, '-', '_', '.', ':'".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new(2000)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
