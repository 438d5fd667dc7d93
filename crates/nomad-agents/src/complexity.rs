use std::sync::LazyLock;

use nomad_common::is_faq_question;
use regex::{Regex, RegexSet};
use serde::Serialize;

/// Utterances shorter than this are always simple.
const SHORT_UTTERANCE_CHARS: usize = 20;
/// Utterances longer than this are always complex.
const LONG_UTTERANCE_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    /// Response token budget for this class.
    pub fn max_tokens(self) -> u32 {
        match self {
            Complexity::Simple => 256,
            Complexity::Medium => 512,
            Complexity::Complex => 1024,
        }
    }
}

static GREETING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(hi|hello|hey|good\s+(morning|afternoon|evening)|thanks|thank\s+you|ok(ay)?|great|cool|bye|goodbye)\b",
    )
    .expect("greeting regex should compile")
});

static COMPLEX_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        // several clauses joined and asked as one question
        r"(?i)\b(and|also|then|plus)\b.+\?",
        r"(?i)\b(plan|planning|itinerary|book|booking|reserve|reservation|schedule|arrange|organi[sz]e)\b",
        r"(?i)\b(call|phone|contact|email|reach)\b",
    ])
    .expect("complexity patterns should compile")
});

/// Pick a response budget from the guest's utterance.
///
/// Rules in priority order: short text, FAQ topics and greetings are simple;
/// long text, compound questions, planning or booking, and contact requests
/// are complex; everything else is medium.
pub fn classify(utterance: &str) -> Complexity {
    let text = utterance.trim();

    if text.chars().count() < SHORT_UTTERANCE_CHARS {
        return Complexity::Simple;
    }
    if is_faq_question(text) {
        return Complexity::Simple;
    }
    if GREETING.is_match(text) {
        return Complexity::Simple;
    }
    if text.chars().count() > LONG_UTTERANCE_CHARS || COMPLEX_PATTERNS.is_match(text) {
        return Complexity::Complex;
    }
    Complexity::Medium
}
