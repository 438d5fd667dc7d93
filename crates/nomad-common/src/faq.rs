//! Curated patterns for repeat-prone hotel questions.
//!
//! Shared by the response cache (eligibility) and the complexity classifier
//! (FAQ questions get the smallest response budget).

use std::sync::LazyLock;

use regex::RegexSet;

static FAQ_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\bwi-?fi\b",
        r"(?i)\binternet\b",
        r"(?i)\b(network|wifi)\s+password\b",
        r"(?i)\bbreakfast\b",
        r"(?i)\bcheck[\s-]?(out|in)\b",
        r"(?i)\bpool\b",
        r"(?i)\b(gym|fitness)\b",
        r"(?i)\bspa\b",
        r"(?i)\bparking\b",
        r"(?i)\b(opening|business)\s+hours\b",
        r"(?i)\bwhat\s+time\s+does\b.*\b(open|close)",
        r"(?i)\bhours\b",
    ])
    .expect("FAQ patterns should compile")
});

/// Whether the question belongs to the curated FAQ set.
pub fn is_faq_question(question: &str) -> bool {
    FAQ_PATTERNS.is_match(question)
}
