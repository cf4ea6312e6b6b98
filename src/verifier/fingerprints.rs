//! Fingerprint extraction — distinctive wrong facts from a claim.
//!
//! A "fingerprint" is a short substring of a known-wrong claim that is
//! unlikely to reappear by coincidence: a phone number, a time of day, a
//! street address, a dollar amount. Pattern families run in that priority
//! order, capped at four fingerprints; claims matching none fall back to
//! their first few long words as a loose signature.

use std::sync::OnceLock;

/// Maximum distinctive fingerprints taken from one claim.
const MAX_FINGERPRINTS: usize = 4;
/// Loose-fallback word count and minimum word length.
const FALLBACK_WORDS: usize = 3;
const FALLBACK_MIN_LEN: usize = 5;

static RE_PHONE: OnceLock<regex::Regex> = OnceLock::new();
static RE_TIME: OnceLock<regex::Regex> = OnceLock::new();
static RE_ADDRESS: OnceLock<regex::Regex> = OnceLock::new();
static RE_MONEY: OnceLock<regex::Regex> = OnceLock::new();

fn re_phone() -> &'static regex::Regex {
    RE_PHONE.get_or_init(|| {
        regex::Regex::new(r"\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").expect("phone regex")
    })
}

fn re_time() -> &'static regex::Regex {
    RE_TIME.get_or_init(|| {
        regex::Regex::new(r"(?i)\b\d{1,2}(?::\d{2})?\s?(?:am|pm)\b").expect("time regex")
    })
}

fn re_address() -> &'static regex::Regex {
    RE_ADDRESS.get_or_init(|| {
        regex::Regex::new(
            r"(?i)\b\d+\s+(?:[A-Za-z]+\s+){1,3}(?:street|st|avenue|ave|road|rd|boulevard|blvd|drive|dr|lane|ln|way|court|ct)\b",
        )
        .expect("address regex")
    })
}

fn re_money() -> &'static regex::Regex {
    RE_MONEY.get_or_init(|| {
        regex::Regex::new(r"\$\d+(?:,\d{3})*(?:\.\d{1,2})?").expect("money regex")
    })
}

/// Extract up to four distinctive fingerprints from `claim`, in priority
/// order. Returns the loose word fallback when no pattern family matches,
/// and an empty vec for claims with nothing usable at all.
pub fn extract_fingerprints(claim: &str) -> Vec<String> {
    let mut fingerprints: Vec<String> = Vec::new();

    for re in [re_phone(), re_time(), re_address(), re_money()] {
        for m in re.find_iter(claim) {
            if fingerprints.len() >= MAX_FINGERPRINTS {
                return fingerprints;
            }
            let found = m.as_str().trim().to_string();
            if !fingerprints.iter().any(|f| f.eq_ignore_ascii_case(&found)) {
                fingerprints.push(found);
            }
        }
    }

    if !fingerprints.is_empty() {
        return fingerprints;
    }

    // Loose signature: the first few substantial words.
    claim
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| w.chars().count() >= FALLBACK_MIN_LEN)
        .take(FALLBACK_WORDS)
        .map(str::to_string)
        .collect()
}
