use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Category of personally identifiable information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiCategory {
    Name,
    Email,
    Phone,
    Address,
    NationalId,
    Financial,
}

impl PiiCategory {
    pub const ALL: [PiiCategory; 6] = [
        PiiCategory::Name,
        PiiCategory::Email,
        PiiCategory::Phone,
        PiiCategory::Address,
        PiiCategory::NationalId,
        PiiCategory::Financial,
    ];

    pub fn all() -> BTreeSet<PiiCategory> {
        Self::ALL.iter().copied().collect()
    }

    /// Replacement token written into redacted text
    pub fn placeholder(&self) -> &'static str {
        match self {
            PiiCategory::Name => "[NAME]",
            PiiCategory::Email => "[EMAIL]",
            PiiCategory::Phone => "[PHONE]",
            PiiCategory::Address => "[ADDRESS]",
            PiiCategory::NationalId => "[NATIONAL_ID]",
            PiiCategory::Financial => "[FINANCIAL]",
        }
    }

    /// Stem of the numbered pseudonyms used by anonymization, e.g. `PERSON_1`
    pub fn pseudonym_prefix(&self) -> &'static str {
        match self {
            PiiCategory::Name => "PERSON",
            PiiCategory::Email => "EMAIL",
            PiiCategory::Phone => "PHONE",
            PiiCategory::Address => "LOCATION",
            PiiCategory::NationalId => "NATIONAL_ID",
            PiiCategory::Financial => "ACCOUNT",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PiiCategory::Name => "name",
            PiiCategory::Email => "email",
            PiiCategory::Phone => "phone",
            PiiCategory::Address => "address",
            PiiCategory::NationalId => "national_id",
            PiiCategory::Financial => "financial",
        }
    }
}

impl fmt::Display for PiiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PiiCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "name" | "person" => Ok(PiiCategory::Name),
            "email" => Ok(PiiCategory::Email),
            "phone" => Ok(PiiCategory::Phone),
            "address" | "location" => Ok(PiiCategory::Address),
            "national_id" | "ssn" | "id" => Ok(PiiCategory::NationalId),
            "financial" | "credit_card" | "iban" => Ok(PiiCategory::Financial),
            other => Err(CoreError::Validation(format!("unknown PII category: {}", other))),
        }
    }
}

/// A flagged region of the original text. Offsets are UTF-8 byte offsets, `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PiiSpan {
    pub start: usize,
    pub end: usize,
    pub category: PiiCategory,
    pub confidence: f64,
}

impl PiiSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn overlaps(&self, other: &PiiSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

pub(crate) const EMAIL_CONFIDENCE: f64 = 0.99;
pub(crate) const PHONE_CONFIDENCE: f64 = 0.85;
pub(crate) const BARE_PHONE_CONFIDENCE: f64 = 0.6;
pub(crate) const SSN_CONFIDENCE: f64 = 0.95;
pub(crate) const CARD_CONFIDENCE: f64 = 0.95;
pub(crate) const IBAN_CONFIDENCE: f64 = 0.9;
pub(crate) const ADDRESS_CONFIDENCE: f64 = 0.85;
pub(crate) const HONORIFIC_NAME_CONFIDENCE: f64 = 0.9;
pub(crate) const CUED_NAME_CONFIDENCE: f64 = 0.85;
/// Two or more capitalised words with no cue word or honorific in front.
///
/// Heuristic limit: this sits below the default 0.75 threshold, so an uncued
/// name such as "My friend Jane Doe" is reported but left in the redacted
/// text. Attaching an entity detector is the way to catch those.
pub(crate) const BARE_NAME_CONFIDENCE: f64 = 0.5;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b"
    ).unwrap();

    // +CC optional, then (NNN) or NNN, then NNN NNNN with optional separators
    static ref PHONE_REGEX: Regex = Regex::new(
        r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{3}\)|\b\d{3})[\s.-]?\d{3}[\s.-]?\d{4}\b"
    ).unwrap();

    static ref SSN_REGEX: Regex = Regex::new(
        r"\b\d{3}-\d{2}-\d{4}\b"
    ).unwrap();

    static ref CARD_REGEX: Regex = Regex::new(
        r"\b(?:\d{4}[-\s]?){3}\d{4}\b|\b\d{4}[-\s]?\d{6}[-\s]?\d{5}\b"
    ).unwrap();

    static ref IBAN_REGEX: Regex = Regex::new(
        r"\b[A-Z]{2}\d{2}(?:\s?[A-Z0-9]{4}){2,7}(?:\s?[A-Z0-9]{1,3})?\b"
    ).unwrap();

    static ref ADDRESS_REGEX: Regex = Regex::new(
        r"\b\d{1,5}\s+(?:[A-Z][A-Za-z]*\.?\s+){1,4}(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr|Court|Ct|Way|Place|Pl|Terrace|Square|Sq)\b\.?"
    ).unwrap();

    static ref NAME_REGEX: Regex = Regex::new(
        r"\b[A-Z][a-z]+(?:[-'][A-Z][a-z]+)?(?:\s+[A-Z][a-z]+(?:[-'][A-Z][a-z]+)?)*\b"
    ).unwrap();

    static ref HONORIFIC_NAME_REGEX: Regex = Regex::new(
        r"\b(?:Mr|Mrs|Ms|Miss|Dr|Prof)\.?\s+[A-Z][a-z]+(?:[-'][A-Z][a-z]+)?(?:\s+[A-Z][a-z]+(?:[-'][A-Z][a-z]+)?)*\b"
    ).unwrap();

    static ref NAME_WORD_REGEX: Regex = Regex::new(
        r"[A-Z][a-z]+(?:[-'][A-Z][a-z]+)?"
    ).unwrap();
}

/// Capitalised words that introduce a name rather than belong to it
const CUE_WORDS: &[&str] = &[
    "Contact", "Call", "Email", "Text", "Message", "Ask", "Meet", "Met", "Dear", "Hi", "Hello",
    "Hey", "Thanks", "Regards", "Cheers", "Signed",
];

/// Capitalised words that are never part of a personal name
const NON_NAME_WORDS: &[&str] = &[
    "The", "This", "That", "These", "Those", "My", "Our", "Your", "We", "You", "They", "He",
    "She", "It", "And", "But", "Or", "If", "When", "Where", "What", "Who", "Why", "How", "At",
    "In", "On", "For", "From", "With", "About", "Monday", "Tuesday", "Wednesday", "Thursday",
    "Friday", "Saturday", "Sunday", "January", "February", "March", "April", "May", "June",
    "July", "August", "September", "October", "November", "December", "Mr", "Mrs", "Ms",
    "Miss", "Dr", "Prof",
];

/// Lowercase phrases that, directly before a capitalised run, mark it as a name
const PRECEDING_CUES: &[&str] = &[
    "name is", "i am", "i'm", "contact", "call", "ask for", "meet", "met", "dear", "hi", "hello",
    "thanks", "email", "text", "message",
];

/// Run every requested pattern matcher. Returned spans may overlap.
pub fn detect_patterns(text: &str, categories: &BTreeSet<PiiCategory>) -> Vec<PiiSpan> {
    let mut spans = Vec::new();

    for category in categories {
        match category {
            PiiCategory::Email => detect_emails(text, &mut spans),
            PiiCategory::Phone => detect_phones(text, &mut spans),
            PiiCategory::NationalId => detect_national_ids(text, &mut spans),
            PiiCategory::Financial => detect_financial(text, &mut spans),
            PiiCategory::Address => detect_addresses(text, &mut spans),
            PiiCategory::Name => detect_names(text, &mut spans),
        }
    }

    spans
}

fn push(spans: &mut Vec<PiiSpan>, start: usize, end: usize, category: PiiCategory, confidence: f64) {
    spans.push(PiiSpan {
        start,
        end,
        category,
        confidence,
    });
}

fn detect_emails(text: &str, spans: &mut Vec<PiiSpan>) {
    for mat in EMAIL_REGEX.find_iter(text) {
        push(spans, mat.start(), mat.end(), PiiCategory::Email, EMAIL_CONFIDENCE);
    }
}

fn detect_phones(text: &str, spans: &mut Vec<PiiSpan>) {
    for mat in PHONE_REGEX.find_iter(text) {
        let separated = mat
            .as_str()
            .chars()
            .any(|c| matches!(c, ' ' | '-' | '.' | '(' | '+'));
        let confidence = if separated {
            PHONE_CONFIDENCE
        } else {
            BARE_PHONE_CONFIDENCE
        };
        push(spans, mat.start(), mat.end(), PiiCategory::Phone, confidence);
    }
}

fn detect_national_ids(text: &str, spans: &mut Vec<PiiSpan>) {
    for mat in SSN_REGEX.find_iter(text) {
        push(spans, mat.start(), mat.end(), PiiCategory::NationalId, SSN_CONFIDENCE);
    }
}

fn detect_financial(text: &str, spans: &mut Vec<PiiSpan>) {
    for mat in CARD_REGEX.find_iter(text) {
        let digits = mat.as_str().replace(['-', ' '], "");
        if is_valid_luhn(&digits) {
            push(spans, mat.start(), mat.end(), PiiCategory::Financial, CARD_CONFIDENCE);
        }
    }

    for mat in IBAN_REGEX.find_iter(text) {
        if is_valid_iban(mat.as_str()) {
            push(spans, mat.start(), mat.end(), PiiCategory::Financial, IBAN_CONFIDENCE);
        }
    }
}

fn detect_addresses(text: &str, spans: &mut Vec<PiiSpan>) {
    for mat in ADDRESS_REGEX.find_iter(text) {
        push(spans, mat.start(), mat.end(), PiiCategory::Address, ADDRESS_CONFIDENCE);
    }
}

fn detect_names(text: &str, spans: &mut Vec<PiiSpan>) {
    for mat in HONORIFIC_NAME_REGEX.find_iter(text) {
        push(
            spans,
            mat.start(),
            mat.end(),
            PiiCategory::Name,
            HONORIFIC_NAME_CONFIDENCE,
        );
    }

    for mat in NAME_REGEX.find_iter(text) {
        let run = mat.as_str();
        let words: Vec<(usize, usize, &str)> = NAME_WORD_REGEX
            .find_iter(run)
            .map(|w| (w.start(), w.end(), w.as_str()))
            .collect();

        // Leading cue and filler words are not part of the name
        let mut cued = preceded_by_cue(&text[..mat.start()]);
        let mut first = 0;
        while first < words.len() {
            let word = words[first].2;
            if CUE_WORDS.contains(&word) {
                cued = true;
            } else if !NON_NAME_WORDS.contains(&word) {
                break;
            }
            first += 1;
        }

        let mut last = words.len();
        while last > first && NON_NAME_WORDS.contains(&words[last - 1].2) {
            last -= 1;
        }

        let remaining = &words[first..last];
        if remaining.len() < 2 || remaining.iter().any(|(_, _, w)| NON_NAME_WORDS.contains(w)) {
            continue;
        }

        let start = mat.start() + remaining[0].0;
        let end = mat.start() + remaining[remaining.len() - 1].1;
        let confidence = if cued {
            CUED_NAME_CONFIDENCE
        } else {
            BARE_NAME_CONFIDENCE
        };
        push(spans, start, end, PiiCategory::Name, confidence);
    }
}

fn preceded_by_cue(before: &str) -> bool {
    let tail_start = before.len().saturating_sub(24);
    let tail_start = (tail_start..=before.len())
        .find(|&i| before.is_char_boundary(i))
        .unwrap_or(before.len());
    let tail = before[tail_start..]
        .trim_end()
        .trim_end_matches([',', ':'])
        .to_lowercase();

    PRECEDING_CUES.iter().any(|cue| {
        tail.ends_with(cue)
            && tail[..tail.len() - cue.len()]
                .chars()
                .last()
                .map_or(true, |c| !c.is_alphanumeric())
    })
}

/// Luhn checksum for card numbers
fn is_valid_luhn(card_number: &str) -> bool {
    let digits: Vec<u32> = card_number.chars().filter_map(|c| c.to_digit(10)).collect();

    if digits.len() < 13 || digits.len() > 19 {
        return false;
    }

    let checksum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(idx, &digit)| {
            if idx % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                digit
            }
        })
        .sum();

    checksum % 10 == 0
}

/// ISO 13616 mod-97 check
fn is_valid_iban(candidate: &str) -> bool {
    let compact: String = candidate.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() < 15 || compact.len() > 34 {
        return false;
    }

    let (head, tail) = compact.split_at(4);
    let mut remainder: u32 = 0;
    for c in tail.chars().chain(head.chars()) {
        let value = match c.to_digit(36) {
            Some(v) => v,
            None => return false,
        };
        remainder = if value >= 10 {
            (remainder * 100 + value) % 97
        } else {
            (remainder * 10 + value) % 97
        };
    }

    remainder == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(text: &str, category: PiiCategory) -> Vec<PiiSpan> {
        let categories = [category].into_iter().collect();
        detect_patterns(text, &categories)
    }

    fn slices<'a>(text: &'a str, spans: &[PiiSpan]) -> Vec<&'a str> {
        spans.iter().map(|s| &text[s.start..s.end]).collect()
    }

    #[test]
    fn test_detect_emails() {
        let text = "Contact me at john.doe@example.com or jane@x.com";
        let spans = detect(text, PiiCategory::Email);
        assert_eq!(slices(text, &spans), vec!["john.doe@example.com", "jane@x.com"]);
        assert!(spans.iter().all(|s| s.confidence >= 0.99));
    }

    #[test]
    fn test_detect_phones() {
        let text = "Call me at (555) 123-4567 or +1 555 987 6543";
        let spans = detect(text, PiiCategory::Phone);
        assert_eq!(spans.len(), 2);
        assert_eq!(&text[spans[0].start..spans[0].end], "(555) 123-4567");
        assert!(spans.iter().all(|s| s.confidence == PHONE_CONFIDENCE));
    }

    #[test]
    fn test_bare_digit_run_is_low_confidence_phone() {
        let spans = detect("order 5551234567", PiiCategory::Phone);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].confidence, BARE_PHONE_CONFIDENCE);
    }

    #[test]
    fn test_detect_ssn() {
        let text = "My SSN is 123-45-6789.";
        let spans = detect(text, PiiCategory::NationalId);
        assert_eq!(slices(text, &spans), vec!["123-45-6789"]);
    }

    #[test]
    fn test_detect_card_requires_luhn() {
        let valid = detect("Card: 4532-1488-0343-6467", PiiCategory::Financial);
        assert_eq!(valid.len(), 1);

        let invalid = detect("Card: 1234-5678-9012-3456", PiiCategory::Financial);
        assert!(invalid.is_empty());
    }

    #[test]
    fn test_detect_iban() {
        let text = "Pay to GB82 WEST 1234 5698 7654 32 please";
        let spans = detect(text, PiiCategory::Financial);
        assert_eq!(slices(text, &spans), vec!["GB82 WEST 1234 5698 7654 32"]);
    }

    #[test]
    fn test_detect_address() {
        let text = "I live at 221 Baker Street, near the park.";
        let spans = detect(text, PiiCategory::Address);
        assert_eq!(slices(text, &spans), vec!["221 Baker Street"]);
    }

    #[test]
    fn test_cue_word_is_trimmed_from_name() {
        let text = "Contact Jane Doe at jane@x.com";
        let spans = detect(text, PiiCategory::Name);
        assert_eq!(slices(text, &spans), vec!["Jane Doe"]);
        assert_eq!(spans[0].confidence, CUED_NAME_CONFIDENCE);
    }

    #[test]
    fn test_preceding_phrase_cues_name() {
        let text = "Hello, my name is Maria Lopez and I paint.";
        let spans = detect(text, PiiCategory::Name);
        assert_eq!(slices(text, &spans), vec!["Maria Lopez"]);
        assert_eq!(spans[0].confidence, CUED_NAME_CONFIDENCE);
    }

    #[test]
    fn test_honorific_name() {
        let text = "Ask Dr. Smith about it";
        let spans = detect(text, PiiCategory::Name);
        assert_eq!(slices(text, &spans), vec!["Dr. Smith"]);
        assert_eq!(spans[0].confidence, HONORIFIC_NAME_CONFIDENCE);
    }

    #[test]
    fn test_uncued_capitalised_pair_is_low_confidence() {
        let text = "We went hiking near Lake Tahoe.";
        let spans = detect(text, PiiCategory::Name);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].confidence, BARE_NAME_CONFIDENCE);

        let text = "My friend Jane Doe";
        let spans = detect(text, PiiCategory::Name);
        assert_eq!(slices(text, &spans), vec!["Jane Doe"]);
        assert!(spans[0].confidence < 0.75);
    }

    #[test]
    fn test_placeholders_do_not_match() {
        let text = "Contact [NAME] at [EMAIL] or [PHONE], [ADDRESS]";
        assert!(detect_patterns(text, &PiiCategory::all()).is_empty());
    }

    #[test]
    fn test_pseudonyms_do_not_match() {
        let text = "Contact PERSON_1 at EMAIL_1 or PHONE_2, LOCATION_1, ACCOUNT_3, NATIONAL_ID_1";
        assert!(detect_patterns(text, &PiiCategory::all()).is_empty());
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("national-id".parse::<PiiCategory>().unwrap(), PiiCategory::NationalId);
        assert_eq!("EMAIL".parse::<PiiCategory>().unwrap(), PiiCategory::Email);
        assert!("blood_type".parse::<PiiCategory>().is_err());
    }

    #[test]
    fn test_span_overlap() {
        let a = PiiSpan { start: 0, end: 5, category: PiiCategory::Name, confidence: 0.5 };
        let b = PiiSpan { start: 4, end: 8, category: PiiCategory::Email, confidence: 0.9 };
        let c = PiiSpan { start: 5, end: 8, category: PiiCategory::Email, confidence: 0.9 };
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}
