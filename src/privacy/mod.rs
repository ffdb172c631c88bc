//! PII detection and redaction
//!
//! Pattern matchers cover structured PII (emails, phones, national ids, card
//! numbers, IBANs, street addresses) and a capitalisation heuristic for
//! personal names. An optional [`EntityDetector`] adds model-based spans; the
//! sanitizer bounds it with a timeout and falls back to patterns alone.
//! Anonymization swaps detected values for numbered pseudonyms instead of
//! category placeholders.
//!
//! ```rust
//! use universa_match::privacy::{PiiCategory, Sanitizer, SanitizerConfig};
//!
//! let sanitizer = Sanitizer::new(SanitizerConfig::default());
//! let report = sanitizer
//!     .sanitize_patterns("Contact Jane Doe at jane@x.com", &PiiCategory::all())
//!     .unwrap();
//! assert_eq!(report.redacted_text, "Contact [NAME] at [EMAIL]");
//! ```

pub mod anonymizer;
pub mod detector;
pub mod model;
pub mod sanitizer;

pub use anonymizer::{anonymize_profile, pseudonymize, AnonymizedText, PseudonymMapping};
pub use detector::{detect_patterns, PiiCategory, PiiSpan};
pub use model::{category_for_label, DetectorError, EntityDetector, HttpEntityDetector};
pub use sanitizer::{redact, resolve_overlaps, PiiReport, Sanitizer, SanitizerConfig};
