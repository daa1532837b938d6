//! Classification of free-form model output
//!
//! Both functions here are pure: text in, closed enum out. They never fail;
//! anything unrecognized maps to [`Decision::Unparseable`] or
//! [`Extraction::Empty`].

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use sightline_common::Decision;

static DECISION_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<decision>(.*?)</decision>").expect("valid regex"));

static EXTRACTED_VALUE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<extracted_value>(.*?)</extracted_value>").expect("valid regex")
});

static WAIT_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<wait\s*/>").expect("valid regex"));

static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// Classify an assertion response.
///
/// The first `<decision>` tag holding a recognized label wins; tags with
/// other content are skipped. Without one, the whole response, trimmed and
/// lowercased, must itself be one of the labels.
pub fn classify_decision(response: &str) -> Decision {
    for caps in DECISION_TAG.captures_iter(response) {
        match Decision::from_label(&caps[1]) {
            Some(decision) => return decision,
            None => warn!(tag = %caps[1].trim(), "Unrecognized decision tag content"),
        }
    }

    Decision::from_label(response).unwrap_or(Decision::Unparseable)
}

/// Outcome of an extraction response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// The page is still loading; capture again later.
    Wait,
    /// Value from an `<extracted_value>` tag.
    Value(String),
    /// No tag; the response with all markup stripped.
    Untagged(String),
    /// Nothing usable.
    Empty,
}

pub fn classify_extraction(response: &str) -> Extraction {
    if WAIT_TAG.is_match(response) {
        return Extraction::Wait;
    }

    if let Some(caps) = EXTRACTED_VALUE_TAG.captures(response) {
        return Extraction::Value(caps[1].trim().to_string());
    }

    let stripped = ANY_TAG.replace_all(response, "");
    let stripped = stripped.trim();
    if stripped.is_empty() {
        Extraction::Empty
    } else {
        Extraction::Untagged(stripped.to_string())
    }
}
