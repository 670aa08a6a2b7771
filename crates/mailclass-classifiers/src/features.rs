//! Surface meta-features of an email
//!
//! Four cheap statistics appended to the sentence embedding before
//! classification: subject length, body length, URL count and an
//! HTML-tag flag. Column order is fixed; the trained classifiers expect it.

use regex::Regex;
use std::sync::OnceLock;

/// Number of meta-feature columns appended to the embedding
pub const META_FEATURE_COUNT: usize = 4;

static URL_REGEX: OnceLock<Regex> = OnceLock::new();
static HTML_TAG_REGEX: OnceLock<Regex> = OnceLock::new();

fn url_regex() -> &'static Regex {
    URL_REGEX.get_or_init(|| {
        Regex::new(r"(?i)https?://\S+|\bwww\.\S+").expect("URL pattern is valid")
    })
}

fn html_tag_regex() -> &'static Regex {
    HTML_TAG_REGEX.get_or_init(|| {
        Regex::new(r"(?i)</?[a-z][\s\S]*>").expect("HTML tag pattern is valid")
    })
}

/// Meta-features for one email
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetaFeatures {
    /// Character count of the subject
    pub subject_length: usize,

    /// Character count of the body
    pub body_length: usize,

    /// Non-overlapping URL matches in the body
    pub url_count: usize,

    /// Whether the body contains something that looks like an HTML tag
    pub has_html: bool,
}

impl MetaFeatures {
    /// Numeric row in classifier column order
    pub fn to_row(&self) -> [f64; META_FEATURE_COUNT] {
        [
            self.subject_length as f64,
            self.body_length as f64,
            self.url_count as f64,
            if self.has_html { 1.0 } else { 0.0 },
        ]
    }
}

/// Extract meta-features from a subject and body.
///
/// Lengths count Unicode scalar values, not bytes. Only the body is scanned
/// for URLs and HTML.
pub fn meta_features(subject: &str, body: &str) -> MetaFeatures {
    MetaFeatures {
        subject_length: subject.chars().count(),
        body_length: body.chars().count(),
        url_count: url_regex().find_iter(body).count(),
        has_html: html_tag_regex().is_match(body),
    }
}
