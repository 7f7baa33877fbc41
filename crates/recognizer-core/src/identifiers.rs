//! Remote classifier response and the candidate identifiers derived from it.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Author as reported by the remote classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizerAuthor {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Metadata returned by the remote classifier for one document.
///
/// Every field is optional; the service omits what it could not determine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizerResponse {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<RecognizerAuthor>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub pages: Option<String>,
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub issue: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub issn: Option<String>,
    #[serde(default)]
    pub arxiv: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub isbn: Option<String>,
}

impl RecognizerResponse {
    /// Candidate identifiers in lookup preference order: arXiv, DOI, ISBN, title.
    ///
    /// Only identifiers that survive normalisation are returned.
    pub fn identifiers(&self) -> Vec<RecognizerIdentifier> {
        let mut identifiers = Vec::with_capacity(4);

        if let Some(id) = self.arxiv.as_deref().and_then(clean_arxiv) {
            identifiers.push(RecognizerIdentifier::Arxiv {
                id,
                automatic_tags: true,
            });
        }
        if let Some(id) = self.doi.as_deref().and_then(clean_doi) {
            identifiers.push(RecognizerIdentifier::Doi {
                id,
                automatic_tags: true,
            });
        }
        if let Some(id) = self.isbn.as_deref().and_then(clean_isbn) {
            identifiers.push(RecognizerIdentifier::Isbn {
                id,
                automatic_tags: true,
            });
        }
        if let Some(title) = non_empty(self.title.as_deref()) {
            identifiers.push(RecognizerIdentifier::Title {
                title: title.to_string(),
                automatic_tags: false,
            });
        }

        identifiers
    }
}

/// One candidate identifier to resolve into an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecognizerIdentifier {
    Arxiv { id: String, automatic_tags: bool },
    Doi { id: String, automatic_tags: bool },
    Isbn { id: String, automatic_tags: bool },
    /// Resolved locally from the classifier response, never looked up.
    Title { title: String, automatic_tags: bool },
}

impl RecognizerIdentifier {
    /// Identifier text as sent to a lookup service.
    pub fn value(&self) -> &str {
        match self {
            Self::Arxiv { id, .. } | Self::Doi { id, .. } | Self::Isbn { id, .. } => id,
            Self::Title { title, .. } => title,
        }
    }

    /// Whether tags on the resolved item should be marked automatic.
    pub fn automatic_tags(&self) -> bool {
        match self {
            Self::Arxiv { automatic_tags, .. }
            | Self::Doi { automatic_tags, .. }
            | Self::Isbn { automatic_tags, .. }
            | Self::Title { automatic_tags, .. } => *automatic_tags,
        }
    }

    pub fn is_title(&self) -> bool {
        matches!(self, Self::Title { .. })
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Arxiv { .. } => "arxiv",
            Self::Doi { .. } => "doi",
            Self::Isbn { .. } => "isbn",
            Self::Title { .. } => "title",
        }
    }
}

impl fmt::Display for RecognizerIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind_str(), self.value())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn doi_regex() -> Option<&'static Regex> {
    static DOI: OnceLock<Option<Regex>> = OnceLock::new();
    DOI.get_or_init(|| Regex::new(r"10\.\d{4,9}/\S+").ok()).as_ref()
}

/// Extract a bare DOI (`10.xxxx/…`) from free text, dropping trailing punctuation.
pub fn clean_doi(raw: &str) -> Option<String> {
    let found = doi_regex()?.find(raw)?.as_str();
    let trimmed = found.trim_end_matches(['.', ',', ';', ')', ']']);
    (!trimmed.ends_with('/')).then(|| trimmed.to_string())
}

/// Strip an `arXiv:` prefix and surrounding whitespace.
pub fn clean_arxiv(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let id = match trimmed.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("arxiv:") => &trimmed[6..],
        _ => trimmed,
    };
    non_empty(Some(id)).map(str::to_string)
}

/// First valid-length ISBN in a list separated by whitespace, commas or semicolons.
pub fn clean_isbn(raw: &str) -> Option<String> {
    raw.split([' ', ',', ';', '\t', '\n'])
        .map(|candidate| {
            candidate
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == 'x' || *c == 'X')
                .map(|c| c.to_ascii_uppercase())
                .collect::<String>()
        })
        .find(|isbn| isbn.len() == 10 || isbn.len() == 13)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response() -> RecognizerResponse {
        serde_json::from_value(serde_json::json!({
            "type": "journal-article",
            "title": "  Attention Is All You Need ",
            "authors": [{"firstName": "Ashish", "lastName": "Vaswani"}],
            "abstract": "The dominant sequence transduction models...",
            "year": "2017",
            "arxiv": "arXiv:1706.03762",
            "doi": "https://doi.org/10.48550/arXiv.1706.03762.",
            "isbn": "978-0-13-609181-3, 0136091814",
            "language": "en"
        }))
        .unwrap()
    }

    #[test]
    fn test_identifiers_in_preference_order() {
        let ids = response().identifiers();
        let kinds: Vec<_> = ids.iter().map(|i| i.kind_str()).collect();
        assert_eq!(kinds, vec!["arxiv", "doi", "isbn", "title"]);
        assert_eq!(ids[0].value(), "1706.03762");
        assert_eq!(ids[1].value(), "10.48550/arXiv.1706.03762");
        assert_eq!(ids[2].value(), "9780136091813");
        assert_eq!(ids[3].value(), "Attention Is All You Need");
    }

    #[test]
    fn test_title_identifier_has_manual_tags() {
        let ids = response().identifiers();
        assert!(ids[..3].iter().all(|i| i.automatic_tags()));
        assert!(!ids[3].automatic_tags());
        assert!(ids[3].is_title());
    }

    #[test]
    fn test_empty_response_has_no_identifiers() {
        let response: RecognizerResponse = serde_json::from_str("{}").unwrap();
        assert!(response.identifiers().is_empty());

        let blank = RecognizerResponse {
            title: Some("   ".into()),
            doi: Some("not a doi".into()),
            isbn: Some("12345".into()),
            arxiv: Some(" ".into()),
            ..Default::default()
        };
        assert!(blank.identifiers().is_empty());
    }

    #[test]
    fn test_only_present_identifiers() {
        let response = RecognizerResponse {
            isbn: Some("9780136091813".into()),
            ..Default::default()
        };
        assert_eq!(
            response.identifiers(),
            vec![RecognizerIdentifier::Isbn {
                id: "9780136091813".into(),
                automatic_tags: true
            }]
        );
    }

    #[test]
    fn test_clean_doi() {
        assert_eq!(clean_doi("10.1000/xyz123").as_deref(), Some("10.1000/xyz123"));
        assert_eq!(
            clean_doi("doi: 10.1038/nature14539).").as_deref(),
            Some("10.1038/nature14539")
        );
        assert_eq!(clean_doi("no doi here"), None);
    }

    #[test]
    fn test_doi_pattern_builds_once() {
        let first = doi_regex().expect("DOI pattern compiles");
        let second = doi_regex().expect("DOI pattern compiles");
        assert!(std::ptr::eq(first, second));
        assert_eq!(
            clean_doi("https://doi.org/10.48550/arXiv.1706.03762.").as_deref(),
            Some("10.48550/arXiv.1706.03762")
        );
    }

    #[test]
    fn test_clean_arxiv() {
        assert_eq!(clean_arxiv("ARXIV:2101.00001").as_deref(), Some("2101.00001"));
        assert_eq!(clean_arxiv(" hep-th/9901001 ").as_deref(), Some("hep-th/9901001"));
        assert_eq!(clean_arxiv("arXiv:"), None);
    }

    #[test]
    fn test_clean_isbn() {
        assert_eq!(clean_isbn("0-306-40615-x").as_deref(), Some("030640615X"));
        assert_eq!(clean_isbn("123 9780136091813").as_deref(), Some("9780136091813"));
        assert_eq!(clean_isbn("12"), None);
    }

    #[test]
    fn test_identifier_display() {
        let id = RecognizerIdentifier::Doi {
            id: "10.1000/xyz".into(),
            automatic_tags: true,
        };
        assert_eq!(id.to_string(), "doi:10.1000/xyz");
    }
}
