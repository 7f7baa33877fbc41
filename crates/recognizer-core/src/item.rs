//! Parsed bibliographic items.
//!
//! Items come from two places: translator JSON returned by an identifier
//! lookup, or a direct synthesis from the classifier response when the only
//! usable candidate is a bare title.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::trace;

use crate::error::RecognitionError;
use crate::identifiers::RecognizerResponse;

/// Translator keys that are structural rather than item fields.
const NON_FIELD_KEYS: &[&str] = &[
    "itemType",
    "title",
    "creators",
    "tags",
    "notes",
    "attachments",
    "seeAlso",
    "key",
    "version",
    "collections",
    "relations",
];

/// A creator (author, editor, ...) of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub creator_type: String,
    pub first_name: String,
    /// Full name for single-field creators (institutions).
    pub last_name: String,
}

impl Creator {
    pub fn author(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            creator_type: "author".to_string(),
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

/// A tag attached to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTag {
    pub name: String,
    /// Set for tags that came from metadata rather than the user.
    pub automatic: bool,
}

/// An item ready to be reported or stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedItem {
    pub item_type: String,
    pub title: String,
    pub creators: Vec<Creator>,
    /// Remaining item fields keyed by their translator field name.
    pub fields: BTreeMap<String, String>,
    pub tags: Vec<ItemTag>,
}

impl ParsedItem {
    /// Parse the first item of a translator response.
    ///
    /// `automatic_tags` marks every tag on the result as automatic.
    pub fn from_translator_json(
        value: &JsonValue,
        automatic_tags: bool,
    ) -> Result<Self, RecognitionError> {
        let object = match value {
            JsonValue::Array(items) => items.first(),
            other => Some(other),
        }
        .and_then(JsonValue::as_object)
        .ok_or_else(|| RecognitionError::ParseFailure("expected an item object".into()))?;

        let item_type = object
            .get("itemType")
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RecognitionError::ParseFailure("missing itemType".into()))?
            .to_string();

        let title = object
            .get("title")
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RecognitionError::ParseFailure("missing title".into()))?
            .to_string();

        let creators = object
            .get("creators")
            .and_then(JsonValue::as_array)
            .map(|creators| creators.iter().filter_map(parse_creator).collect())
            .unwrap_or_default();

        let tags = object
            .get("tags")
            .and_then(JsonValue::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(|tag| match tag {
                        JsonValue::String(name) => Some(name.as_str()),
                        JsonValue::Object(obj) => obj.get("tag").and_then(JsonValue::as_str),
                        _ => None,
                    })
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(|name| ItemTag {
                        name: name.to_string(),
                        automatic: automatic_tags,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut fields = BTreeMap::new();
        for (key, value) in object {
            if NON_FIELD_KEYS.contains(&key.as_str()) {
                continue;
            }
            let text = match value {
                JsonValue::String(s) if !s.trim().is_empty() => s.trim().to_string(),
                JsonValue::Number(n) => n.to_string(),
                _ => {
                    trace!(field = %key, "Skipping non-scalar translator field");
                    continue;
                }
            };
            fields.insert(key.clone(), text);
        }

        Ok(Self {
            item_type,
            title,
            creators,
            fields,
            tags,
        })
    }

    /// Build an item directly from classifier metadata.
    pub fn from_recognizer_response(
        response: &RecognizerResponse,
    ) -> Result<Self, RecognitionError> {
        let title = response
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                RecognitionError::ParseFailure("classifier response has no title".into())
            })?
            .to_string();

        let is_chapter = response.kind.as_deref() == Some("book-chapter");
        let item_type = if is_chapter { "bookSection" } else { "journalArticle" };
        let container_field = if is_chapter {
            "bookTitle"
        } else {
            "publicationTitle"
        };

        let creators = response
            .authors
            .iter()
            .filter_map(|author| {
                let first = author.first_name.as_deref().unwrap_or("").trim();
                let last = author.last_name.as_deref().unwrap_or("").trim();
                (!first.is_empty() || !last.is_empty()).then(|| Creator::author(first, last))
            })
            .collect();

        let mut fields = BTreeMap::new();
        let mut copy = |field: &str, value: &Option<String>| {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                fields.insert(field.to_string(), v.to_string());
            }
        };
        copy(container_field, &response.container);
        copy("date", &response.year);
        copy("pages", &response.pages);
        copy("volume", &response.volume);
        copy("issue", &response.issue);
        copy("url", &response.url);
        copy("publisher", &response.publisher);
        copy("ISSN", &response.issn);
        copy("abstractNote", &response.abstract_text);
        copy("language", &response.language);
        if !is_chapter {
            if let Some(doi) = response.doi.as_deref().and_then(crate::identifiers::clean_doi) {
                fields.insert("DOI".to_string(), doi);
            }
        }

        Ok(Self {
            item_type: item_type.to_string(),
            title,
            creators,
            fields,
            tags: Vec::new(),
        })
    }

    /// Fill `abstractNote` and `language` from the classifier when the item lacks them.
    pub fn enrich_from(&mut self, response: &RecognizerResponse) {
        for (field, value) in [
            ("abstractNote", &response.abstract_text),
            ("language", &response.language),
        ] {
            if self.fields.contains_key(field) {
                continue;
            }
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                self.fields.insert(field.to_string(), v.to_string());
            }
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Four-digit year from the `date` field, if one can be found.
    pub fn year(&self) -> Option<&str> {
        let date = self.field("date")?;
        date.as_bytes()
            .windows(4)
            .position(|w| w.iter().all(u8::is_ascii_digit))
            .map(|start| &date[start..start + 4])
    }
}

fn parse_creator(value: &JsonValue) -> Option<Creator> {
    let obj = value.as_object()?;
    let creator_type = obj
        .get("creatorType")
        .and_then(JsonValue::as_str)
        .unwrap_or("author")
        .to_string();
    let get = |key: &str| {
        obj.get(key)
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .unwrap_or("")
            .to_string()
    };

    let name = get("name");
    if !name.is_empty() {
        return Some(Creator {
            creator_type,
            first_name: String::new(),
            last_name: name,
        });
    }

    let first_name = get("firstName");
    let last_name = get("lastName");
    if first_name.is_empty() && last_name.is_empty() {
        return None;
    }
    Some(Creator {
        creator_type,
        first_name,
        last_name,
    })
}
