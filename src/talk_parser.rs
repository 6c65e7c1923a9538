//! Conference talk HTML parser.
//!
//! Converts one raw content-API document into a [`TalkDocument`]: title,
//! speaker, ordered paragraphs, footnotes, and scripture / talk
//! cross-references. The parser performs no I/O and never fails; every
//! extraction step degrades to an empty value when the markup does not
//! have the expected shape.
//!
//! # Markup eras
//!
//! | Era | Paragraph ids | Metadata detection |
//! |-----|---------------|--------------------|
//! | 2014 – 2024/04 | sequential (`p1`, `author1`, `kicker1`, `subtitle1`) | id prefix |
//! | 2024/10 onward | hashed (`p_ks9eS`) | class (`author-name`, `author-role`, `kicker`) |
//!
//! Paragraph numbers are assigned from document order over the retained
//! paragraphs, never from the `id` attribute, so both eras number the same
//! way.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

/// Path segment that identifies a conference-talk URI.
pub const TALK_URI_SEGMENT: &str = "/general-conference/";

const METADATA_CLASSES: [&str; 3] = ["author-name", "author-role", "kicker"];
const METADATA_ID_PREFIXES: [&str; 2] = ["author", "kicker"];

/// Typed view over the loosely-structured API response.
///
/// Each field is probed independently; a missing or mistyped field is
/// simply absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDocument {
    /// HTML fragment from `content.body`.
    pub body: Option<String>,
    /// Document-level title (`content.title`, else `meta.title`).
    pub title: Option<String>,
    /// Entries of `content.footnotes`, in response order.
    pub footnotes: Vec<(String, Value)>,
}

impl RawDocument {
    pub fn from_value(value: &Value) -> Self {
        let content = value.get("content");
        let body = content
            .and_then(|c| c.get("body"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let title = content
            .and_then(|c| c.get("title"))
            .and_then(Value::as_str)
            .or_else(|| {
                value
                    .get("meta")
                    .and_then(|m| m.get("title"))
                    .and_then(Value::as_str)
            })
            .map(str::to_string);
        let footnotes = content
            .and_then(|c| c.get("footnotes"))
            .and_then(Value::as_object)
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        Self {
            body,
            title,
            footnotes,
        }
    }

    pub fn body(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }
}

/// A paragraph in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    /// 1-indexed position among retained paragraphs.
    pub sequence_number: i64,
    pub text: String,
    pub raw_markup: String,
    /// Original `id` attribute. Opaque.
    pub source_id: String,
    /// Author byline, role, or kicker. Kept for provenance, never embedded.
    pub is_metadata: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footnote {
    pub note_id: String,
    pub marker: String,
    /// `source_id` of the paragraph that carries the footnote marker.
    pub paragraph_source_id: String,
    pub text: String,
    pub reference_uris: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TalkDocument {
    pub title: String,
    pub speaker_name: String,
    pub speaker_role: String,
    pub paragraphs: Vec<Paragraph>,
    pub footnotes: Vec<Footnote>,
    pub scripture_refs: Vec<String>,
    pub talk_refs: Vec<String>,
}

impl TalkDocument {
    /// Paragraphs suitable for embedding (metadata excluded).
    pub fn content_paragraphs(&self) -> Vec<&Paragraph> {
        get_content_paragraphs(self)
    }

    pub fn paragraph_by_source_id(&self, source_id: &str) -> Option<&Paragraph> {
        self.paragraphs.iter().find(|p| p.source_id == source_id)
    }

    /// Footnotes attached to one paragraph. Linear scan over all footnotes.
    pub fn footnotes_for_paragraph(&self, source_id: &str) -> Vec<&Footnote> {
        self.footnotes
            .iter()
            .filter(|f| f.paragraph_source_id == source_id)
            .collect()
    }
}

/// Content paragraphs of a talk, in order.
pub fn get_content_paragraphs(talk: &TalkDocument) -> Vec<&Paragraph> {
    talk.paragraphs.iter().filter(|p| !p.is_metadata).collect()
}

/// Parse a raw API document into a [`TalkDocument`].
pub fn parse_talk(doc: &RawDocument) -> TalkDocument {
    let html = Html::parse_fragment(doc.body());

    let title = extract_title(&html)
        .or_else(|| {
            doc.title
                .as_deref()
                .map(normalize_whitespace)
                .filter(|t| !t.is_empty())
        })
        .unwrap_or_default();

    let (speaker_name, speaker_role) = extract_speaker(&html);
    let paragraphs = extract_paragraphs(&html);
    let footnotes = parse_footnotes(&doc.footnotes);
    let scripture_refs = extract_scripture_refs(&html);
    let talk_refs = extract_talk_refs(&footnotes);

    TalkDocument {
        title,
        speaker_name,
        speaker_role,
        paragraphs,
        footnotes,
        scripture_refs,
        talk_refs,
    }
}

/// Compile a selector literal. Every selector in this module is a constant
/// that is covered by the tests below.
fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css:?}: {e}"))
}

/// Visible text of an element with whitespace runs collapsed.
fn element_text(el: &ElementRef<'_>) -> String {
    let raw: String = el.text().collect();
    normalize_whitespace(&raw)
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_text(html: &Html, css: &str) -> Option<String> {
    html.select(&selector(css))
        .next()
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())
}

fn extract_title(html: &Html) -> Option<String> {
    first_text(html, "h1").or_else(|| first_text(html, ".title"))
}

fn extract_speaker(html: &Html) -> (String, String) {
    let name = first_text(html, ".author-name")
        .map(|n| strip_byline_prefix(&n).to_string())
        .unwrap_or_default();
    let role = first_text(html, ".author-role").unwrap_or_default();
    (name, role)
}

/// Remove a leading "By " or "Presented by " (any case).
fn strip_byline_prefix(name: &str) -> &str {
    let name = strip_prefix_ignore_case(name, "by ").unwrap_or(name);
    strip_prefix_ignore_case(name, "presented by ").unwrap_or(name)
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        s.get(prefix.len()..)
    } else {
        None
    }
}

struct Candidate {
    text: String,
    raw_markup: String,
    source_id: String,
    is_metadata: bool,
}

fn extract_paragraphs(html: &Html) -> Vec<Paragraph> {
    html.select(&selector("p[id]"))
        .filter_map(|el| {
            let source_id = el.value().id().unwrap_or_default().to_string();
            let text = element_text(&el);
            if text.is_empty() || source_id.starts_with("subtitle") {
                return None;
            }
            // Both checks stay: class-based markup and id-prefix markup
            // come from different eras of the same source.
            let by_class = el
                .value()
                .classes()
                .any(|c| METADATA_CLASSES.contains(&c));
            let by_id = METADATA_ID_PREFIXES
                .iter()
                .any(|prefix| source_id.starts_with(prefix));
            Some(Candidate {
                text,
                raw_markup: el.html(),
                source_id,
                is_metadata: by_class || by_id,
            })
        })
        .zip(1..)
        .map(|(c, sequence_number)| Paragraph {
            sequence_number,
            text: c.text,
            raw_markup: c.raw_markup,
            source_id: c.source_id,
            is_metadata: c.is_metadata,
        })
        .collect()
}

fn parse_footnotes(entries: &[(String, Value)]) -> Vec<Footnote> {
    entries
        .iter()
        .filter_map(|(key, note)| {
            let note = note.as_object()?;
            let string_field = |name: &str| -> Option<String> {
                match note.get(name)? {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                }
            };
            let reference_uris = note
                .get("referenceUris")
                .and_then(Value::as_array)
                .map(|uris| {
                    uris.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            Some(Footnote {
                note_id: string_field("id").unwrap_or_else(|| key.clone()),
                marker: string_field("marker").unwrap_or_default(),
                paragraph_source_id: string_field("pid").unwrap_or_default(),
                text: string_field("text").unwrap_or_default(),
                reference_uris,
            })
        })
        .collect()
}

fn extract_scripture_refs(html: &Html) -> Vec<String> {
    dedup_preserving_order(
        html.select(&selector("a.scripture-ref"))
            .map(|a| element_text(&a))
            .filter(|t| !t.is_empty()),
    )
}

fn extract_talk_refs(footnotes: &[Footnote]) -> Vec<String> {
    dedup_preserving_order(
        footnotes
            .iter()
            .flat_map(|f| f.reference_uris.iter())
            .filter(|uri| uri.contains(TALK_URI_SEGMENT))
            .cloned(),
    )
}

/// Keep the first occurrence of each string.
pub(crate) fn dedup_preserving_order<I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
