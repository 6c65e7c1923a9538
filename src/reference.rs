//! Scripture citation parsing.
//!
//! Turns free-text citations scraped from lesson prose (`"2 Corinthians 5:17"`,
//! `"John 1:1-5"`, `"D&C 4:2"`) into the `(book, chapter, verse)` triple
//! used as a lookup key against stored verses. Unparseable input is not an
//! error: callers skip it.

use std::sync::OnceLock;

use regex::Regex;

/// A parsed citation. Verse ranges collapse to their first verse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptureRef {
    pub book: String,
    pub chapter: i64,
    pub verse: i64,
}

/// Spelled-out or abbreviated book names whose lower-cased, space-free
/// form is not the stored book id.
const BOOK_ALIASES: &[(&str, &str)] = &[
    ("doctrine and covenants", "dc"),
    ("d&c", "dc"),
    ("song of solomon", "songofsolomon"),
    ("song of songs", "songofsolomon"),
    ("joseph smith—matthew", "josephsmith-matthew"),
    ("joseph smith—history", "josephsmith-history"),
    ("js—m", "josephsmith-matthew"),
    ("js—h", "josephsmith-history"),
    ("articles of faith", "articlesoffaith"),
    ("words of mormon", "wordsofmormon"),
];

fn citation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d?\s*[\w&—]+(?:\s+[\w&—]+)*)\s+(\d+):(\d+)(?:\s*[-–]\s*\d+)?$")
            .unwrap_or_else(|e| panic!("invalid citation pattern: {e}"))
    })
}

/// Parse one citation, or `None` when the text is not a citation.
pub fn parse_reference(text: &str) -> Option<ScriptureRef> {
    let cleaned = text.replace('\u{a0}', " ");
    let caps = citation_pattern().captures(cleaned.trim())?;

    let book_name = normalize_book_name(&caps[1]);
    let chapter: i64 = caps[2].parse().ok()?;
    let verse: i64 = caps[3].parse().ok()?;

    Some(ScriptureRef {
        book: book_id(&book_name),
        chapter,
        verse,
    })
}

/// Lower-case and collapse internal whitespace runs to one space.
fn normalize_book_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn book_id(name: &str) -> String {
    BOOK_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, id)| id.to_string())
        .unwrap_or_else(|| name.replace(' ', ""))
}
