//! Context window construction.
//!
//! Builds the exact text that is sent to the embedding provider for each
//! record. Verses and paragraphs are embedded together with up to `k`
//! neighbors on each side; lessons are embedded with the text of the
//! verses they cite.
//!
//! Windows never cross a chapter (verses) or a talk (paragraphs): the
//! store lookups are keyed by chapter and talk URI, so neighbors from an
//! adjacent unit are never fetched. At a boundary the window simply
//! shrinks.
//!
//! The formatting functions are pure; the `build_*` functions fetch
//! neighbors from a [`Store`] and delegate to them.

use anyhow::Result;

use crate::models::{ConferenceParagraphRecord, LessonRecord, VerseRecord};
use crate::reference::parse_reference;
use crate::store::{Store, WindowUnit};

/// Marker prefixed to the target paragraph in a conference window.
pub const TARGET_MARKER: &str = ">>> ";

const BOOK_TITLES: &[(&str, &str)] = &[
    // Book of Mormon
    ("1nephi", "1 Nephi"),
    ("2nephi", "2 Nephi"),
    ("jacob", "Jacob"),
    ("enos", "Enos"),
    ("jarom", "Jarom"),
    ("omni", "Omni"),
    ("wordsofmormon", "Words of Mormon"),
    ("mosiah", "Mosiah"),
    ("alma", "Alma"),
    ("helaman", "Helaman"),
    ("3nephi", "3 Nephi"),
    ("4nephi", "4 Nephi"),
    ("mormon", "Mormon"),
    ("ether", "Ether"),
    ("moroni", "Moroni"),
    // Old Testament
    ("genesis", "Genesis"),
    ("exodus", "Exodus"),
    ("leviticus", "Leviticus"),
    ("numbers", "Numbers"),
    ("deuteronomy", "Deuteronomy"),
    ("joshua", "Joshua"),
    ("judges", "Judges"),
    ("ruth", "Ruth"),
    ("1samuel", "1 Samuel"),
    ("2samuel", "2 Samuel"),
    ("1kings", "1 Kings"),
    ("2kings", "2 Kings"),
    ("1chronicles", "1 Chronicles"),
    ("2chronicles", "2 Chronicles"),
    ("ezra", "Ezra"),
    ("nehemiah", "Nehemiah"),
    ("esther", "Esther"),
    ("job", "Job"),
    ("psalms", "Psalms"),
    ("proverbs", "Proverbs"),
    ("ecclesiastes", "Ecclesiastes"),
    ("songofsolomon", "Song of Solomon"),
    ("isaiah", "Isaiah"),
    ("jeremiah", "Jeremiah"),
    ("lamentations", "Lamentations"),
    ("ezekiel", "Ezekiel"),
    ("daniel", "Daniel"),
    ("hosea", "Hosea"),
    ("joel", "Joel"),
    ("amos", "Amos"),
    ("obadiah", "Obadiah"),
    ("jonah", "Jonah"),
    ("micah", "Micah"),
    ("nahum", "Nahum"),
    ("habakkuk", "Habakkuk"),
    ("zephaniah", "Zephaniah"),
    ("haggai", "Haggai"),
    ("zechariah", "Zechariah"),
    ("malachi", "Malachi"),
    // New Testament
    ("matthew", "Matthew"),
    ("mark", "Mark"),
    ("luke", "Luke"),
    ("john", "John"),
    ("acts", "Acts"),
    ("romans", "Romans"),
    ("1corinthians", "1 Corinthians"),
    ("2corinthians", "2 Corinthians"),
    ("galatians", "Galatians"),
    ("ephesians", "Ephesians"),
    ("philippians", "Philippians"),
    ("colossians", "Colossians"),
    ("1thessalonians", "1 Thessalonians"),
    ("2thessalonians", "2 Thessalonians"),
    ("1timothy", "1 Timothy"),
    ("2timothy", "2 Timothy"),
    ("titus", "Titus"),
    ("philemon", "Philemon"),
    ("hebrews", "Hebrews"),
    ("james", "James"),
    ("1peter", "1 Peter"),
    ("2peter", "2 Peter"),
    ("1john", "1 John"),
    ("2john", "2 John"),
    ("3john", "3 John"),
    ("jude", "Jude"),
    ("revelation", "Revelation"),
    // Doctrine and Covenants, Pearl of Great Price
    ("doctrineandcovenants", "D&C"),
    ("dc", "D&C"),
    ("moses", "Moses"),
    ("abraham", "Abraham"),
    ("josephsmith-matthew", "JS-Matthew"),
    ("josephsmith-history", "JS-History"),
    ("articlesoffaith", "Articles of Faith"),
];

/// Display title for a stored book id. Unknown ids are title-cased.
pub fn format_book_title(book_id: &str) -> String {
    BOOK_TITLES
        .iter()
        .find(|(id, _)| *id == book_id)
        .map(|(_, title)| title.to_string())
        .unwrap_or_else(|| title_case(book_id))
}

/// Upper-case every letter that follows a non-letter, lower-case the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_is_letter = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}

/// `"{Book} {chapter}:{start}[-{end}]: {verse texts}"`.
///
/// `verses` must be one chapter's window in verse order. An empty window
/// yields an empty string.
pub fn verse_window_text(book: &str, chapter: i64, verses: &[WindowUnit]) -> String {
    let (Some(first), Some(last)) = (verses.first(), verses.last()) else {
        return String::new();
    };

    let title = format_book_title(book);
    let reference = if first.number == last.number {
        format!("{} {}:{}", title, chapter, first.number)
    } else {
        format!("{} {}:{}-{}", title, chapter, first.number, last.number)
    };
    let text = verses
        .iter()
        .map(|v| v.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    format!("{}: {}", reference, text)
}

/// Context for a lesson: header, reference list, resolved verse texts
/// and the lesson body truncated to `max_chars` characters.
///
/// `resolved` holds `(reference, verse text)` pairs in citation order.
pub fn lesson_context_text(
    lesson: &LessonRecord,
    resolved: &[(String, String)],
    max_chars: usize,
) -> String {
    let mut parts = Vec::new();

    let mut header = lesson.title.clone();
    if !lesson.date_range.is_empty() {
        header.push_str(&format!(" ({})", lesson.date_range));
    }
    parts.push(header);

    if !lesson.scripture_refs.is_empty() {
        parts.push(format!(
            "Scripture References: {}",
            lesson.scripture_refs.join(", ")
        ));
        if !resolved.is_empty() {
            parts.push("\nReferenced Scriptures:".to_string());
            parts.extend(resolved.iter().map(|(r, text)| format!("{}: {}", r, text)));
        }
    }

    if !lesson.content.is_empty() {
        let mut content = truncate_chars(&lesson.content, max_chars).to_string();
        if content.len() < lesson.content.len() {
            content.push_str("...");
        }
        parts.push(format!("\nLesson Content:\n{}", content));
    }

    parts.join("\n")
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Header line, blank line, then each paragraph on its own line with the
/// target marked by [`TARGET_MARKER`].
pub fn paragraph_window_text(
    talk_title: &str,
    speaker_name: &str,
    target: i64,
    paragraphs: &[WindowUnit],
) -> String {
    let mut header = if talk_title.is_empty() {
        "Conference Talk".to_string()
    } else {
        talk_title.to_string()
    };
    if !speaker_name.is_empty() {
        header.push_str(&format!(" by {}", speaker_name));
    }

    let mut parts = vec![header, String::new()];
    parts.extend(paragraphs.iter().map(|p| {
        if p.number == target {
            format!("{}{}", TARGET_MARKER, p.text)
        } else {
            p.text.clone()
        }
    }));
    parts.join("\n")
}

/// Inclusive neighbor range around `n`, never below 1.
fn window_bounds(n: i64, k: i64) -> (i64, i64) {
    ((n - k).max(1), n + k)
}

/// Put `target` into a fetched window if the store did not return it.
fn with_target(mut units: Vec<WindowUnit>, target: WindowUnit) -> Vec<WindowUnit> {
    if !units.iter().any(|u| u.number == target.number) {
        let pos = units.partition_point(|u| u.number < target.number);
        units.insert(pos, target);
    }
    units
}

pub async fn build_verse_context(store: &dyn Store, verse: &VerseRecord, k: i64) -> Result<String> {
    let (from, to) = window_bounds(verse.verse, k);
    let window = store
        .verses_in_window(verse.volume, &verse.book, verse.chapter, verse.lang, from, to)
        .await?;
    let window = with_target(
        window,
        WindowUnit {
            number: verse.verse,
            text: verse.text.clone(),
        },
    );
    Ok(verse_window_text(&verse.book, verse.chapter, &window))
}

/// Resolve up to `max_refs` cited verses and format the lesson context.
/// References that do not parse or are not stored are skipped.
pub async fn build_lesson_context(
    store: &dyn Store,
    lesson: &LessonRecord,
    max_refs: usize,
    max_chars: usize,
) -> Result<String> {
    let mut resolved = Vec::new();
    for reference in lesson.scripture_refs.iter().take(max_refs) {
        let Some(parsed) = parse_reference(reference) else {
            continue;
        };
        if let Some(text) = store
            .verse_text(&parsed.book, parsed.chapter, parsed.verse, lesson.lang)
            .await?
        {
            if !text.is_empty() {
                resolved.push((reference.clone(), text));
            }
        }
    }
    Ok(lesson_context_text(lesson, &resolved, max_chars))
}

pub async fn build_paragraph_context(
    store: &dyn Store,
    paragraph: &ConferenceParagraphRecord,
    k: i64,
) -> Result<String> {
    let (from, to) = window_bounds(paragraph.paragraph_num, k);
    let window = store
        .paragraphs_in_window(&paragraph.talk_uri, paragraph.lang, from, to)
        .await?;
    let window = with_target(
        window,
        WindowUnit {
            number: paragraph.paragraph_num,
            text: paragraph.text.clone(),
        },
    );
    Ok(paragraph_window_text(
        &paragraph.talk_title,
        &paragraph.speaker_name,
        paragraph.paragraph_num,
        &window,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConferenceMonth, Lang, Testament, Volume};
    use crate::store::InMemoryStore;

    fn unit(number: i64, text: &str) -> WindowUnit {
        WindowUnit {
            number,
            text: text.to_string(),
        }
    }

    fn verse(chapter: i64, n: i64) -> VerseRecord {
        VerseRecord {
            volume: Volume::BookOfMormon,
            book: "1nephi".to_string(),
            chapter,
            verse: n,
            text: format!("c{}v{}", chapter, n),
            lang: Lang::En,
            footnotes: None,
        }
    }

    #[test]
    fn book_titles() {
        assert_eq!(format_book_title("1nephi"), "1 Nephi");
        assert_eq!(format_book_title("dc"), "D&C");
        assert_eq!(format_book_title("josephsmith-history"), "JS-History");
        assert_eq!(format_book_title("3nephi"), "3 Nephi");
        assert_eq!(format_book_title("génesis"), "Génesis");
        assert_eq!(format_book_title("facsimile-one"), "Facsimile-One");
    }

    #[test]
    fn verse_window_formats_range() {
        let text = verse_window_text(
            "1nephi",
            1,
            &[unit(1, "I, Nephi."), unit(2, "Yea."), unit(3, "And I know.")],
        );
        assert_eq!(text, "1 Nephi 1:1-3: I, Nephi. Yea. And I know.");
    }

    #[test]
    fn single_verse_window_has_no_range() {
        assert_eq!(
            verse_window_text("alma", 32, &[unit(21, "Faith.")]),
            "Alma 32:21: Faith."
        );
        assert_eq!(verse_window_text("alma", 32, &[]), "");
    }

    #[tokio::test]
    async fn first_verse_of_chapter_shrinks_window() {
        let store = InMemoryStore::new();
        store
            .insert_verses(&[
                verse(1, 19),
                verse(1, 20),
                verse(2, 1),
                verse(2, 2),
                verse(2, 3),
                verse(2, 4),
            ])
            .await
            .unwrap();

        let text = build_verse_context(&store, &verse(2, 1), 2).await.unwrap();
        assert_eq!(text, "1 Nephi 2:1-3: c2v1 c2v2 c2v3");
        assert!(!text.contains("c1v"));
    }

    #[tokio::test]
    async fn lone_verse_uses_single_reference() {
        let store = InMemoryStore::new();
        store.insert_verses(&[verse(3, 1)]).await.unwrap();
        let text = build_verse_context(&store, &verse(3, 1), 2).await.unwrap();
        assert_eq!(text, "1 Nephi 3:1: c3v1");
    }

    fn lesson(refs: &[&str], content: &str) -> LessonRecord {
        LessonRecord {
            year: 2024,
            testament: Testament::Bom,
            lesson_id: "1".to_string(),
            title: "Introductory Pages".to_string(),
            date_range: "January 1-7".to_string(),
            scripture_refs: refs.iter().map(|r| r.to_string()).collect(),
            content: content.to_string(),
            lang: Lang::En,
        }
    }

    #[test]
    fn lesson_context_layout() {
        let l = lesson(&["1 Nephi 3:7"], "Study well.");
        let text = lesson_context_text(
            &l,
            &[("1 Nephi 3:7".to_string(), "I will go and do.".to_string())],
            25_000,
        );
        assert_eq!(
            text,
            "Introductory Pages (January 1-7)\n\
             Scripture References: 1 Nephi 3:7\n\
             \nReferenced Scriptures:\n\
             1 Nephi 3:7: I will go and do.\n\
             \nLesson Content:\nStudy well."
        );
    }

    #[test]
    fn lesson_content_truncates_on_char_boundary() {
        let l = lesson(&[], "ñañañaña");
        let text = lesson_context_text(&l, &[], 3);
        assert!(text.ends_with("\nLesson Content:\nñañ..."));

        let l = lesson(&[], "short");
        assert!(lesson_context_text(&l, &[], 5).ends_with("short"));
    }

    #[tokio::test]
    async fn lesson_context_resolves_first_refs_only() {
        let store = InMemoryStore::new();
        let mut v = verse(3, 7);
        v.text = "I will go and do.".to_string();
        store.insert_verses(&[v]).await.unwrap();

        let l = lesson(&["nonsense", "1 Nephi 3:7", "Alma 99:1"], "");
        let text = build_lesson_context(&store, &l, 10, 100).await.unwrap();
        assert!(text.contains("1 Nephi 3:7: I will go and do."));
        assert!(!text.contains("Alma 99:1:"));

        let text = build_lesson_context(&store, &l, 1, 100).await.unwrap();
        assert!(!text.contains("Referenced Scriptures"));
    }

    fn paragraph(talk: &str, num: i64) -> ConferenceParagraphRecord {
        ConferenceParagraphRecord {
            year: 2024,
            month: ConferenceMonth::October,
            talk_uri: format!("/general-conference/2024/10/{}", talk),
            talk_title: "Faith".to_string(),
            speaker_name: "Jane Doe".to_string(),
            speaker_role: String::new(),
            paragraph_num: num,
            text: format!("{}-{}", talk, num),
            lang: Lang::En,
            footnotes: None,
            scripture_refs: vec![],
            talk_refs: vec![],
        }
    }

    #[tokio::test]
    async fn paragraph_window_marks_target_and_stays_in_talk() {
        let store = InMemoryStore::new();
        let mut rows: Vec<_> = (1..=6).map(|n| paragraph("a", n)).collect();
        rows.push(paragraph("b", 2));
        store.insert_paragraphs(&rows).await.unwrap();

        let text = build_paragraph_context(&store, &paragraph("a", 2), 2)
            .await
            .unwrap();
        assert_eq!(text, "Faith by Jane Doe\n\na-1\n>>> a-2\na-3\na-4");
    }

    #[test]
    fn paragraph_header_fallback() {
        let text = paragraph_window_text("", "", 1, &[unit(1, "only")]);
        assert_eq!(text, "Conference Talk\n\n>>> only");
    }
}
