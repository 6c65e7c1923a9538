//! In-memory [`Store`] implementation for tests.
//!
//! Rows live in `Vec`s behind `std::sync::RwLock`; ids are assigned from a
//! single counter shared by all three tables.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{
    ConferenceParagraphRecord, Corpus, Lang, LessonRecord, PartitionKey, Stored, VerseRecord,
    Volume,
};

use super::{Store, WindowUnit};

struct Row<T> {
    stored: Stored<T>,
    embedding: Option<Vec<f32>>,
}

#[derive(Default)]
pub struct InMemoryStore {
    next_id: AtomicI64,
    verses: RwLock<Vec<Row<VerseRecord>>>,
    lessons: RwLock<Vec<Row<LessonRecord>>>,
    paragraphs: RwLock<Vec<Row<ConferenceParagraphRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored embedding for a row, if any.
    pub fn embedding(&self, corpus: Corpus, id: i64) -> Option<Vec<f32>> {
        fn find<T>(rows: &[Row<T>], id: i64) -> Option<Vec<f32>> {
            rows.iter()
                .find(|r| r.stored.id == id)
                .and_then(|r| r.embedding.clone())
        }
        match corpus {
            Corpus::Scriptures => find(&read(&self.verses).ok()?, id),
            Corpus::Lessons => find(&read(&self.lessons).ok()?, id),
            Corpus::Conference => find(&read(&self.paragraphs).ok()?, id),
        }
    }

    /// All paragraphs currently stored, in insertion order.
    pub fn paragraphs(&self) -> Vec<ConferenceParagraphRecord> {
        read(&self.paragraphs)
            .map(|rows| rows.iter().map(|r| r.stored.record.clone()).collect())
            .unwrap_or_default()
    }

    fn upsert<T: Clone>(
        &self,
        lock: &RwLock<Vec<Row<T>>>,
        records: &[T],
        same_key: impl Fn(&T, &T) -> bool,
    ) -> Result<()> {
        let mut rows = write(lock)?;
        for record in records {
            match rows.iter_mut().find(|r| same_key(&r.stored.record, record)) {
                Some(row) => {
                    row.stored.record = record.clone();
                    row.stored.context_text = None;
                    row.embedding = None;
                }
                None => rows.push(Row {
                    stored: Stored {
                        id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
                        record: record.clone(),
                        context_text: None,
                    },
                    embedding: None,
                }),
            }
        }
        Ok(())
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn pending<T: Clone>(
    rows: &[Row<T>],
    matches: impl Fn(&T) -> bool,
    limit: Option<usize>,
) -> Vec<Stored<T>> {
    rows.iter()
        .filter(|r| r.embedding.is_none() && matches(&r.stored.record))
        .take(limit.unwrap_or(usize::MAX))
        .map(|r| r.stored.clone())
        .collect()
}

fn window<T>(
    rows: &[Row<T>],
    select: impl Fn(&T) -> Option<WindowUnit>,
    from: i64,
    to: i64,
) -> Vec<WindowUnit> {
    let mut units: Vec<WindowUnit> = rows
        .iter()
        .filter_map(|r| select(&r.stored.record))
        .filter(|u| (from..=to).contains(&u.number))
        .collect();
    units.sort_by_key(|u| u.number);
    units
}

fn in_partition_verse(v: &VerseRecord, key: &PartitionKey) -> bool {
    matches!(key, PartitionKey::Scriptures { volume, lang } if v.volume == *volume && v.lang == *lang)
}

fn in_partition_lesson(l: &LessonRecord, key: &PartitionKey) -> bool {
    matches!(key, PartitionKey::Lessons { year, lang } if l.year == *year && l.lang == *lang)
}

fn in_partition_paragraph(p: &ConferenceParagraphRecord, key: &PartitionKey) -> bool {
    matches!(key, PartitionKey::Conference { year, month, lang }
        if p.year == *year && p.month == *month && p.lang == *lang)
}

#[async_trait]
impl Store for InMemoryStore {
    async fn count_partition(&self, key: &PartitionKey) -> Result<u64> {
        let count = match key.corpus() {
            Corpus::Scriptures => read(&self.verses)?
                .iter()
                .filter(|r| in_partition_verse(&r.stored.record, key))
                .count(),
            Corpus::Lessons => read(&self.lessons)?
                .iter()
                .filter(|r| in_partition_lesson(&r.stored.record, key))
                .count(),
            Corpus::Conference => read(&self.paragraphs)?
                .iter()
                .filter(|r| in_partition_paragraph(&r.stored.record, key))
                .count(),
        };
        Ok(count as u64)
    }

    async fn delete_partition(&self, key: &PartitionKey) -> Result<u64> {
        fn remove<T>(rows: &mut Vec<Row<T>>, keep: impl Fn(&T) -> bool) -> u64 {
            let before = rows.len();
            rows.retain(|r| keep(&r.stored.record));
            (before - rows.len()) as u64
        }
        let removed = match key.corpus() {
            Corpus::Scriptures => remove(&mut *write(&self.verses)?, |v| {
                !in_partition_verse(v, key)
            }),
            Corpus::Lessons => remove(&mut *write(&self.lessons)?, |l| {
                !in_partition_lesson(l, key)
            }),
            Corpus::Conference => remove(&mut *write(&self.paragraphs)?, |p| {
                !in_partition_paragraph(p, key)
            }),
        };
        Ok(removed)
    }

    async fn insert_verses(&self, verses: &[VerseRecord]) -> Result<()> {
        self.upsert(&self.verses, verses, |a, b| {
            a.volume == b.volume
                && a.book == b.book
                && a.chapter == b.chapter
                && a.verse == b.verse
                && a.lang == b.lang
        })
    }

    async fn insert_lessons(&self, lessons: &[LessonRecord]) -> Result<()> {
        self.upsert(&self.lessons, lessons, |a, b| {
            a.year == b.year && a.lang == b.lang && a.lesson_id == b.lesson_id
        })
    }

    async fn insert_paragraphs(&self, paragraphs: &[ConferenceParagraphRecord]) -> Result<()> {
        self.upsert(&self.paragraphs, paragraphs, |a, b| {
            a.talk_uri == b.talk_uri && a.paragraph_num == b.paragraph_num && a.lang == b.lang
        })
    }

    async fn verses_in_window(
        &self,
        volume: Volume,
        book: &str,
        chapter: i64,
        lang: Lang,
        from: i64,
        to: i64,
    ) -> Result<Vec<WindowUnit>> {
        let rows = read(&self.verses)?;
        Ok(window(
            &rows,
            |v| {
                (v.volume == volume && v.book == book && v.chapter == chapter && v.lang == lang)
                    .then(|| WindowUnit {
                        number: v.verse,
                        text: v.text.clone(),
                    })
            },
            from,
            to,
        ))
    }

    async fn verse_text(
        &self,
        book: &str,
        chapter: i64,
        verse: i64,
        lang: Lang,
    ) -> Result<Option<String>> {
        Ok(read(&self.verses)?
            .iter()
            .map(|r| &r.stored.record)
            .find(|v| v.book == book && v.chapter == chapter && v.verse == verse && v.lang == lang)
            .map(|v| v.text.clone()))
    }

    async fn paragraphs_in_window(
        &self,
        talk_uri: &str,
        lang: Lang,
        from: i64,
        to: i64,
    ) -> Result<Vec<WindowUnit>> {
        let rows = read(&self.paragraphs)?;
        Ok(window(
            &rows,
            |p| {
                (p.talk_uri == talk_uri && p.lang == lang).then(|| WindowUnit {
                    number: p.paragraph_num,
                    text: p.text.clone(),
                })
            },
            from,
            to,
        ))
    }

    async fn pending_verses(
        &self,
        lang: Lang,
        limit: Option<usize>,
    ) -> Result<Vec<Stored<VerseRecord>>> {
        Ok(pending(&read(&self.verses)?, |v| v.lang == lang, limit))
    }

    async fn pending_lessons(
        &self,
        lang: Lang,
        limit: Option<usize>,
    ) -> Result<Vec<Stored<LessonRecord>>> {
        Ok(pending(&read(&self.lessons)?, |l| l.lang == lang, limit))
    }

    async fn pending_paragraphs(
        &self,
        lang: Lang,
        limit: Option<usize>,
    ) -> Result<Vec<Stored<ConferenceParagraphRecord>>> {
        Ok(pending(&read(&self.paragraphs)?, |p| p.lang == lang, limit))
    }

    async fn set_enrichment(
        &self,
        corpus: Corpus,
        id: i64,
        context_text: &str,
        embedding: &[f32],
    ) -> Result<()> {
        fn apply<T>(rows: &mut [Row<T>], id: i64, context_text: &str, embedding: &[f32]) -> Result<()> {
            let row = rows
                .iter_mut()
                .find(|r| r.stored.id == id)
                .ok_or_else(|| anyhow!("no row with id {}", id))?;
            row.stored.context_text = Some(context_text.to_string());
            row.embedding = Some(embedding.to_vec());
            Ok(())
        }
        match corpus {
            Corpus::Scriptures => apply(&mut *write(&self.verses)?, id, context_text, embedding),
            Corpus::Lessons => apply(&mut *write(&self.lessons)?, id, context_text, embedding),
            Corpus::Conference => apply(&mut *write(&self.paragraphs)?, id, context_text, embedding),
        }
    }
}
