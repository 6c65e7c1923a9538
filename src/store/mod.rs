//! Persistence seam for the ingestion pipeline.
//!
//! The [`Store`] trait covers exactly what ingestion and enrichment need:
//! partition-scoped counting and deletion, batched upserts on natural keys,
//! the neighbor lookups used to build context windows, and the
//! two-phase write-back of `context_text` + embedding.
//!
//! Two backends implement it: [`SqliteStore`] for the CLI and
//! [`InMemoryStore`] for tests.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    ConferenceParagraphRecord, Corpus, Lang, LessonRecord, PartitionKey, Stored, VerseRecord,
    Volume,
};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// One numbered unit inside a context window: a verse or a paragraph.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowUnit {
    pub number: i64,
    pub text: String,
}

/// Abstract storage backend.
///
/// Every insert is an upsert on the record's natural key, so a batch
/// replayed after a crash never produces duplicates. Each `insert_*` call
/// is one commit checkpoint: it either persists the whole batch or none
/// of it.
#[async_trait]
pub trait Store: Send + Sync {
    /// Number of persisted records matching the partition key.
    async fn count_partition(&self, key: &PartitionKey) -> Result<u64>;

    /// Delete every record matching the partition key. Returns the number
    /// of rows removed.
    async fn delete_partition(&self, key: &PartitionKey) -> Result<u64>;

    async fn insert_verses(&self, verses: &[VerseRecord]) -> Result<()>;

    async fn insert_lessons(&self, lessons: &[LessonRecord]) -> Result<()>;

    async fn insert_paragraphs(&self, paragraphs: &[ConferenceParagraphRecord]) -> Result<()>;

    /// Verses `from..=to` of one chapter, ordered by verse number.
    async fn verses_in_window(
        &self,
        volume: Volume,
        book: &str,
        chapter: i64,
        lang: Lang,
        from: i64,
        to: i64,
    ) -> Result<Vec<WindowUnit>>;

    /// Text of a single verse in any volume.
    async fn verse_text(
        &self,
        book: &str,
        chapter: i64,
        verse: i64,
        lang: Lang,
    ) -> Result<Option<String>>;

    /// Paragraphs `from..=to` of one talk, ordered by paragraph number.
    async fn paragraphs_in_window(
        &self,
        talk_uri: &str,
        lang: Lang,
        from: i64,
        to: i64,
    ) -> Result<Vec<WindowUnit>>;

    /// Verses without an embedding, ordered by id.
    async fn pending_verses(&self, lang: Lang, limit: Option<usize>)
        -> Result<Vec<Stored<VerseRecord>>>;

    async fn pending_lessons(
        &self,
        lang: Lang,
        limit: Option<usize>,
    ) -> Result<Vec<Stored<LessonRecord>>>;

    async fn pending_paragraphs(
        &self,
        lang: Lang,
        limit: Option<usize>,
    ) -> Result<Vec<Stored<ConferenceParagraphRecord>>>;

    /// Write the enrichment fields of one record in place.
    async fn set_enrichment(
        &self,
        corpus: Corpus,
        id: i64,
        context_text: &str,
        embedding: &[f32],
    ) -> Result<()>;
}
