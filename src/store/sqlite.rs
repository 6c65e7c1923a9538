//! SQLite-backed [`Store`] implementation.
//!
//! Reference lists and footnotes are stored as JSON text; embeddings as
//! little-endian `f32` BLOBs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::embedding::vec_to_blob;
use crate::models::{
    ConferenceParagraphRecord, Corpus, Lang, LessonRecord, PartitionKey, Stored, VerseRecord,
    Volume,
};

use super::{Store, WindowUnit};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn json_list(values: &[String]) -> Result<String> {
    Ok(serde_json::to_string(values)?)
}

fn parse_json_list(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw).with_context(|| format!("invalid JSON list in row: {}", raw))
}

fn parse_json_opt(raw: Option<String>) -> Result<Option<serde_json::Value>> {
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .context("invalid footnotes JSON in row")
}

fn limit_clause(limit: Option<usize>) -> i64 {
    limit.map(|l| l as i64).unwrap_or(-1)
}

fn verse_from_row(row: &SqliteRow) -> Result<Stored<VerseRecord>> {
    Ok(Stored {
        id: row.get("id"),
        record: VerseRecord {
            volume: row.get::<String, _>("volume").parse()?,
            book: row.get("book"),
            chapter: row.get("chapter"),
            verse: row.get("verse"),
            text: row.get("text"),
            lang: row.get::<String, _>("lang").parse()?,
            footnotes: parse_json_opt(row.get("footnotes"))?,
        },
        context_text: row.get("context_text"),
    })
}

fn lesson_from_row(row: &SqliteRow) -> Result<Stored<LessonRecord>> {
    Ok(Stored {
        id: row.get("id"),
        record: LessonRecord {
            year: row.get::<i64, _>("year") as i32,
            testament: row.get::<String, _>("testament").parse()?,
            lesson_id: row.get("lesson_id"),
            title: row.get("title"),
            date_range: row.get("date_range"),
            scripture_refs: parse_json_list(&row.get::<String, _>("scripture_refs"))?,
            content: row.get("content"),
            lang: row.get::<String, _>("lang").parse()?,
        },
        context_text: row.get("context_text"),
    })
}

fn paragraph_from_row(row: &SqliteRow) -> Result<Stored<ConferenceParagraphRecord>> {
    Ok(Stored {
        id: row.get("id"),
        record: ConferenceParagraphRecord {
            year: row.get::<i64, _>("year") as i32,
            month: row.get::<String, _>("month").parse()?,
            talk_uri: row.get("talk_uri"),
            talk_title: row.get("talk_title"),
            speaker_name: row.get("speaker_name"),
            speaker_role: row.get("speaker_role"),
            paragraph_num: row.get("paragraph_num"),
            text: row.get("text"),
            lang: row.get::<String, _>("lang").parse()?,
            footnotes: parse_json_opt(row.get("footnotes"))?,
            scripture_refs: parse_json_list(&row.get::<String, _>("scripture_refs"))?,
            talk_refs: parse_json_list(&row.get::<String, _>("talk_refs"))?,
        },
        context_text: row.get("context_text"),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn count_partition(&self, key: &PartitionKey) -> Result<u64> {
        let count: i64 = match key {
            PartitionKey::Scriptures { volume, lang } => {
                sqlx::query_scalar("SELECT COUNT(*) FROM scriptures WHERE volume = ? AND lang = ?")
                    .bind(volume.as_str())
                    .bind(lang.as_str())
                    .fetch_one(&self.pool)
                    .await?
            }
            PartitionKey::Lessons { year, lang } => {
                sqlx::query_scalar("SELECT COUNT(*) FROM cfm_lessons WHERE year = ? AND lang = ?")
                    .bind(*year)
                    .bind(lang.as_str())
                    .fetch_one(&self.pool)
                    .await?
            }
            PartitionKey::Conference { year, month, lang } => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM conference_paragraphs WHERE year = ? AND month = ? AND lang = ?",
                )
                .bind(*year)
                .bind(month.as_str())
                .bind(lang.as_str())
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(count as u64)
    }

    async fn delete_partition(&self, key: &PartitionKey) -> Result<u64> {
        let result = match key {
            PartitionKey::Scriptures { volume, lang } => {
                sqlx::query("DELETE FROM scriptures WHERE volume = ? AND lang = ?")
                    .bind(volume.as_str())
                    .bind(lang.as_str())
                    .execute(&self.pool)
                    .await?
            }
            PartitionKey::Lessons { year, lang } => {
                sqlx::query("DELETE FROM cfm_lessons WHERE year = ? AND lang = ?")
                    .bind(*year)
                    .bind(lang.as_str())
                    .execute(&self.pool)
                    .await?
            }
            PartitionKey::Conference { year, month, lang } => {
                sqlx::query(
                    "DELETE FROM conference_paragraphs WHERE year = ? AND month = ? AND lang = ?",
                )
                .bind(*year)
                .bind(month.as_str())
                .bind(lang.as_str())
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn insert_verses(&self, verses: &[VerseRecord]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for v in verses {
            let footnotes = v.footnotes.as_ref().map(|f| f.to_string());
            sqlx::query(
                r#"
                INSERT INTO scriptures (volume, book, chapter, verse, text, lang, footnotes, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(volume, book, chapter, verse, lang) DO UPDATE SET
                    text = excluded.text,
                    footnotes = excluded.footnotes,
                    context_text = NULL,
                    embedding = NULL
                "#,
            )
            .bind(v.volume.as_str())
            .bind(&v.book)
            .bind(v.chapter)
            .bind(v.verse)
            .bind(&v.text)
            .bind(v.lang.as_str())
            .bind(footnotes)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_lessons(&self, lessons: &[LessonRecord]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for l in lessons {
            sqlx::query(
                r#"
                INSERT INTO cfm_lessons (year, testament, lesson_id, title, date_range,
                                         scripture_refs, content, lang, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(year, lang, lesson_id) DO UPDATE SET
                    testament = excluded.testament,
                    title = excluded.title,
                    date_range = excluded.date_range,
                    scripture_refs = excluded.scripture_refs,
                    content = excluded.content,
                    context_text = NULL,
                    embedding = NULL
                "#,
            )
            .bind(l.year)
            .bind(l.testament.as_str())
            .bind(&l.lesson_id)
            .bind(&l.title)
            .bind(&l.date_range)
            .bind(json_list(&l.scripture_refs)?)
            .bind(&l.content)
            .bind(l.lang.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_paragraphs(&self, paragraphs: &[ConferenceParagraphRecord]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for p in paragraphs {
            let footnotes = p.footnotes.as_ref().map(|f| f.to_string());
            sqlx::query(
                r#"
                INSERT INTO conference_paragraphs (year, month, talk_uri, talk_title, speaker_name,
                                                   speaker_role, paragraph_num, text, lang,
                                                   footnotes, scripture_refs, talk_refs, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(talk_uri, paragraph_num, lang) DO UPDATE SET
                    year = excluded.year,
                    month = excluded.month,
                    talk_title = excluded.talk_title,
                    speaker_name = excluded.speaker_name,
                    speaker_role = excluded.speaker_role,
                    text = excluded.text,
                    footnotes = excluded.footnotes,
                    scripture_refs = excluded.scripture_refs,
                    talk_refs = excluded.talk_refs,
                    context_text = NULL,
                    embedding = NULL
                "#,
            )
            .bind(p.year)
            .bind(p.month.as_str())
            .bind(&p.talk_uri)
            .bind(&p.talk_title)
            .bind(&p.speaker_name)
            .bind(&p.speaker_role)
            .bind(p.paragraph_num)
            .bind(&p.text)
            .bind(p.lang.as_str())
            .bind(footnotes)
            .bind(json_list(&p.scripture_refs)?)
            .bind(json_list(&p.talk_refs)?)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
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
        let rows = sqlx::query(
            r#"
            SELECT verse, text FROM scriptures
            WHERE volume = ? AND book = ? AND chapter = ? AND lang = ?
              AND verse BETWEEN ? AND ?
            ORDER BY verse
            "#,
        )
        .bind(volume.as_str())
        .bind(book)
        .bind(chapter)
        .bind(lang.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| WindowUnit {
                number: row.get("verse"),
                text: row.get("text"),
            })
            .collect())
    }

    async fn verse_text(
        &self,
        book: &str,
        chapter: i64,
        verse: i64,
        lang: Lang,
    ) -> Result<Option<String>> {
        let text: Option<String> = sqlx::query_scalar(
            "SELECT text FROM scriptures WHERE book = ? AND chapter = ? AND verse = ? AND lang = ? LIMIT 1",
        )
        .bind(book)
        .bind(chapter)
        .bind(verse)
        .bind(lang.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(text)
    }

    async fn paragraphs_in_window(
        &self,
        talk_uri: &str,
        lang: Lang,
        from: i64,
        to: i64,
    ) -> Result<Vec<WindowUnit>> {
        let rows = sqlx::query(
            r#"
            SELECT paragraph_num, text FROM conference_paragraphs
            WHERE talk_uri = ? AND lang = ? AND paragraph_num BETWEEN ? AND ?
            ORDER BY paragraph_num
            "#,
        )
        .bind(talk_uri)
        .bind(lang.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| WindowUnit {
                number: row.get("paragraph_num"),
                text: row.get("text"),
            })
            .collect())
    }

    async fn pending_verses(
        &self,
        lang: Lang,
        limit: Option<usize>,
    ) -> Result<Vec<Stored<VerseRecord>>> {
        let rows = sqlx::query(
            "SELECT * FROM scriptures WHERE embedding IS NULL AND lang = ? ORDER BY id LIMIT ?",
        )
        .bind(lang.as_str())
        .bind(limit_clause(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(verse_from_row).collect()
    }

    async fn pending_lessons(
        &self,
        lang: Lang,
        limit: Option<usize>,
    ) -> Result<Vec<Stored<LessonRecord>>> {
        let rows = sqlx::query(
            "SELECT * FROM cfm_lessons WHERE embedding IS NULL AND lang = ? ORDER BY id LIMIT ?",
        )
        .bind(lang.as_str())
        .bind(limit_clause(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(lesson_from_row).collect()
    }

    async fn pending_paragraphs(
        &self,
        lang: Lang,
        limit: Option<usize>,
    ) -> Result<Vec<Stored<ConferenceParagraphRecord>>> {
        let rows = sqlx::query(
            "SELECT * FROM conference_paragraphs WHERE embedding IS NULL AND lang = ? ORDER BY id LIMIT ?",
        )
        .bind(lang.as_str())
        .bind(limit_clause(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(paragraph_from_row).collect()
    }

    async fn set_enrichment(
        &self,
        corpus: Corpus,
        id: i64,
        context_text: &str,
        embedding: &[f32],
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET context_text = ?, embedding = ? WHERE id = ?",
            corpus.table()
        );
        sqlx::query(&sql)
            .bind(context_text)
            .bind(vec_to_blob(embedding))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
