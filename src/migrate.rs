use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create tables and indexes. Safe to run repeatedly.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Scripture verses, one row per (volume, book, chapter, verse, lang)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scriptures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            volume TEXT NOT NULL,
            book TEXT NOT NULL,
            chapter INTEGER NOT NULL,
            verse INTEGER NOT NULL,
            text TEXT NOT NULL,
            lang TEXT NOT NULL,
            footnotes TEXT,
            context_text TEXT,
            embedding BLOB,
            created_at INTEGER NOT NULL,
            UNIQUE(volume, book, chapter, verse, lang)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Weekly lessons
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cfm_lessons (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            year INTEGER NOT NULL,
            testament TEXT NOT NULL,
            lesson_id TEXT NOT NULL,
            title TEXT NOT NULL,
            date_range TEXT NOT NULL DEFAULT '',
            scripture_refs TEXT NOT NULL DEFAULT '[]',
            content TEXT NOT NULL,
            lang TEXT NOT NULL,
            context_text TEXT,
            embedding BLOB,
            created_at INTEGER NOT NULL,
            UNIQUE(year, lang, lesson_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Conference talk paragraphs
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conference_paragraphs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            year INTEGER NOT NULL,
            month TEXT NOT NULL,
            talk_uri TEXT NOT NULL,
            talk_title TEXT NOT NULL DEFAULT '',
            speaker_name TEXT NOT NULL DEFAULT '',
            speaker_role TEXT NOT NULL DEFAULT '',
            paragraph_num INTEGER NOT NULL,
            text TEXT NOT NULL,
            lang TEXT NOT NULL,
            footnotes TEXT,
            scripture_refs TEXT NOT NULL DEFAULT '[]',
            talk_refs TEXT NOT NULL DEFAULT '[]',
            context_text TEXT,
            embedding BLOB,
            created_at INTEGER NOT NULL,
            UNIQUE(talk_uri, paragraph_num, lang)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Partition-key and window lookups
    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_scriptures_volume_lang ON scriptures(volume, lang)",
        "CREATE INDEX IF NOT EXISTS idx_scriptures_chapter ON scriptures(book, chapter, lang)",
        "CREATE INDEX IF NOT EXISTS idx_cfm_lessons_year_lang ON cfm_lessons(year, lang)",
        "CREATE INDEX IF NOT EXISTS idx_conference_partition ON conference_paragraphs(year, month, lang)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
