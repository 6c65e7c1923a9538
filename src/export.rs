//! Export one conference session as JSON.
//!
//! Paragraphs are grouped by talk (ordered by talk URI), each talk's
//! paragraphs by paragraph number. Written to a file or to stdout.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{ConferenceMonth, Lang};

#[derive(Debug, Serialize)]
pub struct ConferenceExport {
    pub year: i32,
    pub month: ConferenceMonth,
    pub lang: Lang,
    pub talk_count: usize,
    pub paragraph_count: usize,
    pub talks: Vec<ExportTalk>,
}

#[derive(Debug, Serialize)]
pub struct ExportTalk {
    pub uri: String,
    pub title: String,
    pub speaker_name: String,
    pub speaker_role: String,
    pub paragraphs: Vec<ExportParagraph>,
}

#[derive(Debug, Serialize)]
pub struct ExportParagraph {
    pub num: i64,
    pub text: String,
    pub footnotes: Option<Value>,
    pub scripture_refs: Value,
    pub talk_refs: Value,
}

fn json_column(raw: Option<String>) -> Result<Option<Value>> {
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .context("invalid JSON column")
}

pub async fn export_conference(
    pool: &SqlitePool,
    year: i32,
    month: ConferenceMonth,
    lang: Lang,
) -> Result<ConferenceExport> {
    let rows = sqlx::query(
        r#"
        SELECT talk_uri, talk_title, speaker_name, speaker_role, paragraph_num, text,
               footnotes, scripture_refs, talk_refs
        FROM conference_paragraphs
        WHERE year = ? AND month = ? AND lang = ?
        ORDER BY talk_uri, paragraph_num
        "#,
    )
    .bind(year)
    .bind(month.as_str())
    .bind(lang.as_str())
    .fetch_all(pool)
    .await?;

    let mut talks: Vec<ExportTalk> = Vec::new();
    for row in &rows {
        let uri: String = row.get("talk_uri");
        if talks.last().map(|t| t.uri != uri).unwrap_or(true) {
            talks.push(ExportTalk {
                uri,
                title: row.get("talk_title"),
                speaker_name: row.get("speaker_name"),
                speaker_role: row.get("speaker_role"),
                paragraphs: Vec::new(),
            });
        }
        let paragraph = ExportParagraph {
            num: row.get("paragraph_num"),
            text: row.get("text"),
            footnotes: json_column(row.get("footnotes"))?,
            scripture_refs: json_column(row.get("scripture_refs"))?.unwrap_or(Value::Null),
            talk_refs: json_column(row.get("talk_refs"))?.unwrap_or(Value::Null),
        };
        if let Some(talk) = talks.last_mut() {
            talk.paragraphs.push(paragraph);
        }
    }

    Ok(ConferenceExport {
        year,
        month,
        lang,
        talk_count: talks.len(),
        paragraph_count: rows.len(),
        talks,
    })
}

/// If `output` is `Some`, writes to that file path. Otherwise writes to
/// stdout for piping.
pub async fn run_export_conference(
    config: &Config,
    year: i32,
    month: ConferenceMonth,
    lang: Lang,
    output: Option<&Path>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let export = export_conference(&pool, year, month, lang).await?;
    let json = serde_json::to_string_pretty(&export)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "Exported {} talks, {} paragraphs to {}",
                export.talk_count,
                export.paragraph_count,
                path.display()
            );
        }
        None => println!("{}", json),
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConferenceParagraphRecord;
    use crate::store::{SqliteStore, Store};

    fn paragraph(talk: &str, num: i64) -> ConferenceParagraphRecord {
        ConferenceParagraphRecord {
            year: 2024,
            month: ConferenceMonth::October,
            talk_uri: format!("/general-conference/2024/10/{}", talk),
            talk_title: format!("Talk {}", talk),
            speaker_name: "Speaker".to_string(),
            speaker_role: "Role".to_string(),
            paragraph_num: num,
            text: format!("{} {}", talk, num),
            lang: Lang::En,
            footnotes: None,
            scripture_refs: vec!["John 3:16".to_string()],
            talk_refs: vec![],
        }
    }

    #[tokio::test]
    async fn groups_by_talk_in_paragraph_order() {
        let pool = db::connect_in_memory().await.unwrap();
        migrate::apply_schema(&pool).await.unwrap();
        let store = SqliteStore::new(pool);
        store
            .insert_paragraphs(&[
                paragraph("12b", 4),
                paragraph("11a", 5),
                paragraph("11a", 3),
                paragraph("12b", 3),
            ])
            .await
            .unwrap();

        let export = export_conference(store.pool(), 2024, ConferenceMonth::October, Lang::En)
            .await
            .unwrap();
        assert_eq!(export.talk_count, 2);
        assert_eq!(export.paragraph_count, 4);
        assert_eq!(export.talks[0].uri, "/general-conference/2024/10/11a");
        let nums: Vec<i64> = export.talks[0].paragraphs.iter().map(|p| p.num).collect();
        assert_eq!(nums, vec![3, 5]);

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["month"], "10");
        assert_eq!(json["lang"], "en");
        assert_eq!(json["talks"][1]["paragraphs"][0]["scripture_refs"][0], "John 3:16");
    }

    #[tokio::test]
    async fn empty_partition_exports_no_talks() {
        let pool = db::connect_in_memory().await.unwrap();
        migrate::apply_schema(&pool).await.unwrap();
        let export = export_conference(&pool, 2014, ConferenceMonth::April, Lang::Es)
            .await
            .unwrap();
        assert_eq!(export.talk_count, 0);
        assert!(export.talks.is_empty());
    }
}
