//! Database statistics.
//!
//! Per-partition record counts and embedding coverage for each corpus.
//! Used by `ssearch stats` to verify that ingest and embed runs landed.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::Corpus;

/// Counts for one partition key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionStats {
    pub corpus: Corpus,
    /// Partition label, e.g. `bookofmormon/en` or `2024/10/en`.
    pub partition: String,
    pub records: i64,
    pub embedded: i64,
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<Vec<PartitionStats>> {
    let queries = [
        (
            Corpus::Scriptures,
            r#"
            SELECT volume || '/' || lang AS partition,
                   COUNT(*) AS records,
                   COUNT(embedding) AS embedded
            FROM scriptures
            GROUP BY volume, lang
            ORDER BY volume, lang
            "#,
        ),
        (
            Corpus::Lessons,
            r#"
            SELECT year || '/' || lang AS partition,
                   COUNT(*) AS records,
                   COUNT(embedding) AS embedded
            FROM cfm_lessons
            GROUP BY year, lang
            ORDER BY year, lang
            "#,
        ),
        (
            Corpus::Conference,
            r#"
            SELECT year || '/' || month || '/' || lang AS partition,
                   COUNT(*) AS records,
                   COUNT(embedding) AS embedded
            FROM conference_paragraphs
            GROUP BY year, month, lang
            ORDER BY year, month, lang
            "#,
        ),
    ];

    let mut stats = Vec::new();
    for (corpus, sql) in queries {
        for row in sqlx::query(sql).fetch_all(pool).await? {
            stats.push(PartitionStats {
                corpus,
                partition: row.get("partition"),
                records: row.get("records"),
                embedded: row.get("embedded"),
            });
        }
    }
    Ok(stats)
}

fn percent(part: i64, whole: i64) -> i64 {
    if whole > 0 {
        part * 100 / whole
    } else {
        0
    }
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let stats = collect_stats(&pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Scripture Search Database Stats");
    println!("===============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));

    for corpus in [Corpus::Scriptures, Corpus::Lessons, Corpus::Conference] {
        let rows: Vec<&PartitionStats> = stats.iter().filter(|s| s.corpus == corpus).collect();
        let records: i64 = rows.iter().map(|s| s.records).sum();
        let embedded: i64 = rows.iter().map(|s| s.embedded).sum();

        println!();
        println!(
            "  {}: {} records, {} embedded ({}%)",
            corpus,
            records,
            embedded,
            percent(embedded, records)
        );
        if rows.is_empty() {
            continue;
        }
        println!("  {:<28} {:>8} {:>10}", "PARTITION", "RECORDS", "EMBEDDED");
        println!("  {}", "-".repeat(48));
        for s in rows {
            println!("  {:<28} {:>8} {:>10}", s.partition, s.records, s.embedded);
        }
    }

    println!();
    pool.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Lang, LessonRecord, Testament, VerseRecord, Volume};
    use crate::store::{SqliteStore, Store};

    #[tokio::test]
    async fn counts_per_partition_with_coverage() {
        let pool = db::connect_in_memory().await.unwrap();
        migrate::apply_schema(&pool).await.unwrap();
        let store = SqliteStore::new(pool);

        let verses: Vec<VerseRecord> = (1..=3)
            .map(|n| VerseRecord {
                volume: Volume::NewTestament,
                book: "john".to_string(),
                chapter: 1,
                verse: n,
                text: "text".to_string(),
                lang: Lang::En,
                footnotes: None,
            })
            .collect();
        store.insert_verses(&verses).await.unwrap();
        store
            .insert_lessons(&[LessonRecord {
                year: 2023,
                testament: Testament::Nt,
                lesson_id: "1".to_string(),
                title: "t".to_string(),
                date_range: String::new(),
                scripture_refs: vec![],
                content: "c".to_string(),
                lang: Lang::Es,
            }])
            .await
            .unwrap();

        let id = store.pending_verses(Lang::En, Some(1)).await.unwrap()[0].id;
        store
            .set_enrichment(Corpus::Scriptures, id, "ctx", &[0.1])
            .await
            .unwrap();

        let stats = collect_stats(store.pool()).await.unwrap();
        assert_eq!(
            stats,
            vec![
                PartitionStats {
                    corpus: Corpus::Scriptures,
                    partition: "newtestament/en".to_string(),
                    records: 3,
                    embedded: 1,
                },
                PartitionStats {
                    corpus: Corpus::Lessons,
                    partition: "2023/es".to_string(),
                    records: 1,
                    embedded: 0,
                },
            ]
        );
    }

    #[test]
    fn byte_sizes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(0, 0), 0);
    }
}
