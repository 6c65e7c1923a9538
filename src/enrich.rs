//! Enrichment pass: context text + embedding for records that have none.
//!
//! Selects records of one corpus and language whose embedding is null,
//! ordered by id, and processes them in batches: build each record's
//! context window (or reuse the stored one), embed the batch, write both
//! fields back in place. A failed embedding call skips that batch; the
//! records stay pending for the next run.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{Config, ContextConfig};
use crate::context::{build_lesson_context, build_paragraph_context, build_verse_context};
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::models::{ConferenceParagraphRecord, Corpus, Lang, LessonRecord, Stored, VerseRecord};
use crate::store::{SqliteStore, Store};

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    pub batch_size: usize,
    pub limit: Option<usize>,
    pub batch_delay: Duration,
    pub context: ContextConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    pub pending: u64,
    pub embedded: u64,
    pub failed_batches: u64,
    pub failed_records: u64,
}

/// Records that can build their own context window.
#[async_trait]
trait Enrichable: Send + Sync {
    async fn context_text(&self, store: &dyn Store, ctx: &ContextConfig) -> Result<String>;
}

#[async_trait]
impl Enrichable for VerseRecord {
    async fn context_text(&self, store: &dyn Store, ctx: &ContextConfig) -> Result<String> {
        build_verse_context(store, self, ctx.verse_window).await
    }
}

#[async_trait]
impl Enrichable for LessonRecord {
    async fn context_text(&self, store: &dyn Store, ctx: &ContextConfig) -> Result<String> {
        build_lesson_context(store, self, ctx.lesson_max_refs, ctx.lesson_max_chars).await
    }
}

#[async_trait]
impl Enrichable for ConferenceParagraphRecord {
    async fn context_text(&self, store: &dyn Store, ctx: &ContextConfig) -> Result<String> {
        build_paragraph_context(store, self, ctx.paragraph_window).await
    }
}

/// Number of records of `corpus` still waiting for an embedding.
pub async fn count_pending(
    store: &dyn Store,
    corpus: Corpus,
    lang: Lang,
    limit: Option<usize>,
) -> Result<u64> {
    let n = match corpus {
        Corpus::Scriptures => store.pending_verses(lang, limit).await?.len(),
        Corpus::Lessons => store.pending_lessons(lang, limit).await?.len(),
        Corpus::Conference => store.pending_paragraphs(lang, limit).await?.len(),
    };
    Ok(n as u64)
}

pub async fn enrich(
    store: &dyn Store,
    embedder: &dyn Embedder,
    corpus: Corpus,
    lang: Lang,
    opts: &EnrichOptions,
) -> Result<EnrichSummary> {
    match corpus {
        Corpus::Scriptures => {
            let rows = store.pending_verses(lang, opts.limit).await?;
            enrich_rows(store, embedder, corpus, rows, opts).await
        }
        Corpus::Lessons => {
            let rows = store.pending_lessons(lang, opts.limit).await?;
            enrich_rows(store, embedder, corpus, rows, opts).await
        }
        Corpus::Conference => {
            let rows = store.pending_paragraphs(lang, opts.limit).await?;
            enrich_rows(store, embedder, corpus, rows, opts).await
        }
    }
}

async fn enrich_rows<T: Enrichable>(
    store: &dyn Store,
    embedder: &dyn Embedder,
    corpus: Corpus,
    rows: Vec<Stored<T>>,
    opts: &EnrichOptions,
) -> Result<EnrichSummary> {
    let mut summary = EnrichSummary {
        pending: rows.len() as u64,
        ..Default::default()
    };
    let batch_size = opts.batch_size.max(1);
    let total_batches = rows.len().div_ceil(batch_size);

    for (n, batch) in rows.chunks(batch_size).enumerate() {
        if n > 0 && !opts.batch_delay.is_zero() {
            tokio::time::sleep(opts.batch_delay).await;
        }

        let mut texts = Vec::with_capacity(batch.len());
        for row in batch {
            let text = match &row.context_text {
                Some(existing) => existing.clone(),
                None => row.record.context_text(store, &opts.context).await?,
            };
            texts.push(text);
        }

        let vectors = match embedder.embed(&texts).await {
            Ok(v) => v,
            Err(e) => {
                warn!(%corpus, batch = n + 1, error = %e, "embedding batch failed");
                summary.failed_batches += 1;
                summary.failed_records += batch.len() as u64;
                continue;
            }
        };

        for ((row, text), vector) in batch.iter().zip(&texts).zip(&vectors) {
            store.set_enrichment(corpus, row.id, text, vector).await?;
            summary.embedded += 1;
        }
        info!(%corpus, batch = n + 1, total_batches, "batch embedded");
    }

    Ok(summary)
}

/// `ssearch embed <corpus>`.
pub async fn run_embed(
    config: &Config,
    corpus: Corpus,
    lang: Lang,
    limit: Option<usize>,
    batch_size: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    let pool = db::connect(config).await?;
    crate::migrate::apply_schema(&pool).await?;
    let store = SqliteStore::new(pool);

    if dry_run {
        println!("embed {} {} (dry-run)", corpus, lang);
        println!(
            "  records needing embeddings: {}",
            count_pending(&store, corpus, lang, limit).await?
        );
        return Ok(());
    }

    let embedder = create_embedder(&config.embedding)?;
    let opts = EnrichOptions {
        batch_size: batch_size.unwrap_or(config.embedding.batch_size),
        limit,
        batch_delay: Duration::from_millis(config.embedding.batch_delay_ms),
        context: config.context.clone(),
    };

    let summary = enrich(&store, embedder.as_ref(), corpus, lang, &opts).await?;

    println!("embed {} {}", corpus, lang);
    println!("  model: {}", embedder.model_name());
    println!("  pending: {}", summary.pending);
    println!("  embedded: {}", summary.embedded);
    println!("  failed: {}", summary.failed_records);
    if summary.failed_batches > 0 {
        eprintln!(
            "Warning: {} batch(es) failed; rerun to retry the remaining records",
            summary.failed_batches
        );
    }

    store.pool().close().await;
    Ok(())
}
