//! Ingestion orchestrator.
//!
//! One run loads one partition key (volume+lang, year+lang, or
//! year+month+lang):
//!
//! ```text
//! count existing ──► > 0, no --force ──► Skipped
//!        │
//!        ▼
//! fetch manifest / read source file      (fatal on failure, store untouched)
//!        │
//!        ▼
//! delete partition (if it had records)
//!        │
//!        ▼
//! for each unit: fetch ─► parse ─► build records ─► buffer
//!        every `commit_every` units: persist the buffer
//!        │
//!        ▼
//! Completed { succeeded, failed, absent, ... }
//! ```
//!
//! A unit (one talk, one verse, one lesson) that fails is logged with its
//! identifier and counted; the run carries on. A manifest / source failure
//! (including a manifest that lists no talks) is an `Err` and leaves the
//! store untouched. A failed commit ends the run as
//! [`IngestOutcome::Aborted`], which still carries the summary so far.
//! Units committed before an abort stay committed.
//!
//! Concurrent runs against the same partition key are not supported.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::client::{all_conferences, ContentApi, HttpContentClient, TalkFetch, TalkIdentifier};
use crate::config::{Config, IngestConfig};
use crate::db;
use crate::models::{
    ConferenceMonth, ConferenceParagraphRecord, Lang, LessonRecord, PartitionKey, Testament,
    VerseRecord, Volume,
};
use crate::progress::{IngestProgressEvent, IngestProgressReporter, ProgressMode};
use crate::store::{SqliteStore, Store};
use crate::talk_parser::{parse_talk, TalkDocument};

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub force: bool,
    /// Units processed between two commits.
    pub commit_every: usize,
    /// Talks with fewer content paragraphs are recorded as absent.
    pub min_paragraphs: usize,
}

impl IngestOptions {
    pub fn from_config(config: &IngestConfig, force: bool) -> Self {
        Self {
            force,
            commit_every: config.commit_every.max(1),
            min_paragraphs: config.min_paragraphs,
        }
    }
}

/// Counts for one completed partition run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Units in the manifest or source file.
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub failed_ids: Vec<String>,
    /// Units that legitimately had nothing to load (not found, too short).
    pub absent_ids: Vec<String>,
    pub records_written: u64,
    /// Records deleted before loading (`--force`).
    pub replaced: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Skipped { existing: u64 },
    Completed(IngestSummary),
    /// A commit failed part way through. `summary.records_written` and
    /// `committed_units` count only what reached the store.
    Aborted {
        summary: IngestSummary,
        committed_units: u64,
        error: String,
    },
}

impl IngestSummary {
    fn fail(&mut self, id: impl Into<String>) {
        self.failed += 1;
        self.failed_ids.push(id.into());
    }
}

/// Records that know which store method persists them.
#[async_trait]
trait Persist: Sized + Send + Sync {
    async fn persist(store: &dyn Store, batch: &[Self]) -> Result<()>;
}

#[async_trait]
impl Persist for VerseRecord {
    async fn persist(store: &dyn Store, batch: &[Self]) -> Result<()> {
        store.insert_verses(batch).await
    }
}

#[async_trait]
impl Persist for LessonRecord {
    async fn persist(store: &dyn Store, batch: &[Self]) -> Result<()> {
        store.insert_lessons(batch).await
    }
}

#[async_trait]
impl Persist for ConferenceParagraphRecord {
    async fn persist(store: &dyn Store, batch: &[Self]) -> Result<()> {
        store.insert_paragraphs(batch).await
    }
}

/// Buffer of records committed every `every` units.
struct Batch<'a, T> {
    store: &'a dyn Store,
    progress: &'a dyn IngestProgressReporter,
    partition: String,
    pending: Vec<T>,
    units: usize,
    committed_units: usize,
    every: usize,
    written: u64,
}

impl<'a, T: Persist> Batch<'a, T> {
    fn new(
        store: &'a dyn Store,
        progress: &'a dyn IngestProgressReporter,
        key: &PartitionKey,
        every: usize,
    ) -> Self {
        Self {
            store,
            progress,
            partition: key.to_string(),
            pending: Vec::new(),
            units: 0,
            committed_units: 0,
            every,
            written: 0,
        }
    }

    /// Record one finished unit and its records; commit when due.
    async fn unit_done(&mut self, records: Vec<T>) -> Result<()> {
        self.pending.extend(records);
        self.units += 1;
        if self.units % self.every == 0 {
            self.commit().await?;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            self.committed_units = self.units;
            return Ok(());
        }
        T::persist(self.store, &self.pending)
            .await
            .with_context(|| format!("commit failed for {}", self.partition))?;
        self.committed_units = self.units;
        self.written += self.pending.len() as u64;
        self.pending.clear();
        debug!(partition = %self.partition, written = self.written, "checkpoint");
        self.progress.report(IngestProgressEvent::Checkpoint {
            partition: self.partition.clone(),
            records: self.written,
        });
        Ok(())
    }

    /// Commit the remainder and return the number of records written.
    async fn finish(&mut self) -> Result<u64> {
        self.commit().await?;
        Ok(self.written)
    }

    /// End the run after a failed commit, keeping what was committed.
    fn abort(&self, mut summary: IngestSummary, error: anyhow::Error) -> IngestOutcome {
        let error = format!("{:#}", error);
        summary.records_written = self.written;
        warn!(
            partition = %self.partition,
            committed_units = self.committed_units,
            records_written = self.written,
            error = %error,
            "ingest aborted"
        );
        IngestOutcome::Aborted {
            summary,
            committed_units: self.committed_units as u64,
            error,
        }
    }
}

/// Decision taken before any fetch.
enum Gate {
    Skip(u64),
    /// Load, replacing this many existing records.
    Load(u64),
}

async fn check_existing(store: &dyn Store, key: &PartitionKey, force: bool) -> Result<Gate> {
    let existing = store.count_partition(key).await?;
    if existing > 0 && !force {
        info!(partition = %key, existing, "partition already loaded, skipping");
        return Ok(Gate::Skip(existing));
    }
    Ok(Gate::Load(existing))
}

async fn truncate(store: &dyn Store, key: &PartitionKey, existing: u64) -> Result<u64> {
    if existing == 0 {
        return Ok(0);
    }
    let deleted = store.delete_partition(key).await?;
    info!(partition = %key, deleted, "partition truncated");
    Ok(deleted)
}

// ============ Conference talks ============

/// Footnotes of one paragraph as stored: `[{id, marker, text, refs}]`,
/// `None` when the paragraph has none.
fn paragraph_footnotes(talk: &TalkDocument, source_id: &str) -> Option<Value> {
    let notes: Vec<Value> = talk
        .footnotes_for_paragraph(source_id)
        .into_iter()
        .map(|f| {
            json!({
                "id": f.note_id,
                "marker": f.marker,
                "text": f.text,
                "refs": f.reference_uris,
            })
        })
        .collect();
    (!notes.is_empty()).then(|| Value::Array(notes))
}

/// Content paragraphs of a parsed talk as persisted records.
pub fn paragraph_records(
    talk: &TalkDocument,
    id: &TalkIdentifier,
    lang: Lang,
) -> Vec<ConferenceParagraphRecord> {
    talk.content_paragraphs()
        .into_iter()
        .map(|p| ConferenceParagraphRecord {
            year: id.year,
            month: id.month,
            talk_uri: id.uri.clone(),
            talk_title: talk.title.clone(),
            speaker_name: talk.speaker_name.clone(),
            speaker_role: talk.speaker_role.clone(),
            paragraph_num: p.sequence_number,
            text: p.text.clone(),
            lang,
            footnotes: paragraph_footnotes(talk, &p.source_id),
            scripture_refs: talk.scripture_refs.clone(),
            talk_refs: talk.talk_refs.clone(),
        })
        .collect()
}

/// Load one conference session.
pub async fn ingest_conference(
    store: &dyn Store,
    api: &mut dyn ContentApi,
    year: i32,
    month: ConferenceMonth,
    lang: Lang,
    opts: &IngestOptions,
    progress: &dyn IngestProgressReporter,
) -> Result<IngestOutcome> {
    let key = PartitionKey::Conference { year, month, lang };
    let existing = match check_existing(store, &key, opts.force).await? {
        Gate::Skip(existing) => return Ok(IngestOutcome::Skipped { existing }),
        Gate::Load(existing) => existing,
    };

    progress.report(IngestProgressEvent::Fetching {
        partition: key.to_string(),
    });
    let manifest = api
        .fetch_manifest(year, month)
        .await
        .with_context(|| format!("manifest fetch failed for {}", key))?;
    info!(partition = %key, talks = manifest.talks.len(), "manifest fetched");
    if manifest.talks.is_empty() {
        bail!("manifest for {} lists no talks", key);
    }

    let mut summary = IngestSummary {
        processed: manifest.talks.len() as u64,
        replaced: truncate(store, &key, existing).await?,
        ..Default::default()
    };

    let mut batch = Batch::new(store, progress, &key, opts.commit_every);
    let total = manifest.talks.len() as u64;

    for (i, talk_id) in manifest.talks.iter().enumerate() {
        let records = match api.fetch_talk(&talk_id.uri).await {
            TalkFetch::Found(raw) => {
                let talk = parse_talk(&raw);
                let content = talk.content_paragraphs().len();
                if content < opts.min_paragraphs {
                    warn!(
                        uri = %talk_id.uri,
                        paragraphs = content,
                        "talk too short, treating as absent"
                    );
                    summary.absent_ids.push(talk_id.uri.clone());
                    Vec::new()
                } else {
                    summary.succeeded += 1;
                    paragraph_records(&talk, talk_id, lang)
                }
            }
            TalkFetch::NotFound => {
                warn!(uri = %talk_id.uri, "talk not found");
                summary.absent_ids.push(talk_id.uri.clone());
                Vec::new()
            }
            TalkFetch::Failed(e) => {
                warn!(uri = %talk_id.uri, error = %e, "talk fetch failed");
                summary.fail(&talk_id.uri);
                Vec::new()
            }
        };

        if let Err(e) = batch.unit_done(records).await {
            return Ok(batch.abort(summary, e));
        }
        progress.report(IngestProgressEvent::Loading {
            partition: key.to_string(),
            n: i as u64 + 1,
            total,
        });
    }

    match batch.finish().await {
        Ok(written) => summary.records_written = written,
        Err(e) => return Ok(batch.abort(summary, e)),
    }
    Ok(IngestOutcome::Completed(summary))
}

// ============ Scriptures ============

#[derive(Debug, Deserialize)]
struct ScriptureFile {
    books: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct BookEntry {
    #[serde(default)]
    chapters: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ChapterEntry {
    #[serde(default)]
    verses: Vec<VerseEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct VerseEntry {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    footnotes: Option<Value>,
}

pub fn scripture_path(data_dir: &Path, volume: Volume, lang: Lang) -> PathBuf {
    data_dir
        .join("scriptures")
        .join(lang.as_str())
        .join(format!("{}.json", volume))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

/// One verse of the source file; `Err` carries the unit id.
type VerseUnit = std::result::Result<VerseRecord, String>;

/// Flatten a scripture file into verse units in file order. Verse numbers
/// are 1-based positions within each chapter.
fn verse_units(file: ScriptureFile, volume: Volume, lang: Lang) -> Vec<VerseUnit> {
    let mut units = Vec::new();
    for (book, book_value) in file.books {
        let book_entry: BookEntry = match serde_json::from_value(book_value) {
            Ok(b) => b,
            Err(e) => {
                warn!(book = %book, error = %e, "malformed book entry");
                units.push(Err(book));
                continue;
            }
        };
        for (chapter_key, chapter_value) in book_entry.chapters {
            let chapter_id = format!("{} {}", book, chapter_key);
            let parsed = chapter_key
                .parse::<i64>()
                .ok()
                .zip(serde_json::from_value::<ChapterEntry>(chapter_value).ok());
            let Some((chapter, entry)) = parsed else {
                warn!(chapter = %chapter_id, "malformed chapter entry");
                units.push(Err(chapter_id));
                continue;
            };
            for (idx, verse) in entry.verses.into_iter().enumerate() {
                let number = idx as i64 + 1;
                units.push(match verse.text.filter(|t| !t.trim().is_empty()) {
                    Some(text) => Ok(VerseRecord {
                        volume,
                        book: book.clone(),
                        chapter,
                        verse: number,
                        text,
                        lang,
                        footnotes: verse.footnotes.filter(|f| !f.is_null()),
                    }),
                    None => Err(format!("{} {}:{}", book, chapter, number)),
                });
            }
        }
    }
    units
}

/// Load one scripture volume from `{data_dir}/scriptures/{lang}/{volume}.json`.
pub async fn ingest_scriptures(
    store: &dyn Store,
    data_dir: &Path,
    volume: Volume,
    lang: Lang,
    opts: &IngestOptions,
    progress: &dyn IngestProgressReporter,
) -> Result<IngestOutcome> {
    let key = PartitionKey::Scriptures { volume, lang };
    let existing = match check_existing(store, &key, opts.force).await? {
        Gate::Skip(existing) => return Ok(IngestOutcome::Skipped { existing }),
        Gate::Load(existing) => existing,
    };

    progress.report(IngestProgressEvent::Fetching {
        partition: key.to_string(),
    });
    let file: ScriptureFile = read_json(&scripture_path(data_dir, volume, lang))?;
    let units = verse_units(file, volume, lang);
    info!(partition = %key, verses = units.len(), "scripture file read");

    let mut summary = IngestSummary {
        processed: units.len() as u64,
        replaced: truncate(store, &key, existing).await?,
        ..Default::default()
    };

    let mut batch = Batch::new(store, progress, &key, opts.commit_every);
    let total = units.len() as u64;

    for (i, unit) in units.into_iter().enumerate() {
        let records = match unit {
            Ok(record) => {
                summary.succeeded += 1;
                vec![record]
            }
            Err(id) => {
                warn!(verse = %id, "verse has no text");
                summary.fail(id);
                Vec::new()
            }
        };
        if let Err(e) = batch.unit_done(records).await {
            return Ok(batch.abort(summary, e));
        }
        if (i + 1) % 500 == 0 || i as u64 + 1 == total {
            progress.report(IngestProgressEvent::Loading {
                partition: key.to_string(),
                n: i as u64 + 1,
                total,
            });
        }
    }

    match batch.finish().await {
        Ok(written) => summary.records_written = written,
        Err(e) => return Ok(batch.abort(summary, e)),
    }
    Ok(IngestOutcome::Completed(summary))
}

// ============ Lessons ============

#[derive(Debug, Deserialize)]
struct LessonFile {
    lessons: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct LessonEntry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    date_range: String,
    #[serde(default)]
    scripture_refs: Vec<String>,
    #[serde(default)]
    plain_text: String,
}

pub fn lesson_path(data_dir: &Path, year: i32, testament: Testament, lang: Lang) -> PathBuf {
    data_dir
        .join("cfm")
        .join(lang.as_str())
        .join(format!("cfm_{}_{}.json", testament, year))
}

/// The testament studied in `year`, checked against an explicit choice.
pub fn resolve_testament(year: i32, requested: Option<Testament>) -> Result<Testament> {
    let Some(expected) = Testament::for_year(year) else {
        bail!("no lesson manual for {}. Supported years: 2023-2026", year);
    };
    match requested {
        Some(t) if t != expected => bail!(
            "{} lessons cover '{}', not '{}'",
            year,
            expected,
            t
        ),
        _ => Ok(expected),
    }
}

/// Load one year of lessons from `{data_dir}/cfm/{lang}/cfm_{testament}_{year}.json`.
pub async fn ingest_lessons(
    store: &dyn Store,
    data_dir: &Path,
    year: i32,
    testament: Option<Testament>,
    lang: Lang,
    opts: &IngestOptions,
    progress: &dyn IngestProgressReporter,
) -> Result<IngestOutcome> {
    let testament = resolve_testament(year, testament)?;
    let key = PartitionKey::Lessons { year, lang };
    let existing = match check_existing(store, &key, opts.force).await? {
        Gate::Skip(existing) => return Ok(IngestOutcome::Skipped { existing }),
        Gate::Load(existing) => existing,
    };

    progress.report(IngestProgressEvent::Fetching {
        partition: key.to_string(),
    });
    let file: LessonFile = read_json(&lesson_path(data_dir, year, testament, lang))?;
    info!(partition = %key, lessons = file.lessons.len(), "lesson file read");

    let mut summary = IngestSummary {
        processed: file.lessons.len() as u64,
        replaced: truncate(store, &key, existing).await?,
        ..Default::default()
    };

    let mut batch = Batch::new(store, progress, &key, opts.commit_every);
    let total = summary.processed;

    for (i, (lesson_id, value)) in file.lessons.into_iter().enumerate() {
        let records = match serde_json::from_value::<LessonEntry>(value) {
            Ok(entry) => {
                summary.succeeded += 1;
                vec![LessonRecord {
                    year,
                    testament,
                    lesson_id,
                    title: entry.title,
                    date_range: entry.date_range,
                    scripture_refs: entry.scripture_refs,
                    content: entry.plain_text,
                    lang,
                }]
            }
            Err(e) => {
                warn!(lesson = %lesson_id, error = %e, "malformed lesson entry");
                summary.fail(lesson_id);
                Vec::new()
            }
        };
        if let Err(e) = batch.unit_done(records).await {
            return Ok(batch.abort(summary, e));
        }
        progress.report(IngestProgressEvent::Loading {
            partition: key.to_string(),
            n: i as u64 + 1,
            total,
        });
    }

    match batch.finish().await {
        Ok(written) => summary.records_written = written,
        Err(e) => return Ok(batch.abort(summary, e)),
    }
    Ok(IngestOutcome::Completed(summary))
}

// ============ CLI entry points ============

fn print_counts(unit: &str, s: &IngestSummary) {
    if s.replaced > 0 {
        println!("  replaced: {} records", s.replaced);
    }
    println!("  {}: {}", unit, s.processed);
    println!("  succeeded: {}", s.succeeded);
    println!("  failed: {}", s.failed);
    for id in &s.failed_ids {
        println!("    {}", id);
    }
    if !s.absent_ids.is_empty() {
        println!("  absent: {}", s.absent_ids.len());
        for id in &s.absent_ids {
            println!("    {}", id);
        }
    }
    println!("  records written: {}", s.records_written);
}

fn print_outcome(key: &PartitionKey, unit: &str, outcome: &IngestOutcome) {
    println!("ingest {}", key);
    match outcome {
        IngestOutcome::Skipped { existing } => {
            println!(
                "  skipped: {} existing records. Use --force to reload.",
                existing
            );
        }
        IngestOutcome::Completed(s) => {
            print_counts(unit, s);
            println!("{}", if s.failed == 0 { "ok" } else { "completed with failures" });
        }
        IngestOutcome::Aborted {
            summary,
            committed_units,
            error,
        } => {
            print_counts(unit, summary);
            println!("  committed {}: {}", unit, committed_units);
            println!("  error: {}", error);
            println!("aborted");
        }
    }
}

/// Print the outcome; an aborted run fails the command.
fn report(key: &PartitionKey, unit: &str, outcome: &IngestOutcome) -> Result<()> {
    print_outcome(key, unit, outcome);
    if let IngestOutcome::Aborted { error, .. } = outcome {
        bail!("ingest {} aborted: {}", key, error);
    }
    Ok(())
}

async fn open_store(config: &Config) -> Result<SqliteStore> {
    let pool = db::connect(config).await?;
    crate::migrate::apply_schema(&pool).await?;
    Ok(SqliteStore::new(pool))
}

pub async fn run_ingest_scriptures(
    config: &Config,
    volume: Volume,
    lang: Lang,
    force: bool,
    mode: ProgressMode,
) -> Result<()> {
    let store = open_store(config).await?;
    let opts = IngestOptions::from_config(&config.ingest, force);
    let reporter = mode.reporter();
    let outcome = ingest_scriptures(
        &store,
        &config.content.data_dir,
        volume,
        lang,
        &opts,
        reporter.as_ref(),
    )
    .await?;
    report(&PartitionKey::Scriptures { volume, lang }, "verses", &outcome)
}

pub async fn run_ingest_lessons(
    config: &Config,
    year: i32,
    testament: Option<Testament>,
    lang: Lang,
    force: bool,
    mode: ProgressMode,
) -> Result<()> {
    let store = open_store(config).await?;
    let opts = IngestOptions::from_config(&config.ingest, force);
    let reporter = mode.reporter();
    let outcome = ingest_lessons(
        &store,
        &config.content.data_dir,
        year,
        testament,
        lang,
        &opts,
        reporter.as_ref(),
    )
    .await?;
    report(&PartitionKey::Lessons { year, lang }, "lessons", &outcome)
}

/// Ingest one conference, or every conference through
/// `ingest.latest_conference` when `conference` is `None`.
///
/// With several conferences a fatal failure in one does not stop the
/// others; the command still fails at the end.
pub async fn run_ingest_conference(
    config: &Config,
    conference: Option<(i32, ConferenceMonth)>,
    lang: Lang,
    force: bool,
    mode: ProgressMode,
) -> Result<()> {
    let conferences = match conference {
        Some(c) => vec![c],
        None => all_conferences(config.ingest.first_conference_year, config.ingest.latest()?),
    };

    let store = open_store(config).await?;
    let mut api = HttpContentClient::new(&config.content, lang)?;
    let opts = IngestOptions::from_config(&config.ingest, force);
    let reporter = mode.reporter();

    let mut fatal = Vec::new();
    for (year, month) in conferences {
        let key = PartitionKey::Conference { year, month, lang };
        let result =
            ingest_conference(&store, &mut api, year, month, lang, &opts, reporter.as_ref())
                .await
                .and_then(|outcome| report(&key, "talks", &outcome));
        match result {
            Ok(()) => {}
            Err(e) if conference.is_none() => {
                warn!(partition = %key, error = %e, "conference ingest aborted");
                eprintln!("Error: {:#}", e);
                fatal.push(key.to_string());
            }
            Err(e) => return Err(e),
        }
    }

    if !fatal.is_empty() {
        bail!(
            "{} conference(s) could not be ingested: {}",
            fatal.len(),
            fatal.join(", ")
        );
    }
    Ok(())
}
