//! Ingest progress reporting.
//!
//! Progress goes to **stderr** so stdout stays parseable for scripts.
//! The `--progress` flag picks human lines, JSON lines, or nothing; the
//! default is human when stderr is a TTY.

use std::io::Write;

use clap::ValueEnum;

/// A single progress event for one partition run.
#[derive(Clone, Debug, PartialEq)]
pub enum IngestProgressEvent {
    /// Manifest or source file is being read. Total unknown.
    Fetching { partition: String },
    /// `n` of `total` units processed.
    Loading {
        partition: String,
        n: u64,
        total: u64,
    },
    /// A batch was committed; `records` rows persisted so far.
    Checkpoint { partition: String, records: u64 },
}

pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr:
/// `ingest conference 2024/10/en  loading  12 / 34 talks`.
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Fetching { partition } => {
                format!("ingest {}  fetching...\n", partition)
            }
            IngestProgressEvent::Loading {
                partition,
                n,
                total,
            } => format!(
                "ingest {}  loading  {} / {} units\n",
                partition,
                format_number(*n),
                format_number(*total)
            ),
            IngestProgressEvent::Checkpoint { partition, records } => format!(
                "ingest {}  committed  {} records\n",
                partition,
                format_number(*records)
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// One JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let obj = match &event {
            IngestProgressEvent::Fetching { partition } => serde_json::json!({
                "event": "progress",
                "partition": partition,
                "phase": "fetching"
            }),
            IngestProgressEvent::Loading {
                partition,
                n,
                total,
            } => serde_json::json!({
                "event": "progress",
                "partition": partition,
                "phase": "loading",
                "n": n,
                "total": total
            }),
            IngestProgressEvent::Checkpoint { partition, records } => serde_json::json!({
                "event": "checkpoint",
                "partition": partition,
                "records": records
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
