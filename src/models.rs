//! Core data models used throughout Scripture Search.
//!
//! These types name the three corpora, the partition keys that scope one
//! ingest-replace-or-skip unit of work, and the records persisted for each
//! corpus. Records are written in two phases: structural fields at load
//! time, then `context_text` + embedding during enrichment.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail};
use clap::ValueEnum;
use serde::Serialize;

/// Content language. The database stores ISO codes; the content API
/// expects its own three-letter codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    En,
    Es,
}

impl Lang {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lang::En => "en",
            Lang::Es => "es",
        }
    }

    /// Language code understood by the remote content API.
    pub fn api_code(&self) -> &'static str {
        match self {
            Lang::En => "eng",
            Lang::Es => "spa",
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lang {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en" => Ok(Lang::En),
            "es" => Ok(Lang::Es),
            other => bail!("unknown language '{}'. Must be en or es.", other),
        }
    }
}

/// The five canonical scripture volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
pub enum Volume {
    #[value(name = "oldtestament")]
    OldTestament,
    #[value(name = "newtestament")]
    NewTestament,
    #[value(name = "bookofmormon")]
    BookOfMormon,
    #[value(name = "doctrineandcovenants")]
    DoctrineAndCovenants,
    #[value(name = "pearlofgreatprice")]
    PearlOfGreatPrice,
}

impl Volume {
    pub const ALL: [Volume; 5] = [
        Volume::OldTestament,
        Volume::NewTestament,
        Volume::BookOfMormon,
        Volume::DoctrineAndCovenants,
        Volume::PearlOfGreatPrice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Volume::OldTestament => "oldtestament",
            Volume::NewTestament => "newtestament",
            Volume::BookOfMormon => "bookofmormon",
            Volume::DoctrineAndCovenants => "doctrineandcovenants",
            Volume::PearlOfGreatPrice => "pearlofgreatprice",
        }
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Volume {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Volume::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| anyhow!("unknown volume '{}'", s))
    }
}

/// Scripture focus of a year of weekly lessons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Testament {
    Ot,
    Nt,
    Bom,
    Dc,
}

impl Testament {
    /// Fixed year → testament rotation for the lesson manuals on record.
    pub fn for_year(year: i32) -> Option<Testament> {
        match year {
            2023 => Some(Testament::Nt),
            2024 => Some(Testament::Bom),
            2025 => Some(Testament::Dc),
            2026 => Some(Testament::Ot),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Testament::Ot => "ot",
            Testament::Nt => "nt",
            Testament::Bom => "bom",
            Testament::Dc => "dc",
        }
    }
}

impl fmt::Display for Testament {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Testament {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ot" => Ok(Testament::Ot),
            "nt" => Ok(Testament::Nt),
            "bom" => Ok(Testament::Bom),
            "dc" => Ok(Testament::Dc),
            other => bail!("unknown testament '{}'", other),
        }
    }
}

/// Conference sessions are held in April and October.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum, Serialize)]
pub enum ConferenceMonth {
    #[value(name = "04")]
    #[serde(rename = "04")]
    April,
    #[value(name = "10")]
    #[serde(rename = "10")]
    October,
}

impl ConferenceMonth {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConferenceMonth::April => "04",
            ConferenceMonth::October => "10",
        }
    }
}

impl fmt::Display for ConferenceMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConferenceMonth {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "04" => Ok(ConferenceMonth::April),
            "10" => Ok(ConferenceMonth::October),
            other => bail!("unknown conference month '{}'. Must be 04 or 10.", other),
        }
    }
}

/// One of the three searchable corpora.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Corpus {
    Scriptures,
    Lessons,
    Conference,
}

impl Corpus {
    pub fn table(&self) -> &'static str {
        match self {
            Corpus::Scriptures => "scriptures",
            Corpus::Lessons => "cfm_lessons",
            Corpus::Conference => "conference_paragraphs",
        }
    }
}

impl fmt::Display for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Corpus::Scriptures => "scriptures",
            Corpus::Lessons => "lessons",
            Corpus::Conference => "conference",
        };
        f.write_str(name)
    }
}

/// Scope of one ingest run. All records matching the key are either
/// replaced together or left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionKey {
    Scriptures {
        volume: Volume,
        lang: Lang,
    },
    Lessons {
        year: i32,
        lang: Lang,
    },
    Conference {
        year: i32,
        month: ConferenceMonth,
        lang: Lang,
    },
}

impl PartitionKey {
    pub fn corpus(&self) -> Corpus {
        match self {
            PartitionKey::Scriptures { .. } => Corpus::Scriptures,
            PartitionKey::Lessons { .. } => Corpus::Lessons,
            PartitionKey::Conference { .. } => Corpus::Conference,
        }
    }

    pub fn lang(&self) -> Lang {
        match self {
            PartitionKey::Scriptures { lang, .. }
            | PartitionKey::Lessons { lang, .. }
            | PartitionKey::Conference { lang, .. } => *lang,
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKey::Scriptures { volume, lang } => write!(f, "{}/{}", volume, lang),
            PartitionKey::Lessons { year, lang } => write!(f, "cfm {}/{}", year, lang),
            PartitionKey::Conference { year, month, lang } => {
                write!(f, "conference {}/{}/{}", year, month, lang)
            }
        }
    }
}

/// A scripture verse keyed by (volume, book, chapter, verse, lang).
#[derive(Debug, Clone, PartialEq)]
pub struct VerseRecord {
    pub volume: Volume,
    pub book: String,
    pub chapter: i64,
    pub verse: i64,
    pub text: String,
    pub lang: Lang,
    pub footnotes: Option<serde_json::Value>,
}

/// A weekly lesson keyed by (year, lang, lesson_id).
#[derive(Debug, Clone, PartialEq)]
pub struct LessonRecord {
    pub year: i32,
    pub testament: Testament,
    pub lesson_id: String,
    pub title: String,
    pub date_range: String,
    pub scripture_refs: Vec<String>,
    pub content: String,
    pub lang: Lang,
}

/// A conference talk paragraph keyed by (talk_uri, paragraph_num, lang).
#[derive(Debug, Clone, PartialEq)]
pub struct ConferenceParagraphRecord {
    pub year: i32,
    pub month: ConferenceMonth,
    pub talk_uri: String,
    pub talk_title: String,
    pub speaker_name: String,
    pub speaker_role: String,
    pub paragraph_num: i64,
    pub text: String,
    pub lang: Lang,
    pub footnotes: Option<serde_json::Value>,
    pub scripture_refs: Vec<String>,
    pub talk_refs: Vec<String>,
}

/// A persisted record together with its row id and any context text
/// already built for it.
#[derive(Debug, Clone)]
pub struct Stored<T> {
    pub id: i64,
    pub record: T,
    pub context_text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lang_maps_to_api_codes() {
        assert_eq!(Lang::En.api_code(), "eng");
        assert_eq!(Lang::Es.api_code(), "spa");
        assert_eq!("es".parse::<Lang>().unwrap(), Lang::Es);
        assert!("fr".parse::<Lang>().is_err());
    }

    #[test]
    fn testament_rotation() {
        assert_eq!(Testament::for_year(2024), Some(Testament::Bom));
        assert_eq!(Testament::for_year(2026), Some(Testament::Ot));
        assert_eq!(Testament::for_year(2019), None);
    }

    #[test]
    fn partition_key_display() {
        let key = PartitionKey::Conference {
            year: 2024,
            month: ConferenceMonth::October,
            lang: Lang::En,
        };
        assert_eq!(key.to_string(), "conference 2024/10/en");
        assert_eq!(key.corpus(), Corpus::Conference);

        let key = PartitionKey::Scriptures {
            volume: Volume::BookOfMormon,
            lang: Lang::Es,
        };
        assert_eq!(key.to_string(), "bookofmormon/es");
    }

    #[test]
    fn volume_round_trips_through_str() {
        for v in Volume::ALL {
            assert_eq!(v.as_str().parse::<Volume>().unwrap(), v);
        }
    }
}
