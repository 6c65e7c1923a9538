//! # Scripture Search
//!
//! Ingestion pipeline for semantic search over scripture verses,
//! Come, Follow Me lessons and general conference talks.
//!
//! Content comes from pre-fetched JSON files (scriptures, lessons) or
//! from the content API (conference talks). Every record is stored in
//! SQLite under a partition key, then enriched with a context window of
//! neighbouring text and an embedding of that window.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐   ┌──────────────┐
//! │ Content API  │──▶│ Talk parser  │──▶│  SQLite  │──▶│ Context +    │
//! │ / JSON files │   │ + references │   │  (WAL)   │   │ embeddings   │
//! └──────────────┘   └──────────────┘   └──────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ssearch init
//! ssearch ingest scriptures --volume bookofmormon --lang en
//! ssearch ingest conference --year 2024 --month 10 --lang en
//! ssearch embed conference --lang en
//! ssearch stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Partition keys and record types |
//! | [`client`] | Rate-limited content API client |
//! | [`talk_parser`] | Talk HTML to paragraphs and footnotes |
//! | [`reference`] | Scripture reference parsing |
//! | [`context`] | Context window text for embedding |
//! | [`store`] | Record persistence (SQLite and in-memory) |
//! | [`ingest`] | Partition-scoped ingest orchestration |
//! | [`embedding`] | Embedding provider clients |
//! | [`enrich`] | Context + embedding backfill |
//! | [`progress`] | Ingest progress reporting |
//! | [`stats`] | Per-partition counts |
//! | [`export`] | Conference JSON export |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod client;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod enrich;
pub mod export;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod reference;
pub mod stats;
pub mod store;
pub mod talk_parser;
