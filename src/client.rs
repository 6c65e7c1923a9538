//! Content API client.
//!
//! Fetches conference manifests (the list of talks in one session) and
//! individual talk documents from the remote content API. Each request is
//! `GET {base_url}{api_path}?lang={code}&uri={uri}` returning JSON with an
//! HTML body and an optional footnote map.
//!
//! A [`RateLimiter`] owned by each client instance enforces a minimum
//! delay between consecutive requests. Two clients never share a clock.
//!
//! # Outcomes
//!
//! - Manifest fetch: any non-success status or transport error is a
//!   [`FetchError`]; the caller treats it as fatal for the partition.
//! - Talk fetch: a 404 is [`TalkFetch::NotFound`], a normal outcome the
//!   orchestrator branches on. Everything else that goes wrong is
//!   [`TalkFetch::Failed`].
//!
//! Requests are never retried here.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::config::ContentConfig;
use crate::models::{ConferenceMonth, Lang};
use crate::talk_parser::{dedup_preserving_order, RawDocument};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("content API returned HTTP {status} for {uri}")]
    RemoteUnavailable { uri: String, status: u16 },
    #[error("request for {uri} failed: {source}")]
    Transport {
        uri: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("response for {uri} is not valid JSON: {source}")]
    Decode {
        uri: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result of fetching one talk.
#[derive(Debug)]
pub enum TalkFetch {
    Found(RawDocument),
    NotFound,
    Failed(FetchError),
}

/// One talk listed in a conference manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TalkIdentifier {
    pub year: i32,
    pub month: ConferenceMonth,
    pub talk_id: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConferenceManifest {
    pub year: i32,
    pub month: ConferenceMonth,
    pub talks: Vec<TalkIdentifier>,
}

/// Source of conference manifests and talk documents.
#[async_trait]
pub trait ContentApi: Send {
    async fn fetch_manifest(
        &mut self,
        year: i32,
        month: ConferenceMonth,
    ) -> Result<ConferenceManifest, FetchError>;

    async fn fetch_talk(&mut self, uri: &str) -> TalkFetch;
}

/// Manifest URI for one conference session.
pub fn manifest_uri(year: i32, month: ConferenceMonth) -> String {
    format!("/general-conference/{}/{}", year, month)
}

/// Talk URI for one manifest entry.
pub fn talk_uri(year: i32, month: ConferenceMonth, talk_id: &str) -> String {
    format!("/general-conference/{}/{}/{}", year, month, talk_id)
}

fn talk_link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"/study/general-conference/(\d{4})/(\d{2})/([^"?]+)"#)
            .unwrap_or_else(|e| panic!("invalid talk link pattern: {e}"))
    })
}

/// Pull talk identifiers out of a manifest page body.
///
/// Links look like `/study/general-conference/{year}/{month}/{talk_id}`.
/// Administrative entries (ids starting with `_`) are dropped; the rest
/// are deduplicated keeping first-occurrence order.
pub fn extract_talk_ids(body: &str, year: i32, month: ConferenceMonth) -> Vec<TalkIdentifier> {
    let year_str = year.to_string();

    let ids = talk_link_pattern()
        .captures_iter(body)
        .filter(|caps| &caps[1] == year_str.as_str() && &caps[2] == month.as_str())
        .map(|caps| caps[3].to_string())
        .filter(|id| !id.starts_with('_'));

    dedup_preserving_order(ids)
        .into_iter()
        .map(|talk_id| TalkIdentifier {
            year,
            month,
            uri: talk_uri(year, month, &talk_id),
            talk_id,
        })
        .collect()
}

/// Chronological `(year, month)` pairs from April of `first_year` up to
/// and including `latest`.
pub fn all_conferences(
    first_year: i32,
    latest: (i32, ConferenceMonth),
) -> Vec<(i32, ConferenceMonth)> {
    (first_year..=latest.0)
        .flat_map(|year| {
            [ConferenceMonth::April, ConferenceMonth::October]
                .into_iter()
                .map(move |month| (year, month))
        })
        .filter(|&conference| conference <= latest)
        .collect()
}

/// Minimum spacing between consecutive requests from one client.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// Sleep until `min_interval` has passed since the previous call, then
    /// record this call.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last {
            let ready_at = last + self.min_interval;
            if Instant::now() < ready_at {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

/// [`ContentApi`] over HTTP with `reqwest`.
pub struct HttpContentClient {
    client: reqwest::Client,
    endpoint: String,
    lang: Lang,
    limiter: RateLimiter,
}

impl HttpContentClient {
    pub fn new(config: &ContentConfig, lang: Lang) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}{}",
                config.base_url.trim_end_matches('/'),
                config.api_path
            ),
            lang,
            limiter: RateLimiter::new(Duration::from_millis(config.request_delay_ms)),
        })
    }

    fn url(&self, uri: &str) -> String {
        format!("{}?lang={}&uri={}", self.endpoint, self.lang.api_code(), uri)
    }

    /// One rate-limited GET. Returns the status and, for successful
    /// responses, the decoded JSON document.
    async fn get(&mut self, uri: &str) -> Result<(u16, Option<serde_json::Value>), FetchError> {
        self.limiter.wait().await;

        let url = self.url(uri);
        debug!(%url, "content request");

        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                uri: uri.to_string(),
                source: Box::new(e),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Ok((status.as_u16(), None));
        }

        let value = resp
            .json::<serde_json::Value>()
            .await
            .map_err(|e| FetchError::Decode {
                uri: uri.to_string(),
                source: Box::new(e),
            })?;
        Ok((status.as_u16(), Some(value)))
    }
}

#[async_trait]
impl ContentApi for HttpContentClient {
    async fn fetch_manifest(
        &mut self,
        year: i32,
        month: ConferenceMonth,
    ) -> Result<ConferenceManifest, FetchError> {
        let uri = manifest_uri(year, month);
        let (status, value) = self.get(&uri).await?;
        let Some(value) = value else {
            return Err(FetchError::RemoteUnavailable { uri, status });
        };

        let doc = RawDocument::from_value(&value);
        Ok(ConferenceManifest {
            year,
            month,
            talks: extract_talk_ids(doc.body(), year, month),
        })
    }

    async fn fetch_talk(&mut self, uri: &str) -> TalkFetch {
        match self.get(uri).await {
            Ok((_, Some(value))) => TalkFetch::Found(RawDocument::from_value(&value)),
            Ok((404, None)) => TalkFetch::NotFound,
            Ok((status, None)) => TalkFetch::Failed(FetchError::RemoteUnavailable {
                uri: uri.to_string(),
                status,
            }),
            Err(e) => TalkFetch::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST_BODY: &str = r#"
        <nav>
          <a href="/study/general-conference/2024/10/11oaks?lang=eng">Oaks</a>
          <a href="/study/general-conference/2024/10/_contents">Contents</a>
          <a href="/study/general-conference/2024/10/12andersen">Andersen</a>
          <a href="/study/general-conference/2024/10/11oaks?lang=eng">Oaks again</a>
          <a href="/study/general-conference/2024/04/57nelson">Other session</a>
        </nav>
    "#;

    #[test]
    fn manifest_ids_filtered_and_deduped() {
        let talks = extract_talk_ids(MANIFEST_BODY, 2024, ConferenceMonth::October);
        let ids: Vec<&str> = talks.iter().map(|t| t.talk_id.as_str()).collect();
        assert_eq!(ids, vec!["11oaks", "12andersen"]);
        assert_eq!(talks[0].uri, "/general-conference/2024/10/11oaks");
        assert_eq!(talks[1].month, ConferenceMonth::October);
    }

    #[test]
    fn manifest_links_from_other_sessions_are_ignored() {
        let april = extract_talk_ids(MANIFEST_BODY, 2024, ConferenceMonth::April);
        let ids: Vec<&str> = april.iter().map(|t| t.talk_id.as_str()).collect();
        assert_eq!(ids, vec!["57nelson"]);
        assert!(extract_talk_ids(MANIFEST_BODY, 2023, ConferenceMonth::October).is_empty());
    }

    #[test]
    fn empty_manifest_body() {
        assert!(extract_talk_ids("", 2024, ConferenceMonth::April).is_empty());
    }

    #[test]
    fn conference_schedule_is_chronological_and_bounded() {
        let all = all_conferences(2023, (2025, ConferenceMonth::April));
        assert_eq!(
            all,
            vec![
                (2023, ConferenceMonth::April),
                (2023, ConferenceMonth::October),
                (2024, ConferenceMonth::April),
                (2024, ConferenceMonth::October),
                (2025, ConferenceMonth::April),
            ]
        );
        assert_eq!(all_conferences(2014, (2025, ConferenceMonth::April)).len(), 23);
        assert!(all_conferences(2026, (2025, ConferenceMonth::October)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limiter_spaces_requests() {
        let mut limiter = RateLimiter::new(Duration::from_millis(500));
        let start = Instant::now();

        limiter.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(500));

        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limiter_does_not_sleep_after_idle_gap() {
        let mut limiter = RateLimiter::new(Duration::from_millis(500));
        limiter.wait().await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        let before = Instant::now();
        limiter.wait().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn limiters_are_independent() {
        let mut a = RateLimiter::new(Duration::from_millis(500));
        let mut b = RateLimiter::new(Duration::from_millis(500));
        let start = Instant::now();
        a.wait().await;
        b.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn request_url_uses_api_language_code() {
        let client = HttpContentClient::new(&ContentConfig::default(), Lang::Es).unwrap();
        assert_eq!(
            client.url("/general-conference/2024/10/11oaks"),
            "https://www.churchofjesuschrist.org/study/api/v3/language-pages/type/content?lang=spa&uri=/general-conference/2024/10/11oaks"
        );
    }
}
