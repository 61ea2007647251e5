//! crates/news_brief_core/src/fetcher.rs
//!
//! Requests a briefing from the summarization port and turns the model's free-text
//! reply into a validated `ResultBundle`.
//!
//! The reply is never trusted: the JSON object is cut out of surrounding prose,
//! every field is optional on the way in, and only summaries that keep at least
//! one acceptable related-article link survive.

use crate::domain::{ArticleLink, ResultBundle, Summary, SummaryId};
use crate::ports::{PortError, SummarizationService};
use chrono::Local;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::{Position, Url};

/// Shown to the user whenever a search fails, whatever the cause.
pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch news. Please try again in a moment.";

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_LINK_TITLE: &str = "View related article";
const DEFAULT_CATEGORY: &str = "News";
const PLACEHOLDER_IMAGE_BASE: &str = "https://image.pollinations.ai/prompt";
const CATEGORY_IMAGE_BASE: &str = "https://placehold.co/400x300?text=";

/// Encyclopedia, social and blog hosts whose links are not news sources.
const DENIED_DOMAINS: &[&str] = &[
    "namu.wiki",
    "wikipedia.org",
    "youtube.com",
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "tistory.com",
    "blog.naver.com",
];

//=========================================================================================
// Errors
//=========================================================================================

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Summarization service error: {0}")]
    Service(#[from] PortError),
    #[error("Summarization service timed out after {0:?}")]
    Timeout(Duration),
    #[error("Malformed summary response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Invalid summary response: {0}")]
    Validation(String),
}

//=========================================================================================
// Fetcher
//=========================================================================================

pub struct SummaryFetcher {
    service: Arc<dyn SummarizationService>,
    timeout: Option<Duration>,
}

impl SummaryFetcher {
    /// `timeout: None` waits for the transport indefinitely.
    pub fn new(service: Arc<dyn SummarizationService>, timeout: Option<Duration>) -> Self {
        Self { service, timeout }
    }

    pub async fn fetch(&self, topic: &str) -> Result<ResultBundle, FetchError> {
        let today = Local::now().date_naive();
        info!("Requesting briefing for '{}' ({}).", topic, today);

        let request = self.service.summarize(topic, today);
        let raw = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| FetchError::Timeout(limit))??,
            None => request.await?,
        };

        let bundle = parse_bundle(&raw)?;
        info!(
            "Briefing for '{}' has {} summaries and {} recommendations.",
            topic,
            bundle.summaries.len(),
            bundle.recommendations.len()
        );
        Ok(bundle)
    }
}

//=========================================================================================
// Response Parsing
//=========================================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSummary {
    title: Option<String>,
    summary: Option<String>,
    image_keywords: Option<String>,
    category: Option<String>,
    search_image_url: Option<String>,
    #[serde(default)]
    related_articles: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct RawArticle {
    headline: Option<String>,
    url: Option<String>,
}

fn json_object_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid JSON object pattern"))
}

fn citation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s*\(\[[^\]]*\]\([^)]*\)\)").expect("valid citation pattern"))
}

/// Parses the model's reply into a bundle.
pub fn parse_bundle(raw: &str) -> Result<ResultBundle, FetchError> {
    let json = json_object_pattern()
        .find(raw)
        .map(|m| m.as_str())
        .ok_or_else(|| FetchError::Validation("reply contains no JSON object".to_string()))?;

    let value: serde_json::Value = serde_json::from_str(json)?;

    let items = value
        .get("summaries")
        .and_then(|s| s.as_array())
        .ok_or_else(|| FetchError::Validation("missing `summaries` array".to_string()))?;

    let summaries: Vec<Summary> = items
        .iter()
        .filter_map(|item| match RawSummary::deserialize(item) {
            Ok(raw) => Some(raw),
            Err(e) => {
                debug!("Dropping unreadable summary item: {}", e);
                None
            }
        })
        .filter_map(into_summary)
        .enumerate()
        .map(|(index, mut summary)| {
            summary.id = SummaryId(index);
            summary
        })
        .collect();

    if summaries.len() < items.len() {
        info!(
            "Kept {} of {} summaries after validation.",
            summaries.len(),
            items.len()
        );
    }

    let recommendations = value
        .get("recommendations")
        .and_then(|r| r.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|r| r.as_str())
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(ResultBundle {
        summaries,
        recommendations,
    })
}

fn into_summary(raw: RawSummary) -> Option<Summary> {
    let title = raw
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())?
        .to_string();

    let links: Vec<ArticleLink> = raw
        .related_articles
        .unwrap_or_default()
        .iter()
        .filter_map(|article| RawArticle::deserialize(article).ok())
        .filter_map(|article| {
            let url = article.url?;
            if !is_acceptable_link(&url) {
                debug!("Filtered related link {}", url);
                return None;
            }
            let title = article
                .headline
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| DEFAULT_LINK_TITLE.to_string());
            Some(ArticleLink { title, url })
        })
        .collect();

    if links.is_empty() {
        warn!("Dropping summary '{}': no usable related articles.", title);
        return None;
    }

    let image_url = resolve_image(
        &title,
        raw.search_image_url.as_deref(),
        raw.image_keywords.as_deref(),
        raw.category.as_deref(),
    );
    let body = strip_citations(raw.summary.as_deref().unwrap_or_default());

    Some(Summary {
        id: SummaryId(0),
        title,
        body,
        image_url,
        links,
    })
}

/// Absolute http(s) URL that does not point at, or refer to, a denied domain.
/// The host is matched by domain so `netflix.com` is not mistaken for `x.com`;
/// the path, query and fragment are matched by substring.
pub fn is_acceptable_link(candidate: &str) -> bool {
    let Ok(url) = Url::parse(candidate.trim()) else {
        return false;
    };
    if url.scheme() != "http" && url.scheme() != "https" {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.trim_start_matches("www.").to_ascii_lowercase();
    let rest = url[Position::BeforePath..].to_ascii_lowercase();
    !DENIED_DOMAINS.iter().any(|denied| {
        host == *denied || host.ends_with(&format!(".{denied}")) || rest.contains(*denied)
    })
}

fn resolve_image(
    title: &str,
    provided: Option<&str>,
    keywords: Option<&str>,
    category: Option<&str>,
) -> String {
    if let Some(url) = provided.map(str::trim).filter(|u| u.starts_with("http")) {
        return url.to_string();
    }

    if let Some(keywords) = keywords.map(str::trim).filter(|k| !k.is_empty()) {
        let seed = stable_hash(&format!("{title}{keywords}"));
        return format!(
            "{PLACEHOLDER_IMAGE_BASE}/{}?width=400&height=300&nologo=true&seed={seed}",
            urlencoding::encode(keywords)
        );
    }

    let category = category
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CATEGORY);
    format!("{CATEGORY_IMAGE_BASE}{}", urlencoding::encode(category))
}

/// 31-multiplier string hash over UTF-16 units with 32-bit wrap-around. Same
/// title and keywords always give the same placeholder image.
pub fn stable_hash(text: &str) -> u32 {
    let hash = text
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));
    hash.unsigned_abs()
}

fn strip_citations(text: &str) -> String {
    citation_pattern().replace_all(text, "").trim().to_string()
}
