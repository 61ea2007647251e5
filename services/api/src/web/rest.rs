//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use news_brief_core::{
    cache::normalize_query,
    domain::{ArticleLink, ResultBundle, Summary},
    fetcher::{FetchError, FETCH_FAILED_MESSAGE},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{IntoParams, OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        get_brief_handler,
    ),
    components(
        schemas(BriefResponse, SummaryDto, ArticleLinkDto)
    ),
    tags(
        (name = "News Brief API", description = "Summarized news briefings, read aloud over the WebSocket at /ws.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, IntoParams)]
pub struct BriefQuery {
    /// The topic to brief on.
    pub q: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ArticleLinkDto {
    title: String,
    url: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDto {
    /// Position in the bundle.
    id: usize,
    title: String,
    body: String,
    image_url: String,
    links: Vec<ArticleLinkDto>,
}

/// A summarized briefing for one topic.
#[derive(Debug, Serialize, ToSchema)]
pub struct BriefResponse {
    summaries: Vec<SummaryDto>,
    recommendations: Vec<String>,
}

impl From<&ArticleLink> for ArticleLinkDto {
    fn from(link: &ArticleLink) -> Self {
        Self {
            title: link.title.clone(),
            url: link.url.clone(),
        }
    }
}

impl From<&Summary> for SummaryDto {
    fn from(summary: &Summary) -> Self {
        Self {
            id: summary.id.0,
            title: summary.title.clone(),
            body: summary.body.clone(),
            image_url: summary.image_url.clone(),
            links: summary.links.iter().map(ArticleLinkDto::from).collect(),
        }
    }
}

impl From<&ResultBundle> for BriefResponse {
    fn from(bundle: &ResultBundle) -> Self {
        Self {
            summaries: bundle.summaries.iter().map(SummaryDto::from).collect(),
            recommendations: bundle.recommendations.clone(),
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Get a news briefing for a topic.
///
/// Served from the shared cache when the same topic was fetched recently.
#[utoipa::path(
    get,
    path = "/briefs",
    params(BriefQuery),
    responses(
        (status = 200, description = "Briefing generated", body = BriefResponse),
        (status = 400, description = "The topic is blank"),
        (status = 502, description = "The language model failed or returned an unusable reply"),
        (status = 504, description = "The language model did not answer in time")
    )
)]
pub async fn get_brief_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<BriefQuery>,
) -> Result<Json<BriefResponse>, (StatusCode, String)> {
    let topic = params.q.trim();
    if topic.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "q must not be blank".to_string()));
    }
    let key = normalize_query(topic);

    if let Some(bundle) = app_state.brief_cache.lock().await.get(&key, Utc::now()) {
        info!("REST cache hit for '{}'.", key);
        return Ok(Json(BriefResponse::from(bundle.as_ref())));
    }

    match app_state.fetcher.fetch(topic).await {
        Ok(bundle) => {
            let bundle = Arc::new(bundle);
            app_state
                .brief_cache
                .lock()
                .await
                .put(key, bundle.clone(), Utc::now());
            Ok(Json(BriefResponse::from(bundle.as_ref())))
        }
        Err(e) => {
            error!("Failed to fetch briefing for '{}': {:?}", topic, e);
            Err((status_for(&e), FETCH_FAILED_MESSAGE.to_string()))
        }
    }
}

fn status_for(error: &FetchError) -> StatusCode {
    match error {
        FetchError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        FetchError::Service(_) | FetchError::Malformed(_) | FetchError::Validation(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use news_brief_core::{
        fetcher::SummaryFetcher,
        ports::{PortError, PortResult, SummarizationService},
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSummarizer {
        calls: AtomicUsize,
        reply: PortResult<String>,
    }

    #[async_trait]
    impl SummarizationService for CountingSummarizer {
        async fn summarize(&self, _topic: &str, _today: NaiveDate) -> PortResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    struct SilentSummarizer;

    #[async_trait]
    impl SummarizationService for SilentSummarizer {
        async fn summarize(&self, _topic: &str, _today: NaiveDate) -> PortResult<String> {
            std::future::pending().await
        }
    }

    fn state_with(service: Arc<dyn SummarizationService>) -> Arc<AppState> {
        let config = Arc::new(Config::from_lookup(|_| None).unwrap());
        let fetcher = Arc::new(SummaryFetcher::new(service, Some(Duration::from_secs(30))));
        Arc::new(AppState::new(config, fetcher, None, None))
    }

    fn query(q: &str) -> Query<BriefQuery> {
        Query(BriefQuery { q: q.to_string() })
    }

    const REPLY: &str = r#"{"summaries": [
        {"title": "Rates hold", "summary": "Held.",
         "relatedArticles": [{"headline": "Bank", "url": "https://news.example.com/a"}]}
    ], "recommendations": ["Bonds"]}"#;

    #[tokio::test]
    async fn blank_topic_is_a_bad_request() {
        let state = state_with(Arc::new(SilentSummarizer));
        let (status, _) = get_brief_handler(State(state), query("   ")).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn second_request_is_served_from_the_cache() {
        let service = Arc::new(CountingSummarizer {
            calls: AtomicUsize::new(0),
            reply: Ok(REPLY.to_string()),
        });
        let state = state_with(service.clone());

        let Json(first) = get_brief_handler(State(state.clone()), query("Rates")).await.unwrap();
        let Json(second) = get_brief_handler(State(state), query(" rates ")).await.unwrap();

        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.summaries.len(), 1);
        assert_eq!(second.recommendations, vec!["Bonds"]);
    }

    #[tokio::test]
    async fn upstream_failure_is_a_bad_gateway() {
        let service = Arc::new(CountingSummarizer {
            calls: AtomicUsize::new(0),
            reply: Err(PortError::Unexpected("503".to_string())),
        });
        let (status, body) = get_brief_handler(State(state_with(service)), query("rates"))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body, FETCH_FAILED_MESSAGE);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_upstream_is_a_gateway_timeout() {
        let state = state_with(Arc::new(SilentSummarizer));
        let (status, _) = get_brief_handler(State(state), query("rates")).await.unwrap_err();
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn openapi_document_lists_the_brief_endpoint() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/briefs"));
    }
}
