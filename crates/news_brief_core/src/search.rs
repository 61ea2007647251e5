//! crates/news_brief_core/src/search.rs
//!
//! Debounced search orchestration: input → cache → fetch → result.
//!
//! The controller owns no timers. `submit` hands back a `DebounceTicket`; the
//! runtime arms a timer for it and calls `fire` when it elapses. Only the ticket in
//! the single pending slot can fire, so a newer submission makes every older timer
//! a no-op even if the runtime fails to cancel it.

use crate::cache::{normalize_query, SummaryCache};
use crate::domain::{DebounceWindows, QuerySource, ResultBundle};
use crate::fetcher::{FetchError, FETCH_FAILED_MESSAGE};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the search box renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchStatus {
    pub loading: bool,
    pub error: Option<String>,
    pub query: Option<String>,
}

/// Arm a timer for `delay`, then call `fire(generation)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceTicket {
    pub generation: u64,
    pub delay: Duration,
}

/// What a fired search needs from the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchStep {
    /// Served from the cache; install it now.
    Hit(Arc<ResultBundle>),
    /// Call the fetcher with `query` (trimmed, case preserved), then report back
    /// via `complete_fetch`.
    Fetch { generation: u64, query: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchCompletion {
    Installed(Arc<ResultBundle>),
    Failed(String),
    /// A newer search has been issued since this fetch started.
    Stale,
}

#[derive(Debug, Clone)]
struct PendingSearch {
    generation: u64,
    query: String,
}

pub struct SearchController {
    cache: SummaryCache,
    windows: DebounceWindows,
    pending: Option<PendingSearch>,
    /// Generation of the most recent accepted submission.
    latest: u64,
    status: SearchStatus,
}

impl SearchController {
    pub fn new(cache: SummaryCache, windows: DebounceWindows) -> Self {
        Self {
            cache,
            windows,
            pending: None,
            latest: 0,
            status: SearchStatus::default(),
        }
    }

    pub fn status(&self) -> &SearchStatus {
        &self.status
    }

    pub fn cache(&self) -> &SummaryCache {
        &self.cache
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Accepts a query and replaces any pending one. Loading is raised right away.
    /// Blank input is ignored.
    pub fn submit(&mut self, raw: &str, source: QuerySource) -> Option<DebounceTicket> {
        let query = raw.trim();
        if query.is_empty() {
            return None;
        }

        self.latest += 1;
        if let Some(superseded) = self.pending.replace(PendingSearch {
            generation: self.latest,
            query: query.to_string(),
        }) {
            debug!("Discarding pending search '{}'.", superseded.query);
        }

        self.status = SearchStatus {
            loading: true,
            error: None,
            query: Some(query.to_string()),
        };

        Some(DebounceTicket {
            generation: self.latest,
            delay: self.windows.for_source(source),
        })
    }

    /// Runs the pending search if `generation` still owns the slot.
    pub fn fire(&mut self, generation: u64, now: DateTime<Utc>) -> Option<SearchStep> {
        match &self.pending {
            Some(pending) if pending.generation == generation => {}
            _ => {
                debug!("Debounce {} superseded; nothing to do.", generation);
                return None;
            }
        }
        let pending = self.pending.take()?;
        let key = normalize_query(&pending.query);

        if let Some(bundle) = self.cache.get(&key, now) {
            info!("Cache hit for '{}'.", key);
            self.status.loading = false;
            return Some(SearchStep::Hit(bundle));
        }

        info!("Cache miss for '{}'; fetching.", key);
        Some(SearchStep::Fetch {
            generation,
            query: pending.query,
        })
    }

    /// Records a fetch result. Successful results are always cached; only the
    /// latest search may install results or change the status.
    pub fn complete_fetch(
        &mut self,
        generation: u64,
        query: &str,
        result: Result<ResultBundle, FetchError>,
        now: DateTime<Utc>,
    ) -> FetchCompletion {
        let is_latest = generation == self.latest;
        match result {
            Ok(bundle) => {
                let bundle = Arc::new(bundle);
                self.cache.put(normalize_query(query), bundle.clone(), now);
                if !is_latest {
                    debug!("Fetch {} for '{}' arrived after a newer search.", generation, query);
                    return FetchCompletion::Stale;
                }
                self.status.loading = false;
                self.status.error = None;
                FetchCompletion::Installed(bundle)
            }
            Err(e) => {
                warn!("Fetch {} for '{}' failed: {}", generation, query, e);
                if !is_latest {
                    return FetchCompletion::Stale;
                }
                self.status.loading = false;
                self.status.error = Some(FETCH_FAILED_MESSAGE.to_string());
                FetchCompletion::Failed(FETCH_FAILED_MESSAGE.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortError;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn controller() -> SearchController {
        SearchController::new(SummaryCache::default(), DebounceWindows::default())
    }

    fn bundle(tag: &str) -> ResultBundle {
        ResultBundle {
            summaries: Vec::new(),
            recommendations: vec![tag.to_string()],
        }
    }

    #[test]
    fn blank_input_is_ignored() {
        let mut s = controller();
        assert!(s.submit("   \t", QuerySource::Typed).is_none());
        assert!(!s.status().loading);
        assert!(!s.has_pending());
    }

    #[test]
    fn loading_is_raised_before_the_debounce_elapses() {
        let mut s = controller();
        let ticket = s.submit(" Markets ", QuerySource::Voice).unwrap();
        assert_eq!(ticket.delay, Duration::from_millis(1000));
        assert!(s.status().loading);
        assert_eq!(s.status().query.as_deref(), Some("Markets"));
    }

    #[test]
    fn only_the_last_submission_fires() {
        let mut s = controller();
        let first = s.submit("a", QuerySource::Typed).unwrap();
        let second = s.submit("b", QuerySource::Typed).unwrap();

        assert_eq!(s.fire(first.generation, now()), None);
        assert_eq!(
            s.fire(second.generation, now()),
            Some(SearchStep::Fetch {
                generation: second.generation,
                query: "b".to_string()
            })
        );
        // Already consumed.
        assert_eq!(s.fire(second.generation, now()), None);
    }

    #[test]
    fn cache_hit_skips_the_fetch_and_clears_loading() {
        let mut s = controller();
        let t = s.submit("Seoul Weather", QuerySource::Typed).unwrap();
        let Some(SearchStep::Fetch { generation, query }) = s.fire(t.generation, now()) else {
            panic!("expected a fetch");
        };
        assert_eq!(query, "Seoul Weather");
        s.complete_fetch(generation, &query, Ok(bundle("w")), now());

        let t = s.submit("  SEOUL weather", QuerySource::Typed).unwrap();
        match s.fire(t.generation, now()) {
            Some(SearchStep::Hit(b)) => assert_eq!(b.recommendations, vec!["w"]),
            other => panic!("expected a cache hit, got {other:?}"),
        }
        assert!(!s.status().loading);
    }

    #[test]
    fn failure_sets_the_user_message_and_clears_loading() {
        let mut s = controller();
        let t = s.submit("q", QuerySource::Typed).unwrap();
        s.fire(t.generation, now());
        let outcome = s.complete_fetch(
            t.generation,
            "q",
            Err(FetchError::Service(PortError::Unexpected("503".into()))),
            now(),
        );
        assert_eq!(outcome, FetchCompletion::Failed(FETCH_FAILED_MESSAGE.to_string()));
        assert!(!s.status().loading);
        assert_eq!(s.status().error.as_deref(), Some(FETCH_FAILED_MESSAGE));
    }

    #[test]
    fn stale_fetch_is_cached_but_not_installed() {
        let mut s = controller();
        let old = s.submit("old", QuerySource::Typed).unwrap();
        s.fire(old.generation, now());
        let new = s.submit("new", QuerySource::Typed).unwrap();

        let outcome = s.complete_fetch(old.generation, "old", Ok(bundle("o")), now());
        assert_eq!(outcome, FetchCompletion::Stale);
        assert!(s.status().loading);
        assert!(s.cache().contains_key("old"));

        s.fire(new.generation, now());
        let outcome = s.complete_fetch(new.generation, "new", Ok(bundle("n")), now());
        assert!(matches!(outcome, FetchCompletion::Installed(_)));
        assert!(!s.status().loading);
    }

    #[test]
    fn new_submission_clears_previous_error() {
        let mut s = controller();
        let t = s.submit("q", QuerySource::Typed).unwrap();
        s.fire(t.generation, now());
        s.complete_fetch(t.generation, "q", Err(FetchError::Timeout(Duration::from_secs(30))), now());
        s.submit("q2", QuerySource::Typed);
        assert_eq!(s.status().error, None);
        assert!(s.status().loading);
    }
}
