//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use news_brief_core::{
    cache::SummaryCache,
    fetcher::SummaryFetcher,
    ports::{SpeechToTextService, TextToSpeechService},
};
use std::sync::Arc;
use tokio::sync::Mutex;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub fetcher: Arc<SummaryFetcher>,
    /// `None` when voice input is disabled.
    pub sst_adapter: Option<Arc<dyn SpeechToTextService>>,
    /// `None` unless narration is synthesized on the server.
    pub tts_adapter: Option<Arc<dyn TextToSpeechService>>,
    /// Backs the REST endpoint. WebSocket sessions keep their own cache.
    pub brief_cache: Mutex<SummaryCache>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        fetcher: Arc<SummaryFetcher>,
        sst_adapter: Option<Arc<dyn SpeechToTextService>>,
        tts_adapter: Option<Arc<dyn TextToSpeechService>>,
    ) -> Self {
        let brief_cache = Mutex::new(SummaryCache::new(config.cache_ttl, config.cache_capacity));
        Self {
            config,
            fetcher,
            sst_adapter,
            tts_adapter,
            brief_cache,
        }
    }

    /// A fresh cache sized from the configuration.
    pub fn session_cache(&self) -> SummaryCache {
        SummaryCache::new(self.config.cache_ttl, self.config.cache_capacity)
    }
}
