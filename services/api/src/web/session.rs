//! services/api/src/web/session.rs
//!
//! One browser connection's view of the news brief: search box, result cards,
//! narration and voice input.
//!
//! A `BriefSession` is driven by a single event loop. Client messages, timer
//! expiries and finished background work all arrive as `SessionEvent`s and are
//! applied one at a time, so the core state machines never see concurrent calls.
//! Slow work (debounce timers, fetches, transcription) runs in spawned tasks that
//! post their result back as another event.

use crate::config::SpeechOutput;
use crate::web::{
    protocol::{utterance_outcome, ClientMessage, Outbound, ServerMessage},
    speech_engine::{ClientSpeechEngine, SynthesizedSpeechEngine},
    state::AppState,
};
use chrono::Utc;
use news_brief_core::{
    capture::{CaptureSessionId, SpeechCapture},
    domain::{DebounceWindows, PlaybackRate, QuerySource, ResultBundle},
    fetcher::FetchError,
    playback::{PlaybackCoordinator, PlaybackSnapshot, UtteranceOutcome},
    ports::{PortError, PortResult, SpeechEngine, UtteranceToken},
    search::{DebounceTicket, FetchCompletion, SearchController, SearchStatus, SearchStep},
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything that can happen to a session.
#[derive(Debug)]
pub enum SessionEvent {
    Client(ClientMessage),
    /// A binary frame of voice-query audio.
    Audio(Vec<u8>),
    DebounceElapsed {
        generation: u64,
    },
    FetchFinished {
        generation: u64,
        query: String,
        result: Result<ResultBundle, FetchError>,
    },
    TranscriptReady {
        session: CaptureSessionId,
        result: PortResult<String>,
    },
    /// Completion reported by a server-side engine rather than by the browser.
    UtteranceFinished {
        token: UtteranceToken,
        outcome: UtteranceOutcome,
    },
}

pub struct BriefSession {
    id: Uuid,
    app_state: Arc<AppState>,
    coordinator: PlaybackCoordinator<Box<dyn SpeechEngine>>,
    search: SearchController,
    capture: SpeechCapture,
    events: UnboundedSender<SessionEvent>,
    outbound: UnboundedSender<Outbound>,
    debounce_timer: Option<CancellationToken>,
    /// Cancels every background task when the connection goes away.
    lifetime: CancellationToken,
    last_playback: Option<PlaybackSnapshot>,
    last_search: Option<SearchStatus>,
}

impl BriefSession {
    pub fn new(
        app_state: Arc<AppState>,
        events: UnboundedSender<SessionEvent>,
        outbound: UnboundedSender<Outbound>,
    ) -> Self {
        let engine: Box<dyn SpeechEngine> = match (&app_state.config.speech_output, &app_state.tts_adapter) {
            (SpeechOutput::Server, Some(tts)) => Box::new(SynthesizedSpeechEngine::new(
                tts.clone(),
                outbound.clone(),
                events.clone(),
            )),
            (SpeechOutput::Server, None) => {
                warn!("Server speech requested without a TTS adapter; using the browser voice.");
                Box::new(ClientSpeechEngine::new(outbound.clone()))
            }
            (SpeechOutput::Client, _) => Box::new(ClientSpeechEngine::new(outbound.clone())),
        };

        let voice_supported = app_state.config.voice_input && app_state.sst_adapter.is_some();

        Self {
            id: Uuid::new_v4(),
            coordinator: PlaybackCoordinator::new(engine),
            search: SearchController::new(app_state.session_cache(), DebounceWindows::default()),
            capture: SpeechCapture::new(voice_supported),
            app_state,
            events,
            outbound,
            debounce_timer: None,
            lifetime: CancellationToken::new(),
            last_playback: None,
            last_search: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Greets the client with the session's capabilities and initial state.
    pub fn start(&mut self) {
        info!("Brief session {} started.", self.id);
        let speech_output = if self.app_state.tts_adapter.is_some() {
            self.app_state.config.speech_output
        } else {
            SpeechOutput::Client
        };
        self.send(ServerMessage::SessionInitialized {
            session_id: self.id,
            voice_input_supported: self.capture.is_supported(),
            speech_output,
            rate_presets: PlaybackRate::PRESETS.to_vec(),
        });
        self.publish_state();
    }

    /// Applies one event, then pushes whatever state changed to the client.
    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Client(message) => self.handle_client(message),
            SessionEvent::Audio(data) => {
                if !self.capture.push_audio(&data) {
                    debug!("Dropping {} audio bytes received while not listening.", data.len());
                }
            }
            SessionEvent::DebounceElapsed { generation } => self.fire_search(generation),
            SessionEvent::FetchFinished {
                generation,
                query,
                result,
            } => match self.search.complete_fetch(generation, &query, result, Utc::now()) {
                FetchCompletion::Installed(bundle) => self.install(&bundle),
                FetchCompletion::Failed(message) => self.send(ServerMessage::Error { message }),
                FetchCompletion::Stale => {}
            },
            SessionEvent::TranscriptReady { session, result } => {
                if let Some(text) = self.capture.finish(session, result) {
                    info!("Voice query: '{}'.", text);
                    self.send(ServerMessage::Transcript { text: text.clone() });
                    self.submit_search(&text, QuerySource::Voice);
                }
            }
            SessionEvent::UtteranceFinished { token, outcome } => {
                self.coordinator.on_utterance_finished(token, outcome);
            }
        }
        self.publish_state();
    }

    /// Stops everything this session started.
    pub fn shutdown(&mut self) {
        info!("Brief session {} shutting down.", self.id);
        if let Some(timer) = self.debounce_timer.take() {
            timer.cancel();
        }
        self.lifetime.cancel();
        self.coordinator.stop_all();
    }

    fn handle_client(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::Search { query } => self.submit_search(&query, QuerySource::Typed),
            ClientMessage::StartListening => {
                if let Err(e) = self.capture.start_listening() {
                    warn!("Cannot start listening: {}", e);
                    self.send(ServerMessage::Error { message: e.to_string() });
                }
            }
            ClientMessage::StopListening => self.transcribe(),
            ClientMessage::Play { id } => self.coordinator.play_manual(id),
            ClientMessage::PlayAll => self.coordinator.play_all(),
            ClientMessage::StopAll => self.coordinator.stop_all(),
            ClientMessage::ToggleAutoPlay => self.coordinator.toggle_auto_play(),
            ClientMessage::SetMuted { muted } => self.coordinator.set_muted(muted),
            ClientMessage::SetRate { rate } => self.coordinator.set_rate(rate),
            ClientMessage::CycleRate => {
                let rate = self.coordinator.cycle_rate();
                debug!("Playback rate is now {}.", rate);
            }
            ClientMessage::UtteranceEnded { token, error } => {
                let outcome = utterance_outcome(error.as_deref());
                self.coordinator.on_utterance_finished(token, outcome);
            }
        }
    }

    //=====================================================================================
    // Search
    //=====================================================================================

    /// A new query replaces the displayed bundle right away; the fetch itself
    /// waits for the debounce window.
    fn submit_search(&mut self, raw: &str, source: QuerySource) {
        let Some(ticket) = self.search.submit(raw, source) else {
            return;
        };
        self.coordinator.clear_bundle();
        self.send(ServerMessage::ResultsCleared);
        self.arm_debounce(ticket);
    }

    fn arm_debounce(&mut self, ticket: DebounceTicket) {
        if let Some(previous) = self.debounce_timer.take() {
            previous.cancel();
        }
        let timer = self.lifetime.child_token();
        self.debounce_timer = Some(timer.clone());

        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(ticket.delay) => {
                    let _ = events.send(SessionEvent::DebounceElapsed { generation: ticket.generation });
                }
            }
        });
    }

    fn fire_search(&mut self, generation: u64) {
        match self.search.fire(generation, Utc::now()) {
            None => {}
            Some(SearchStep::Hit(bundle)) => self.install(&bundle),
            Some(SearchStep::Fetch { generation, query }) => {
                let fetcher = self.app_state.fetcher.clone();
                let events = self.events.clone();
                let lifetime = self.lifetime.clone();
                let topic = query.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = lifetime.cancelled() => {}
                        result = fetcher.fetch(&topic) => {
                            let _ = events.send(SessionEvent::FetchFinished { generation, query, result });
                        }
                    }
                });
            }
        }
    }

    fn install(&mut self, bundle: &ResultBundle) {
        self.send(ServerMessage::Results {
            bundle: bundle.clone(),
        });
        self.coordinator.install_bundle(bundle.summaries.clone());
    }

    //=====================================================================================
    // Voice input
    //=====================================================================================

    fn transcribe(&mut self) {
        let Some(job) = self.capture.stop_listening() else {
            return;
        };
        let events = self.events.clone();
        let Some(sst) = self.app_state.sst_adapter.clone() else {
            let result = Err(PortError::Unavailable("speech-to-text".to_string()));
            let _ = events.send(SessionEvent::TranscriptReady {
                session: job.session,
                result,
            });
            return;
        };

        info!("Transcribing {} bytes of voice input.", job.audio.len());
        let lifetime = self.lifetime.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = lifetime.cancelled() => {}
                result = sst.transcribe_audio(&job.audio) => {
                    let _ = events.send(SessionEvent::TranscriptReady { session: job.session, result });
                }
            }
        });
    }

    //=====================================================================================
    // Outbound
    //=====================================================================================

    fn send(&self, message: ServerMessage) {
        if self.outbound.send(Outbound::Message(message)).is_err() {
            debug!("Session {} has no writer; dropping message.", self.id);
        }
    }

    /// Sends playback and search state, each only when it changed.
    fn publish_state(&mut self) {
        let snapshot = self.coordinator.snapshot();
        if self.last_playback.as_ref() != Some(&snapshot) {
            self.last_playback = Some(snapshot.clone());
            self.send(ServerMessage::Playback { snapshot });
        }

        let status = self.search.status().clone();
        if self.last_search.as_ref() != Some(&status) {
            self.last_search = Some(status.clone());
            self.send(ServerMessage::SearchState { status });
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
        domain::SummaryId,
        fetcher::{SummaryFetcher, FETCH_FAILED_MESSAGE},
        playback::PlaybackMode,
        ports::{SpeechToTextService, SummarizationService},
    };
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    const REPLY: &str = r#"{
        "summaries": [
            {"title": "Rates hold", "summary": "The bank held rates.", "category": "Economy",
             "relatedArticles": [{"headline": "Bank holds", "url": "https://news.example.com/a"}]},
            {"title": "Rain ahead", "summary": "Storms on Friday.", "category": "Weather",
             "relatedArticles": [{"headline": "Forecast", "url": "https://weather.example.com/b"}]}
        ],
        "recommendations": ["Bond yields"]
    }"#;

    /// Records every topic and answers with a fixed reply.
    struct FakeSummarizer {
        topics: Mutex<Vec<String>>,
        reply: PortResult<String>,
    }

    #[async_trait]
    impl SummarizationService for FakeSummarizer {
        async fn summarize(&self, topic: &str, _today: NaiveDate) -> PortResult<String> {
            self.topics.lock().unwrap().push(topic.to_string());
            self.reply.clone()
        }
    }

    struct FixedTranscriber(&'static str);

    #[async_trait]
    impl SpeechToTextService for FixedTranscriber {
        async fn transcribe_audio(&self, _audio_data: &[u8]) -> PortResult<String> {
            Ok(self.0.to_string())
        }
    }

    struct Harness {
        session: BriefSession,
        summarizer: Arc<FakeSummarizer>,
        events: UnboundedReceiver<SessionEvent>,
        outbound: UnboundedReceiver<Outbound>,
    }

    impl Harness {
        fn new(reply: PortResult<String>, sst: Option<Arc<dyn SpeechToTextService>>) -> Self {
            let summarizer = Arc::new(FakeSummarizer {
                topics: Mutex::new(Vec::new()),
                reply,
            });
            let config = Arc::new(Config::from_lookup(|_| None).unwrap());
            let fetcher = Arc::new(SummaryFetcher::new(summarizer.clone(), config.fetch_timeout));
            let app_state = Arc::new(AppState::new(config, fetcher, sst, None));

            let (event_tx, events) = mpsc::unbounded_channel();
            let (out_tx, outbound) = mpsc::unbounded_channel();
            let mut session = BriefSession::new(app_state, event_tx, out_tx);
            session.start();
            Self {
                session,
                summarizer,
                events,
                outbound,
            }
        }

        fn client(&mut self, message: ClientMessage) {
            self.session.handle(SessionEvent::Client(message));
        }

        /// Feeds the next background event back into the session.
        async fn pump(&mut self) {
            let event = self.events.recv().await.unwrap();
            self.session.handle(event);
        }

        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut messages = Vec::new();
            while let Ok(out) = self.outbound.try_recv() {
                if let Outbound::Message(message) = out {
                    messages.push(message);
                }
            }
            messages
        }

        fn topics(&self) -> Vec<String> {
            self.summarizer.topics.lock().unwrap().clone()
        }
    }

    fn spoken(messages: &[ServerMessage]) -> Vec<(UtteranceToken, String)> {
        messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::Speak { token, text, .. } => Some((*token, text.clone())),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn session_announces_its_capabilities() {
        let mut h = Harness::new(Ok(REPLY.to_string()), None);
        let messages = h.drain();
        match &messages[0] {
            ServerMessage::SessionInitialized {
                voice_input_supported,
                speech_output,
                rate_presets,
                ..
            } => {
                assert!(!voice_input_supported);
                assert_eq!(*speech_output, SpeechOutput::Client);
                assert_eq!(rate_presets.len(), 3);
            }
            other => panic!("unexpected first message {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_queries_are_coalesced_into_one_fetch() {
        let mut h = Harness::new(Ok(REPLY.to_string()), None);
        h.client(ClientMessage::Search { query: "mar".into() });
        h.client(ClientMessage::Search { query: "markets".into() });

        h.pump().await; // debounce
        h.pump().await; // fetch

        assert_eq!(h.topics(), vec!["markets"]);
        let messages = h.drain();
        assert!(messages.iter().any(|m| matches!(m, ServerMessage::Results { bundle } if bundle.summaries.len() == 2)));
        let speech = spoken(&messages);
        assert_eq!(speech.len(), 1);
        assert_eq!(speech[0].1, "First issue. Rates hold. The bank held rates.");
    }

    #[tokio::test(start_paused = true)]
    async fn loading_is_shown_before_the_debounce_elapses() {
        let mut h = Harness::new(Ok(REPLY.to_string()), None);
        h.drain();
        h.client(ClientMessage::Search { query: "markets".into() });

        let messages = h.drain();
        assert!(messages.contains(&ServerMessage::ResultsCleared));
        assert!(messages.iter().any(|m| matches!(
            m,
            ServerMessage::SearchState { status } if status.loading
        )));
        assert!(h.topics().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_query_is_served_from_the_cache() {
        let mut h = Harness::new(Ok(REPLY.to_string()), None);
        h.client(ClientMessage::Search { query: "Markets".into() });
        h.pump().await;
        h.pump().await;

        h.client(ClientMessage::Search { query: " markets ".into() });
        h.pump().await;

        assert_eq!(h.topics().len(), 1);
        let results = h
            .drain()
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::Results { .. }))
            .count();
        assert_eq!(results, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_reports_the_user_message() {
        let mut h = Harness::new(Err(PortError::Unexpected("503".into())), None);
        h.client(ClientMessage::Search { query: "markets".into() });
        h.pump().await;
        h.pump().await;

        let messages = h.drain();
        assert!(messages.contains(&ServerMessage::Error {
            message: FETCH_FAILED_MESSAGE.to_string()
        }));
        assert!(messages.iter().any(|m| matches!(
            m,
            ServerMessage::SearchState { status }
                if !status.loading && status.error.as_deref() == Some(FETCH_FAILED_MESSAGE)
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn completions_advance_auto_play_and_stale_ones_are_ignored() {
        let mut h = Harness::new(Ok(REPLY.to_string()), None);
        h.client(ClientMessage::Search { query: "markets".into() });
        h.pump().await;
        h.pump().await;
        let first = spoken(&h.drain())[0].0;

        h.client(ClientMessage::UtteranceEnded { token: first, error: None });
        let speech = spoken(&h.drain());
        assert_eq!(speech.len(), 1);
        assert_eq!(speech[0].1, "Second issue. Rain ahead. Storms on Friday.");

        // The first token again is stale.
        h.client(ClientMessage::UtteranceEnded { token: first, error: None });
        assert!(spoken(&h.drain()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn playing_a_card_reports_it_as_now_playing() {
        let mut h = Harness::new(Ok(REPLY.to_string()), None);
        h.client(ClientMessage::Search { query: "markets".into() });
        h.pump().await;
        h.pump().await;
        h.client(ClientMessage::StopAll);
        h.drain();

        h.client(ClientMessage::Play { id: SummaryId(1) });
        let messages = h.drain();
        assert!(messages.iter().any(|m| matches!(
            m,
            ServerMessage::Playback { snapshot }
                if snapshot.mode == PlaybackMode::ManualSingle && snapshot.now_playing == Some(SummaryId(1))
        )));
        assert_eq!(spoken(&messages)[0].1, "Rain ahead. Storms on Friday.");
    }

    #[tokio::test(start_paused = true)]
    async fn voice_query_is_transcribed_and_searched() {
        let sst: Arc<dyn SpeechToTextService> = Arc::new(FixedTranscriber(" exchange rate "));
        let mut h = Harness::new(Ok(REPLY.to_string()), Some(sst));
        h.client(ClientMessage::StartListening);
        h.session.handle(SessionEvent::Audio(vec![0, 1, 2, 3]));
        h.client(ClientMessage::StopListening);

        h.pump().await; // transcript
        let before = tokio::time::Instant::now();
        h.pump().await; // debounce
        assert!(before.elapsed() >= Duration::from_millis(1000));
        h.pump().await; // fetch

        assert_eq!(h.topics(), vec!["exchange rate"]);
        assert!(h.drain().contains(&ServerMessage::Transcript {
            text: "exchange rate".to_string()
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn listening_without_voice_support_is_an_error() {
        let mut h = Harness::new(Ok(REPLY.to_string()), None);
        h.drain();
        h.client(ClientMessage::StartListening);
        assert!(matches!(h.drain().as_slice(), [ServerMessage::Error { .. }]));
    }

    #[tokio::test(start_paused = true)]
    async fn muting_stops_narration() {
        let mut h = Harness::new(Ok(REPLY.to_string()), None);
        h.client(ClientMessage::Search { query: "markets".into() });
        h.pump().await;
        h.pump().await;
        h.drain();

        h.client(ClientMessage::SetMuted { muted: true });
        let messages = h.drain();
        assert!(messages.contains(&ServerMessage::CancelSpeech));
        assert!(messages.iter().any(|m| matches!(
            m,
            ServerMessage::Playback { snapshot } if snapshot.muted && snapshot.mode == PlaybackMode::Idle
        )));
    }
}
