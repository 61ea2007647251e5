//! crates/news_brief_core/src/playback.rs
//!
//! The narration coordinator: the single owner of "what is being read aloud".
//!
//! Three modes interact here: idle, manual playback of one card, and sequential
//! auto-play of the whole bundle. Every utterance handed to the speech engine is
//! stamped with a fresh `UtteranceToken`; a completion only mutates state when it
//! carries the token of the utterance currently considered active. Late events from
//! cancelled or superseded utterances are dropped.

use crate::domain::{PlaybackRate, Summary, SummaryId};
use crate::ports::{SpeechEngine, Submission, Utterance, UtteranceToken};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

const ORDINALS: [&str; 7] = [
    "First", "Second", "Third", "Fourth", "Fifth", "Sixth", "Seventh",
];

/// Auto-play narration: ordinal announcement, title, body.
pub fn auto_narration(summary: &Summary) -> String {
    match ORDINALS.get(summary.id.0) {
        Some(ordinal) => format!("{ordinal} issue. {}. {}", summary.title, summary.body),
        None => manual_narration(summary),
    }
}

/// Manual narration: title and body only.
pub fn manual_narration(summary: &Summary) -> String {
    format!("{}. {}", summary.title, summary.body)
}

//=========================================================================================
// State
//=========================================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    #[default]
    Idle,
    ManualSingle,
    SequentialAuto,
}

/// How an utterance ended, as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UtteranceOutcome {
    Completed,
    /// The engine's own cancellation ("interrupted" / "canceled").
    Interrupted,
    Failed(String),
}

#[derive(Debug, Clone)]
struct NowPlaying {
    id: SummaryId,
    title: String,
    token: UtteranceToken,
}

/// Read-only view for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub mode: PlaybackMode,
    pub now_playing: Option<SummaryId>,
    pub now_playing_title: Option<String>,
    pub pending: usize,
    pub muted: bool,
    pub rate: PlaybackRate,
}

//=========================================================================================
// Coordinator
//=========================================================================================

pub struct PlaybackCoordinator<E> {
    engine: E,
    summaries: Vec<Summary>,
    mode: PlaybackMode,
    now_playing: Option<NowPlaying>,
    queue: VecDeque<Summary>,
    muted: bool,
    rate: PlaybackRate,
    last_token: u64,
}

impl<E: SpeechEngine> PlaybackCoordinator<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            summaries: Vec::new(),
            mode: PlaybackMode::Idle,
            now_playing: None,
            queue: VecDeque::new(),
            muted: false,
            rate: PlaybackRate::default(),
            last_token: 0,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            mode: self.mode,
            now_playing: self.now_playing.as_ref().map(|n| n.id),
            now_playing_title: self.now_playing.as_ref().map(|n| n.title.clone()),
            pending: self.queue.len(),
            muted: self.muted,
            rate: self.rate,
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn now_playing(&self) -> Option<SummaryId> {
        self.now_playing.as_ref().map(|n| n.id)
    }

    pub fn active_token(&self) -> Option<UtteranceToken> {
        self.now_playing.as_ref().map(|n| n.token)
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn rate(&self) -> PlaybackRate {
        self.rate
    }

    // --- Bundle lifecycle ---

    /// Replaces the source list after stopping everything, then auto-starts
    /// sequential playback when there is something to read and sound is on.
    pub fn install_bundle(&mut self, summaries: Vec<Summary>) {
        self.stop_all();
        self.summaries = summaries;
        info!("Installed bundle with {} summaries.", self.summaries.len());
        if !self.summaries.is_empty() && !self.muted {
            self.play_all();
        }
    }

    /// Drops the current bundle; used when a new search is issued.
    pub fn clear_bundle(&mut self) {
        self.stop_all();
        self.summaries.clear();
    }

    // --- Intents ---

    pub fn play_all(&mut self) {
        if self.summaries.is_empty() || self.muted {
            debug!("play_all ignored (empty bundle or muted).");
            return;
        }
        self.halt();
        self.queue = self.summaries.iter().cloned().collect();
        self.mode = PlaybackMode::SequentialAuto;
        info!("Auto-play started with {} items.", self.queue.len());
        self.advance();
    }

    pub fn stop_all(&mut self) {
        self.halt();
    }

    pub fn toggle_auto_play(&mut self) {
        if self.mode == PlaybackMode::SequentialAuto {
            self.stop_all();
        } else {
            self.play_all();
        }
    }

    /// Plays one card. Asking for the card that is already playing stops
    /// everything, including an auto-play queue.
    pub fn play_manual(&mut self, id: SummaryId) {
        if self.muted {
            return;
        }
        if self.now_playing() == Some(id) {
            info!("Play requested for the card already playing ({}); stopping.", id);
            self.halt();
            return;
        }
        let Some(summary) = self.summaries.iter().find(|s| s.id == id).cloned() else {
            warn!("Play requested for unknown summary {}.", id);
            return;
        };

        self.halt();
        self.mode = PlaybackMode::ManualSingle;
        if !self.speak(&summary, manual_narration(&summary)) {
            self.now_playing = None;
            self.mode = PlaybackMode::Idle;
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        if muted == self.muted {
            return;
        }
        self.muted = muted;
        if muted {
            info!("Sound muted; stopping playback.");
            self.halt();
        }
    }

    /// Applies from the next submitted utterance on.
    pub fn set_rate(&mut self, rate: PlaybackRate) {
        self.rate = rate;
    }

    pub fn cycle_rate(&mut self) -> PlaybackRate {
        self.rate = self.rate.next();
        self.rate
    }

    // --- Engine events ---

    /// Handles an engine completion. Anything not matching the active token is
    /// stale and ignored.
    pub fn on_utterance_finished(&mut self, token: UtteranceToken, outcome: UtteranceOutcome) {
        if self.active_token() != Some(token) {
            debug!("Ignoring stale completion for {} ({:?}).", token, outcome);
            return;
        }
        if let UtteranceOutcome::Failed(reason) = &outcome {
            warn!("Speech synthesis failed for {}: {}. Treating as spoken.", token, reason);
        }

        self.now_playing = None;
        match self.mode {
            PlaybackMode::SequentialAuto => self.advance(),
            PlaybackMode::ManualSingle | PlaybackMode::Idle => self.mode = PlaybackMode::Idle,
        }
    }

    // --- Internals ---

    /// Pops queue items until one is actually speaking or the queue is exhausted.
    /// Items the engine finishes or rejects on the spot count as spoken.
    fn advance(&mut self) {
        loop {
            if self.muted || self.mode != PlaybackMode::SequentialAuto {
                self.reset_idle();
                return;
            }
            let Some(next) = self.queue.pop_front() else {
                info!("Auto-play finished.");
                self.reset_idle();
                return;
            };
            if self.speak(&next, auto_narration(&next)) {
                return;
            }
            self.now_playing = None;
        }
    }

    /// Submits one utterance. Returns true when a completion event is pending.
    fn speak(&mut self, summary: &Summary, text: String) -> bool {
        if self.now_playing.is_some() {
            self.engine.cancel();
        }
        self.last_token += 1;
        let token = UtteranceToken(self.last_token);
        self.now_playing = Some(NowPlaying {
            id: summary.id,
            title: summary.title.clone(),
            token,
        });

        let utterance = Utterance {
            token,
            text,
            rate: self.rate,
            muted: self.muted,
        };
        match self.engine.speak(&utterance) {
            Ok(Submission::Started) => {
                debug!("Speaking {} as {}.", summary.id, token);
                true
            }
            Ok(Submission::Finished) => false,
            Err(e) => {
                warn!("Speech engine rejected {}: {}. Treating as spoken.", token, e);
                false
            }
        }
    }

    /// Cancels the active utterance, if any, and returns to idle with an empty queue.
    fn halt(&mut self) {
        if self.now_playing.is_some() {
            self.engine.cancel();
        }
        self.reset_idle();
    }

    fn reset_idle(&mut self) {
        self.queue.clear();
        self.now_playing = None;
        self.mode = PlaybackMode::Idle;
    }
}
