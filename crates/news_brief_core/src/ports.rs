//! crates/news_brief_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like LLM or speech APIs.

use crate::domain::PlaybackRate;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., network, engines).
#[derive(Debug, Clone, thiserror::Error)]
pub enum PortError {
    #[error("Capability unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait SummarizationService: Send + Sync {
    /// Asks the language model for a multi-article briefing on `topic`.
    /// Returns the model's raw reply; validation happens in the core.
    async fn summarize(&self, topic: &str, today: NaiveDate) -> PortResult<String>;
}

#[async_trait]
pub trait SpeechToTextService: Send + Sync {
    /// Transcribes a slice of audio data into text.
    async fn transcribe_audio(&self, audio_data: &[u8]) -> PortResult<String>;
}

#[async_trait]
pub trait TextToSpeechService: Send + Sync {
    /// Generates audio data from a string of text at the given speed.
    async fn generate_audio(&self, text: &str, rate: PlaybackRate) -> PortResult<Vec<u8>>;
}

//=========================================================================================
// Speech Engine Capability
//=========================================================================================

/// Stamp carried by every utterance submission. Completions are matched against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UtteranceToken(pub u64);

impl fmt::Display for UtteranceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "utt-{}", self.0)
    }
}

/// A request to read `text` aloud.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub token: UtteranceToken,
    pub text: String,
    pub rate: PlaybackRate,
    pub muted: bool,
}

/// What the engine did with a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Speaking has begun; exactly one completion carrying the token follows later.
    Started,
    /// Handled on the spot (e.g. muted). No completion event will follow.
    Finished,
}

/// The single, exclusive text-to-speech session.
///
/// The owner calls `cancel` before every new `speak`. Cancellation is best-effort:
/// a completion for the cancelled token may still arrive and must be tolerated.
pub trait SpeechEngine: Send {
    fn speak(&mut self, utterance: &Utterance) -> PortResult<Submission>;
    fn cancel(&mut self);
}

impl<E: SpeechEngine + ?Sized> SpeechEngine for Box<E> {
    fn speak(&mut self, utterance: &Utterance) -> PortResult<Submission> {
        (**self).speak(utterance)
    }

    fn cancel(&mut self) {
        (**self).cancel()
    }
}
