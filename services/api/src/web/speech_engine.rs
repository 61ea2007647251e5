//! services/api/src/web/speech_engine.rs
//!
//! The two ways a session can read narration aloud. Both hand the coordinator an
//! immediate answer and report completion later through the session's event loop,
//! keyed by the utterance token.

use crate::web::{
    protocol::{Outbound, ServerMessage},
    session::SessionEvent,
};
use news_brief_core::{
    playback::UtteranceOutcome,
    ports::{PortError, PortResult, SpeechEngine, Submission, TextToSpeechService, Utterance},
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

//=========================================================================================
// Browser voice
//=========================================================================================

/// Asks the browser to speak with its own voice. The browser answers with
/// `utterance_ended`.
pub struct ClientSpeechEngine {
    outbound: UnboundedSender<Outbound>,
}

impl ClientSpeechEngine {
    pub fn new(outbound: UnboundedSender<Outbound>) -> Self {
        Self { outbound }
    }
}

impl SpeechEngine for ClientSpeechEngine {
    fn speak(&mut self, utterance: &Utterance) -> PortResult<Submission> {
        if utterance.muted {
            return Ok(Submission::Finished);
        }
        self.outbound
            .send(Outbound::Message(ServerMessage::Speak {
                token: utterance.token,
                text: utterance.text.clone(),
                rate: utterance.rate,
            }))
            .map_err(|_| PortError::Unavailable("client disconnected".to_string()))?;
        Ok(Submission::Started)
    }

    fn cancel(&mut self) {
        let _ = self
            .outbound
            .send(Outbound::Message(ServerMessage::CancelSpeech));
    }
}

//=========================================================================================
// Server-synthesized voice
//=========================================================================================

/// Synthesizes narration with the TTS port and streams the audio to the browser,
/// which plays it and answers with `utterance_ended`. Synthesis failures are
/// reported straight back to the session.
pub struct SynthesizedSpeechEngine {
    tts: Arc<dyn TextToSpeechService>,
    outbound: UnboundedSender<Outbound>,
    events: UnboundedSender<SessionEvent>,
    in_flight: Option<CancellationToken>,
}

impl SynthesizedSpeechEngine {
    pub fn new(
        tts: Arc<dyn TextToSpeechService>,
        outbound: UnboundedSender<Outbound>,
        events: UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            tts,
            outbound,
            events,
            in_flight: None,
        }
    }

    fn abort_in_flight(&mut self) {
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
    }
}

impl SpeechEngine for SynthesizedSpeechEngine {
    fn speak(&mut self, utterance: &Utterance) -> PortResult<Submission> {
        if utterance.muted {
            return Ok(Submission::Finished);
        }
        if self.outbound.is_closed() {
            return Err(PortError::Unavailable("client disconnected".to_string()));
        }
        self.abort_in_flight();

        let cancel = CancellationToken::new();
        self.in_flight = Some(cancel.clone());

        let tts = self.tts.clone();
        let outbound = self.outbound.clone();
        let events = self.events.clone();
        let token = utterance.token;
        let text = utterance.text.clone();
        let rate = utterance.rate;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Synthesis for {} cancelled.", token);
                }
                result = tts.generate_audio(&text, rate) => match result {
                    Ok(audio) => {
                        let _ = outbound.send(Outbound::Message(ServerMessage::Audio { token }));
                        let _ = outbound.send(Outbound::Audio(audio));
                    }
                    Err(e) => {
                        error!("Failed to synthesize {}: {:?}", token, e);
                        let _ = events.send(SessionEvent::UtteranceFinished {
                            token,
                            outcome: UtteranceOutcome::Failed(e.to_string()),
                        });
                    }
                }
            }
        });

        Ok(Submission::Started)
    }

    fn cancel(&mut self) {
        self.abort_in_flight();
        let _ = self
            .outbound
            .send(Outbound::Message(ServerMessage::CancelSpeech));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use news_brief_core::{domain::PlaybackRate, ports::UtteranceToken};
    use tokio::sync::mpsc;

    struct FixedTts(PortResult<Vec<u8>>);

    #[async_trait]
    impl TextToSpeechService for FixedTts {
        async fn generate_audio(&self, _text: &str, _rate: PlaybackRate) -> PortResult<Vec<u8>> {
            self.0.clone()
        }
    }

    fn utterance(token: u64, muted: bool) -> Utterance {
        Utterance {
            token: UtteranceToken(token),
            text: "First issue. A. B".to_string(),
            rate: PlaybackRate::Fast,
            muted,
        }
    }

    #[test]
    fn client_engine_forwards_text_to_the_browser() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = ClientSpeechEngine::new(tx);

        assert_eq!(engine.speak(&utterance(1, false)).unwrap(), Submission::Started);
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Message(ServerMessage::Speak {
                token: UtteranceToken(1),
                text: "First issue. A. B".to_string(),
                rate: PlaybackRate::Fast,
            })
        );

        engine.cancel();
        assert_eq!(rx.try_recv().unwrap(), Outbound::Message(ServerMessage::CancelSpeech));
    }

    #[test]
    fn client_engine_finishes_muted_utterances_on_the_spot() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = ClientSpeechEngine::new(tx);
        assert_eq!(engine.speak(&utterance(1, true)).unwrap(), Submission::Finished);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn client_engine_reports_a_closed_connection() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut engine = ClientSpeechEngine::new(tx);
        assert!(matches!(
            engine.speak(&utterance(1, false)),
            Err(PortError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn synthesized_engine_streams_audio_after_the_header() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (ev_tx, _ev_rx) = mpsc::unbounded_channel();
        let mut engine =
            SynthesizedSpeechEngine::new(Arc::new(FixedTts(Ok(vec![1, 2, 3]))), out_tx, ev_tx);

        assert_eq!(engine.speak(&utterance(4, false)).unwrap(), Submission::Started);
        assert_eq!(
            out_rx.recv().await.unwrap(),
            Outbound::Message(ServerMessage::Audio { token: UtteranceToken(4) })
        );
        assert_eq!(out_rx.recv().await.unwrap(), Outbound::Audio(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn synthesized_engine_reports_failures_as_completions() {
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let (ev_tx, mut ev_rx) = mpsc::unbounded_channel();
        let tts = FixedTts(Err(PortError::Unexpected("quota".to_string())));
        let mut engine = SynthesizedSpeechEngine::new(Arc::new(tts), out_tx, ev_tx);

        engine.speak(&utterance(9, false)).unwrap();
        match ev_rx.recv().await.unwrap() {
            SessionEvent::UtteranceFinished { token, outcome } => {
                assert_eq!(token, UtteranceToken(9));
                assert!(matches!(outcome, UtteranceOutcome::Failed(_)));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
