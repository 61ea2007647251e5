//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API server
//! for the news brief reader.

use crate::config::SpeechOutput;
use news_brief_core::{
    domain::{PlaybackRate, ResultBundle, SummaryId},
    playback::{PlaybackSnapshot, UtteranceOutcome},
    ports::UtteranceToken,
    search::SearchStatus,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================
// NOTE: Voice query audio is sent as raw Binary frames (PCM16 mono) between
// `StartListening` and `StopListening`, not as part of this enum.
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A typed search, or a recommendation chip that was clicked.
    Search { query: String },

    /// The microphone button was pressed; audio frames follow.
    StartListening,

    /// The microphone button was released; transcribe what was heard.
    StopListening,

    /// Play or stop a single card.
    Play { id: SummaryId },

    PlayAll,

    StopAll,

    /// The global play-all / stop-all button.
    ToggleAutoPlay,

    SetMuted { muted: bool },

    SetRate { rate: PlaybackRate },

    CycleRate,

    /// The client's speech engine finished (or gave up on) an utterance.
    UtteranceEnded {
        token: UtteranceToken,
        #[serde(default)]
        error: Option<String>,
    },
}

/// Maps the client's completion report onto an outcome. Cancellation errors raised
/// by the engine itself are not failures.
pub fn utterance_outcome(error: Option<&str>) -> UtteranceOutcome {
    match error.map(str::trim) {
        None | Some("") => UtteranceOutcome::Completed,
        Some("interrupted") | Some("canceled") => UtteranceOutcome::Interrupted,
        Some(other) => UtteranceOutcome::Failed(other.to_string()),
    }
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================
// NOTE: Server-synthesized narration is sent as a raw Binary frame right after the
// matching `Audio` message.
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the connection is ready and advertises its capabilities.
    SessionInitialized {
        session_id: Uuid,
        voice_input_supported: bool,
        speech_output: SpeechOutput,
        rate_presets: Vec<PlaybackRate>,
    },

    /// Loading indicator, error banner and current query.
    SearchState { status: SearchStatus },

    /// A new bundle replaces whatever was displayed.
    Results { bundle: ResultBundle },

    /// A new search was issued; the old cards go away.
    ResultsCleared,

    /// Mode, highlighted card, mute and speed.
    Playback { snapshot: PlaybackSnapshot },

    /// Speak `text` with the browser's voice and report back with `token`.
    Speak {
        token: UtteranceToken,
        text: String,
        rate: PlaybackRate,
    },

    /// The next binary frame is the narration audio for `token`.
    Audio { token: UtteranceToken },

    /// Stop speaking immediately.
    CancelSpeech,

    /// The finalized voice query, for display in the search box.
    Transcript { text: String },

    /// Reports an error to the client, which should display an error message.
    Error { message: String },
}

/// Everything the socket writer can be asked to send.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    Audio(Vec<u8>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_snake_case_tags() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"play","id":2}"#).unwrap();
        assert_eq!(msg, ClientMessage::Play { id: SummaryId(2) });

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"set_rate","rate":"1.5"}"#).unwrap();
        assert_eq!(msg, ClientMessage::SetRate { rate: PlaybackRate::Faster });

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"utterance_ended","token":7}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::UtteranceEnded { token: UtteranceToken(7), error: None }
        );
    }

    #[test]
    fn engine_cancellation_is_not_a_failure() {
        assert_eq!(utterance_outcome(None), UtteranceOutcome::Completed);
        assert_eq!(utterance_outcome(Some("canceled")), UtteranceOutcome::Interrupted);
        assert_eq!(utterance_outcome(Some("interrupted")), UtteranceOutcome::Interrupted);
        assert_eq!(
            utterance_outcome(Some("synthesis-failed")),
            UtteranceOutcome::Failed("synthesis-failed".to_string())
        );
    }

    #[test]
    fn speak_message_shape() {
        let json = serde_json::to_value(ServerMessage::Speak {
            token: UtteranceToken(3),
            text: "First issue. A. B".to_string(),
            rate: PlaybackRate::Fast,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "speak", "token": 3, "text": "First issue. A. B", "rate": "1.2"})
        );
    }
}
