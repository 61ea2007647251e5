//! crates/news_brief_core/src/capture.rs
//!
//! Voice input: one listening session buffers audio until stopped, the buffer is
//! transcribed elsewhere, and the finalized transcript is released at most once.

use crate::ports::PortResult;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("Voice input is not supported")]
    Unsupported,
    #[error("Already listening")]
    AlreadyListening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureSessionId(pub u64);

/// Audio to transcribe for a finished listening session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureJob {
    pub session: CaptureSessionId,
    pub audio: Vec<u8>,
}

#[derive(Debug)]
enum CaptureState {
    Idle,
    Listening {
        session: CaptureSessionId,
        audio: Vec<u8>,
    },
    Transcribing {
        session: CaptureSessionId,
    },
}

#[derive(Debug)]
pub struct SpeechCapture {
    supported: bool,
    state: CaptureState,
    last_session: u64,
}

impl SpeechCapture {
    pub fn new(supported: bool) -> Self {
        Self {
            supported,
            state: CaptureState::Idle,
            last_session: 0,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    pub fn is_listening(&self) -> bool {
        matches!(self.state, CaptureState::Listening { .. })
    }

    /// Opens a new session. A transcription still in flight is abandoned; its
    /// transcript will not be released.
    pub fn start_listening(&mut self) -> Result<CaptureSessionId, CaptureError> {
        if !self.supported {
            return Err(CaptureError::Unsupported);
        }
        if self.is_listening() {
            return Err(CaptureError::AlreadyListening);
        }
        self.last_session += 1;
        let session = CaptureSessionId(self.last_session);
        self.state = CaptureState::Listening {
            session,
            audio: Vec::new(),
        };
        info!("Listening session {} started.", session.0);
        Ok(session)
    }

    /// Appends audio while listening; frames outside a session are dropped.
    pub fn push_audio(&mut self, data: &[u8]) -> bool {
        match &mut self.state {
            CaptureState::Listening { audio, .. } => {
                audio.extend_from_slice(data);
                true
            }
            _ => false,
        }
    }

    /// Ends the session. Returns the audio to transcribe, or `None` if nothing
    /// was being recorded or nothing was heard.
    pub fn stop_listening(&mut self) -> Option<CaptureJob> {
        match std::mem::replace(&mut self.state, CaptureState::Idle) {
            CaptureState::Listening { session, audio } if !audio.is_empty() => {
                self.state = CaptureState::Transcribing { session };
                Some(CaptureJob { session, audio })
            }
            CaptureState::Listening { session, .. } => {
                debug!("Listening session {} ended without audio.", session.0);
                None
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Releases the transcript for `session`, once. Blank or failed
    /// transcriptions release nothing.
    pub fn finish(&mut self, session: CaptureSessionId, result: PortResult<String>) -> Option<String> {
        match self.state {
            CaptureState::Transcribing { session: current } if current == session => {
                self.state = CaptureState::Idle;
            }
            _ => {
                debug!("Dropping transcript for abandoned session {}.", session.0);
                return None;
            }
        }
        match result {
            Ok(text) => {
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            Err(e) => {
                warn!("Transcription for session {} failed: {}", session.0, e);
                None
            }
        }
    }
}
