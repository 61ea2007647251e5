//! services/api/src/adapters/sst.rs
//!
//! This module contains the adapter for OpenAI's Speech-to-Text (Whisper) service.
//! It implements the `SpeechToTextService` port used for voice search.

use async_openai::{
    config::OpenAIConfig,
    types::{audio::{AudioInput, CreateTranscriptionRequest}},
    Client, error::OpenAIError,
};
use async_trait::async_trait;
use hound::{WavSpec, WavWriter};
use news_brief_core::ports::{PortError, PortResult, SpeechToTextService};

/// Sample rate of the PCM16 mono frames the browser streams while listening.
pub const CAPTURE_SAMPLE_RATE: u32 = 48_000;

/// An adapter that implements the `SpeechToTextService` port using the OpenAI Whisper API.
#[derive(Clone)]
pub struct OpenAiSstAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiSstAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

/// Wraps little-endian PCM16 mono samples in a WAV container. A trailing odd
/// byte is dropped.
pub fn pcm16_to_wav(pcm_data: &[u8], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::new(&mut cursor, spec)?;
    for chunk in pcm_data.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
    }
    writer.finalize()?;
    Ok(cursor.into_inner())
}

#[async_trait]
impl SpeechToTextService for OpenAiSstAdapter {
    /// Transcribes a spoken search topic.
    async fn transcribe_audio(&self, audio_data: &[u8]) -> PortResult<String> {
        let wav_data = pcm16_to_wav(audio_data, CAPTURE_SAMPLE_RATE)
            .map_err(|e| PortError::Unexpected(format!("Failed to encode WAV: {}", e)))?;

        let request = CreateTranscriptionRequest {
            file: AudioInput::from_vec_u8("voice_query.wav".into(), wav_data),
            model: self.model.clone(),
            ..Default::default()
        };

        let response = self
            .client
            .audio()
            .transcription()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        Ok(response.text.trim().to_string())
    }
}
