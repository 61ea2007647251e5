//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use news_brief_core::{cache, fetcher};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where narration is turned into sound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechOutput {
    /// The browser speaks the text with its own voice.
    Client,
    /// The server synthesizes audio and streams it to the browser.
    Server,
}

impl FromStr for SpeechOutput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "client" => Ok(Self::Client),
            "server" => Ok(Self::Server),
            other => Err(format!("'{}' is not one of client, server", other)),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub cors_origin: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub summary_model: String,
    pub sst_model: String,
    pub voice_input: bool,
    pub tts_voice: String,
    pub speech_output: SpeechOutput,
    /// `None` waits on the transport indefinitely.
    pub fetch_timeout: Option<Duration>,
    pub cache_ttl: chrono::Duration,
    pub cache_capacity: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        // --- Server Settings ---
        let bind_address: SocketAddr = parse_or(&var, "BIND_ADDRESS", "0.0.0.0:3000".parse().ok())?;

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            var("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- API Keys (optional) ---
        let openai_api_key = var("OPENAI_API_KEY");
        let openai_base_url = var("OPENAI_BASE_URL");

        // --- Adapter-specific Settings ---
        let summary_model = var("SUMMARY_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let sst_model = var("SST_MODEL").unwrap_or_else(|| "whisper-1".to_string());
        let voice_input = parse_or(&var, "VOICE_INPUT", Some(true))?;
        let tts_voice = var("TTS_VOICE").unwrap_or_else(|| "alloy".to_string());
        let speech_output = parse_or(&var, "SPEECH_OUTPUT", Some(SpeechOutput::Client))?;

        // --- Search Settings ---
        let timeout_secs: u64 = parse_or(
            &var,
            "FETCH_TIMEOUT_SECS",
            Some(fetcher::DEFAULT_FETCH_TIMEOUT.as_secs()),
        )?;
        let fetch_timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

        let ttl_secs: u32 = parse_or(&var, "CACHE_TTL_SECS", Some(cache::DEFAULT_TTL_SECS as u32))?;
        let cache_capacity: usize = parse_or(&var, "CACHE_CAPACITY", Some(cache::DEFAULT_CAPACITY))?;
        if cache_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "CACHE_CAPACITY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            log_level,
            cors_origin,
            openai_api_key,
            openai_base_url,
            summary_model,
            sst_model,
            voice_input,
            tts_voice,
            speech_output,
            fetch_timeout,
            cache_ttl: chrono::Duration::seconds(i64::from(ttl_secs)),
            cache_capacity,
        })
    }
}

/// Parses `name` if set, otherwise falls back to `default`. A missing variable
/// with no default is an error.
fn parse_or<T, V>(var: &V, name: &str, default: Option<T>) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingVar(name.to_string())),
    }
}
