//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{tts::parse_voice, OpenAiSstAdapter, OpenAiSummaryAdapter, OpenAiTtsAdapter},
    config::{Config, SpeechOutput},
    error::ApiError,
    web::{get_brief_handler, rest::ApiDoc, state::AppState, ws_handler},
};
use async_openai::{config::OpenAIConfig, types::audio::SpeechModel, Client};
use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    routing::get,
    Router,
};
use news_brief_core::{
    fetcher::SummaryFetcher,
    ports::{SpeechToTextService, TextToSpeechService},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Initialize Service Adapters ---
    let mut openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    if let Some(base_url) = &config.openai_base_url {
        openai_config = openai_config.with_api_base(base_url);
    }
    let openai_client = Client::with_config(openai_config);

    let summary_adapter = Arc::new(OpenAiSummaryAdapter::new(
        openai_client.clone(),
        config.summary_model.clone(),
    ));
    let fetcher = Arc::new(SummaryFetcher::new(summary_adapter, config.fetch_timeout));

    let sst_adapter: Option<Arc<dyn SpeechToTextService>> = if config.voice_input {
        Some(Arc::new(OpenAiSstAdapter::new(
            openai_client.clone(),
            config.sst_model.clone(),
        )))
    } else {
        info!("Voice input disabled.");
        None
    };

    let tts_adapter: Option<Arc<dyn TextToSpeechService>> = match config.speech_output {
        SpeechOutput::Server => {
            let voice = parse_voice(&config.tts_voice).ok_or_else(|| {
                ApiError::Internal(format!(
                    "Invalid TTS voice specified in config: '{}'",
                    config.tts_voice
                ))
            })?;
            Some(Arc::new(OpenAiTtsAdapter::new(
                openai_client.clone(),
                SpeechModel::Tts1Hd,
                voice,
            )))
        }
        SpeechOutput::Client => None,
    };

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(
        config.clone(),
        fetcher,
        sst_adapter,
        tts_adapter,
    ));

    let cors_origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS origin '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    // --- 4. Create the Web Router ---
    let api_router = Router::new()
        .route("/briefs", get(get_brief_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http());

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
