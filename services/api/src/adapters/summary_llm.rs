//! services/api/src/adapters/summary_llm.rs
//!
//! This module contains the adapter for the news-summarizing LLM.
//! It implements the `SummarizationService` port from the `core` crate.

const SYSTEM_INSTRUCTIONS: &str = r#"You are a precise news aggregator.

Use the web search tool to find the latest reporting relevant to the user's topic and the current date,
then return a JSON object summarizing 5 distinct major news stories.

Rules for links (they must not 404):
- Every `url` MUST be copied character-for-character from a web search result. Keep query parameters.
- Never shorten, guess or invent a URL. If search gives no URL for a story, leave the story out.
- Prefer major news outlets and articles published within the last 24-48 hours.
- Each `summary` must be based only on the articles listed under that story.

Image hints:
- `imageKeywords` is exactly 2 simple English nouns (e.g. "storm car", "diplomat handshake").
- `category` is one word such as Politics, Economy, Society, World, Tech, Sports or Culture.

Output format:
{
  "summaries": [
    {
      "title": "Clean headline without tags like [Exclusive]",
      "summary": "Two or three sentence summary.",
      "imageKeywords": "noun1 noun2",
      "category": "Economy",
      "relatedArticles": [
        { "headline": "Original headline", "url": "EXACT_URL_FROM_SEARCH" }
      ]
    }
  ],
  "recommendations": ["related topic 1", "related topic 2", "related topic 3"]
}

Return ONLY the JSON. No markdown fences, no introduction."#;

const USER_INPUT_TEMPLATE: &str = r#"Current date: {today}
User topic: "{topic}""#;

use async_openai::{
    config::OpenAIConfig,
    types::{
        responses::{CreateResponseArgs, Tool, WebSearchTool},
    },
    Client, error::OpenAIError,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use news_brief_core::ports::{PortError, PortResult, SummarizationService};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `SummarizationService` using an OpenAI-compatible LLM
/// with web search grounding.
#[derive(Clone)]
pub struct OpenAiSummaryAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiSummaryAdapter {
    /// Creates a new `OpenAiSummaryAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    fn user_input(topic: &str, today: NaiveDate) -> String {
        USER_INPUT_TEMPLATE
            .replace("{today}", &today.format("%B %-d, %Y").to_string())
            .replace("{topic}", topic.trim())
    }
}

//=========================================================================================
// `SummarizationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl SummarizationService for OpenAiSummaryAdapter {
    /// Asks the model for a grounded briefing and returns its raw text output.
    async fn summarize(&self, topic: &str, today: NaiveDate) -> PortResult<String> {
        let request = CreateResponseArgs::default()
            .model(&self.model)
            .instructions(SYSTEM_INSTRUCTIONS)
            .input(Self::user_input(topic, today))
            .tools(vec![Tool::WebSearch(WebSearchTool::default())])
            .max_output_tokens(4000u32)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self
            .client
            .responses()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let text = response.output_text().unwrap_or_default();
        if text.trim().is_empty() {
            return Err(PortError::Unexpected(
                "Summary LLM response contained no text content.".to_string(),
            ));
        }
        debug!("Summary LLM returned {} characters.", text.len());
        Ok(text)
    }
}
