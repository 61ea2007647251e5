//! crates/news_brief_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any transport; they derive `Serialize` only
//! so the service can hand them to the browser unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A single related article shown under a summary card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleLink {
    pub title: String,
    pub url: String,
}

/// Position of a summary inside its bundle. Stable for the bundle's lifetime and
/// used as the playback identity instead of the title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SummaryId(pub usize);

impl fmt::Display for SummaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One summarized article cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub id: SummaryId,
    pub title: String,
    /// The narrated and displayed text.
    pub body: String,
    pub image_url: String,
    /// Never empty once the summary reaches a bundle.
    pub links: Vec<ArticleLink>,
}

/// One complete fetch result. Replaces the previous bundle wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultBundle {
    pub summaries: Vec<Summary>,
    pub recommendations: Vec<String>,
}

/// Narration speed presets, cycled by the header speed toggle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackRate {
    #[default]
    #[serde(rename = "1.0")]
    Normal,
    #[serde(rename = "1.2")]
    Fast,
    #[serde(rename = "1.5")]
    Faster,
}

impl PlaybackRate {
    pub const PRESETS: [PlaybackRate; 3] = [Self::Normal, Self::Fast, Self::Faster];

    pub fn multiplier(self) -> f32 {
        match self {
            Self::Normal => 1.0,
            Self::Fast => 1.2,
            Self::Faster => 1.5,
        }
    }

    /// The next preset in the cycle, wrapping back to normal speed.
    pub fn next(self) -> Self {
        match self {
            Self::Normal => Self::Fast,
            Self::Fast => Self::Faster,
            Self::Faster => Self::Normal,
        }
    }
}

impl fmt::Display for PlaybackRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.multiplier())
    }
}

/// Where a search query came from. Voice transcripts arrive in bursts and get a
/// longer quiescence window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuerySource {
    #[default]
    Typed,
    Voice,
}

/// Debounce quiescence windows per query source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceWindows {
    pub typed: Duration,
    pub voice: Duration,
}

impl Default for DebounceWindows {
    fn default() -> Self {
        Self {
            typed: Duration::from_millis(600),
            voice: Duration::from_millis(1000),
        }
    }
}

impl DebounceWindows {
    pub fn for_source(&self, source: QuerySource) -> Duration {
        match source {
            QuerySource::Typed => self.typed,
            QuerySource::Voice => self.voice,
        }
    }
}
