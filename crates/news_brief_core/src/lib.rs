pub mod cache;
pub mod capture;
pub mod domain;
pub mod fetcher;
pub mod playback;
pub mod ports;
pub mod search;

pub use cache::{normalize_query, SummaryCache};
pub use capture::{CaptureError, CaptureJob, CaptureSessionId, SpeechCapture};
pub use domain::{ArticleLink, DebounceWindows, PlaybackRate, QuerySource, ResultBundle, Summary, SummaryId};
pub use fetcher::{FetchError, SummaryFetcher, FETCH_FAILED_MESSAGE};
pub use playback::{PlaybackCoordinator, PlaybackMode, PlaybackSnapshot, UtteranceOutcome};
pub use ports::{
    PortError, PortResult, SpeechEngine, SpeechToTextService, Submission, SummarizationService,
    TextToSpeechService, Utterance, UtteranceToken,
};
pub use search::{DebounceTicket, FetchCompletion, SearchController, SearchStatus, SearchStep};
