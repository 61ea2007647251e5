pub mod sst;
pub mod summary_llm;
pub mod tts;

pub use sst::OpenAiSstAdapter;
pub use summary_llm::OpenAiSummaryAdapter;
pub use tts::OpenAiTtsAdapter;
