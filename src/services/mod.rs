pub mod images;
pub mod llm;
pub mod pipeline;
pub mod read_along;
pub mod retry;
pub mod story;
pub mod transcribe;
pub mod tts;
