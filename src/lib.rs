//! Bedtime story generation: story text, illustrations, narration and a
//! timed read-along, each stage optional after the first.

pub mod core;
pub mod services;
pub mod utils;

pub use crate::core::config::Config;
pub use crate::core::notice::{LogNotices, Notice, NoticeSink, Stage};
pub use crate::core::session::StorySession;
pub use crate::core::story::{
    AssetCache, IllustrationSet, Story, StoryOutcome, StoryRequest, Theme, VoiceAsset,
};
pub use crate::core::voice::{Voice, VoiceCatalog};
pub use crate::services::images::ModelVariant;
pub use crate::services::pipeline::{PipelineReport, StageStatus, StoryOptions, StoryPipeline};
pub use crate::services::read_along::{HighlightEvent, HighlightState, ReadAlong, ReadAlongHandle};
pub use crate::services::retry::RetryPolicy;
