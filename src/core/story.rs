use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Theme {
    Adventure,
    Animals,
    Magic,
    Space,
    Ocean,
    Forest,
    Castle,
    Friendship,
}

impl Theme {
    pub const ALL: [Theme; 8] = [
        Theme::Adventure,
        Theme::Animals,
        Theme::Magic,
        Theme::Space,
        Theme::Ocean,
        Theme::Forest,
        Theme::Castle,
        Theme::Friendship,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Theme::Adventure => "Adventure",
            Theme::Animals => "Animals",
            Theme::Magic => "Magic",
            Theme::Space => "Space",
            Theme::Ocean => "Ocean",
            Theme::Forest => "Forest",
            Theme::Castle => "Castle",
            Theme::Friendship => "Friendship",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Theme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Theme::ALL
            .iter()
            .copied()
            .find(|t| t.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("Unknown story theme: {}", s))
    }
}

/// What the user asked for. Never changes after submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryRequest {
    pub prompt: String,
    pub child_name: Option<String>,
    pub theme: Option<Theme>,
}

impl StoryRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            child_name: None,
            theme: None,
        }
    }

    /// Blank names are treated as "no name".
    pub fn with_child_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.child_name = if name.trim().is_empty() {
            None
        } else {
            Some(name.trim().to_string())
        };
        self
    }

    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = Some(theme);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoryOutcome {
    Written(String),
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Story {
    pub request: StoryRequest,
    pub outcome: StoryOutcome,
}

impl Story {
    pub fn written(request: StoryRequest, text: impl Into<String>) -> Self {
        Self {
            request,
            outcome: StoryOutcome::Written(text.into()),
        }
    }

    pub fn failed(request: StoryRequest, reason: impl Into<String>) -> Self {
        Self {
            request,
            outcome: StoryOutcome::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self.outcome, StoryOutcome::Written(_))
    }

    /// The prose, only when generation succeeded.
    pub fn prose(&self) -> Option<&str> {
        match &self.outcome {
            StoryOutcome::Written(text) => Some(text),
            StoryOutcome::Failed { .. } => None,
        }
    }

    /// Text to show the reader: the story, or a message explaining why there is none.
    pub fn text(&self) -> String {
        match &self.outcome {
            StoryOutcome::Written(text) => text.clone(),
            StoryOutcome::Failed { reason } => format!("Error generating story: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IllustrationSet {
    /// Scene from the first half of the story.
    pub first_image: String,
    /// Scene from the second half of the story.
    pub second_image: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceAsset {
    pub voice_id: String,
    pub voice_name: String,
    pub audio: Vec<u8>,
}

impl VoiceAsset {
    pub const MIME_TYPE: &'static str = "audio/mpeg";

    /// Suggested download name, e.g. `bedtime_story_Adam_-_Warm_Male.mp3`.
    pub fn file_name(&self) -> String {
        format!("bedtime_story_{}.mp3", self.voice_name.replace(' ', "_"))
    }
}

/// Narration audio for one story, one slot per voice id.
#[derive(Debug, Clone, Default)]
pub struct AssetCache {
    assets: HashMap<String, VoiceAsset>,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, voice_id: &str) -> Option<&VoiceAsset> {
        self.assets.get(voice_id)
    }

    pub fn contains(&self, voice_id: &str) -> bool {
        self.assets.contains_key(voice_id)
    }

    /// Stores the asset under its voice id, replacing any earlier take.
    pub fn insert(&mut self, asset: VoiceAsset) -> &VoiceAsset {
        let key = asset.voice_id.clone();
        self.assets.insert(key.clone(), asset);
        &self.assets[&key]
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VoiceAsset> {
        self.assets.values()
    }

    pub fn clear(&mut self) {
        self.assets.clear();
    }
}
