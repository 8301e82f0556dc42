use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
}

impl Voice {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// "Adam" for "Adam - Warm Male".
    pub fn short_name(&self) -> &str {
        self.name
            .split_once(" - ")
            .map(|(short, _)| short)
            .unwrap_or(&self.name)
            .trim()
    }
}

const DEFAULT_VOICES: [(&str, &str); 7] = [
    ("4YYIPFl9wE5c4L2eu2Gb", "Burt Reynolds"),
    ("L2Ztarb5Q7APkwWdQTDy", "DanShahDotCom"),
    ("pNInz6obpgDQGcFmaJgB", "Adam - Warm Male"),
    ("EXAVITQu4vr4xnSDxMaL", "Bella - Gentle Female"),
    ("21m00Tcm4TlvDq8ikWAM", "Rachel - Storyteller"),
    ("ErXwobaYiN019PkySvjV", "Antoni - Deep Male"),
    ("AZnzlk1XvdvUeBnXmlld", "Domi - Cheerful Female"),
];

pub const DEFAULT_VOICE_ID: &str = "pNInz6obpgDQGcFmaJgB";

/// Narrator voices offered to the user, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceCatalog {
    voices: Vec<Voice>,
}

impl Default for VoiceCatalog {
    fn default() -> Self {
        Self {
            voices: DEFAULT_VOICES
                .iter()
                .map(|(id, name)| Voice::new(*id, *name))
                .collect(),
        }
    }
}

impl VoiceCatalog {
    /// Builds a catalog from configured voices; later duplicates of an id are dropped.
    pub fn new(voices: Vec<Voice>) -> Self {
        let mut unique: Vec<Voice> = Vec::with_capacity(voices.len());
        for voice in voices {
            if !unique.iter().any(|v| v.id == voice.id) {
                unique.push(voice);
            }
        }
        Self { voices: unique }
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn get(&self, voice_id: &str) -> Option<&Voice> {
        self.voices.iter().find(|v| v.id == voice_id)
    }

    /// Resolves a voice by id, full label, or short name ("Adam").
    pub fn resolve(&self, key: &str) -> Option<&Voice> {
        let key = key.trim();
        self.get(key).or_else(|| {
            self.voices.iter().find(|v| {
                v.name.eq_ignore_ascii_case(key) || v.short_name().eq_ignore_ascii_case(key)
            })
        })
    }

    /// Display label for a voice id, falling back to the id itself.
    pub fn label<'a>(&'a self, voice_id: &'a str) -> &'a str {
        self.get(voice_id).map(|v| v.name.as_str()).unwrap_or(voice_id)
    }
}
