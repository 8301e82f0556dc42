use uuid::Uuid;

use crate::core::story::{AssetCache, IllustrationSet, Story};
use crate::services::read_along::ReadAlongHandle;

/// Everything one user has produced so far. Nothing here is shared between
/// sessions; the pipeline only writes a field once its stage has succeeded.
#[derive(Debug)]
pub struct StorySession {
    id: Uuid,
    story: Option<Story>,
    illustrations: Option<IllustrationSet>,
    audio: AssetCache,
    read_along: Option<ReadAlongHandle>,
}

impl Default for StorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl StorySession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            story: None,
            illustrations: None,
            audio: AssetCache::new(),
            read_along: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn story(&self) -> Option<&Story> {
        self.story.as_ref()
    }

    pub fn illustrations(&self) -> Option<&IllustrationSet> {
        self.illustrations.as_ref()
    }

    pub fn audio(&self) -> &AssetCache {
        &self.audio
    }

    pub(crate) fn audio_mut(&mut self) -> &mut AssetCache {
        &mut self.audio
    }

    pub fn read_along(&self) -> Option<&ReadAlongHandle> {
        self.read_along.as_ref()
    }

    pub fn read_along_mut(&mut self) -> Option<&mut ReadAlongHandle> {
        self.read_along.as_mut()
    }

    /// Current read-along sentence, if a pass has been started.
    pub fn read_along_cursor(&self) -> Option<usize> {
        self.read_along.as_ref().map(|h| h.cursor())
    }

    /// Replaces the story. Assets derived from the previous one are dropped.
    pub fn set_story(&mut self, story: Story) -> &Story {
        self.stop_read_along();
        self.illustrations = None;
        self.audio.clear();
        self.story.insert(story)
    }

    pub fn set_illustrations(&mut self, illustrations: IllustrationSet) -> &IllustrationSet {
        self.illustrations.insert(illustrations)
    }

    /// Installs a new read-along, cancelling any pass still running.
    pub fn set_read_along(&mut self, handle: ReadAlongHandle) -> &mut ReadAlongHandle {
        self.stop_read_along();
        self.read_along.insert(handle)
    }

    pub fn stop_read_along(&mut self) {
        if let Some(handle) = self.read_along.take() {
            handle.cancel();
        }
    }

    /// Back to an empty session. The id is kept.
    pub fn clear(&mut self) {
        self.stop_read_along();
        self.story = None;
        self.illustrations = None;
        self.audio.clear();
    }
}
