use anyhow::{anyhow, bail, Result};
use log::info;
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::Config;
use crate::core::notice::{LogNotices, Notice, NoticeSink, Stage};
use crate::core::session::StorySession;
use crate::core::story::{IllustrationSet, Story, StoryOutcome, StoryRequest, VoiceAsset};
use crate::core::voice::{Voice, VoiceCatalog};
use crate::services::images::{create_image_client, Illustrator, ImageClient, ModelVariant};
use crate::services::llm::{create_llm, LlmClient};
use crate::services::read_along::{ReadAlong, ReadAlongHandle};
use crate::services::retry::RetryPolicy;
use crate::services::story::StoryWriter;
use crate::services::transcribe::{create_transcriber, Transcriber};
use crate::services::tts::{create_tts_client, Narrator, TtsClient};
use crate::utils::audio::{encode_wav_mono, recording_seconds};

/// Upstream clients the pipeline talks to. Optional ones disable their stage.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub llm: Arc<dyn LlmClient>,
    pub images: Option<Arc<dyn ImageClient>>,
    pub speech: Option<Arc<dyn TtsClient>>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
}

impl Collaborators {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            llm: Arc::from(create_llm(&config.llm)?),
            images: create_image_client(&config.images).map(Arc::from),
            speech: create_tts_client(&config.speech).map(Arc::from),
            transcriber: create_transcriber(&config.transcription).map(Arc::from),
        })
    }
}

/// What to do after the story is written.
#[derive(Debug, Clone, Default)]
pub struct StoryOptions {
    pub illustrate: bool,
    /// Overrides the configured image variant.
    pub variant: Option<ModelVariant>,
    /// Voice ids or names to narrate with, in order.
    pub voices: Vec<String>,
    pub read_along: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Done,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub story: StageStatus,
    pub illustrations: StageStatus,
    /// One entry per requested voice, keyed by the name it was requested with.
    pub narration: Vec<(String, StageStatus)>,
    pub read_along: StageStatus,
}

/// Runs the generation stages against a session.
///
/// Stages are independent: a failure is reported as a notice and leaves
/// whatever earlier stages stored in the session alone.
pub struct StoryPipeline {
    writer: StoryWriter,
    illustrator: Option<Illustrator>,
    narrator: Option<Narrator>,
    transcriber: Option<Arc<dyn Transcriber>>,
    retry: RetryPolicy,
    notices: Arc<dyn NoticeSink>,
    voices: VoiceCatalog,
    default_voice: Voice,
    image_variant: ModelVariant,
    read_along_interval: Duration,
}

impl std::fmt::Debug for StoryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoryPipeline")
            .field("illustrations", &self.illustrator.is_some())
            .field("narration", &self.narrator.is_some())
            .field("transcription", &self.transcriber.is_some())
            .field("default_voice", &self.default_voice.name)
            .field("image_variant", &self.image_variant)
            .field("read_along_interval", &self.read_along_interval)
            .finish()
    }
}

impl StoryPipeline {
    /// Builds the real clients from config and reports through the log.
    pub fn from_config(config: &Config) -> Result<Self> {
        let collaborators = Collaborators::from_config(config)?;
        Self::with_collaborators(config, collaborators, Arc::new(LogNotices))
    }

    pub fn with_collaborators(
        config: &Config,
        collaborators: Collaborators,
        notices: Arc<dyn NoticeSink>,
    ) -> Result<Self> {
        let retry = RetryPolicy::new(&config.retry).with_notices(notices.clone());

        let voices = config.speech.catalog();
        let default_voice = voices
            .resolve(&config.speech.default_voice)
            .or_else(|| voices.voices().first())
            .cloned()
            .ok_or_else(|| anyhow!("Voice list is empty"))?;

        let writer = StoryWriter::new(collaborators.llm, retry.clone(), config.llm.params());
        let illustrator = collaborators
            .images
            .map(|client| Illustrator::new(client, retry.clone(), config.images.size.clone()));
        let narrator = collaborators
            .speech
            .map(|tts| Narrator::new(tts, retry.clone()));

        info!(
            "Story pipeline ready (illustrations: {}, narration: {}, voice input: {})",
            illustrator.is_some(),
            narrator.is_some(),
            collaborators.transcriber.is_some()
        );

        Ok(Self {
            writer,
            illustrator,
            narrator,
            transcriber: collaborators.transcriber,
            retry,
            notices,
            voices,
            default_voice,
            image_variant: config.images.variant,
            read_along_interval: config.read_along.interval(),
        })
    }

    pub fn voices(&self) -> &VoiceCatalog {
        &self.voices
    }

    pub fn default_voice(&self) -> &Voice {
        &self.default_voice
    }

    pub fn image_variant(&self) -> ModelVariant {
        self.image_variant
    }

    pub fn can_illustrate(&self) -> bool {
        self.illustrator.is_some()
    }

    pub fn can_narrate(&self) -> bool {
        self.narrator.is_some()
    }

    pub fn can_transcribe(&self) -> bool {
        self.transcriber.is_some()
    }

    /// Writes a new story into the session, replacing the previous one and
    /// everything derived from it. A generation failure is stored as a
    /// failed story rather than returned as an error.
    pub async fn write_story<'s>(
        &self,
        session: &'s mut StorySession,
        request: StoryRequest,
    ) -> Result<&'s Story> {
        if request.prompt.trim().is_empty() {
            bail!("Please enter a story idea first");
        }

        let story = self.writer.generate(request).await;
        if let StoryOutcome::Failed { reason } = &story.outcome {
            self.notify(Notice::StageFailed {
                stage: Stage::Story,
                reason: reason.clone(),
            });
        }
        Ok(session.set_story(story))
    }

    /// Draws both scenes of the session's story.
    ///
    /// `Ok(None)` when the stage is skipped (disabled, or no written story).
    pub async fn illustrate<'s>(
        &self,
        session: &'s mut StorySession,
        variant: ModelVariant,
    ) -> Result<Option<&'s IllustrationSet>> {
        let Some(illustrator) = &self.illustrator else {
            self.skip(Stage::Illustrations, "image generation is not configured");
            return Ok(None);
        };
        let Some(story) = session.story().filter(|s| s.is_written()) else {
            self.skip(Stage::Illustrations, "there is no story to illustrate");
            return Ok(None);
        };

        let result = illustrator
            .generate_illustrations(
                story,
                &story.request.prompt,
                story.request.child_name.as_deref(),
                variant,
            )
            .await;

        match result {
            Ok(set) => Ok(Some(session.set_illustrations(set))),
            Err(e) => Err(self.fail(Stage::Illustrations, e)),
        }
    }

    /// Narration for `voice_key` (id or name), reusing the session's cached
    /// audio when that voice was already synthesized.
    pub async fn narrate<'s>(
        &self,
        session: &'s mut StorySession,
        voice_key: &str,
    ) -> Result<Option<&'s VoiceAsset>> {
        self.narrate_with(session, voice_key, false).await
    }

    /// Synthesizes `voice_key` again, overwriting any cached take.
    pub async fn regenerate_narration<'s>(
        &self,
        session: &'s mut StorySession,
        voice_key: &str,
    ) -> Result<Option<&'s VoiceAsset>> {
        self.narrate_with(session, voice_key, true).await
    }

    async fn narrate_with<'s>(
        &self,
        session: &'s mut StorySession,
        voice_key: &str,
        force: bool,
    ) -> Result<Option<&'s VoiceAsset>> {
        let Some(narrator) = &self.narrator else {
            self.skip(Stage::Narration, "speech synthesis is not configured");
            return Ok(None);
        };
        let voice = self
            .voices
            .resolve(voice_key)
            .ok_or_else(|| anyhow!("Unknown voice: {}", voice_key))?;
        let Some(text) = session.story().and_then(|s| s.prose()).map(str::to_string) else {
            self.skip(Stage::Narration, "there is no story to narrate");
            return Ok(None);
        };

        let result = if force {
            narrator.regenerate(session.audio_mut(), &text, voice).await
        } else {
            narrator
                .get_or_synthesize(session.audio_mut(), &text, voice)
                .await
        };

        match result {
            Ok(asset) => Ok(Some(asset)),
            Err(e) => Err(self.fail(Stage::Narration, e)),
        }
    }

    /// Starts highlighting the session's story, replacing any running pass.
    pub fn start_read_along<'s>(
        &self,
        session: &'s mut StorySession,
    ) -> Option<&'s mut ReadAlongHandle> {
        let Some(text) = session.story().and_then(|s| s.prose()).map(str::to_string) else {
            self.skip(Stage::ReadAlong, "there is no story to read along with");
            return None;
        };
        let handle = ReadAlong::start(&text, self.read_along_interval);
        Some(session.set_read_along(handle))
    }

    /// Turns a spoken story idea into text for the prompt field.
    ///
    /// `Ok(None)` when voice input is not configured.
    pub async fn transcribe_prompt(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<Option<String>> {
        let Some(transcriber) = &self.transcriber else {
            self.skip(Stage::Transcription, "voice input is not configured");
            return Ok(None);
        };
        if samples.is_empty() {
            bail!("No audio was recorded");
        }

        info!(
            "Transcribing {:.1}s of audio",
            recording_seconds(samples.len(), sample_rate)
        );
        let wav = encode_wav_mono(samples, sample_rate)?;
        let wav = &wav;
        let result = self
            .retry
            .execute("Transcription", || async move {
                transcriber.transcribe(wav).await
            })
            .await;

        match result {
            Ok(text) => Ok(Some(text)),
            Err(e) => Err(self.fail(Stage::Transcription, e)),
        }
    }

    /// Writes the story, then runs each requested stage in order.
    ///
    /// Only an invalid request is an error; stage outcomes are in the report.
    pub async fn run(
        &self,
        session: &mut StorySession,
        request: StoryRequest,
        options: &StoryOptions,
    ) -> Result<PipelineReport> {
        let written = self.write_story(session, request).await?.is_written();
        let mut report = PipelineReport {
            story: if written {
                StageStatus::Done
            } else {
                StageStatus::Failed
            },
            illustrations: StageStatus::Skipped,
            narration: Vec::new(),
            read_along: StageStatus::Skipped,
        };
        if !written {
            return Ok(report);
        }

        if options.illustrate {
            let variant = options.variant.unwrap_or(self.image_variant);
            report.illustrations = status_of(self.illustrate(session, variant).await);
        }

        for voice in &options.voices {
            let status = status_of(self.narrate(session, voice).await);
            report.narration.push((voice.clone(), status));
        }

        if options.read_along {
            report.read_along = if self.start_read_along(session).is_some() {
                StageStatus::Done
            } else {
                StageStatus::Skipped
            };
        }

        Ok(report)
    }

    fn notify(&self, notice: Notice) {
        self.notices.notify(&notice);
    }

    fn skip(&self, stage: Stage, reason: &str) {
        self.notify(Notice::StageSkipped {
            stage,
            reason: reason.to_string(),
        });
    }

    fn fail(&self, stage: Stage, err: anyhow::Error) -> anyhow::Error {
        self.notify(Notice::StageFailed {
            stage,
            reason: format!("{:#}", err),
        });
        err
    }
}

fn status_of<T>(result: Result<Option<T>>) -> StageStatus {
    match result {
        Ok(Some(_)) => StageStatus::Done,
        Ok(None) => StageStatus::Skipped,
        Err(_) => StageStatus::Failed,
    }
}
