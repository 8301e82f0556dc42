use log::{info, warn};
use std::sync::Arc;

use crate::core::error::UpstreamError;
use crate::core::story::{Story, StoryRequest};
use crate::services::llm::{GenerationParams, LlmClient};
use crate::services::retry::RetryPolicy;

/// Builds the bedtime-story prompt for a request.
pub fn build_story_prompt(request: &StoryRequest) -> String {
    let mut prompt = String::from(
        "Create a gentle, imaginative bedtime story for a 6-year-old child. The story should be:\n\
         - 3-4 minutes long when read aloud (approximately 400-600 words)\n\
         - Age-appropriate with a comforting, peaceful ending\n\
         - Creative and engaging but not overstimulating before bedtime\n\
         - Include a gentle moral or lesson\n\n",
    );
    prompt.push_str(&format!("Story idea: {}\n", request.prompt.trim()));
    if let Some(name) = &request.child_name {
        prompt.push_str(&format!("Main character name: {}\n", name));
    }
    if let Some(theme) = &request.theme {
        prompt.push_str(&format!("Theme/Setting: {}\n", theme));
    }
    prompt.push_str(
        "\nPlease write a complete story with a clear beginning, middle, and end. \
         Make it warm and soothing for bedtime.",
    );
    prompt
}

/// Turns a request into a story. Never fails: an upstream failure becomes
/// a `Story` whose outcome is `Failed`.
#[derive(Debug, Clone)]
pub struct StoryWriter {
    llm: Arc<dyn LlmClient>,
    retry: RetryPolicy,
    params: GenerationParams,
}

impl StoryWriter {
    pub fn new(llm: Arc<dyn LlmClient>, retry: RetryPolicy, params: GenerationParams) -> Self {
        Self { llm, retry, params }
    }

    pub async fn generate(&self, request: StoryRequest) -> Story {
        let prompt = build_story_prompt(&request);
        info!("Generating story for prompt: {}", request.prompt.trim());

        let llm = &self.llm;
        let params = &self.params;
        let prompt = &prompt;
        let result = self
            .retry
            .execute("Story generation", || async move {
                let text = llm.chat("", prompt, params).await?;
                if text.trim().is_empty() {
                    return Err(anyhow::Error::from(UpstreamError::EmptyResponse {
                        service: "Text generation",
                    }));
                }
                Ok(text)
            })
            .await;

        match result {
            Ok(text) => {
                info!("Story generated ({} words)", text.split_whitespace().count());
                Story::written(request, text)
            }
            Err(e) => {
                warn!("Story generation failed: {:#}", e);
                Story::failed(request, format!("{:#}", e))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::story::{StoryOutcome, Theme};
    use crate::services::retry::RetryConfig;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted replies in order, then repeats the last one.
    #[derive(Debug)]
    pub struct MockLlmClient {
        pub replies: Mutex<VecDeque<std::result::Result<String, u16>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl MockLlmClient {
        /// `Err(status)` entries fail with that HTTP status.
        pub fn replying(replies: Vec<std::result::Result<&str, u16>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().map(|r| r.map(str::to_string)).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn chat(
            &self,
            _system: &str,
            user: &str,
            _params: &GenerationParams,
        ) -> Result<String> {
            self.prompts.lock().unwrap().push(user.to_string());
            let mut replies = self.replies.lock().unwrap();
            let reply = if replies.len() > 1 {
                replies.pop_front()
            } else {
                replies.front().cloned()
            };
            match reply {
                Some(Ok(text)) => Ok(text),
                Some(Err(status)) => Err(UpstreamError::Http {
                    service: "Mock",
                    status,
                    body: "scripted failure".to_string(),
                }
                .into()),
                None => Err(anyhow::anyhow!("no scripted reply")),
            }
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(&RetryConfig {
            max_retries: 2,
            base_delay_ms: 10,
            max_delay_ms: 100,
            backoff_factor: 2.0,
        })
    }

    #[test]
    fn test_prompt_includes_optional_fields() {
        let request = StoryRequest::new("A sleepy dragon who forgot how to breathe fire")
            .with_child_name("Emma")
            .with_theme(Theme::Castle);
        let prompt = build_story_prompt(&request);
        assert!(prompt.contains("Story idea: A sleepy dragon who forgot how to breathe fire"));
        assert!(prompt.contains("Main character name: Emma"));
        assert!(prompt.contains("Theme/Setting: Castle"));
        assert!(prompt.contains("400-600 words"));
    }

    #[test]
    fn test_prompt_omits_missing_fields() {
        let prompt = build_story_prompt(&StoryRequest::new("A star that fell"));
        assert!(!prompt.contains("Main character name"));
        assert!(!prompt.contains("Theme/Setting"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_is_returned_verbatim() {
        let llm = Arc::new(MockLlmClient::replying(vec![Ok("  Once upon a time.\n")]));
        let writer = StoryWriter::new(llm.clone(), fast_retry(), GenerationParams::default());

        let story = writer.generate(StoryRequest::new("a dragon")).await;
        assert_eq!(
            story.outcome,
            StoryOutcome::Written("  Once upon a time.\n".to_string())
        );
        assert_eq!(llm.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let llm = Arc::new(MockLlmClient::replying(vec![Err(529), Ok("The end.")]));
        let writer = StoryWriter::new(llm.clone(), fast_retry(), GenerationParams::default());

        let story = writer.generate(StoryRequest::new("a dragon")).await;
        assert_eq!(story.prose(), Some("The end."));
        assert_eq!(llm.prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_becomes_failed_story() {
        let llm = Arc::new(MockLlmClient::replying(vec![Err(401)]));
        let writer = StoryWriter::new(llm.clone(), fast_retry(), GenerationParams::default());

        let story = writer.generate(StoryRequest::new("a dragon")).await;
        assert!(!story.is_written());
        assert!(story.text().starts_with("Error generating story:"));
        assert!(story.text().contains("401"));
        assert_eq!(llm.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_completion_is_failure() {
        let llm = Arc::new(MockLlmClient::replying(vec![Ok("   ")]));
        let writer = StoryWriter::new(llm, fast_retry(), GenerationParams::default());

        let story = writer.generate(StoryRequest::new("a dragon")).await;
        assert!(matches!(story.outcome, StoryOutcome::Failed { .. }));
    }
}
