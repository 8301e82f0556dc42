use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

use crate::core::config::resolve_api_key;
use crate::core::error::{http_error, UpstreamError};
use crate::core::story::{IllustrationSet, Story};
use crate::services::retry::RetryPolicy;
use crate::utils::text::{split_halves, split_sentences, truncate_chars};

pub const ILLUSTRATION_STYLE: &str = "Children's book illustration in a soft, warm watercolor style. \
Do not include any text, letters, words or writing anywhere in the image.";

pub const MAX_EXCERPT_CHARS: usize = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    #[default]
    Standard,
    HighDefinition,
}

/// How strictly the image model is asked to keep lettering out of the picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextTolerance {
    Strict,
    Relaxed,
}

impl ModelVariant {
    pub fn quality(&self) -> &'static str {
        match self {
            ModelVariant::Standard => "standard",
            ModelVariant::HighDefinition => "hd",
        }
    }

    pub fn text_tolerance(&self) -> TextTolerance {
        match self {
            ModelVariant::Standard => TextTolerance::Strict,
            ModelVariant::HighDefinition => TextTolerance::Relaxed,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImageConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub variant: ModelVariant,
    #[serde(default = "default_image_model")]
    pub model: String,
    #[serde(default = "default_image_size")]
    pub size: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            variant: ModelVariant::default(),
            model: default_image_model(),
            size: default_image_size(),
            api_key: None,
            base_url: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}
fn default_image_model() -> String {
    "dall-e-3".to_string()
}
fn default_image_size() -> String {
    "1024x1024".to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub prompt: String,
    pub size: String,
    pub quality: &'static str,
    pub text_tolerance: TextTolerance,
}

#[async_trait]
pub trait ImageClient: Send + Sync + Debug {
    /// Returns a reference (URL) to the generated image.
    async fn generate(&self, request: &ImageRequest) -> Result<String>;
}

/// `None` when images are disabled or no OpenAI key is available.
pub fn create_image_client(config: &ImageConfig) -> Option<Box<dyn ImageClient>> {
    if !config.enabled {
        return None;
    }
    let Some(api_key) = resolve_api_key(config.api_key.as_deref(), "OPENAI_API_KEY") else {
        info!("No OpenAI API key found; illustrations are disabled");
        return None;
    };
    Some(Box::new(OpenAIImageClient::new(
        &api_key,
        &config.model,
        config.base_url.as_deref(),
    )))
}

// --- OpenAI Images ---

#[derive(Debug)]
struct OpenAIImageClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIImageClient {
    fn new(api_key: &str, model: &str, base_url: Option<&str>) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OpenAIImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    quality: &'a str,
    style: &'a str,
}

#[derive(Deserialize)]
struct OpenAIImageResponse {
    #[serde(default)]
    data: Vec<OpenAIImageData>,
}

#[derive(Deserialize)]
struct OpenAIImageData {
    url: Option<String>,
}

fn style_for(tolerance: TextTolerance) -> &'static str {
    // "natural" keeps the model closer to the prompt, including the no-text rule
    match tolerance {
        TextTolerance::Strict => "natural",
        TextTolerance::Relaxed => "vivid",
    }
}

#[async_trait]
impl ImageClient for OpenAIImageClient {
    async fn generate(&self, request: &ImageRequest) -> Result<String> {
        let url = format!("{}/images/generations", self.base_url);

        let body = OpenAIImageRequest {
            model: &self.model,
            prompt: &request.prompt,
            n: 1,
            size: &request.size,
            quality: request.quality,
            style: style_for(request.text_tolerance),
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(http_error("OpenAI Images", resp).await);
        }

        let result: OpenAIImageResponse = resp.json().await?;
        result
            .data
            .into_iter()
            .find_map(|d| d.url)
            .ok_or_else(|| {
                UpstreamError::EmptyResponse {
                    service: "OpenAI Images",
                }
                .into()
            })
    }
}

/// Builds the prompt for one scene.
pub fn build_illustration_prompt(
    excerpt: &str,
    original_prompt: &str,
    child_name: Option<&str>,
) -> String {
    let mut prompt = format!(
        "{} Scene: {} Story idea: {}",
        ILLUSTRATION_STYLE,
        truncate_chars(excerpt.trim(), MAX_EXCERPT_CHARS),
        original_prompt.trim()
    );
    if let Some(name) = child_name.filter(|n| !n.trim().is_empty()) {
        prompt.push_str(&format!(" The main character is named {}.", name.trim()));
    }
    prompt
}

/// Beginning and ending excerpts of a story, split at the midpoint sentence.
pub fn scene_excerpts(text: &str) -> (String, String) {
    let sentences = split_sentences(text);
    let (first, second) = split_halves(&sentences);
    let whole = text.trim().to_string();
    let join = |part: &[String]| {
        if part.is_empty() {
            whole.clone()
        } else {
            part.join(" ")
        }
    };
    (join(first), join(second))
}

/// Draws the beginning and ending scenes of a story.
#[derive(Debug, Clone)]
pub struct Illustrator {
    client: Arc<dyn ImageClient>,
    retry: RetryPolicy,
    size: String,
}

impl Illustrator {
    pub fn new(client: Arc<dyn ImageClient>, retry: RetryPolicy, size: impl Into<String>) -> Self {
        Self {
            client,
            retry,
            size: size.into(),
        }
    }

    /// Both images must succeed; a half-finished set is never returned.
    pub async fn generate_illustrations(
        &self,
        story: &Story,
        original_prompt: &str,
        child_name: Option<&str>,
        variant: ModelVariant,
    ) -> Result<IllustrationSet> {
        let text = story
            .prose()
            .ok_or_else(|| anyhow!("Story generation failed, nothing to illustrate"))?;

        let (beginning, ending) = scene_excerpts(text);

        let first_image = self
            .draw(
                "Illustration 1 of 2",
                build_illustration_prompt(&beginning, original_prompt, child_name),
                variant,
            )
            .await?;
        let second_image = self
            .draw(
                "Illustration 2 of 2",
                build_illustration_prompt(&ending, original_prompt, child_name),
                variant,
            )
            .await?;

        info!("Both illustrations generated");
        Ok(IllustrationSet {
            first_image,
            second_image,
        })
    }

    async fn draw(&self, label: &str, prompt: String, variant: ModelVariant) -> Result<String> {
        let request = ImageRequest {
            prompt,
            size: self.size.clone(),
            quality: variant.quality(),
            text_tolerance: variant.text_tolerance(),
        };
        debug!("{} prompt: {}", label, request.prompt);

        let client = &self.client;
        let request = &request;
        self.retry
            .execute(label, || async move { client.generate(request).await })
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::story::StoryRequest;
    use crate::services::retry::RetryConfig;
    use std::sync::Mutex;

    /// Returns `https://img/<n>` for call n; calls listed in `fail_on` fail with `status`.
    #[derive(Debug, Default)]
    pub struct MockImageClient {
        pub requests: Mutex<Vec<ImageRequest>>,
        pub fail_on: Vec<usize>,
        pub status: u16,
    }

    #[async_trait]
    impl ImageClient for MockImageClient {
        async fn generate(&self, request: &ImageRequest) -> Result<String> {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            let n = requests.len();
            if self.fail_on.contains(&n) {
                return Err(UpstreamError::Http {
                    service: "Mock Images",
                    status: self.status,
                    body: "content policy".to_string(),
                }
                .into());
            }
            Ok(format!("https://img/{}", n))
        }
    }

    fn numbered_story(n: usize) -> Story {
        let text = (1..=n)
            .map(|i| format!("Sentence number {}.", i))
            .collect::<Vec<_>>()
            .join(" ");
        Story::written(StoryRequest::new("a dragon"), text)
    }

    fn illustrator(client: Arc<MockImageClient>) -> Illustrator {
        let retry = RetryPolicy::new(&RetryConfig {
            max_retries: 1,
            base_delay_ms: 10,
            max_delay_ms: 50,
            backoff_factor: 2.0,
        });
        Illustrator::new(client, retry, "1024x1024")
    }

    fn scene(prompt: &str) -> &str {
        let start = prompt.find("Scene: ").unwrap() + "Scene: ".len();
        let end = prompt.find(" Story idea:").unwrap();
        &prompt[start..end]
    }

    #[test]
    fn test_scene_excerpts_split_at_midpoint() {
        let story = numbered_story(11);
        let (first, second) = scene_excerpts(story.prose().unwrap());
        assert!(first.starts_with("Sentence number 1."));
        assert!(first.ends_with("Sentence number 5."));
        assert!(second.starts_with("Sentence number 6."));
        assert!(second.ends_with("Sentence number 11."));
    }

    #[test]
    fn test_single_sentence_uses_whole_story_for_both() {
        let (first, second) = scene_excerpts("The moon smiled.");
        assert_eq!(first, "The moon smiled.");
        assert_eq!(second, "The moon smiled.");
    }

    #[test]
    fn test_prompt_truncates_excerpt() {
        let long = "word ".repeat(100);
        let prompt = build_illustration_prompt(&long, "a sleepy dragon", Some("Emma"));
        assert!(prompt.starts_with(ILLUSTRATION_STYLE));
        assert!(scene(&prompt).chars().count() <= MAX_EXCERPT_CHARS);
        assert!(prompt.contains("Story idea: a sleepy dragon"));
        assert!(prompt.ends_with("The main character is named Emma."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_scenes_from_each_half() {
        let client = Arc::new(MockImageClient::default());
        let set = illustrator(client.clone())
            .generate_illustrations(&numbered_story(10), "a dragon", None, ModelVariant::Standard)
            .await
            .unwrap();

        assert_eq!(set.first_image, "https://img/1");
        assert_eq!(set.second_image, "https://img/2");
        assert_ne!(set.first_image, set.second_image);

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(scene(&requests[0].prompt).starts_with("Sentence number 1."));
        assert!(scene(&requests[1].prompt).starts_with("Sentence number 6."));
        assert_eq!(requests[0].quality, "standard");
        assert_eq!(requests[0].text_tolerance, TextTolerance::Strict);
        assert_eq!(requests[0].size, "1024x1024");
    }

    #[tokio::test(start_paused = true)]
    async fn test_variant_changes_only_quality_and_tolerance() {
        let standard = Arc::new(MockImageClient::default());
        let hd = Arc::new(MockImageClient::default());
        let story = numbered_story(4);

        illustrator(standard.clone())
            .generate_illustrations(&story, "a dragon", None, ModelVariant::Standard)
            .await
            .unwrap();
        illustrator(hd.clone())
            .generate_illustrations(&story, "a dragon", None, ModelVariant::HighDefinition)
            .await
            .unwrap();

        let a = standard.requests.lock().unwrap();
        let b = hd.requests.lock().unwrap();
        assert_eq!(a[0].prompt, b[0].prompt);
        assert_eq!(a[1].prompt, b[1].prompt);
        assert_eq!(b[0].quality, "hd");
        assert_eq!(b[0].text_tolerance, TextTolerance::Relaxed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_failure_fails_whole_set() {
        let client = Arc::new(MockImageClient {
            fail_on: vec![2],
            status: 400,
            ..Default::default()
        });
        let result = illustrator(client.clone())
            .generate_illustrations(&numbered_story(6), "a dragon", None, ModelVariant::Standard)
            .await;

        assert!(result.is_err());
        assert_eq!(client.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_image_failure_is_retried_per_call() {
        let client = Arc::new(MockImageClient {
            fail_on: vec![1],
            status: 503,
            ..Default::default()
        });
        let set = illustrator(client.clone())
            .generate_illustrations(&numbered_story(6), "a dragon", None, ModelVariant::Standard)
            .await
            .unwrap();

        assert_eq!(set.first_image, "https://img/2");
        assert_eq!(set.second_image, "https://img/3");
    }

    #[tokio::test]
    async fn test_failed_story_is_not_illustrated() {
        let client = Arc::new(MockImageClient::default());
        let story = Story::failed(StoryRequest::new("a dragon"), "HTTP 401");
        let result = illustrator(client.clone())
            .generate_illustrations(&story, "a dragon", None, ModelVariant::Standard)
            .await;

        assert!(result.is_err());
        assert!(client.requests.lock().unwrap().is_empty());
    }
}
