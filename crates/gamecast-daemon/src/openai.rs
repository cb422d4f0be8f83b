//! OpenAI-backed collaborators: chat completions for commentary and the
//! speech endpoint for audio.

use std::time::Duration;

use async_trait::async_trait;
use gamecast_core::prompt::COMMENTATOR_PERSONA;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::collab::{CollabError, CommentaryGenerator, SpeechSynthesizer};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4";
pub const DEFAULT_SPEECH_MODEL: &str = "tts-1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_TOKENS: u32 = 150;
const TEMPERATURE: f32 = 0.9;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub speech_model: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            speech_model: DEFAULT_SPEECH_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, CollabError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CollabError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Use a pre-configured HTTP client; `config.timeout` is not applied.
    pub fn with_client(client: Client, config: OpenAiConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, CollabError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| CollabError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollabError::Response(format!("{status}: {body}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl CommentaryGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String, CollabError> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: COMMENTATOR_PERSONA,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let reply: ChatResponse = self
            .post("chat/completions", &request)
            .await?
            .json()
            .await
            .map_err(|e| CollabError::Response(e.to_string()))?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(CollabError::Empty)
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiClient {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, CollabError> {
        let request = SpeechRequest {
            model: &self.config.speech_model,
            input: text,
            voice,
            response_format: "mp3",
        };

        let bytes = self
            .post("audio/speech", &request)
            .await?
            .bytes()
            .await
            .map_err(|e| CollabError::Response(e.to_string()))?;

        if bytes.is_empty() {
            return Err(CollabError::Empty);
        }
        Ok(bytes.to_vec())
    }
}
