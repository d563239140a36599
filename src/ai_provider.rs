use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AIProvider {
    OpenAI,
    Ollama,
}

impl std::fmt::Display for AIProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AIProvider::OpenAI => write!(f, "openai"),
            AIProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for AIProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" | "gpt" => Ok(AIProvider::OpenAI),
            "ollama" => Ok(AIProvider::Ollama),
            _ => Err(anyhow!("Unknown AI provider: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIConfig {
    pub provider: AIProvider,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
}

/// Produces interpretation text for a structured prompt. Failures are
/// expected and recovered by the workflow's fallback path; implementations
/// only need to fail in bounded time.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str, max_tokens: u32)
        -> Result<String>;
}

pub struct AIProviderClient {
    config: AIConfig,
    http_client: reqwest::Client,
}

impl AIProviderClient {
    pub fn new(config: AIConfig) -> Self {
        let http_client = reqwest::Client::new();

        AIProviderClient {
            config,
            http_client,
        }
    }

    pub fn get_model(&self) -> &str {
        &self.config.model
    }

    async fn generate_openai(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<String> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("OpenAI API key required"))?;

        let request_body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt }
            ],
            "max_tokens": max_tokens,
            "temperature": self.config.temperature
        });

        let response = self
            .http_client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("OpenAI API error: {}", error_text));
        }

        let response_json: serde_json::Value = response.json().await?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("Invalid OpenAI response format"))?
            .to_string();

        Ok(content)
    }

    async fn generate_ollama(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let default_url = "http://localhost:11434".to_string();
        let base_url = self.config.base_url.as_ref().unwrap_or(&default_url);

        let request_body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt }
            ],
            "stream": false
        });

        let url = format!("{}/api/chat", base_url);
        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("Ollama API error: {}", error_text));
        }

        let response_json: serde_json::Value = response.json().await?;

        let content = response_json["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("Invalid Ollama response format"))?
            .to_string();

        Ok(content)
    }
}

#[async_trait]
impl TextGenerator for AIProviderClient {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<String> {
        match self.config.provider {
            AIProvider::OpenAI => {
                self.generate_openai(system_prompt, user_prompt, max_tokens)
                    .await
            }
            // Ollama ignores the token budget; the model config caps output.
            AIProvider::Ollama => self.generate_ollama(system_prompt, user_prompt).await,
        }
    }
}
