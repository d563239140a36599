use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ai_provider::{AIConfig, AIProvider};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Channel the subscription gate checks membership against.
    #[serde(default = "default_channel")]
    pub channel: String,
    pub default_provider: String,
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub default_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_channel() -> String {
    "@arcana_daily".to_string()
}

/// Diamond prices, reward amounts and cooldown windows. These are product
/// knobs; the defaults match the deployed bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_daily_card_cost")]
    pub daily_card_cost: u32,
    #[serde(default = "default_three_card_cost")]
    pub three_card_cost: u32,
    #[serde(default = "default_clarify_cost")]
    pub clarify_cost: u32,
    #[serde(default = "default_subscription_reward")]
    pub subscription_reward: u32,
    #[serde(default = "default_referral_reward")]
    pub referral_reward: u32,
    #[serde(default = "default_gift_cooldown_hours")]
    pub gift_cooldown_hours: i64,
}

fn default_daily_card_cost() -> u32 {
    5
}

fn default_three_card_cost() -> u32 {
    10
}

fn default_clarify_cost() -> u32 {
    3
}

fn default_subscription_reward() -> u32 {
    5
}

fn default_referral_reward() -> u32 {
    10
}

fn default_gift_cooldown_hours() -> i64 {
    24
}

impl Default for PricingConfig {
    fn default() -> Self {
        PricingConfig {
            daily_card_cost: default_daily_card_cost(),
            three_card_cost: default_three_card_cost(),
            clarify_cost: default_clarify_cost(),
            subscription_reward: default_subscription_reward(),
            referral_reward: default_referral_reward(),
            gift_cooldown_hours: default_gift_cooldown_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_daily_max_tokens")]
    pub daily_max_tokens: u32,
    #[serde(default = "default_three_card_max_tokens")]
    pub three_card_max_tokens: u32,
    #[serde(default = "default_clarify_max_tokens")]
    pub clarify_max_tokens: u32,
    /// Optional system prompt overrides, resolved per prompt mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub three_system_prompt: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_daily_max_tokens() -> u32 {
    400
}

fn default_three_card_max_tokens() -> u32 {
    700
}

fn default_clarify_max_tokens() -> u32 {
    300
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            timeout_secs: default_timeout_secs(),
            daily_max_tokens: default_daily_max_tokens(),
            three_card_max_tokens: default_three_card_max_tokens(),
            clarify_max_tokens: default_clarify_max_tokens(),
            base_system_prompt: None,
            day_system_prompt: None,
            three_system_prompt: None,
        }
    }
}

impl Config {
    pub fn new(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("arcana")
        });

        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        let config_path = data_dir.join("config.json");

        if config_path.exists() {
            let config_str =
                std::fs::read_to_string(&config_path).context("Failed to read config.json")?;

            match serde_json::from_str::<Config>(&config_str) {
                Ok(mut config) => {
                    config.data_dir = data_dir;
                    config.fill_api_keys_from_env();
                    return Ok(config);
                }
                Err(e) => {
                    tracing::warn!("Failed to parse existing config.json: {}, recreating", e);
                }
            }
        }

        let config = Self::default_config(data_dir);

        let json_str =
            serde_json::to_string_pretty(&config).context("Failed to serialize default config")?;
        std::fs::write(&config_path, json_str).context("Failed to write default config.json")?;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = self.data_dir.join("config.json");
        let json_str = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, json_str).context("Failed to write config.json")?;
        Ok(())
    }

    fn fill_api_keys_from_env(&mut self) {
        if let Some(openai_config) = self.providers.get_mut("openai") {
            if openai_config
                .api_key
                .as_ref()
                .map_or(true, |key| key.is_empty())
            {
                openai_config.api_key = std::env::var("OPENAI_API_KEY").ok();
            }
        }
    }

    fn default_config(data_dir: PathBuf) -> Self {
        let mut providers = HashMap::new();

        providers.insert(
            "ollama".to_string(),
            ProviderConfig {
                default_model: "qwen2.5".to_string(),
                host: Some("http://localhost:11434".to_string()),
                api_key: None,
            },
        );

        providers.insert(
            "openai".to_string(),
            ProviderConfig {
                default_model: "gpt-4o-mini".to_string(),
                host: None,
                api_key: std::env::var("OPENAI_API_KEY").ok(),
            },
        );

        Config {
            data_dir,
            channel: default_channel(),
            default_provider: "ollama".to_string(),
            providers,
            pricing: PricingConfig::default(),
            generation: GenerationConfig::default(),
        }
    }

    pub fn get_provider(&self, provider_name: &str) -> Option<&ProviderConfig> {
        self.providers.get(provider_name)
    }

    pub fn get_ai_config(
        &self,
        provider: Option<String>,
        model: Option<String>,
    ) -> Result<AIConfig> {
        let provider_name = provider.as_deref().unwrap_or(&self.default_provider);
        let provider_config = self
            .get_provider(provider_name)
            .ok_or_else(|| anyhow::anyhow!("Unknown provider: {}", provider_name))?;

        let ai_provider: AIProvider = provider_name.parse()?;
        let model_name = model.unwrap_or_else(|| provider_config.default_model.clone());

        Ok(AIConfig {
            provider: ai_provider,
            model: model_name,
            api_key: provider_config.api_key.clone(),
            base_url: provider_config.host.clone(),
            temperature: Some(0.7),
        })
    }

    pub fn users_file(&self) -> PathBuf {
        self.data_dir.join("users.json")
    }

    pub fn history_file(&self) -> PathBuf {
        self.data_dir.join("draws.json")
    }

    pub fn cards_dir(&self) -> PathBuf {
        self.data_dir.join("cards")
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.data_dir.join("prompts")
    }

    pub fn gift_cooldown(&self) -> chrono::Duration {
        chrono::Duration::hours(self.pricing.gift_cooldown_hours)
    }
}
