//! Generation service client.
//!
//! The [`Generator`] trait decouples the loop from the hosted model backend
//! (currently an OpenAI-compatible chat completions endpoint). Tests use
//! scripted generators that return predetermined replies without network.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::io::config::GeneratorConfig;

/// A rendered prompt ready to send to the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Abstraction over generation service backends.
pub trait Generator {
    /// Send a prompt and return the raw reply text.
    fn complete(&self, prompt: &Prompt) -> Result<String>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug)]
pub struct HttpGenerator {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: Option<f32>,
}

impl HttpGenerator {
    /// Build a client from config, reading the API key from the env var the
    /// config names.
    pub fn from_config(cfg: &GeneratorConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .map_err(|_| anyhow!("missing API key env var '{}'", cfg.api_key_env))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            api_key,
            temperature: cfg.temperature,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl Generator for HttpGenerator {
    #[instrument(skip_all, fields(model = %self.model))]
    fn complete(&self, prompt: &Prompt) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.temperature,
        };

        info!("calling generation service");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .context("send generation request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!(
                "generation service returned {status}: {}",
                body.trim()
            ));
        }

        let parsed: ChatResponse = response.json().context("parse generation response")?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("generation response had no content"))?;
        if content.trim().is_empty() {
            return Err(anyhow!("generation response was empty"));
        }

        debug!(bytes = content.len(), "generation service replied");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_requires_api_key_env() {
        let cfg = GeneratorConfig {
            api_key_env: "FORGE_TEST_KEY_THAT_DOES_NOT_EXIST".to_string(),
            ..GeneratorConfig::default()
        };
        let err = HttpGenerator::from_config(&cfg).expect_err("should fail");
        assert!(
            err.to_string()
                .contains("FORGE_TEST_KEY_THAT_DOES_NOT_EXIST")
        );
    }

    #[test]
    fn chat_request_serializes_system_then_user() {
        let request = ChatRequest {
            model: "gpt-4o",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "be terse",
                },
                ChatMessage {
                    role: "user",
                    content: "hello",
                },
            ],
            temperature: None,
        };

        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert!(json.get("temperature").is_none());
    }
}
