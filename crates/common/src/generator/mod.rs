//! Answer generation client
//!
//! Chat-completion client that turns a question plus an assembled context
//! bundle into answer text. The prompt contract asks for inline `[n]`
//! markers that refer to 1-based bundle positions; the citation tracker
//! downstream maps markers back to chunks and never trusts the model to
//! have cited correctly.

use crate::config::GeneratorConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One bundle entry handed to the generator, in bundle order
#[derive(Debug, Clone)]
pub struct GenerationContext {
    /// 1-based bundle position, the number cited as `[n]`
    pub position: usize,

    /// Section path label shown with the excerpt
    pub section_path: String,

    pub content: String,
}

/// Per-request generation options
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// System prompt, flavored by the detected query intent
    pub system_prompt: String,

    pub max_tokens: usize,

    pub temperature: f32,
}

/// Trait for answer generation
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Generate answer text grounded in the given contexts
    async fn generate(
        &self,
        question: &str,
        contexts: &[GenerationContext],
        options: &GenerationOptions,
    ) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Build the user prompt from question and bundle contexts
///
/// Shared by the real client and the mock so the contract stays in one
/// place.
pub fn build_user_prompt(question: &str, contexts: &[GenerationContext]) -> String {
    let mut prompt = format!(
        "Answer the question based ONLY on the provided excerpts. \
        Cite every claim with inline markers in the format [1], [2], etc., \
        where the number is the excerpt number. If the excerpts do not \
        contain enough information, say so explicitly.\n\n\
        Question: {}\n\nExcerpts:\n",
        question
    );

    for ctx in contexts {
        prompt.push_str(&format!(
            "\n[{}] (Section {})\n{}\n",
            ctx.position, ctx.section_path, ctx.content
        ));
    }

    prompt.push_str("\nAnswer:");
    prompt
}

/// OpenAI chat-completions generator
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAiGenerator {
    pub fn new(api_key: String, config: &GeneratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        question: &str,
        contexts: &[GenerationContext],
        options: &GenerationOptions,
    ) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: options.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_user_prompt(question, contexts),
                },
            ],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::GenerationError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GenerationError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse =
            response.json().await.map_err(|e| AppError::GenerationError {
                message: format!("Failed to parse response: {}", e),
            })?;

        chat_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| AppError::GenerationError {
                message: "Empty response".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Mock generator for local development and tests
///
/// Cites the first bundle entries so the citation path is exercised
/// without an API key.
pub struct MockGenerator;

#[async_trait]
impl AnswerGenerator for MockGenerator {
    async fn generate(
        &self,
        question: &str,
        contexts: &[GenerationContext],
        _options: &GenerationOptions,
    ) -> Result<String> {
        if contexts.is_empty() {
            return Ok(format!(
                "The provided documents do not contain information to answer: {}",
                question
            ));
        }

        let mut answer = format!(
            "Based on the retrieved provisions, the following addresses the question \"{}\". ",
            question
        );
        for ctx in contexts.iter().take(2) {
            let excerpt: String = ctx.content.chars().take(120).collect();
            answer.push_str(&format!("Section {} provides: {} [{}]. ", ctx.section_path, excerpt, ctx.position));
        }
        Ok(answer)
    }

    fn model_name(&self) -> &str {
        "mock-generator"
    }
}

/// Create a generator based on configuration
///
/// Falls back to the mock generator when no API key is configured.
pub fn create_generator(config: &GeneratorConfig) -> Result<std::sync::Arc<dyn AnswerGenerator>> {
    match &config.api_key {
        Some(key) if !key.is_empty() => Ok(std::sync::Arc::new(OpenAiGenerator::new(
            key.clone(),
            config,
        )?)),
        _ => {
            tracing::warn!("No generation API key configured, using mock generator");
            Ok(std::sync::Arc::new(MockGenerator))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contexts() -> Vec<GenerationContext> {
        vec![
            GenerationContext {
                position: 1,
                section_path: "5/5.2".to_string(),
                content: "Either party may terminate upon thirty (30) days written notice.".to_string(),
            },
            GenerationContext {
                position: 2,
                section_path: "8".to_string(),
                content: "Notices shall be delivered to the addresses in Exhibit A.".to_string(),
            },
        ]
    }

    #[test]
    fn test_user_prompt_numbers_excerpts_in_bundle_order() {
        let prompt = build_user_prompt("What is the notice period?", &contexts());
        let first = prompt.find("[1] (Section 5/5.2)").unwrap();
        let second = prompt.find("[2] (Section 8)").unwrap();
        assert!(first < second);
        assert!(prompt.contains("Question: What is the notice period?"));
    }

    #[tokio::test]
    async fn test_mock_generator_cites_bundle_positions() {
        let options = GenerationOptions {
            system_prompt: "test".to_string(),
            max_tokens: 256,
            temperature: 0.1,
        };
        let answer = MockGenerator
            .generate("What is the notice period?", &contexts(), &options)
            .await
            .unwrap();
        assert!(answer.contains("[1]"));
    }
}
