//! Answer-model backends.
//!
//! - **[`ExtractiveModel`]**: offline; answers with the context sentences
//!   that best overlap the question. No generation, no network.
//! - **[`OllamaModel`]**: `POST /api/generate` on a local Ollama instance.
//! - **[`OpenAIChatModel`]**: `POST /v1/chat/completions`.
//!
//! As with embeddings, providers make one request per call and the
//! `*_with_retry` helpers apply the configured timeout and retries.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::warn;

use lexvault_core::answer::AnswerModel;

use crate::config::LlmConfig;

/// Build the [`AnswerModel`] named by `config.provider`.
pub fn create_answer_model(config: &LlmConfig) -> Result<Arc<dyn AnswerModel>> {
    match config.provider.as_str() {
        "extractive" => Ok(Arc::new(ExtractiveModel)),
        "ollama" => Ok(Arc::new(OllamaModel::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIChatModel::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

pub async fn answer_with_retry(
    model: &dyn AnswerModel,
    config: &LlmConfig,
    context: &str,
    question: &str,
) -> Result<String> {
    retry(model.model_name(), config, || model.answer(context, question)).await
}

pub async fn analyze_with_retry(model: &dyn AnswerModel, config: &LlmConfig, text: &str) -> Result<String> {
    retry(model.model_name(), config, || model.analyze(text)).await
}

async fn retry<F, Fut>(model_name: &str, config: &LlmConfig, mut call: F) -> Result<String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let timeout = Duration::from_secs(config.timeout_secs);
    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        match tokio::time::timeout(timeout, call()).await {
            Ok(Ok(text)) => return Ok(text),
            Ok(Err(e)) => {
                warn!(model = model_name, attempt, error = %e, "Answer model call failed");
                last_err = Some(e);
            }
            Err(_) => {
                warn!(model = model_name, attempt, "Answer model call timed out");
                last_err = Some(anyhow::anyhow!(
                    "answer model timed out after {}s",
                    config.timeout_secs
                ));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Answer synthesis failed after retries")))
}

// ============ Extractive Model ============

const RISK_MARKERS: &[&str] = &[
    "terminat", "liabil", "indemn", "penalt", "exclusiv", "waive", "renew", "breach",
];

/// Offline stand-in for an LLM.
pub struct ExtractiveModel;

#[async_trait]
impl AnswerModel for ExtractiveModel {
    fn model_name(&self) -> &str {
        "extractive"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let picked: Vec<String> = sentences(prompt).into_iter().take(2).collect();
        Ok(picked.join(" "))
    }

    async fn answer(&self, context: &str, question: &str) -> Result<String> {
        let wanted = terms(question);
        let mut scored: Vec<(usize, usize, String)> = sentences(context)
            .into_iter()
            .enumerate()
            .map(|(pos, s)| {
                let overlap = terms(&s).intersection(&wanted).count();
                (overlap, pos, s)
            })
            .filter(|(overlap, _, _)| *overlap > 0)
            .collect();

        if scored.is_empty() {
            return Ok("I don't know based on the provided documents.".to_string());
        }

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.truncate(2);
        scored.sort_by_key(|(_, pos, _)| *pos);
        Ok(scored
            .into_iter()
            .map(|(_, _, s)| s)
            .collect::<Vec<_>>()
            .join(" "))
    }

    async fn analyze(&self, text: &str) -> Result<String> {
        let flagged: Vec<String> = sentences(text)
            .into_iter()
            .filter(|s| {
                let lower = s.to_lowercase();
                RISK_MARKERS.iter().any(|m| lower.contains(m))
            })
            .collect();

        if flagged.is_empty() {
            return Ok("No obvious risk indicators found in this clause.".to_string());
        }

        let mut out = String::from("Potential risks identified:");
        for s in flagged {
            out.push_str("\n- ");
            out.push_str(&s);
        }
        Ok(out)
    }
}

fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("[source:") || line == "---" {
            continue;
        }
        let mut current = String::new();
        for c in line.chars() {
            current.push(c);
            if matches!(c, '.' | '!' | '?') {
                push_sentence(&mut out, &mut current);
            }
        }
        push_sentence(&mut out, &mut current);
    }
    out
}

fn push_sentence(out: &mut Vec<String>, current: &mut String) {
    let s = current.trim();
    if s.chars().any(|c| c.is_alphanumeric()) {
        out.push(s.to_string());
    }
    current.clear();
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(|w| w.to_lowercase())
        .collect()
}

// ============ Ollama Model ============

pub struct OllamaModel {
    model: String,
    url: String,
    client: reqwest::Client,
}

impl OllamaModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config.model.clone().unwrap_or_else(|| "llama3".to_string());
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { model, url, client })
    }
}

#[async_trait]
impl AnswerModel for OllamaModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url,
                    e
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(|r| r.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response"))
    }
}

// ============ OpenAI Chat Model ============

pub struct OpenAIChatModel {
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl AnswerModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0,
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(|c| c.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
    }
}
