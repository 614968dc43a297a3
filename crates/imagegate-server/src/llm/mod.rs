//! Pass-through prompt optimize/translate client.
//!
//! Grounded on the thin `reqwest::Client` + base `Url` wrapper pattern from
//! `other_examples/capslock-stable-diffusion-bot`'s `stable-diffusion-api`
//! crate: one struct holding a client and a base URL, one method per
//! upstream endpoint, errors folded into a single domain error rather than
//! leaking `reqwest::Error` to callers.
//!
//! Per spec.md §4, these endpoints never fail the caller's request: any
//! upstream error or missing configuration degrades to returning the input
//! prompt unchanged.

use serde::{Deserialize, Serialize};

/// Outcome of a pass-through prompt rewrite/translation call. Never an
/// `Err` at the HTTP boundary — `success=false` carries the failure instead,
/// per spec.md §7's "external LLM failure" contract.
pub struct LlmResult {
    pub text: String,
    pub success: bool,
    pub message: Option<String>,
}

impl LlmResult {
    fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: true,
            message: None,
        }
    }

    fn failure(original: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            text: original.into(),
            success: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl LlmClient {
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    /// Rewrites `prompt` into a more detailed, model-friendly description.
    /// Never fails hard: on any error (including no LLM configured) this
    /// returns the original prompt with `success=false` and a message
    /// explaining why, per spec.md §7's "external LLM failure" contract.
    pub async fn optimize_prompt(&self, prompt: &str) -> LlmResult {
        self.chat_completion(
            "Rewrite the user's image prompt with more visual detail. \
             Respond with only the rewritten prompt, no preamble.",
            prompt,
        )
        .await
    }

    /// Translates `prompt` into English if it is not already. Same
    /// never-fails contract as [`Self::optimize_prompt`].
    pub async fn translate_prompt(&self, prompt: &str) -> LlmResult {
        self.chat_completion(
            "Translate the user's text into English. If it is already \
             English, return it unchanged. Respond with only the \
             translation, no preamble.",
            prompt,
        )
        .await
    }

    async fn chat_completion(&self, system_prompt: &str, user_content: &str) -> LlmResult {
        let Some(base_url) = self.base_url.as_ref() else {
            return LlmResult::failure(user_content, "no prompt LLM configured");
        };
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

        let body = ChatCompletionRequest {
            model: "gpt-4o-mini",
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_content.to_string(),
                },
            ],
            temperature: 0.7,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(err) => {
                let reason = imagegate_core::Error::external_llm(err.to_string());
                tracing::warn!(%reason, "LLM pass-through request failed");
                return LlmResult::failure(user_content, reason.to_string());
            }
        };

        if !response.status().is_success() {
            let reason =
                imagegate_core::Error::external_llm(format!("upstream status {}", response.status()));
            tracing::warn!(%reason, "LLM pass-through returned an error status");
            return LlmResult::failure(user_content, reason.to_string());
        }

        match response.json::<ChatCompletionResponse>().await {
            Ok(parsed) => match parsed.choices.into_iter().next() {
                Some(choice) => LlmResult::success(choice.message.content.trim().to_string()),
                None => LlmResult::failure(user_content, "LLM response contained no choices"),
            },
            Err(err) => {
                let reason = imagegate_core::Error::external_llm(err.to_string());
                tracing::warn!(%reason, "failed to parse LLM pass-through response");
                LlmResult::failure(user_content, reason.to_string())
            }
        }
    }
}
