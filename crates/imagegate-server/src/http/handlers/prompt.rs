//! `POST /v1/prompt/optimize` and `POST /v1/prompt/translate`.
//!
//! Both routes proxy through [`crate::llm::LlmClient`], which never errors
//! the caller — a missing `PROMPT_LLM_BASE_URL` or an upstream failure
//! returns the original prompt with `success=false` instead.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::http::state::AppState;

#[derive(Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
}

#[derive(Serialize)]
pub struct OptimizeResponse {
    pub original: String,
    pub optimized: String,
    pub success: bool,
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct TranslateResponse {
    pub original: String,
    pub translated: String,
    pub success: bool,
    pub message: Option<String>,
}

pub async fn optimize(
    State(state): State<AppState>,
    Json(body): Json<PromptRequest>,
) -> Json<OptimizeResponse> {
    let result = state.llm.optimize_prompt(&body.prompt).await;
    Json(OptimizeResponse {
        original: body.prompt,
        optimized: result.text,
        success: result.success,
        message: result.message,
    })
}

pub async fn translate(
    State(state): State<AppState>,
    Json(body): Json<PromptRequest>,
) -> Json<TranslateResponse> {
    let result = state.llm.translate_prompt(&body.prompt).await;
    Json(TranslateResponse {
        original: body.prompt,
        translated: result.text,
        success: result.success,
        message: result.message,
    })
}
