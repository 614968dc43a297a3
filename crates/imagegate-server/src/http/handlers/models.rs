//! `GET /v1/models`, an OpenAI-compatible listing of the one model this
//! gateway serves.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::http::state::AppState;

#[derive(Serialize)]
pub struct ModelEntry {
    id: String,
    object: &'static str,
    owned_by: &'static str,
}

#[derive(Serialize)]
pub struct ModelsResponse {
    object: &'static str,
    data: Vec<ModelEntry>,
}

pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let id = std::path::Path::new(&state.model_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| state.model_path.clone());

    Json(ModelsResponse {
        object: "list",
        data: vec![ModelEntry {
            id,
            object: "model",
            owned_by: "imagegate",
        }],
    })
}
