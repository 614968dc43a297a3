//! `/v1/gallery` and `/gallery/images/:file` routes.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::{Json, http::StatusCode, http::header};
use imagegate_core::{Error, GalleryEntry};
use serde::{Deserialize, Serialize};

use crate::http::state::AppState;

#[derive(Serialize)]
pub struct GalleryListResponse {
    pub images: Vec<GalleryEntry>,
    pub count: usize,
}

pub async fn list(State(state): State<AppState>) -> Json<GalleryListResponse> {
    let images = state.gallery.list().await;
    let count = images.len();
    Json(GalleryListResponse { images, count })
}

#[derive(Deserialize)]
pub struct SaveGalleryRequest {
    pub image_data: String,
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    pub size: String,
    #[serde(default)]
    pub seed: Option<u32>,
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f64,
    #[serde(default = "default_inference_steps")]
    pub num_inference_steps: u32,
}

fn default_guidance_scale() -> f64 {
    5.0
}

fn default_inference_steps() -> u32 {
    20
}

#[derive(Serialize)]
pub struct SaveGalleryResponse {
    pub success: bool,
    pub image_id: u64,
    pub filename: String,
    pub url: String,
}

pub async fn save(
    State(state): State<AppState>,
    Json(body): Json<SaveGalleryRequest>,
) -> Response {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);

    match state
        .gallery
        .save(
            &body.image_data,
            body.prompt,
            body.negative_prompt,
            body.size,
            body.seed,
            body.guidance_scale,
            body.num_inference_steps,
            timestamp,
        )
        .await
    {
        Ok(entry) => {
            let filename = entry
                .url
                .rsplit('/')
                .next()
                .unwrap_or(&entry.url)
                .to_string();
            Json(SaveGalleryResponse {
                success: true,
                image_id: entry.id,
                filename,
                url: entry.url,
            })
            .into_response()
        }
        Err(err) => super::error_response(err),
    }
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    match state.gallery.delete(id).await {
        Ok(true) => Json(serde_json::json!({ "success": true })).into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => super::error_response(err),
    }
}

pub async fn get_image(State(state): State<AppState>, Path(file_name): Path<String>) -> Response {
    if file_name.contains("..") || file_name.contains('/') {
        return super::error_response(Error::validation("invalid image file name"));
    }
    let path = state.gallery.images_dir().join(&file_name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let content_type = if file_name.ends_with(".jpg") || file_name.ends_with(".jpeg") {
                "image/jpeg"
            } else {
                "image/png"
            };
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        // A missing file is a routine 404, not part of the `Error` taxonomy.
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}
