//! HTTP/SSE surface.
//!
//! Replaces the teacher's gRPC transport (`tonic` + `tower` + `GrpcWebLayer`
//! in `ferroid-tonic-server::main`) with `axum` + `tower` + `tower-http`,
//! keeping the same `ServiceBuilder` layering idiom for CORS and request
//! tracing.

pub mod handlers;
pub mod sse;
pub mod state;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{delete, get, post};
use imagegate_core::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { Redirect::temporary("/static/index.html") }))
        .route("/gallery", get(|| async { Redirect::temporary("/static/gallery.html") }))
        .route("/health", get(handlers::health::health))
        .route("/status", get(handlers::health::status))
        .route("/v1/models", get(handlers::models::list_models))
        .route("/v1/images/generations", post(handlers::generate::generate))
        .route("/v1/prompt/optimize", post(handlers::prompt::optimize))
        .route("/v1/prompt/translate", post(handlers::prompt::translate))
        .route("/v1/gallery", get(handlers::gallery::list))
        .route("/v1/gallery/save", post(handlers::gallery::save))
        .route("/v1/gallery/delete/{id}", delete(handlers::gallery::delete))
        .route("/gallery/images/{file_name}", get(handlers::gallery::get_image))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Maps the domain [`Error`] taxonomy onto HTTP status codes, per spec.md
/// §7.
pub(crate) fn error_response(err: Error) -> Response {
    let status = match &err {
        Error::Validation { .. } | Error::Admission => StatusCode::BAD_REQUEST,
        Error::ServiceShutdown => StatusCode::SERVICE_UNAVAILABLE,
        Error::ModelInvocation { .. }
        | Error::GalleryIo { .. }
        | Error::ChannelClosed { .. }
        | Error::ExternalLlm { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = axum::Json(serde_json::json!({ "detail": err.to_string() }));
    (status, body).into_response()
}
