//! `POST /v1/images/generations`.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{self, StreamExt};
use imagegate_core::{
    parse_size, Error, GenerationRequest, ImageData, ImageGenerationRequest, ImageGenerationResponse,
    ResultEvent, GUIDANCE_RANGE, N_RANGE, STEPS_RANGE,
};

use crate::http::sse::{done_event, to_sse_events};
use crate::http::state::AppState;

fn new_request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_owned()
}

fn validate(req: &ImageGenerationRequest, width: u32, height: u32, max_total_pixels: u64) -> Result<(), Error> {
    if req.prompt.trim().is_empty() {
        return Err(Error::validation("prompt must not be empty"));
    }
    if !N_RANGE.contains(&req.n) {
        return Err(Error::validation(format!(
            "n must be between {} and {}",
            N_RANGE.start(),
            N_RANGE.end()
        )));
    }
    if !GUIDANCE_RANGE.contains(&req.guidance_scale) {
        return Err(Error::validation(format!(
            "guidance_scale must be between {} and {}",
            GUIDANCE_RANGE.start(),
            GUIDANCE_RANGE.end()
        )));
    }
    if !STEPS_RANGE.contains(&req.num_inference_steps) {
        return Err(Error::validation(format!(
            "num_inference_steps must be between {} and {}",
            STEPS_RANGE.start(),
            STEPS_RANGE.end()
        )));
    }
    if req.response_format != "b64_json" && req.response_format != "url" {
        return Err(Error::validation(
            "response_format must be \"b64_json\" or \"url\"",
        ));
    }
    if req.response_format == "url" {
        tracing::warn!("response_format=url requested; this gateway has no object storage and always returns b64_json");
    }
    let pixel_cost = u64::from(width) * u64::from(height) * u64::from(req.n);
    if pixel_cost >= max_total_pixels {
        return Err(Error::admission());
    }
    Ok(())
}

pub async fn generate(
    State(state): State<AppState>,
    Json(body): Json<ImageGenerationRequest>,
) -> Response {
    let (width, height) = parse_size(&body.size);
    if let Err(err) = validate(&body, width, height, state.max_total_pixels) {
        return super::error_response(err);
    }

    let request_id = new_request_id();
    let stream = body.stream;
    let steps = body.num_inference_steps;

    let request = GenerationRequest {
        request_id: request_id.clone(),
        prompt: body.prompt,
        negative_prompt: body.negative_prompt,
        width,
        height,
        guidance: body.guidance_scale,
        steps,
        n: body.n,
        stream,
        seed: body.seed,
    };

    let mut receiver = state.mailbox.register(request_id.clone()).await;
    if let Err(err) = state.pool.admit(request).await {
        state.mailbox.unregister(&request_id).await;
        return super::error_response(err);
    }

    if stream {
        let mailbox = state.mailbox.clone();
        let request_id_for_cleanup = request_id.clone();
        let sse_stream = stream::unfold(
            (receiver, false, mailbox, request_id_for_cleanup),
            move |(mut receiver, done, mailbox, request_id)| async move {
                if done {
                    mailbox.unregister(&request_id).await;
                    return None;
                }
                match receiver.recv().await {
                    Some(event) => {
                        let (events, terminal) = to_sse_events(event, steps);
                        let mut out: Vec<Result<Event, Infallible>> =
                            events.into_iter().map(Ok).collect();
                        if terminal {
                            out.push(Ok(done_event()));
                        }
                        Some((
                            stream::iter(out),
                            (receiver, terminal, mailbox, request_id),
                        ))
                    }
                    None => {
                        mailbox.unregister(&request_id).await;
                        None
                    }
                }
            },
        )
        .flatten();

        return Sse::new(sse_stream)
            .keep_alive(
                axum::response::sse::KeepAlive::new()
                    .interval(Duration::from_secs(15))
                    .text("keep-alive"),
            )
            .into_response();
    }

    // Non-streaming: the worker emits exactly one terminal event.
    let result = receiver.recv().await;
    state.mailbox.unregister(&request_id).await;

    match result {
        Some(ResultEvent::Completed { data: Some(data), .. }) => {
            let images = data
                .images_b64
                .into_iter()
                .map(|b64| ImageData {
                    b64_json: Some(b64),
                    url: None,
                    revised_prompt: None,
                    seed: Some(data.seed),
                })
                .collect();
            Json(ImageGenerationResponse {
                created: unix_timestamp(),
                data: images,
            })
            .into_response()
        }
        Some(ResultEvent::Error { message, .. }) => {
            super::error_response(Error::model_invocation(message))
        }
        _ => super::error_response(Error::channel_closed(
            "worker mailbox closed before a result arrived",
        )),
    }
}

fn unix_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
