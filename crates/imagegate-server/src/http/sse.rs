//! Conversion of [`imagegate_core::ResultEvent`] into SSE wire frames.
//!
//! The literal `[DONE]` sentinel event mirrors the OpenAI streaming
//! convention `original_source/src/main.py` also emits at the end of a
//! stream.

use axum::response::sse::Event;
use imagegate_core::{ResultEvent, StreamFrame};

pub const DONE_SENTINEL: &str = "[DONE]";

/// Converts one worker result event into zero or more SSE events. Returns
/// `(events, is_terminal)` — `is_terminal` tells the caller to stop reading
/// from the mailbox and emit the `[DONE]` sentinel next.
pub fn to_sse_events(event: ResultEvent, total_steps: u32) -> (Vec<Event>, bool) {
    match event {
        ResultEvent::StreamingStep { data, .. } => {
            let frame = StreamFrame::from((&data, total_steps));
            let event = Event::default().json_data(&frame).unwrap_or_else(|_| {
                Event::default().data("{\"error\":\"frame serialization failed\"}")
            });
            (vec![event], false)
        }
        ResultEvent::Completed { .. } => (Vec::new(), true),
        ResultEvent::Error { message, .. } => {
            let timestamp = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            let payload = serde_json::json!({ "error": message, "timestamp": timestamp });
            let event = Event::default()
                .json_data(&payload)
                .unwrap_or_else(|_| Event::default().data("{\"error\":\"frame serialization failed\"}"));
            (vec![event], true)
        }
    }
}

pub fn done_event() -> Event {
    Event::default().data(DONE_SENTINEL)
}
