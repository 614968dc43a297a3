//! Wire and internal domain types.
//!
//! Field names follow `original_source/src/schemas.py` (the Python
//! dataclasses/pydantic models this service's contract was distilled from);
//! shapes are otherwise idiomatic Rust (explicit `width`/`height` instead of
//! a parsed-on-demand size string, `Option<T>` instead of `None`-as-sentinel).

use serde::{Deserialize, Serialize};

/// Default canvas side used when a `size` string is missing or malformed.
pub const DEFAULT_DIMENSION: u32 = 1024;

/// The default per-batch pixel budget (4 megapixels), matching
/// `MAX_TOTAL_PIXELS` in spec.md §6.
pub const DEFAULT_MAX_TOTAL_PIXELS: u64 = 4 * 1024 * 1024;

/// Splits a `"WxH"` size string into `(width, height)`. Any parse failure —
/// missing `x`, non-numeric parts, zero dimensions — silently falls back to
/// [`DEFAULT_DIMENSION`] square, per spec.md §6.
pub fn parse_size(size: &str) -> (u32, u32) {
    size.split_once('x')
        .and_then(|(w, h)| {
            let w: u32 = w.parse().ok()?;
            let h: u32 = h.parse().ok()?;
            (w > 0 && h > 0).then_some((w, h))
        })
        .unwrap_or((DEFAULT_DIMENSION, DEFAULT_DIMENSION))
}

/// OpenAI-shaped client request body for `POST /v1/images/generations`.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageGenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default = "default_n")]
    pub n: u32,
    #[serde(default = "default_size")]
    pub size: String,
    /// Inert OpenAI-compatibility field; accepted and ignored.
    #[serde(default)]
    pub quality: Option<String>,
    /// Inert OpenAI-compatibility field; accepted and ignored.
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default = "default_response_format")]
    pub response_format: String,
    /// Inert OpenAI-compatibility field; accepted and ignored.
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f64,
    #[serde(default = "default_inference_steps")]
    pub num_inference_steps: u32,
    #[serde(default)]
    pub seed: Option<u32>,
}

fn default_n() -> u32 {
    1
}
fn default_size() -> String {
    "1024x1024".to_string()
}
fn default_response_format() -> String {
    "b64_json".to_string()
}
fn default_guidance_scale() -> f64 {
    5.0
}
fn default_inference_steps() -> u32 {
    50
}

/// Bounds enforced on [`ImageGenerationRequest`], per spec.md §3/§8.
pub const N_RANGE: std::ops::RangeInclusive<u32> = 1..=4;
pub const GUIDANCE_RANGE: std::ops::RangeInclusive<f64> = 1.0..=20.0;
pub const STEPS_RANGE: std::ops::RangeInclusive<u32> = 10..=150;

/// A single admitted generation request, server-assigned a `request_id`.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub request_id: String,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub width: u32,
    pub height: u32,
    pub guidance: f64,
    pub steps: u32,
    pub n: u32,
    pub stream: bool,
    pub seed: Option<u32>,
}

impl GenerationRequest {
    /// The equivalence class used by the batch manager to decide whether two
    /// requests may share one pipeline invocation. See spec.md §3 "Batch
    /// key".
    pub fn batch_key(&self) -> BatchKey {
        BatchKey {
            width: self.width,
            height: self.height,
            guidance_bits: self.guidance.to_bits(),
            steps: self.steps,
            stream: self.stream,
            n: self.n,
            seed: self.seed,
        }
    }

    /// Total pixel cost of this request alone (`width * height * n`), used
    /// both for single-request admission and for the batch manager's
    /// VRAM-cap projection.
    pub fn pixel_cost(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * u64::from(self.n)
    }
}

/// Equivalence key grouping requests that may share one pipeline invocation.
///
/// `guidance` is stored as its raw bit pattern so the key can derive
/// `Eq`/`Hash` without pulling in an ordered-float wrapper; two requests
/// parsed from the same decimal literal produce identical bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub width: u32,
    pub height: u32,
    pub guidance_bits: u64,
    pub steps: u32,
    pub stream: bool,
    pub n: u32,
    pub seed: Option<u32>,
}

/// A coalesced multi-prompt request dispatched to a single worker.
///
/// Invariant: `prompts.len() == negative_prompts.len() == request_ids.len()
/// == seeds.len()`.
#[derive(Debug, Clone)]
pub struct BatchedRequest {
    pub batch_id: String,
    pub prompts: Vec<String>,
    pub negative_prompts: Vec<Option<String>>,
    pub request_ids: Vec<String>,
    pub n_per_request: u32,
    pub width: u32,
    pub height: u32,
    pub guidance: f64,
    pub steps: u32,
    pub stream: bool,
    pub seeds: Vec<Option<u32>>,
}

impl BatchedRequest {
    pub fn len(&self) -> usize {
        self.request_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.request_ids.is_empty()
    }
}

/// One streaming intermediate frame's payload, prior to chunking.
#[derive(Debug, Clone)]
pub struct StreamingStepData {
    pub step: u32,
    pub progress: f64,
    pub image_b64: String,
    pub is_final: bool,
    pub timestamp: f64,
    pub image_index: u32,
    pub total_images: u32,
    pub seed: u32,
    /// Set when this frame is one chunk of a larger payload split per
    /// spec.md §4.1 step 3.
    pub chunk: Option<ChunkInfo>,
}

#[derive(Debug, Clone)]
pub struct ChunkInfo {
    pub chunk_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
}

/// The final payload of a non-streaming completion.
#[derive(Debug, Clone)]
pub struct CompletedData {
    pub images_b64: Vec<String>,
    pub seed: u32,
}

/// An event emitted by a worker and routed by the dispatch fabric to the
/// client stream whose `request_id` matches. See spec.md §3 "Result event".
#[derive(Debug, Clone)]
pub enum ResultEvent {
    StreamingStep {
        request_id: String,
        data: StreamingStepData,
    },
    /// `data` is `None` for a streaming request's terminal event, `Some` for
    /// a non-streaming request's sole event.
    Completed {
        request_id: String,
        data: Option<CompletedData>,
    },
    Error {
        request_id: String,
        message: String,
    },
}

impl ResultEvent {
    pub fn request_id(&self) -> &str {
        match self {
            Self::StreamingStep { request_id, .. }
            | Self::Completed { request_id, .. }
            | Self::Error { request_id, .. } => request_id,
        }
    }
}

/// Wire shape of an SSE stream frame, per spec.md §3/§6.
#[derive(Debug, Clone, Serialize)]
pub struct StreamFrame {
    pub step: u32,
    pub total_steps: u32,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub is_final: bool,
    pub timestamp: f64,
    pub is_chunked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_images: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
}

impl From<(&StreamingStepData, u32)> for StreamFrame {
    fn from((data, total_steps): (&StreamingStepData, u32)) -> Self {
        Self {
            step: data.step,
            total_steps,
            progress: data.progress,
            image: Some(data.image_b64.clone()),
            is_final: data.is_final,
            timestamp: data.timestamp,
            is_chunked: data.chunk.is_some(),
            chunk_id: data.chunk.as_ref().map(|c| c.chunk_id.clone()),
            chunk_index: data.chunk.as_ref().map(|c| c.chunk_index),
            total_chunks: data.chunk.as_ref().map(|c| c.total_chunks),
            image_index: Some(data.image_index),
            total_images: Some(data.total_images),
            seed: Some(data.seed),
        }
    }
}

/// One OpenAI-shaped image in a non-streaming response.
#[derive(Debug, Clone, Serialize)]
pub struct ImageData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
}

/// Non-streaming response body for `POST /v1/images/generations`.
#[derive(Debug, Clone, Serialize)]
pub struct ImageGenerationResponse {
    pub created: i64,
    pub data: Vec<ImageData>,
}

/// A durable gallery entry, as stored in the on-disk JSON index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub id: u64,
    pub url: String,
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    pub size: String,
    #[serde(default)]
    pub seed: Option<u32>,
    pub timestamp: f64,
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f64,
    #[serde(default = "default_gallery_steps")]
    pub num_inference_steps: u32,
}

fn default_gallery_steps() -> u32 {
    20
}

/// On-disk shape of `static/images/gallery.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GalleryIndex {
    #[serde(default)]
    pub images: Vec<GalleryEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_valid() {
        assert_eq!(parse_size("512x768"), (512, 768));
    }

    #[test]
    fn parse_size_malformed_defaults_to_1024_square() {
        for bad in ["abc", "1024", "0x0", "1024xabc", ""] {
            assert_eq!(parse_size(bad), (1024, 1024), "input={bad:?}");
        }
    }

    #[test]
    fn batch_key_ignores_prompt_text() {
        let mut a = GenerationRequest {
            request_id: "aaaa0001".into(),
            prompt: "a cat".into(),
            negative_prompt: None,
            width: 512,
            height: 512,
            guidance: 5.0,
            steps: 20,
            n: 1,
            stream: false,
            seed: Some(7),
        };
        let mut b = a.clone();
        b.request_id = "bbbb0002".into();
        b.prompt = "a dog".into();
        b.negative_prompt = Some("blurry".into());
        assert_eq!(a.batch_key(), b.batch_key());

        a.guidance = 6.0;
        assert_ne!(a.batch_key(), b.batch_key());
    }
}
