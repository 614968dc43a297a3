//! The opaque diffusion model boundary.
//!
//! `original_source/src/worker.py` loads a real `diffusers` pipeline and
//! drives it step by step via a callback. That model is out of scope here
//! (spec.md's Non-goals exclude the model itself); [`ImagePipeline`] is the
//! seam a real GPU-backed implementation would plug into, grounded on the
//! teacher's `Generator` trait in `ferroid-tonic-core::common::types`
//! (one narrow trait standing in for a black-box id/image source).

mod synthetic;

pub use synthetic::SyntheticPipeline;

use imagegate_core::Result;

/// One decoded intermediate or final frame produced during a pipeline run.
pub struct PipelineFrame {
    pub step: u32,
    pub total_steps: u32,
    pub is_final: bool,
    /// Already-encoded image bytes (JPEG for intermediate steps, PNG for
    /// the final frame), per spec.md §4.1.
    pub image_bytes: Vec<u8>,
}

/// A single prompt's worth of work within a (possibly batched) pipeline
/// invocation.
pub struct PipelineJob {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub seed: u32,
}

/// Per-worker placement info, recorded at spawn time so a real GPU-backed
/// pipeline has somewhere to read its assigned device from.
/// `SyntheticPipeline` ignores `gpu_index` entirely.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub worker_id: usize,
    pub gpu_index: usize,
}

/// Abstraction over the text-to-image model. Implementations drive however
/// many denoising steps the model needs and emit a [`PipelineFrame`] per
/// step via `on_frame`, finishing with `is_final = true` frames for every
/// job in the invocation.
///
/// `on_frame` is synchronous (not `async`) so implementations can call it
/// from a blocking model-inference loop without needing a runtime handle;
/// the caller (`pool::worker`) is responsible for forwarding frames onto
/// async channels.
pub trait ImagePipeline: Send + Sync + 'static {
    fn run(
        &self,
        jobs: &[PipelineJob],
        width: u32,
        height: u32,
        guidance: f64,
        steps: u32,
        on_frame: &mut dyn FnMut(usize, PipelineFrame) -> Result<()>,
    ) -> Result<()>;
}
