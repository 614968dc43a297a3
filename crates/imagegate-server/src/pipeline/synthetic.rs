//! Deterministic placeholder pipeline.
//!
//! Stands in for a real GPU-backed diffusion model (explicitly out of scope
//! per spec.md's Non-goals). Produces a reproducible per-seed gradient image
//! that sharpens over denoising steps, so callers exercising streaming,
//! batching, and the gallery get real bytes to push through the system.

use std::io::Cursor;
use std::time::Duration;

use image::{ImageBuffer, Rgb, RgbImage, codecs::jpeg::JpegEncoder};
use rand::{Rng, SeedableRng, rngs::StdRng};

use imagegate_core::{Error, Result};

use super::{ImagePipeline, PipelineFrame, PipelineJob};

pub struct SyntheticPipeline {
    model_path: String,
}

impl SyntheticPipeline {
    pub fn new(model_path: impl Into<String>) -> Self {
        let model_path = model_path.into();
        tracing::info!(%model_path, "synthetic pipeline initialized (no real model weights loaded)");
        Self { model_path }
    }

    pub fn model_path(&self) -> &str {
        &self.model_path
    }
}

impl ImagePipeline for SyntheticPipeline {
    fn run(
        &self,
        jobs: &[PipelineJob],
        width: u32,
        height: u32,
        guidance: f64,
        steps: u32,
        on_frame: &mut dyn FnMut(usize, PipelineFrame) -> Result<()>,
    ) -> Result<()> {
        for (index, job) in jobs.iter().enumerate() {
            // Each job gets an independent RNG seeded from its own slot,
            // per spec.md §9's per-slot seeding resolution: a batch of N
            // requests with no explicit seed must not all render the same
            // image.
            let mut rng = StdRng::seed_from_u64(u64::from(job.seed));
            let base_color = render_base_color(&mut rng, job, guidance);

            for step in 0..steps {
                // Simulated per-step inference latency; keeps streaming
                // tests honest about frame ordering without a real model.
                std::thread::sleep(Duration::from_micros(50));

                let is_final = step == steps - 1;
                let noise_fraction = 1.0 - (f64::from(step + 1) / f64::from(steps));
                let image = render_frame(width, height, base_color, noise_fraction, &mut rng);

                // Step-local failure per spec.md §7: a decode/encode error
                // for one step is logged and the frame dropped, not
                // propagated — it must not abort the rest of this job or
                // any other job sharing the batch.
                let image_bytes = match encode_frame(&image, is_final) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        tracing::warn!(job = index, step, %err, "dropping frame: encode failed");
                        continue;
                    }
                };

                on_frame(
                    index,
                    PipelineFrame {
                        step,
                        total_steps: steps,
                        is_final,
                        image_bytes,
                    },
                )?;
            }
        }
        Ok(())
    }
}

fn render_base_color(rng: &mut StdRng, job: &PipelineJob, guidance: f64) -> Rgb<u8> {
    let prompt_hash: u32 = job
        .prompt
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
    let jitter: u8 = rng.random_range(0..40);
    let guidance_tint = (guidance.clamp(1.0, 20.0) / 20.0 * 255.0) as u8;
    Rgb([
        (prompt_hash & 0xFF) as u8 ^ jitter,
        ((prompt_hash >> 8) & 0xFF) as u8,
        guidance_tint,
    ])
}

fn render_frame(
    width: u32,
    height: u32,
    base: Rgb<u8>,
    noise_fraction: f64,
    rng: &mut StdRng,
) -> RgbImage {
    ImageBuffer::from_fn(width, height, |x, y| {
        let noise_amplitude = (noise_fraction * 255.0) as i32;
        let noise = if noise_amplitude > 0 {
            rng.random_range(-noise_amplitude..=noise_amplitude)
        } else {
            0
        };
        let gradient = ((x + y) as f32 / (width + height).max(1) as f32 * 64.0) as i32;
        Rgb([
            clamp_channel(i32::from(base.0[0]) + noise + gradient),
            clamp_channel(i32::from(base.0[1]) + noise),
            clamp_channel(i32::from(base.0[2]) + noise),
        ])
    })
}

fn clamp_channel(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Intermediate steps encode as JPEG quality 90 (smaller SSE payloads);
/// the final frame encodes as PNG, per spec.md §4.1.
fn encode_frame(image: &RgbImage, is_final: bool) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    if is_final {
        image::DynamicImage::ImageRgb8(image.clone())
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .map_err(|e| Error::model_invocation(format!("PNG encode failed: {e}")))?;
    } else {
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, 90);
        encoder
            .encode_image(image)
            .map_err(|e| Error::model_invocation(format!("JPEG encode failed: {e}")))?;
    }
    Ok(buf)
}
