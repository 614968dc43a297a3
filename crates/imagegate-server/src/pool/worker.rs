//! A single worker's task loop.
//!
//! Structurally follows `ferroid-tonic-server::server::pool::worker`'s
//! `worker_loop` dispatching on a `WorkRequest` enum; the payload and the
//! per-batch processing are specific to this service (the teacher streams
//! precomputed Snowflake ids, this streams diffusion frames).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use imagegate_core::{BatchedRequest, ChunkInfo, CompletedData, Error, ResultEvent, StreamingStepData};
use rand::Rng;
use tokio::sync::mpsc;

use crate::dispatch::MailboxRegistry;
use crate::pipeline::{ImagePipeline, PipelineFrame, PipelineJob, WorkerConfig};

/// Chunk boundary for base64 image payloads on the SSE wire, per spec.md
/// §4.1 step 3.
const CHUNK_THRESHOLD_BYTES: usize = 400 * 1024;

pub(crate) enum WorkRequest {
    Batch(BatchedRequest),
    Shutdown,
}

pub(crate) async fn worker_loop(
    config: WorkerConfig,
    startup_stagger: Duration,
    mut rx: mpsc::Receiver<WorkRequest>,
    pipeline: Arc<dyn ImagePipeline>,
    mailbox: MailboxRegistry,
    ready: Arc<AtomicBool>,
) {
    let worker_id = config.worker_id;
    tracing::info!(worker_id, gpu_index = config.gpu_index, ?startup_stagger, "worker loading");
    if !startup_stagger.is_zero() {
        tokio::time::sleep(startup_stagger).await;
    }
    ready.store(true, Ordering::SeqCst);
    tracing::info!(worker_id, "worker ready");

    while let Some(msg) = rx.recv().await {
        match msg {
            WorkRequest::Shutdown => {
                tracing::info!(worker_id, "worker received shutdown message");
                break;
            }
            WorkRequest::Batch(batch) => {
                process_batch(worker_id, batch, &pipeline, &mailbox).await;
            }
        }
    }

    tracing::info!(worker_id, "worker exiting");
}

/// One image's worth of work, flattened out of a [`BatchedRequest`] (whose
/// `n_per_request` may be > 1) so the pipeline always sees one job per
/// image, each independently seeded per spec.md §9's per-slot seeding
/// resolution.
struct FlatJob {
    request_id: String,
    image_index: u32,
}

async fn process_batch(
    worker_id: usize,
    batch: BatchedRequest,
    pipeline: &Arc<dyn ImagePipeline>,
    mailbox: &MailboxRegistry,
) {
    let batch_id = batch.batch_id.clone();
    let n = batch.n_per_request.max(1);
    let total_images = n;
    let stream = batch.stream;

    let mut jobs = Vec::with_capacity(batch.request_ids.len() * n as usize);
    let mut flat = Vec::with_capacity(batch.request_ids.len() * n as usize);
    let mut rng = rand::rng();
    for i in 0..batch.request_ids.len() {
        for image_index in 0..n {
            let seed = match batch.seeds[i] {
                Some(base) => base.wrapping_add(image_index),
                None => rng.random::<u32>(),
            };
            jobs.push(PipelineJob {
                prompt: batch.prompts[i].clone(),
                negative_prompt: batch.negative_prompts[i].clone(),
                seed,
            });
            flat.push(FlatJob {
                request_id: batch.request_ids[i].clone(),
                image_index,
            });
        }
    }

    let (frame_tx, mut frame_rx) = mpsc::channel::<ResultEvent>(256);
    let width = batch.width;
    let height = batch.height;
    let guidance = batch.guidance;
    let steps = batch.steps;

    let pipeline = pipeline.clone();
    let blocking = tokio::task::spawn_blocking(move || {
        let per_job_seed: Vec<u32> = jobs.iter().map(|j| j.seed).collect();

        // Tracks, per original request, the b64 image collected for each
        // image_index so a non-streaming Completed event fires only once
        // every image for that request has rendered.
        let mut per_request_images: std::collections::HashMap<String, Vec<Option<String>>> =
            std::collections::HashMap::new();
        for job in &flat {
            per_request_images
                .entry(job.request_id.clone())
                .or_insert_with(|| vec![None; total_images as usize]);
        }

        let run_result = pipeline.run(
            &jobs,
            width,
            height,
            guidance,
            steps,
            &mut |job_idx: usize, frame: PipelineFrame| -> Result<(), Error> {
                let flat_job = &flat[job_idx];
                let seed = per_job_seed[job_idx];
                let b64 = BASE64.encode(&frame.image_bytes);

                if stream {
                    emit_streaming_step(&frame_tx, flat_job, &b64, &frame, seed, total_images)?;
                    if frame.is_final {
                        send(&frame_tx, ResultEvent::Completed {
                            request_id: flat_job.request_id.clone(),
                            data: None,
                        })?;
                    }
                } else if frame.is_final {
                    let slot = per_request_images
                        .get_mut(&flat_job.request_id)
                        .expect("request registered above");
                    slot[flat_job.image_index as usize] = Some(b64);
                    if slot.iter().all(Option::is_some) {
                        let images_b64 = slot.iter().cloned().map(|v| v.unwrap()).collect();
                        send(&frame_tx, ResultEvent::Completed {
                            request_id: flat_job.request_id.clone(),
                            data: Some(CompletedData { images_b64, seed }),
                        })?;
                    }
                }
                Ok(())
            },
        );
        run_result
    });

    // Forward frames as they arrive while the blocking pipeline run is still
    // in flight, rather than buffering until completion — this is what
    // makes the SSE stream actually stream.
    while let Some(event) = frame_rx.recv().await {
        mailbox.deliver(event).await;
    }

    match blocking.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::warn!(worker_id, batch_id, %err, "pipeline invocation failed");
            for request_id in batch.request_ids {
                mailbox
                    .deliver(ResultEvent::Error {
                        request_id,
                        message: err.to_string(),
                    })
                    .await;
            }
        }
        Err(join_err) => {
            tracing::error!(worker_id, batch_id, %join_err, "pipeline task panicked");
            for request_id in batch.request_ids {
                mailbox
                    .deliver(ResultEvent::Error {
                        request_id,
                        message: "internal error during generation".to_string(),
                    })
                    .await;
            }
        }
    }
}

fn send(tx: &mpsc::Sender<ResultEvent>, event: ResultEvent) -> Result<(), Error> {
    tx.blocking_send(event)
        .map_err(|_| Error::channel_closed("frame forwarding channel closed"))
}

fn emit_streaming_step(
    tx: &mpsc::Sender<ResultEvent>,
    flat_job: &FlatJob,
    b64: &str,
    frame: &PipelineFrame,
    seed: u32,
    total_images: u32,
) -> Result<(), Error> {
    let timestamp = web_time_now();
    if b64.len() <= CHUNK_THRESHOLD_BYTES {
        send(tx, ResultEvent::StreamingStep {
            request_id: flat_job.request_id.clone(),
            data: StreamingStepData {
                step: frame.step,
                progress: f64::from(frame.step + 1) / f64::from(frame.total_steps),
                image_b64: b64.to_string(),
                is_final: frame.is_final,
                timestamp,
                image_index: flat_job.image_index,
                total_images,
                seed,
                chunk: None,
            },
        })
    } else {
        let chunk_id = format!("{}-{}-{}", flat_job.request_id, frame.step, flat_job.image_index);
        let chunks: Vec<&str> = {
            let mut v = Vec::new();
            let mut rest = b64;
            while !rest.is_empty() {
                let take = rest.len().min(CHUNK_THRESHOLD_BYTES);
                let (head, tail) = rest.split_at(take);
                v.push(head);
                rest = tail;
            }
            v
        };
        let total_chunks = chunks.len() as u32;
        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            send(tx, ResultEvent::StreamingStep {
                request_id: flat_job.request_id.clone(),
                data: StreamingStepData {
                    step: frame.step,
                    progress: f64::from(frame.step + 1) / f64::from(frame.total_steps),
                    image_b64: chunk.to_string(),
                    is_final: frame.is_final,
                    timestamp,
                    image_index: flat_job.image_index,
                    total_images,
                    seed,
                    chunk: Some(ChunkInfo {
                        chunk_id: chunk_id.clone(),
                        chunk_index: chunk_index as u32,
                        total_chunks,
                    }),
                },
            })?;
        }
        Ok(())
    }
}

fn web_time_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
