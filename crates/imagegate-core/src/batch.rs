//! Request coalescing.
//!
//! Ported from `original_source/src/processing.py::BatchManager`: requests
//! sharing a [`BatchKey`] accumulate in a pending-batch slot until either
//! `max_batch_size` is reached or `batch_timeout` elapses since the slot's
//! first request, at which point the slot flushes into one
//! [`BatchedRequest`]. The Python original used a single background thread
//! sweeping all slots; here the equivalent is an external ~100ms ticker
//! calling [`BatchManager::check_timeouts`] (see `imagegate-server`'s batch
//! sweep task).

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{BatchKey, BatchedRequest, GenerationRequest};

struct PendingBatch {
    requests: Vec<GenerationRequest>,
    opened_at: std::time::Instant,
}

impl PendingBatch {
    fn new(first: GenerationRequest) -> Self {
        Self {
            requests: vec![first],
            opened_at: std::time::Instant::now(),
        }
    }
}

/// Groups admitted requests into batches sharing a [`BatchKey`], subject to
/// a per-batch VRAM cap and size/timeout flush triggers.
///
/// Not `Send`-shared directly: `imagegate-server` owns one instance behind a
/// single task's exclusive access (mirroring the Python original's
/// single-threaded `BatchManager`), communicating with callers over
/// channels rather than a mutex.
pub struct BatchManager {
    max_total_pixels: u64,
    max_batch_size: usize,
    batch_timeout: Duration,
    enabled: bool,
    pending: HashMap<BatchKey, PendingBatch>,
}

impl BatchManager {
    pub fn new(
        max_total_pixels: u64,
        max_batch_size: usize,
        batch_timeout: Duration,
        enabled: bool,
    ) -> Self {
        Self {
            max_total_pixels,
            max_batch_size,
            batch_timeout,
            enabled,
            pending: HashMap::new(),
        }
    }

    /// Admits a single request, either returning it immediately as a
    /// one-element batch (batching disabled, or the request alone already
    /// meets a flush trigger) or folding it into a pending slot.
    ///
    /// Returns `Err(Error::Admission)` if the request alone exceeds
    /// `max_total_pixels` — no amount of batching can make it fit.
    pub fn add_request(&mut self, request: GenerationRequest) -> Result<Option<BatchedRequest>> {
        if request.pixel_cost() >= self.max_total_pixels {
            return Err(Error::Admission);
        }

        if !self.enabled {
            return Ok(Some(Self::finalize(vec![request])));
        }

        let key = request.batch_key();
        let slot = self.pending.entry(key).or_insert_with(|| {
            // Placeholder swapped below; avoids a second hash lookup.
            PendingBatch {
                requests: Vec::new(),
                opened_at: std::time::Instant::now(),
            }
        });

        if slot.requests.is_empty() {
            *slot = PendingBatch::new(request);
        } else {
            let projected: u64 = slot
                .requests
                .iter()
                .chain(std::iter::once(&request))
                .map(GenerationRequest::pixel_cost)
                .sum();
            if projected >= self.max_total_pixels || slot.requests.len() + 1 > self.max_batch_size
            {
                // Current slot is full; flush it and open a fresh one for
                // this request.
                let full = self.pending.remove(&key).expect("slot just matched");
                let flushed = Self::finalize(full.requests);
                self.pending.insert(key, PendingBatch::new(request));
                return Ok(Some(flushed));
            }
            slot.requests.push(request);
        }

        let slot = self.pending.get(&key).expect("slot just inserted");
        if slot.requests.len() >= self.max_batch_size {
            let full = self.pending.remove(&key).expect("slot just matched");
            return Ok(Some(Self::finalize(full.requests)));
        }

        Ok(None)
    }

    /// Flushes every pending slot whose oldest request has waited at least
    /// `batch_timeout`. Called from the server's periodic sweep task.
    pub fn check_timeouts(&mut self) -> Vec<BatchedRequest> {
        let timeout = self.batch_timeout;
        let expired: Vec<BatchKey> = self
            .pending
            .iter()
            .filter(|(_, slot)| slot.opened_at.elapsed() >= timeout)
            .map(|(key, _)| *key)
            .collect();

        expired
            .into_iter()
            .filter_map(|key| self.pending.remove(&key))
            .map(|slot| Self::finalize(slot.requests))
            .collect()
    }

    /// Flushes every pending slot unconditionally, regardless of age or
    /// size. Used during shutdown so no admitted request is silently
    /// dropped.
    pub fn flush_pending_batches(&mut self) -> Vec<BatchedRequest> {
        self.pending
            .drain()
            .map(|(_, slot)| Self::finalize(slot.requests))
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.values().map(|slot| slot.requests.len()).sum()
    }

    fn finalize(requests: Vec<GenerationRequest>) -> BatchedRequest {
        let first = requests.first().expect("batch is never empty");
        let batch_id = uuid_like(&requests);
        let width = first.width;
        let height = first.height;
        let guidance = first.guidance;
        let steps = first.steps;
        let stream = first.stream;
        let n_per_request = first.n;

        let mut prompts = Vec::with_capacity(requests.len());
        let mut negative_prompts = Vec::with_capacity(requests.len());
        let mut request_ids = Vec::with_capacity(requests.len());
        let mut seeds = Vec::with_capacity(requests.len());
        for request in requests {
            prompts.push(request.prompt);
            negative_prompts.push(request.negative_prompt);
            request_ids.push(request.request_id);
            seeds.push(request.seed);
        }

        BatchedRequest {
            batch_id,
            prompts,
            negative_prompts,
            request_ids,
            n_per_request,
            width,
            height,
            guidance,
            steps,
            stream,
            seeds,
        }
    }
}

/// Batch ids only need to be unique for logging correlation, not globally
/// unique or unguessable, so we derive one from the member request ids
/// rather than pulling in a UUID generator for this alone.
fn uuid_like(requests: &[GenerationRequest]) -> String {
    requests
        .first()
        .map(|r| format!("batch-{}", r.request_id))
        .unwrap_or_else(|| "batch-empty".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(id: &str, w: u32, h: u32) -> GenerationRequest {
        GenerationRequest {
            request_id: id.to_string(),
            prompt: "x".into(),
            negative_prompt: None,
            width: w,
            height: h,
            guidance: 5.0,
            steps: 20,
            n: 1,
            stream: false,
            seed: None,
        }
    }

    #[test]
    fn single_request_exceeding_cap_is_rejected() {
        let mut mgr = BatchManager::new(100, 4, Duration::from_millis(50), true);
        let err = mgr.add_request(req("a", 1000, 1000)).unwrap_err();
        assert!(matches!(err, Error::Admission));
    }

    #[test]
    fn batching_disabled_returns_each_request_immediately() {
        let mut mgr = BatchManager::new(u64::MAX, 4, Duration::from_secs(1), false);
        let batch = mgr.add_request(req("a", 64, 64)).unwrap().unwrap();
        assert_eq!(batch.request_ids, vec!["a"]);
    }

    #[test]
    fn same_key_requests_coalesce_until_max_batch_size() {
        let mut mgr = BatchManager::new(u64::MAX, 2, Duration::from_secs(10), true);
        assert!(mgr.add_request(req("a", 64, 64)).unwrap().is_none());
        let batch = mgr.add_request(req("b", 64, 64)).unwrap().unwrap();
        assert_eq!(batch.request_ids, vec!["a", "b"]);
        assert_eq!(mgr.pending_count(), 0);
    }

    #[test]
    fn differing_key_opens_a_separate_slot() {
        let mut mgr = BatchManager::new(u64::MAX, 4, Duration::from_secs(10), true);
        assert!(mgr.add_request(req("a", 64, 64)).unwrap().is_none());
        assert!(mgr.add_request(req("b", 128, 128)).unwrap().is_none());
        assert_eq!(mgr.pending_count(), 2);
    }

    #[test]
    fn timeout_sweep_flushes_aged_slots_only() {
        let mut mgr = BatchManager::new(u64::MAX, 4, Duration::from_millis(20), true);
        mgr.add_request(req("a", 64, 64)).unwrap();
        assert!(mgr.check_timeouts().is_empty());
        std::thread::sleep(Duration::from_millis(30));
        let flushed = mgr.check_timeouts();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].request_ids, vec!["a"]);
    }

    #[test]
    fn flush_pending_batches_drains_everything_regardless_of_age() {
        let mut mgr = BatchManager::new(u64::MAX, 4, Duration::from_secs(100), true);
        mgr.add_request(req("a", 64, 64)).unwrap();
        mgr.add_request(req("b", 128, 128)).unwrap();
        let flushed = mgr.flush_pending_batches();
        assert_eq!(flushed.len(), 2);
        assert_eq!(mgr.pending_count(), 0);
    }

    #[test]
    fn exceeding_pixel_cap_mid_batch_flushes_current_and_opens_new_slot() {
        let mut mgr = BatchManager::new(100, 4, Duration::from_secs(10), true);
        assert!(mgr.add_request(req("a", 8, 8)).unwrap().is_none());
        let flushed = mgr.add_request(req("b", 8, 8)).unwrap();
        // 8*8 + 8*8 = 128 > 100, so adding "b" flushes "a" alone and opens a
        // fresh slot containing "b".
        assert_eq!(flushed.unwrap().request_ids, vec!["a"]);
        assert_eq!(mgr.pending_count(), 1);
    }
}
