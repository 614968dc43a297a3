//! Benchmarks the batch manager's admission hot path: `add_request` under a
//! steady stream of same-shape requests, which is the path every incoming
//! HTTP request takes before a worker ever runs. Modeled on the
//! `[[bench]]` convention in `ferroid`'s own `Cargo.toml` (`harness =
//! false`, one `criterion_main!` per file).

use std::time::Duration;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use imagegate_core::{BatchManager, GenerationRequest};

fn make_request(id: u64) -> GenerationRequest {
    GenerationRequest {
        request_id: format!("{id:08x}"),
        prompt: "a watercolor fox in a snowy forest".to_string(),
        negative_prompt: None,
        width: 1024,
        height: 1024,
        guidance: 5.0,
        steps: 30,
        n: 1,
        stream: false,
        seed: None,
    }
}

fn admission_same_shape(c: &mut Criterion) {
    c.bench_function("batch_manager_admit_same_shape", |b| {
        b.iter_batched(
            || BatchManager::new(64 * 1024 * 1024, 8, Duration::from_millis(150), true),
            |mut mgr| {
                for id in 0..1000u64 {
                    let _ = black_box(mgr.add_request(make_request(id)));
                }
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn admission_varied_shapes(c: &mut Criterion) {
    c.bench_function("batch_manager_admit_varied_shapes", |b| {
        b.iter_batched(
            || BatchManager::new(64 * 1024 * 1024, 8, Duration::from_millis(150), true),
            |mut mgr| {
                for id in 0..1000u64 {
                    let mut request = make_request(id);
                    request.width = 512 + (id % 4) as u32 * 128;
                    request.height = request.width;
                    let _ = black_box(mgr.add_request(request));
                }
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, admission_same_shape, admission_varied_shapes);
criterion_main!(benches);
