//! Benchmarks of the localization pipeline on synthetic spot fields

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::{ArrayD, IxDyn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use spotfind::{locate, Engine, LocateConfig};

/// A noisy frame with `count` Gaussian spots at seeded random positions.
fn spot_field(height: usize, width: usize, count: usize, seed: u64) -> ArrayD<u8> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut image =
        ArrayD::from_shape_simple_fn(IxDyn(&[height, width]), || rng.gen_range(0..8_u8));
    let margin = 12.0;
    let centers: Vec<(f64, f64)> = (0..count)
        .map(|_| {
            (
                rng.gen_range(margin..height as f64 - margin),
                rng.gen_range(margin..width as f64 - margin),
            )
        })
        .collect();
    for (idx, v) in image.indexed_iter_mut() {
        let mut value = f64::from(*v);
        for &(cy, cx) in &centers {
            let dy = idx[0] as f64 - cy;
            let dx = idx[1] as f64 - cx;
            let d2 = dy * dy + dx * dx;
            if d2 < 64.0 {
                value += 200.0 * (-d2 / 5.12).exp();
            }
        }
        *v = value.min(255.0) as u8;
    }
    image
}

fn bench_locate(c: &mut Criterion) {
    let image = spot_field(512, 512, 100, 42);

    let mut group = c.benchmark_group("locate");
    for (name, engine) in [("optimized", Engine::Optimized), ("scalar", Engine::Scalar)] {
        let config = LocateConfig::new(9)
            .with_minmass(300.0)
            .with_engine(engine);
        group.bench_function(name, |b| {
            b.iter(|| locate(black_box(&image), black_box(&config)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_locate);
criterion_main!(benches);
