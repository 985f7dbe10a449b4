//! Cascade, designer and response benchmarks

use aeq_core::{BandSet, preset};
use aeq_dsp::{Cascade, MonoProcessor, design_all, response};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

fn rock_coeffs() -> Vec<aeq_dsp::BiquadCoeffs> {
    let bands = preset("Rock")
        .and_then(|s| s.band_set().ok())
        .unwrap_or_else(BandSet::flat_graphic);
    design_all(&bands, 48000.0)
}

fn bench_cascade_10_bands(c: &mut Criterion) {
    let mut cascade = Cascade::with_coeffs(&rock_coeffs());
    let mut buffer: Vec<f64> = (0..1024).map(|i| (i as f64 * 0.01).sin()).collect();

    c.bench_function("cascade_10_bands_1024", |b| {
        b.iter(|| {
            cascade.process_block(black_box(&mut buffer));
        })
    });
}

fn bench_cascade_f32(c: &mut Criterion) {
    let mut cascade = Cascade::with_coeffs(&rock_coeffs());
    let mut buffer: Vec<f32> = (0..1024).map(|i| (i as f32 * 0.01).sin()).collect();

    c.bench_function("cascade_10_bands_f32_1024", |b| {
        b.iter(|| {
            cascade.process_block_io(black_box(&mut buffer));
        })
    });
}

fn bench_design(c: &mut Criterion) {
    let bands = BandSet::flat_graphic();
    c.bench_function("design_10_bands", |b| {
        b.iter(|| design_all(black_box(&bands), 48000.0))
    });
}

fn bench_response(c: &mut Criterion) {
    let coeffs = rock_coeffs();
    c.bench_function("response_200_points", |b| {
        b.iter(|| response::evaluate_default(black_box(&coeffs), 48000.0))
    });
}

criterion_group!(
    benches,
    bench_cascade_10_bands,
    bench_cascade_f32,
    bench_design,
    bench_response
);
criterion_main!(benches);
