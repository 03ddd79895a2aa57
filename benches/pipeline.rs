use criterion::{criterion_group, criterion_main, Criterion};
use dcesol::prelude::*;
use std::hint::black_box;

fn phantom(size: usize) -> (SignalVolume, Metadata) {
    let timing = Timing::new((0..50).map(|i| i as f64 * 6.0).collect()).unwrap();
    let aif = PopulationAif::parker(24.0).curve_on(&timing);
    let options = SynthesisOptions::default().with_noise(2.0, 1);
    let signal = synthesize_signal(
        [size, size, 1],
        &timing,
        &aif,
        |[x, y, _]| {
            VoxelContent::Tissue(PkParameters::tofts(
                0.05 + 0.01 * x as f64,
                0.2 + 0.01 * y as f64,
            ))
        },
        &options,
    )
    .unwrap();
    (signal, simulator::metadata(&timing, &options))
}

fn pipeline_benchmark(c: &mut Criterion) {
    let (signal, metadata) = phantom(16);
    let config = Configuration::default()
        .with_population_aif(true)
        .with_population_aif_onset(24.0);

    c.bench_function("run 16x16 population AIF", |b| {
        b.iter(|| black_box(run(&Inputs::new(&signal), &metadata, &config, None)))
    });

    let bat = BatEstimator::new(BatMode::PeakGradient, 0, 50).unwrap();
    let converter = ConcentrationConverter::new(SignalEquation::new(5.0, 25.0, 0.0039), 1597.0, 1600.0, &bat);
    c.bench_function("concentration 16x16", |b| {
        b.iter(|| black_box(converter.convert(&signal)))
    });
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
