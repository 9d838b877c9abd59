//! Benchmarks for group resampling and the two-sample test

#![allow(clippy::cast_precision_loss, clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stambo::{
    replicate_rng, two_sample_test, Accuracy, ComparisonConfig, GroupIndex, GroupedSample,
    Resampler,
};

fn create_pair(n: usize, group_size: usize) -> (GroupedSample, GroupedSample) {
    let targets: Vec<f64> = (0..n).map(|i| (i % 2) as f64).collect();
    let groups: Vec<u64> = (0..n as u64).map(|i| i / group_size as u64).collect();
    let flip = |every: usize| -> Vec<f64> {
        targets
            .iter()
            .enumerate()
            .map(|(i, &t)| if i % every == 0 { 1.0 - t } else { t })
            .collect()
    };
    let a = GroupedSample::with_groups(flip(10), targets.clone(), groups.clone()).unwrap();
    let b = GroupedSample::with_groups(flip(4), targets.clone(), groups).unwrap();
    (a, b)
}

fn benchmark_resampler(c: &mut Criterion) {
    let mut group = c.benchmark_group("resampler_draw");

    for (n, group_size) in [(1_000, 1), (1_000, 20), (10_000, 1), (10_000, 20)] {
        let ids: Vec<u64> = (0..n as u64).map(|i| i / group_size).collect();
        let resampler = Resampler::new(GroupIndex::from_ids(&ids)).unwrap();
        let mut indices = Vec::with_capacity(n);
        let mut drawn = Vec::new();

        group.bench_function(format!("draw_{n}_obs_groups_of_{group_size}"), |b| {
            let mut replicate = 0;
            b.iter(|| {
                let mut rng = replicate_rng(42, replicate);
                resampler.draw_into(&mut rng, &mut indices, &mut drawn);
                replicate += 1;
                black_box(indices.len())
            });
        });
    }

    group.finish();
}

fn benchmark_two_sample_test(c: &mut Criterion) {
    let mut group = c.benchmark_group("two_sample_test");
    group.sample_size(10);

    for parallel in [false, true] {
        let (a, b) = create_pair(2_000, 10);
        let config = ComparisonConfig::default()
            .with_n_bootstrap(1_000)
            .with_parallel(parallel);
        let label = if parallel { "parallel" } else { "sequential" };

        group.bench_function(format!("accuracy_2000_obs_1000_replicates_{label}"), |bench| {
            bench.iter(|| two_sample_test(black_box(&a), black_box(&b), &Accuracy, &config));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_resampler, benchmark_two_sample_test);
criterion_main!(benches);
