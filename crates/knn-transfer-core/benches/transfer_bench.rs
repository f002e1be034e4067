use criterion::{black_box, criterion_group, criterion_main, Criterion};
use knn_transfer_core::{
    fit, Dataset, EmbeddingMatrix, EmbeddingSelector, LabelTable, TransferConfig,
    WeightedKnnTransfer,
};

const N_FEATURES: usize = 30;

fn random_dataset(rng: &mut oorandom::Rand64, prefix: &str, n: usize) -> Dataset {
    let data: Vec<f64> = (0..n * N_FEATURES).map(|_| rng.rand_float() * 10.0).collect();
    let x = EmbeddingMatrix::from_flat(data, n, N_FEATURES).unwrap();
    let ids = (0..n).map(|i| format!("{prefix}{i}")).collect();
    Dataset::new(ids, x).unwrap()
}

fn random_labels(rng: &mut oorandom::Rand64, reference: &Dataset) -> LabelTable {
    let level = |rng: &mut oorandom::Rand64, n_classes: u64| -> Vec<String> {
        (0..reference.len())
            .map(|_| format!("type_{}", rng.rand_range(0..n_classes)))
            .collect()
    };
    let level_1 = level(rng, 4);
    let level_2 = level(rng, 16);
    LabelTable::from_columns(
        reference.ids().to_vec(),
        vec![("ann_level_1".into(), level_1), ("ann_level_2".into(), level_2)],
    )
    .unwrap()
}

fn bench_transfer(c: &mut Criterion) {
    let mut rng = oorandom::Rand64::new(42);
    let reference = random_dataset(&mut rng, "ref", 2_000);
    let query = random_dataset(&mut rng, "query", 500);
    let labels = random_labels(&mut rng, &reference);

    c.bench_function("fit_exact_index_2000", |b| {
        b.iter(|| fit(black_box(&reference), "X", 50).unwrap());
    });

    let index = fit(&reference, "X", 50).unwrap();
    let engine = WeightedKnnTransfer::new(TransferConfig::new().with_label_key("ann_level"));

    c.bench_function("transfer_500_queries_k50", |b| {
        b.iter(|| {
            engine
                .transfer(&index, black_box(&query), &EmbeddingSelector::Primary, &labels)
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_transfer);
criterion_main!(benches);
