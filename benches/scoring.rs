use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kolosal_credit::data::{age_group, Dataset, FeatureSchema};
use kolosal_credit::inference::{CreditScorer, CustomerRecord};
use kolosal_credit::pipeline::{PipelineConfig, TrainingPipeline};
use kolosal_credit::training::LearnerKind;
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn create_credit_data(n_rows: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let schema = FeatureSchema::credit_default();
    let n_features = schema.n_features();

    let mut x = Array2::zeros((n_rows, n_features));
    let mut y = Array1::zeros(n_rows);
    for i in 0..n_rows {
        for (j, name) in schema.features.iter().enumerate() {
            x[[i, j]] = match name.as_str() {
                "LIMIT_BAL" => rng.gen_range(1..=50) as f64 * 10_000.0,
                "AGE" => rng.gen_range(21..=70) as f64,
                "EDUCATION" => rng.gen_range(1..=4) as f64,
                "MARRIAGE" => rng.gen_range(1..=3) as f64,
                "SEX" => rng.gen_range(1..=2) as f64,
                "AGE_GROUP" => 0.0,
                n if n.starts_with("PAY_AMT") => rng.gen_range(0..5_000) as f64,
                n if n.starts_with("PAY_") => rng.gen_range(-2..=4) as f64,
                _ => rng.gen_range(0.0..100_000.0_f64).round(),
            };
        }
        if let Some(j) = schema.index_of("AGE_GROUP") {
            let age = schema.index_of("AGE").map_or(30.0, |a| x[[i, a]]);
            x[[i, j]] = age_group(age);
        }
        let delay = schema.index_of("PAY_1").map_or(0.0, |p| x[[i, p]]);
        let p = 1.0 / (1.0 + (1.2 - 0.9 * delay).exp());
        y[i] = if rng.gen::<f64>() < p { 1.0 } else { 0.0 };
    }

    Dataset {
        ids: (1..=n_rows as i64).collect(),
        x,
        y,
        schema,
    }
}

fn to_records(data: &Dataset) -> Vec<CustomerRecord> {
    (0..data.n_rows())
        .map(|i| {
            data.schema
                .features
                .iter()
                .enumerate()
                .fold(CustomerRecord::new(data.ids[i]), |r, (j, name)| r.with_feature(name.clone(), data.x[[i, j]]))
        })
        .collect()
}

fn bench_scoring(c: &mut Criterion) {
    let config = PipelineConfig::new()
        .with_n_trials(3)
        .with_cv_folds(3)
        .with_learners(LearnerKind::ALL.to_vec());
    let run = TrainingPipeline::new(config)
        .run_dataset(&create_credit_data(1000, 42))
        .unwrap();
    let scorer = CreditScorer::from_artifact(run.artifact).unwrap();

    let mut group = c.benchmark_group("scoring");
    for n_rows in [1, 100, 1000].iter() {
        let records = to_records(&create_credit_data(*n_rows, 7));
        group.bench_with_input(BenchmarkId::new("predict", n_rows), &records, |b, records| {
            b.iter(|| scorer.predict(black_box(records)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_scoring);
criterion_main!(benches);
