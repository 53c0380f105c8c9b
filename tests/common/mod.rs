//! Shared fixtures: a seeded synthetic credit dataset and a small trained model

#![allow(dead_code)]

use kolosal_credit::data::{age_group, Dataset, FeatureSchema};
use kolosal_credit::export::EnsembleArtifact;
use kolosal_credit::inference::CustomerRecord;
use kolosal_credit::pipeline::{PipelineConfig, TrainingPipeline};
use kolosal_credit::training::LearnerKind;
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::Path;
use std::sync::OnceLock;

pub fn feature_names() -> Vec<String> {
    FeatureSchema::credit_default().features
}

/// One synthetic account in schema order; default risk rises with
/// repayment delay and falls with the credit limit
fn synthetic_account(rng: &mut ChaCha8Rng) -> (Vec<f64>, f64) {
    let limit = rng.gen_range(1..=50) as f64 * 10_000.0;
    let age = rng.gen_range(21..=70) as f64;
    let delay = rng.gen_range(-2..=4) as f64;

    let bills: Vec<f64> = (0..6).map(|_| rng.gen_range(0.0..limit).round()).collect();
    let payments: Vec<f64> = (0..6).map(|_| rng.gen_range(0..5_000) as f64).collect();
    let pays: Vec<f64> = (0..6)
        .map(|i| if i == 0 { delay } else { (delay + rng.gen_range(-1..=1) as f64).clamp(-2.0, 8.0) })
        .collect();

    let mut row = vec![limit, age];
    row.extend(bills);
    row.extend(payments);
    row.extend(pays);
    row.push(rng.gen_range(1..=4) as f64); // EDUCATION
    row.push(rng.gen_range(1..=3) as f64); // MARRIAGE
    row.push(rng.gen_range(1..=2) as f64); // SEX
    row.push(age_group(age));

    let logit = -1.2 + 0.9 * delay - limit / 150_000.0;
    let p = 1.0 / (1.0 + (-logit).exp());
    let label = if rng.gen::<f64>() < p { 1.0 } else { 0.0 };
    (row, label)
}

pub fn credit_dataset(n: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let schema = FeatureSchema::credit_default();
    let mut x = Array2::zeros((n, schema.n_features()));
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let (row, label) = synthetic_account(&mut rng);
        for (j, v) in row.into_iter().enumerate() {
            x[[i, j]] = v;
        }
        y[i] = label;
    }
    Dataset {
        ids: (1..=n as i64).collect(),
        x,
        y,
        schema,
    }
}

/// Write the dataset as CSV. The public UCI layout names the first repayment
/// column `PAY_0`, has no `AGE_GROUP`, and here also carries one duplicate
/// row and one blank cell.
pub fn write_csv(path: &Path, n: usize, seed: u64, uci_layout: bool) {
    let data = credit_dataset(n, seed);
    let names = feature_names();

    let mut header = vec!["ID".to_string()];
    let mut keep = Vec::new();
    for (j, name) in names.iter().enumerate() {
        match name.as_str() {
            "AGE_GROUP" if uci_layout => continue,
            "PAY_1" if uci_layout => header.push("PAY_0".to_string()),
            _ => header.push(name.clone()),
        }
        keep.push(j);
    }
    header.push("default.payment.next.month".to_string());

    let mut lines = vec![header.join(",")];
    for i in 0..n {
        let mut cells = vec![data.ids[i].to_string()];
        for &j in &keep {
            let blank = uci_layout && i == 3 && names[j] == "BILL_AMT3";
            cells.push(if blank { String::new() } else { data.x[[i, j]].to_string() });
        }
        cells.push(data.y[i].to_string());
        lines.push(cells.join(","));
    }
    if uci_layout {
        let last = lines[n].clone();
        lines.push(last);
    }
    std::fs::write(path, lines.join("\n") + "\n").expect("write fixture csv");
}

/// Small search budget so tests stay fast
pub fn quick_config() -> PipelineConfig {
    PipelineConfig::new()
        .with_n_trials(2)
        .with_cv_folds(3)
        .with_learners(vec![LearnerKind::Knn, LearnerKind::GradientBoosting])
}

/// A model trained once per test binary
pub fn shared_artifact() -> &'static EnsembleArtifact {
    static ARTIFACT: OnceLock<EnsembleArtifact> = OnceLock::new();
    ARTIFACT.get_or_init(|| {
        TrainingPipeline::new(quick_config())
            .run_dataset(&credit_dataset(300, 7))
            .expect("train fixture model")
            .artifact
    })
}

pub fn save_shared_artifact(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("ensemble_model.bin");
    shared_artifact().save(&path).expect("save fixture model");
    path
}

/// First account of the public dataset
pub fn sample_record() -> CustomerRecord {
    let values = [
        ("LIMIT_BAL", 20000.0),
        ("AGE", 24.0),
        ("BILL_AMT1", 3913.0),
        ("BILL_AMT2", 3102.0),
        ("BILL_AMT3", 689.0),
        ("BILL_AMT4", 0.0),
        ("BILL_AMT5", 0.0),
        ("BILL_AMT6", 0.0),
        ("PAY_AMT1", 0.0),
        ("PAY_AMT2", 689.0),
        ("PAY_AMT3", 0.0),
        ("PAY_AMT4", 0.0),
        ("PAY_AMT5", 0.0),
        ("PAY_AMT6", 0.0),
        ("PAY_1", 2.0),
        ("PAY_2", 2.0),
        ("PAY_3", -1.0),
        ("PAY_4", -1.0),
        ("PAY_5", -2.0),
        ("PAY_6", -2.0),
        ("EDUCATION", 2.0),
        ("MARRIAGE", 1.0),
        ("SEX", 2.0),
        ("AGE_GROUP", 0.0),
    ];
    values
        .iter()
        .fold(CustomerRecord::new(1), |r, &(name, v)| r.with_feature(name, v))
}

pub fn sample_record_json() -> serde_json::Value {
    serde_json::to_value(sample_record()).expect("record to json")
}
