//! Integration tests: scoring facade over a saved artifact

mod common;

use common::{credit_dataset, sample_record, save_shared_artifact, shared_artifact};
use kolosal_credit::export::{EnsembleArtifact, ARTIFACT_MAGIC};
use kolosal_credit::inference::{CreditScorer, CustomerRecord, RiskTier, DECISION_THRESHOLD};
use kolosal_credit::KolosalError;
use ndarray::Array2;

fn scorer() -> CreditScorer {
    CreditScorer::from_artifact(shared_artifact().clone()).unwrap()
}

fn records_from(n: usize, seed: u64) -> Vec<CustomerRecord> {
    let data = credit_dataset(n, seed);
    (0..n)
        .map(|i| {
            data.schema
                .features
                .iter()
                .enumerate()
                .fold(CustomerRecord::new(data.ids[i]), |r, (j, name)| r.with_feature(name.clone(), data.x[[i, j]]))
        })
        .collect()
}

#[test]
fn test_sample_record_scores() {
    let scorer = scorer();
    let record = sample_record();
    let scored = scorer.predict_one(&record).unwrap();

    let features = scorer.feature_columns();
    let row: Vec<f64> = features.iter().map(|name| record.features[name]).collect();
    let raw = scorer
        .predict_matrix(&Array2::from_shape_vec((1, features.len()), row).unwrap())
        .unwrap()[0];

    assert_eq!(scored.id, 1);
    assert!((0.0..=1.0).contains(&raw));
    assert_eq!(scored.default_probability, (raw * 10_000.0).round() / 10_000.0);
    assert_eq!(scored.default_prediction == 1, raw > DECISION_THRESHOLD);
    assert_eq!(scored.risk_level, RiskTier::from_probability(raw));
    let expected_label = if scored.default_prediction == 1 { "Default" } else { "No Default" };
    assert_eq!(scored.default_label, expected_label);
}

#[test]
fn test_reloaded_artifact_scores_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = save_shared_artifact(dir.path());
    let records = records_from(25, 99);

    let first = CreditScorer::load(&path).unwrap().predict(&records).unwrap();
    let second = CreditScorer::load(&path).unwrap().predict(&records).unwrap();
    let in_memory = scorer().predict(&records).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, in_memory);
}

#[test]
fn test_batch_preserves_order() {
    let scorer = scorer();
    let records = records_from(20, 5);
    let batch = scorer.predict(&records).unwrap();

    assert_eq!(batch.len(), records.len());
    for (record, scored) in records.iter().zip(&batch) {
        assert_eq!(scored.id, record.id);
        assert_eq!(*scored, scorer.predict_one(record).unwrap());
    }
}

#[test]
fn test_empty_batch_scores_nothing() {
    assert!(scorer().predict(&[]).unwrap().is_empty());
}

#[test]
fn test_missing_column_rejected() {
    let mut record = sample_record();
    record.features.remove("PAY_AMT6");

    match scorer().predict_one(&record) {
        Err(KolosalError::SchemaMismatch { missing, unexpected }) => {
            assert_eq!(missing, vec!["PAY_AMT6".to_string()]);
            assert!(unexpected.is_empty());
        }
        other => panic!("expected schema mismatch, got {other:?}"),
    }
}

#[test]
fn test_extra_column_rejected() {
    let record = sample_record().with_feature("INCOME", 1.0);

    match scorer().predict_one(&record) {
        Err(KolosalError::SchemaMismatch { missing, unexpected }) => {
            assert!(missing.is_empty());
            assert_eq!(unexpected, vec!["INCOME".to_string()]);
        }
        other => panic!("expected schema mismatch, got {other:?}"),
    }
}

#[test]
fn test_non_finite_value_rejected() {
    let record = sample_record().with_feature("AGE", f64::NAN);
    assert!(matches!(scorer().predict_one(&record), Err(KolosalError::ValidationError(_))));
}

#[test]
fn test_missing_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let err = CreditScorer::load(dir.path().join("absent.bin")).unwrap_err();
    assert!(matches!(err, KolosalError::ArtifactNotFound(_)));
}

#[test]
fn test_corrupt_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let path = save_shared_artifact(dir.path());

    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();
    assert!(matches!(CreditScorer::load(&path), Err(KolosalError::ArtifactCorrupt(_))));

    std::fs::write(&path, b"not a model").unwrap();
    assert!(matches!(EnsembleArtifact::load(&path), Err(KolosalError::ArtifactCorrupt(_))));

    let mut truncated = ARTIFACT_MAGIC.to_vec();
    truncated.extend_from_slice(&[0u8; 8]);
    std::fs::write(&path, &truncated).unwrap();
    assert!(matches!(EnsembleArtifact::load(&path), Err(KolosalError::ArtifactCorrupt(_))));
}

#[test]
fn test_model_info() {
    let info = scorer().model_info();

    assert_eq!(info.n_features, 25);
    assert_eq!(info.input_features.len(), 25);
    assert_eq!(info.input_features[0], "ID");
    assert_eq!(info.model_type, "StackedEnsemble");
    assert_eq!(info.classes, vec![0, 1]);
    assert_eq!(info.threshold, 0.5);
    assert_eq!(info.base_learners.len(), 2);
    assert_eq!(info.base_learners[0].kind, "knn");
    assert!(info.holdout_metrics.is_some());
}
