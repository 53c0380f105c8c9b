//! Integration tests: training pipeline, transform and out-of-fold stacking

mod common;

use common::{credit_dataset, quick_config, write_csv};
use kolosal_credit::ensemble::{EnsembleState, OutOfFoldGenerator};
use kolosal_credit::export::EnsembleArtifact;
use kolosal_credit::preprocessing::{FeatureTransform, TransformKind};
use kolosal_credit::training::{LearnerConfig, LearnerKind};
use kolosal_credit::pipeline::{PipelineConfig, TrainingPipeline};
use std::collections::HashSet;

#[test]
fn test_pipeline_from_uci_csv() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("credit.csv");
    write_csv(&csv, 240, 11, true);

    let config = quick_config().with_learners(LearnerKind::ALL.to_vec());
    let run = TrainingPipeline::new(config).run(&csv).unwrap();

    let cleaning = run.cleaning.as_ref().unwrap();
    assert_eq!(cleaning.rows_in, 241);
    assert_eq!(cleaning.duplicates_removed, 1);
    assert!(cleaning.imputations.iter().any(|imp| imp.column == "BILL_AMT3" && imp.count == 1));

    assert_eq!(run.n_train + run.n_test, 240);
    assert_eq!(run.report.learners.len(), 3);
    assert_eq!(run.artifact.ensemble.state(), EnsembleState::Ready);
    assert_eq!(run.artifact.feature_columns.len(), 24);

    let holdout = run.holdout.as_ref().unwrap();
    assert_eq!(holdout.n_samples, run.n_test);
    assert!(holdout.auc_roc.unwrap() > 0.6);
}

#[test]
fn test_artifact_round_trip_scores_identically() {
    let dir = tempfile::tempdir().unwrap();
    let data = credit_dataset(200, 3);
    let run = TrainingPipeline::new(quick_config().with_learners(vec![LearnerKind::Knn]))
        .run_dataset(&data)
        .unwrap();

    let path = dir.path().join("model.bin");
    run.save_artifact(&path).unwrap();
    let loaded = EnsembleArtifact::load(&path).unwrap();

    let before = run.artifact.ensemble.predict_proba(&run.artifact.transform.apply(&data.x).unwrap()).unwrap();
    let after = loaded.ensemble.predict_proba(&loaded.transform.apply(&data.x).unwrap()).unwrap();
    assert_eq!(before, after);
    assert_eq!(loaded.metadata, run.artifact.metadata);
}

#[test]
fn test_transform_standardizes_continuous_credit_columns() {
    let data = credit_dataset(400, 5);
    let columns = &data.schema.features;
    for kind in [TransformKind::Power, TransformKind::Standard, TransformKind::OutlierClip { k: 3.0 }] {
        let transform = FeatureTransform::fit(&data.x, columns, kind).unwrap();
        let out = transform.apply(&data.x).unwrap();

        let transformed: HashSet<&str> = transform.transformed_columns().into_iter().collect();
        assert!(transformed.contains("LIMIT_BAL"));
        assert!(transformed.contains("BILL_AMT1"));
        assert!(!transformed.contains("SEX"));
        assert!(!transformed.contains("EDUCATION"));

        for (j, name) in columns.iter().enumerate() {
            let col = out.column(j);
            if transformed.contains(name.as_str()) {
                let mean = col.mean().unwrap();
                let std = col.std(0.0);
                assert!(mean.abs() < 1e-6, "{kind} {name}: mean {mean}");
                assert!((std - 1.0).abs() < 1e-6, "{kind} {name}: std {std}");
            } else {
                assert_eq!(col, data.x.column(j), "{name} should pass through");
            }
        }
    }
}

#[test]
fn test_out_of_fold_rows_never_seen_by_writer() {
    let data = credit_dataset(150, 9);
    let configs = vec![
        LearnerConfig::default_for(LearnerKind::Knn),
        LearnerConfig::default_for(LearnerKind::ExtraTrees),
    ];
    let meta = OutOfFoldGenerator::new(5, 42).generate(&configs, &data.x, &data.y).unwrap();

    let mut held_out = HashSet::new();
    for split in &meta.splits {
        let train: HashSet<usize> = split.train_indices.iter().copied().collect();
        for &row in &split.test_indices {
            assert!(!train.contains(&row));
            assert!(held_out.insert(row), "row {row} held out twice");
        }
    }
    assert_eq!(held_out.len(), 150);
    assert_eq!(meta.matrix.ncols(), 2);
}

#[test]
fn test_exhausted_search_still_trains() {
    let data = credit_dataset(150, 13);
    let config = PipelineConfig::new()
        .with_n_trials(0)
        .with_cv_folds(3)
        .with_learners(vec![LearnerKind::Knn]);
    let run = TrainingPipeline::new(config).run_dataset(&data).unwrap();

    let learner = &run.report.learners[0];
    assert!(learner.exhausted);
    assert!(learner.cv_auc.is_none());
    assert_eq!(learner.config, LearnerConfig::default_for(LearnerKind::Knn));
    assert!(run.artifact.metadata.base_learners[0].exhausted);
}

#[test]
fn test_search_histories_written() {
    let dir = tempfile::tempdir().unwrap();
    let run = TrainingPipeline::new(quick_config())
        .run_dataset(&credit_dataset(150, 17))
        .unwrap();
    run.save_studies(dir.path().join("studies")).unwrap();

    assert!(dir.path().join("studies").join("knn_study.json").exists());
    assert!(dir.path().join("studies").join("gradient_boosting_study.json").exists());
}

#[test]
fn test_missing_target_column_is_schema_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("credit.csv");
    write_csv(&csv, 60, 1, false);

    let config = quick_config();
    let config = PipelineConfig { target_column: "defaulted".to_string(), ..config };
    let err = TrainingPipeline::new(config).run(&csv).unwrap_err();
    assert!(err.to_string().contains("defaulted"));
}
