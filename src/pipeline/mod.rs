//! End-to-end training run
//!
//! Load, clean, split, fit the transform on the training split, fit the
//! stacked ensemble, evaluate on the hold-out split and bundle the artifact.

mod config;

pub use config::PipelineConfig;

use std::path::Path;
use std::time::Instant;
use tracing::info;

use crate::data::{CleaningReport, CreditDataLoader, Dataset};
use crate::ensemble::{EnsembleReport, StackedEnsemble};
use crate::error::{KolosalError, Result};
use crate::export::{ArtifactMetadata, BaseLearnerSummary, EnsembleArtifact};
use crate::inference::DECISION_THRESHOLD;
use crate::preprocessing::FeatureTransform;
use crate::training::{train_test_split, ClassificationMetrics};

/// Everything produced by one training run
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub artifact: EnsembleArtifact,
    pub report: EnsembleReport,
    /// Present when the run started from a raw CSV
    pub cleaning: Option<CleaningReport>,
    pub holdout: Option<ClassificationMetrics>,
    pub n_train: usize,
    pub n_test: usize,
}

impl TrainingRun {
    pub fn save_artifact(&self, path: impl AsRef<Path>) -> Result<()> {
        self.artifact.save(path)
    }

    /// Write each learner's search history as `<learner>_study.json`
    pub fn save_studies(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        for search in &self.report.searches {
            search.study.save(dir.join(format!("{}_study.json", search.kind)))?;
        }
        Ok(())
    }
}

/// Offline training job
#[derive(Debug, Clone, Default)]
pub struct TrainingPipeline {
    config: PipelineConfig,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Train from a raw CSV file
    pub fn run(&self, csv_path: impl AsRef<Path>) -> Result<TrainingRun> {
        self.config.validate()?;
        let raw = CreditDataLoader::new().load_csv(csv_path)?;
        let (clean, cleaning) = raw.clean()?;
        let dataset = clean.to_dataset(&self.config.schema())?;

        let mut run = self.run_dataset(&dataset)?;
        run.cleaning = Some(cleaning);
        Ok(run)
    }

    /// Train from an already cleaned dataset
    pub fn run_dataset(&self, dataset: &Dataset) -> Result<TrainingRun> {
        self.config.validate()?;
        let start = Instant::now();
        if dataset.n_rows() == 0 {
            return Err(KolosalError::DataError("Dataset is empty".to_string()));
        }

        let (train, test) = if self.config.test_fraction > 0.0 {
            let (train_idx, test_idx) = train_test_split(&dataset.y, self.config.test_fraction, self.config.seed)?;
            (dataset.subset(&train_idx), Some(dataset.subset(&test_idx)))
        } else {
            (dataset.clone(), None)
        };
        let n_test = test.as_ref().map_or(0, Dataset::n_rows);

        info!(
            train_rows = train.n_rows(),
            test_rows = n_test,
            positive_rate = train.positive_rate(),
            "Split dataset"
        );

        let columns = &dataset.schema.features;
        let transform = FeatureTransform::fit_with_threshold(
            &train.x,
            columns,
            self.config.transform,
            self.config.continuous_threshold,
        )?;
        let x_train = transform.apply(&train.x)?;

        let mut ensemble = StackedEnsemble::new(self.config.stacking());
        let report = ensemble.fit(&x_train, &train.y)?.clone();

        let holdout = match &test {
            Some(test) => {
                let proba = ensemble.predict_proba(&transform.apply(&test.x)?)?;
                let metrics = ClassificationMetrics::compute(&test.y, &proba, DECISION_THRESHOLD)?;
                info!(
                    auc = metrics.auc_roc.unwrap_or(f64::NAN),
                    accuracy = metrics.accuracy,
                    f1 = metrics.f1_score,
                    "Hold-out evaluation"
                );
                Some(metrics)
            }
            None => None,
        };

        let metadata = ArtifactMetadata {
            model_name: "Stacked Ensemble".to_string(),
            base_learners: report
                .learners
                .iter()
                .map(|l| BaseLearnerSummary {
                    kind: l.kind,
                    params: l.config.params_json().to_string(),
                    cv_auc: l.cv_auc,
                    oof_auc: l.oof_auc,
                    exhausted: l.exhausted,
                })
                .collect(),
            meta_model: "LogisticRegression".to_string(),
            transform: self.config.transform,
            transformed_columns: transform.transformed_columns().iter().map(|c| c.to_string()).collect(),
            n_train_rows: train.n_rows(),
            n_test_rows: n_test,
            train_positive_rate: train.positive_rate(),
            stacked_oof_auc: report.stacked_oof_auc,
            holdout: holdout.clone(),
            seed: self.config.seed,
            training_secs: start.elapsed().as_secs_f64(),
        };

        let artifact = EnsembleArtifact::new(columns.clone(), transform, ensemble, metadata)?;
        info!(elapsed_secs = start.elapsed().as_secs_f64(), "Training run complete");

        Ok(TrainingRun {
            artifact,
            report,
            cleaning: None,
            holdout,
            n_train: train.n_rows(),
            n_test,
        })
    }
}
