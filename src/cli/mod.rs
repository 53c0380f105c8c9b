//! Command-line interface for training, batch scoring and serving

use clap::{Parser, Subcommand};
use colored::*;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::data::{CreditDataLoader, RawTable, ID_COLUMN};
use crate::export::EnsembleArtifact;
use crate::inference::{CreditScorer, CustomerRecord, ScoredRecord};
use crate::pipeline::{PipelineConfig, TrainingPipeline, TrainingRun};
use crate::preprocessing::TransformKind;
use crate::server::{run_server, ServerConfig, DEFAULT_MODEL_PATH};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn warn(s: &str) -> ColoredString   { s.truecolor(230, 190, 90) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(&format!("{:<18}", key)), val.white())
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |v| format!("{:.4}", v))
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "kolosal-credit")]
#[command(author = "KolosalAI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Stacked-ensemble credit default scoring")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train the stacked ensemble and write the model artifact
    Train {
        /// Training CSV with ID, the feature columns and the target
        #[arg(short, long)]
        data: PathBuf,

        /// Artifact output path
        #[arg(short, long, default_value = DEFAULT_MODEL_PATH)]
        output: PathBuf,

        /// JSON pipeline configuration; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Feature transform (power, quantile, standard, outlier)
        #[arg(long)]
        transform: Option<String>,

        /// Search trials per base learner
        #[arg(long)]
        trials: Option<usize>,

        /// Cross-validation folds
        #[arg(long)]
        folds: Option<usize>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Directory for per-learner search histories (JSON)
        #[arg(long)]
        study_dir: Option<PathBuf>,
    },

    /// Score a CSV file with a trained model
    Predict {
        /// Model artifact
        #[arg(short, long)]
        model: PathBuf,

        /// Input CSV with ID and the feature columns
        #[arg(short, long)]
        data: PathBuf,

        /// Output CSV; prints a preview when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start the REST scoring server
    Serve {
        /// Server host (default: API_HOST or 0.0.0.0)
        #[arg(long)]
        host: Option<String>,

        /// Server port (default: API_PORT or 8000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Model artifact (default: MODEL_PATH or artifacts/ensemble_model.bin)
        #[arg(short, long)]
        model: Option<PathBuf>,
    },

    /// Show model artifact information
    Info {
        /// Model artifact
        #[arg(short, long)]
        model: PathBuf,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub struct TrainArgs {
    pub data: PathBuf,
    pub output: PathBuf,
    pub config: Option<PathBuf>,
    pub transform: Option<String>,
    pub trials: Option<usize>,
    pub folds: Option<usize>,
    pub seed: Option<u64>,
    pub study_dir: Option<PathBuf>,
}

/// File config first, then flag overrides
pub fn resolve_config(args: &TrainArgs) -> anyhow::Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(t) = &args.transform {
        config.transform = t.parse::<TransformKind>()?;
    }
    if let Some(n) = args.trials {
        config.n_trials = n;
    }
    if let Some(k) = args.folds {
        config.cv_folds = k;
    }
    if let Some(s) = args.seed {
        config.seed = s;
    }
    config.validate()?;
    Ok(config)
}

pub fn cmd_train(args: TrainArgs) -> anyhow::Result<()> {
    section("Train");
    let config = resolve_config(&args)?;

    step_run(&format!("Training on {}", args.data.display()));
    let start = Instant::now();
    let run = TrainingPipeline::new(config).run(&args.data)?;
    step_done(&format!("{:.1}s", start.elapsed().as_secs_f64()));

    step_run(&format!("Saving → {}", args.output.display()));
    run.save_artifact(&args.output)?;
    step_done("");

    if let Some(dir) = &args.study_dir {
        step_run(&format!("Writing search histories → {}", dir.display()));
        run.save_studies(dir)?;
        step_done("");
    }

    print_training_summary(&run);
    Ok(())
}

fn print_training_summary(run: &TrainingRun) {
    section("Summary");
    if let Some(cleaning) = &run.cleaning {
        println!("  {}", kv("Rows read", &cleaning.rows_in.to_string()));
        println!("  {}", kv("Duplicates removed", &cleaning.duplicates_removed.to_string()));
        println!("  {}", kv("Columns imputed", &cleaning.imputations.len().to_string()));
    }
    println!("  {}", kv("Train rows", &run.n_train.to_string()));
    println!("  {}", kv("Test rows", &run.n_test.to_string()));

    section("Base learners");
    for learner in &run.report.learners {
        let flag = if learner.exhausted { warn(" (defaults)") } else { "".normal() };
        println!(
            "  {:<20} {} {}  {} {}{}",
            learner.kind.model_name().cyan(),
            muted("cv auc"),
            fmt_opt(learner.cv_auc).white().bold(),
            muted("oof auc"),
            format!("{:.4}", learner.oof_auc).white(),
            flag
        );
    }
    println!("  {}", kv("Stacked OOF AUC", &format!("{:.4}", run.report.stacked_oof_auc)));

    if let Some(m) = &run.holdout {
        section("Hold-out");
        println!("  {}", kv("ROC AUC", &fmt_opt(m.auc_roc)));
        println!("  {}", kv("Accuracy", &format!("{:.4}", m.accuracy)));
        println!("  {}", kv("Precision", &format!("{:.4}", m.precision)));
        println!("  {}", kv("Recall", &format!("{:.4}", m.recall)));
        println!("  {}", kv("F1", &format!("{:.4}", m.f1_score)));
        println!("  {}", kv("Log loss", &format!("{:.4}", m.log_loss)));
    }
    println!();
}

/// Turn CSV rows into records carrying only the model's feature columns
pub fn records_from_table(table: &RawTable, features: &[String]) -> anyhow::Result<Vec<CustomerRecord>> {
    let n = table.n_rows();
    let id_col = table.columns.iter().position(|c| c == ID_COLUMN);
    let feature_cols: Vec<(String, usize)> = features
        .iter()
        .filter_map(|f| table.columns.iter().position(|c| c == f).map(|i| (f.clone(), i)))
        .collect();

    (0..n)
        .map(|row| {
            let id = match id_col {
                Some(c) => table.values[c][row]
                    .ok_or_else(|| anyhow::anyhow!("Row {} has no {}", row + 1, ID_COLUMN))? as i64,
                None => row as i64 + 1,
            };
            let mut record = CustomerRecord::new(id);
            for (name, col) in &feature_cols {
                let value = table.values[*col][row]
                    .ok_or_else(|| anyhow::anyhow!("Record {} is missing a value for {}", id, name))?;
                record = record.with_feature(name.clone(), value);
            }
            Ok(record)
        })
        .collect()
}

fn write_predictions(path: &Path, scored: &[ScoredRecord]) -> anyhow::Result<()> {
    let mut df = df!(
        "ID" => scored.iter().map(|s| s.id).collect::<Vec<i64>>(),
        "default_probability" => scored.iter().map(|s| s.default_probability).collect::<Vec<f64>>(),
        "default_prediction" => scored.iter().map(|s| s.default_prediction as i32).collect::<Vec<i32>>(),
        "default_label" => scored.iter().map(|s| s.default_label.clone()).collect::<Vec<String>>(),
        "risk_level" => scored.iter().map(|s| s.risk_level.to_string()).collect::<Vec<String>>(),
    )?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    CsvWriter::new(&mut file).finish(&mut df)?;
    Ok(())
}

pub fn cmd_predict(model_path: &Path, data_path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading model");
    let scorer = CreditScorer::load(model_path)?;
    step_done(&format!("{} features", scorer.feature_columns().len()));

    step_run("Loading data");
    let table = CreditDataLoader::new().load_csv(data_path)?;
    let records = records_from_table(&table, scorer.feature_columns())?;
    step_done(&format!("{} records", records.len()));

    step_run("Scoring");
    let start = Instant::now();
    let scored = scorer.predict(&records)?;
    step_done(&format!("{:?}", start.elapsed()));

    let defaults = scored.iter().filter(|s| s.default_prediction == 1).count();
    println!();
    println!("  {}", kv("Records", &scored.len().to_string()));
    println!("  {}", kv("Predicted default", &defaults.to_string()));

    match output {
        Some(path) => {
            write_predictions(path, &scored)?;
            println!("  {}", kv("Written to", &path.display().to_string()));
        }
        None => {
            section("Preview");
            for s in scored.iter().take(10) {
                println!(
                    "  {:>8}  {:.4}  {:<10}  {}",
                    s.id,
                    s.default_probability,
                    s.default_label,
                    accent(s.risk_level.as_str())
                );
            }
        }
    }
    println!();
    Ok(())
}

pub fn cmd_info(model_path: &Path) -> anyhow::Result<()> {
    let artifact = EnsembleArtifact::load(model_path)?;
    let info = CreditScorer::from_artifact(artifact)?.model_info();

    println!();
    line_box_top();
    line_box(&format!("{}", info.model_name.white().bold()));
    line_box(&kv("Type", &info.model_type));
    line_box(&kv("Meta model", &info.meta_model));
    line_box(&kv("Transform", &info.transform));
    line_box(&kv("Format version", &info.format_version.to_string()));
    line_box(&kv("Created", &info.created_at));
    line_box(&kv("Input features", &info.n_features.to_string()));
    line_box(&kv("Train rows", &info.n_train_rows.to_string()));
    line_box_bottom();

    section("Base learners");
    for learner in &info.base_learners {
        println!("  {} {}", learner.name.cyan(), muted(&format!("cv auc {}", fmt_opt(learner.cv_auc))));
        println!("    {}", dim(&learner.params.to_string()));
    }

    if let Some(m) = &info.holdout_metrics {
        section("Hold-out");
        println!("  {}", kv("ROC AUC", &fmt_opt(m.auc_roc)));
        println!("  {}", kv("Accuracy", &format!("{:.4}", m.accuracy)));
        println!("  {}", kv("F1", &format!("{:.4}", m.f1_score)));
    }
    println!();
    Ok(())
}

pub async fn cmd_serve(host: Option<String>, port: Option<u16>, model: Option<PathBuf>) -> anyhow::Result<()> {
    let mut config = ServerConfig::default();
    if let Some(host) = host {
        config = config.with_host(host);
    }
    if let Some(port) = port {
        config = config.with_port(port);
    }
    if let Some(model) = model {
        config = config.with_model_path(model);
    }
    run_server(config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> TrainArgs {
        TrainArgs {
            data: PathBuf::from("train.csv"),
            output: PathBuf::from(DEFAULT_MODEL_PATH),
            config: None,
            transform: None,
            trials: None,
            folds: None,
            seed: None,
            study_dir: None,
        }
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = resolve_config(&TrainArgs {
            transform: Some("quantile".to_string()),
            trials: Some(4),
            seed: Some(9),
            ..args()
        })
        .unwrap();
        assert_eq!(config.transform, TransformKind::Quantile);
        assert_eq!(config.n_trials, 4);
        assert_eq!(config.seed, 9);
        assert_eq!(config.cv_folds, 5);
    }

    #[test]
    fn test_bad_transform_rejected() {
        assert!(resolve_config(&TrainArgs { transform: Some("log".to_string()), ..args() }).is_err());
    }

    #[test]
    fn test_records_from_table() {
        let table = RawTable::new(
            vec!["ID".to_string(), "AGE".to_string(), "OTHER".to_string()],
            vec![vec![Some(5.0), Some(6.0)], vec![Some(30.0), Some(41.0)], vec![Some(1.0), None]],
        )
        .unwrap();
        let records = records_from_table(&table, &["AGE".to_string()]).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].id, 6);
        assert_eq!(records[1].features["AGE"], 41.0);
        assert!(!records[0].features.contains_key("OTHER"));
    }

    #[test]
    fn test_cli_parses_train() {
        let cli = Cli::try_parse_from(["kolosal-credit", "train", "--data", "d.csv", "--trials", "3"]).unwrap();
        match cli.command {
            Commands::Train { trials, output, .. } => {
                assert_eq!(trials, Some(3));
                assert_eq!(output, PathBuf::from(DEFAULT_MODEL_PATH));
            }
            _ => panic!("expected train"),
        }
    }
}
