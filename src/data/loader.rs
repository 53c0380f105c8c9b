//! CSV loading and cleaning for the credit default dataset
//!
//! Loading goes through polars; cleaning (deduplication and imputation)
//! works on a plain column-major table so that every remediation can be
//! logged and reported.

use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::path::Path;
use tracing::{info, warn};

use super::schema::FeatureSchema;
use crate::error::{KolosalError, Result};

/// Upper bounds (exclusive) of the derived age bands; the last band is open ended
const AGE_BANDS: [f64; 4] = [30.0, 40.0, 50.0, 60.0];

/// Map an age in years to its derived age group code
pub fn age_group(age: f64) -> f64 {
    AGE_BANDS.iter().take_while(|&&upper| age >= upper).count() as f64
}

/// Table as read from disk; values may be missing
#[derive(Debug, Clone)]
pub struct RawTable {
    pub columns: Vec<String>,
    /// Column-major values
    pub values: Vec<Vec<Option<f64>>>,
}

/// How a column's missing values were filled
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FillStrategy {
    Mode,
    Median,
}

/// One imputation performed during cleaning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Imputation {
    pub column: String,
    pub strategy: FillStrategy,
    pub count: usize,
    pub value: f64,
}

/// Summary of the remediation applied by [`RawTable::clean`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleaningReport {
    pub rows_in: usize,
    pub duplicates_removed: usize,
    pub imputations: Vec<Imputation>,
}

/// Fully populated table
#[derive(Debug, Clone)]
pub struct CleanTable {
    pub columns: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

/// Feature matrix with labels and record identifiers
#[derive(Debug, Clone)]
pub struct Dataset {
    pub ids: Array1<i64>,
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub schema: FeatureSchema,
}

/// Loads the credit dataset from CSV
#[derive(Debug, Clone, Default)]
pub struct CreditDataLoader {
    infer_schema_length: Option<usize>,
}

impl CreditDataLoader {
    pub fn new() -> Self {
        Self {
            infer_schema_length: Some(100),
        }
    }

    pub fn with_infer_schema_length(mut self, n: usize) -> Self {
        self.infer_schema_length = Some(n);
        self
    }

    /// Read a CSV file, cast every column to f64 and harmonize column names
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<RawTable> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            KolosalError::DataError(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.infer_schema_length)
            .into_reader_with_file_handle(file)
            .finish()?;

        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        let mut values = Vec::with_capacity(names.len());
        for name in &names {
            let series = df.column(name)?.as_materialized_series().cast(&DataType::Float64)?;
            let column: Vec<Option<f64>> = series.f64()?.into_iter().collect();
            values.push(column);
        }

        info!(path = %path.display(), rows = df.height(), columns = names.len(), "Loaded CSV");

        let mut table = RawTable { columns: names, values };
        table.harmonize();
        Ok(table)
    }
}

impl RawTable {
    pub fn new(columns: Vec<String>, values: Vec<Vec<Option<f64>>>) -> Result<Self> {
        if columns.len() != values.len() {
            return Err(KolosalError::ShapeError {
                expected: format!("{} columns", columns.len()),
                actual: format!("{} value columns", values.len()),
            });
        }
        let n_rows = values.first().map_or(0, Vec::len);
        if values.iter().any(|c| c.len() != n_rows) {
            return Err(KolosalError::DataError("Columns have different lengths".to_string()));
        }
        Ok(Self { columns, values })
    }

    pub fn n_rows(&self) -> usize {
        self.values.first().map_or(0, Vec::len)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Bring the public UCI layout in line with the model schema:
    /// `PAY_0` becomes `PAY_1` and a missing `AGE_GROUP` is derived from `AGE`.
    pub fn harmonize(&mut self) {
        if self.position("PAY_1").is_none() {
            if let Some(idx) = self.position("PAY_0") {
                info!("Renaming column PAY_0 to PAY_1");
                self.columns[idx] = "PAY_1".to_string();
            }
        }

        if self.position("AGE_GROUP").is_none() {
            if let Some(age_idx) = self.position("AGE") {
                info!("Deriving AGE_GROUP from AGE");
                let groups = self.values[age_idx].iter().map(|v| v.map(age_group)).collect();
                self.columns.push("AGE_GROUP".to_string());
                self.values.push(groups);
            }
        }
    }

    /// Drop exact duplicate rows and impute missing values.
    ///
    /// Columns with exactly two distinct values are filled with their mode,
    /// every other column with its median.
    pub fn clean(&self) -> Result<(CleanTable, CleaningReport)> {
        let rows_in = self.n_rows();
        let keep = self.unique_rows();
        let duplicates_removed = rows_in - keep.len();
        if duplicates_removed > 0 {
            info!(removed = duplicates_removed, "Removed duplicate rows");
        }

        let mut report = CleaningReport {
            rows_in,
            duplicates_removed,
            imputations: Vec::new(),
        };

        let mut values = Vec::with_capacity(self.columns.len());
        for (name, column) in self.columns.iter().zip(&self.values) {
            let kept: Vec<Option<f64>> = keep.iter().map(|&i| column[i]).collect();
            let present: Vec<f64> = kept.iter().flatten().copied().collect();
            let missing = kept.len() - present.len();

            if missing == 0 {
                values.push(present);
                continue;
            }
            if present.is_empty() {
                return Err(KolosalError::DataError(format!(
                    "Column '{}' has no values to impute from",
                    name
                )));
            }

            let (strategy, fill) = if distinct_count(&present) == 2 {
                (FillStrategy::Mode, mode(&present))
            } else {
                (FillStrategy::Median, median(&present))
            };
            info!(column = %name, count = missing, value = fill, strategy = ?strategy, "Filled missing values");
            report.imputations.push(Imputation {
                column: name.clone(),
                strategy,
                count: missing,
                value: fill,
            });
            values.push(kept.into_iter().map(|v| v.unwrap_or(fill)).collect());
        }

        info!(rows = keep.len(), columns = self.columns.len(), "Data cleaning complete");
        Ok((
            CleanTable {
                columns: self.columns.clone(),
                values,
            },
            report,
        ))
    }

    /// Indices of the first occurrence of every distinct row
    fn unique_rows(&self) -> Vec<usize> {
        let mut seen: HashSet<Vec<Option<u64>>> = HashSet::with_capacity(self.n_rows());
        (0..self.n_rows())
            .filter(|&row| {
                let key = self
                    .values
                    .iter()
                    .map(|c| c[row].map(|v| if v == 0.0 { 0u64 } else { v.to_bits() }))
                    .collect();
                seen.insert(key)
            })
            .collect()
    }
}

impl CleanTable {
    pub fn n_rows(&self) -> usize {
        self.values.first().map_or(0, Vec::len)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.values[i].as_slice())
    }

    /// Select the schema's features in schema order together with labels and ids
    pub fn to_dataset(&self, schema: &FeatureSchema) -> Result<Dataset> {
        let missing: Vec<String> = schema
            .features
            .iter()
            .chain(std::iter::once(&schema.target_column))
            .filter(|f| self.column(f).is_none())
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(KolosalError::SchemaMismatch {
                missing,
                unexpected: Vec::new(),
            });
        }

        let n = self.n_rows();
        let feature_columns: Vec<&[f64]> = schema
            .features
            .iter()
            .filter_map(|f| self.column(f))
            .collect();
        let x = Array2::from_shape_fn((n, feature_columns.len()), |(i, j)| feature_columns[j][i]);

        let target = self.column(&schema.target_column).unwrap_or_default();
        if let Some(bad) = target.iter().find(|&&v| v != 0.0 && v != 1.0) {
            return Err(KolosalError::DataError(format!(
                "Target column '{}' must be 0/1, found {}",
                schema.target_column, bad
            )));
        }
        let y = Array1::from_vec(target.to_vec());

        let ids = match self.column(&schema.id_column) {
            Some(col) => col.iter().map(|&v| v as i64).collect(),
            None => {
                warn!(column = %schema.id_column, "No identifier column, numbering rows from 1");
                (1..=n as i64).collect()
            }
        };

        Ok(Dataset {
            ids,
            x,
            y,
            schema: schema.clone(),
        })
    }
}

impl Dataset {
    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    /// Rows at the given indices, in that order
    pub fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            ids: indices.iter().map(|&i| self.ids[i]).collect(),
            x: self.x.select(Axis(0), indices),
            y: indices.iter().map(|&i| self.y[i]).collect(),
            schema: self.schema.clone(),
        }
    }

    /// Fraction of positive labels
    pub fn positive_rate(&self) -> f64 {
        self.y.mean().unwrap_or(0.0)
    }
}

fn distinct_count(values: &[f64]) -> usize {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    sorted.len()
}

/// Most frequent value; ties resolve to the smallest value
fn mode(values: &[f64]) -> f64 {
    let mut counts: BTreeMap<u64, (f64, usize)> = BTreeMap::new();
    for &v in values {
        counts.entry(v.to_bits()).or_insert((v, 0)).1 += 1;
    }
    counts
        .values()
        .fold(None, |best: Option<(f64, usize)>, &(v, c)| match best {
            Some((bv, bc)) if bc > c || (bc == c && bv <= v) => Some((bv, bc)),
            _ => Some((v, c)),
        })
        .map_or(0.0, |(v, _)| v)
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn table(columns: &[&str], rows: &[&[Option<f64>]]) -> RawTable {
        let values = (0..columns.len())
            .map(|j| rows.iter().map(|r| r[j]).collect())
            .collect();
        RawTable::new(columns.iter().map(|s| s.to_string()).collect(), values).unwrap()
    }

    #[test]
    fn test_age_group_bands() {
        assert_eq!(age_group(21.0), 0.0);
        assert_eq!(age_group(29.9), 0.0);
        assert_eq!(age_group(30.0), 1.0);
        assert_eq!(age_group(45.0), 2.0);
        assert_eq!(age_group(59.0), 3.0);
        assert_eq!(age_group(75.0), 4.0);
    }

    #[test]
    fn test_clean_drops_exact_duplicates() {
        let raw = table(
            &["a", "b"],
            &[
                &[Some(1.0), Some(2.0)],
                &[Some(1.0), Some(2.0)],
                &[Some(1.0), Some(3.0)],
            ],
        );
        let (clean, report) = raw.clean().unwrap();
        assert_eq!(clean.n_rows(), 2);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(clean.column("b").unwrap(), &[2.0, 3.0]);
    }

    #[test]
    fn test_clean_imputes_mode_for_binary_and_median_otherwise() {
        let raw = table(
            &["flag", "amount"],
            &[
                &[Some(1.0), Some(10.0)],
                &[Some(1.0), None],
                &[Some(0.0), Some(30.0)],
                &[None, Some(20.0)],
                &[Some(1.0), Some(100.0)],
            ],
        );
        let (clean, report) = raw.clean().unwrap();
        assert_eq!(clean.column("flag").unwrap()[3], 1.0);
        assert_eq!(clean.column("amount").unwrap()[1], 25.0);
        assert_eq!(report.imputations.len(), 2);
        assert_eq!(report.imputations[0].strategy, FillStrategy::Mode);
        assert_eq!(report.imputations[1].strategy, FillStrategy::Median);
    }

    #[test]
    fn test_clean_rejects_all_missing_column() {
        let raw = table(&["a", "b"], &[&[Some(1.0), None], &[Some(2.0), None]]);
        assert!(raw.clean().is_err());
    }

    #[test]
    fn test_harmonize_renames_and_derives() {
        let mut raw = table(&["AGE", "PAY_0"], &[&[Some(24.0), Some(2.0)], &[Some(52.0), Some(-1.0)]]);
        raw.harmonize();
        assert!(raw.columns.contains(&"PAY_1".to_string()));
        let idx = raw.columns.iter().position(|c| c == "AGE_GROUP").unwrap();
        assert_eq!(raw.values[idx], vec![Some(0.0), Some(3.0)]);
    }

    #[test]
    fn test_to_dataset_reports_missing_columns() {
        let raw = table(&["LIMIT_BAL"], &[&[Some(1.0)]]);
        let (clean, _) = raw.clean().unwrap();
        let err = clean.to_dataset(&FeatureSchema::credit_default()).unwrap_err();
        assert!(matches!(err, KolosalError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_load_csv_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "ID,AGE,PAY_0,default.payment.next.month").unwrap();
        writeln!(file, "1,24,2,1").unwrap();
        writeln!(file, "2,,0,0").unwrap();
        writeln!(file, "3,40,-1,0").unwrap();
        writeln!(file, "4,60,0,1").unwrap();
        drop(file);

        let raw = CreditDataLoader::new().load_csv(&path).unwrap();
        assert_eq!(raw.n_rows(), 4);
        assert!(raw.columns.contains(&"PAY_1".to_string()));
        assert!(raw.columns.contains(&"AGE_GROUP".to_string()));

        let (clean, report) = raw.clean().unwrap();
        assert_eq!(clean.column("AGE").unwrap()[1], 40.0);
        // AGE_GROUP inherits the gap in AGE
        assert_eq!(clean.column("AGE_GROUP").unwrap()[1], 1.0);
        assert_eq!(report.imputations.len(), 2);
    }
}
