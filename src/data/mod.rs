//! Data source for training: CSV loading, cleaning and the feature schema

mod loader;
mod schema;

pub use loader::{
    age_group, CleanTable, CleaningReport, CreditDataLoader, Dataset, FillStrategy, Imputation,
    RawTable,
};
pub use schema::{FeatureSchema, ID_COLUMN, TARGET_COLUMN};
