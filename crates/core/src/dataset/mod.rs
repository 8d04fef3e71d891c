//! The two cohort tables the analysis tool reads.
//!
//! `health` holds one row per patient; `activity` is longitudinal, ten daily
//! step counts per patient keyed by the same `Patient_Number`. Both are loaded
//! once at startup and shared read-only between requests.

pub mod loader;
pub mod mock;
pub mod table;

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::config::DatasetConfig;
pub use table::Table;

pub const HEALTH_TABLE: &str = "health";
pub const ACTIVITY_TABLE: &str = "activity";
pub const PATIENT_KEY: &str = "Patient_Number";

pub const HEALTH_COLUMNS: &[&str] = &[
    "Patient_Number",
    "Blood_Pressure_Abnormality",
    "Level_of_Hemoglobin",
    "Genetic_Pedigree_Coefficient",
    "Age",
    "BMI",
    "Sex",
    "Pregnancy",
    "Smoking",
    "salt_content_in_the_diet",
    "alcohol_consumption_per_day",
    "Level_of_Stress",
    "Chronic_kidney_disease",
    "Adrenal_and_thyroid_disorders",
];

pub const ACTIVITY_COLUMNS: &[&str] = &["Patient_Number", "Day_Number", "Physical_activity"];

pub const SCHEMA_CONTEXT: &str = "\
TABLE 1: health (one row per patient)
- Patient_Number: (int) unique patient id
- Blood_Pressure_Abnormality: (int) 0 = normal, 1 = abnormal
- Level_of_Hemoglobin: (float) g/dl
- Genetic_Pedigree_Coefficient: (float) 0 to 1 (0 = distant, 1 = immediate family history)
- Age: (int) years
- BMI: (float) body mass index
- Sex: (int) 0 = male, 1 = female
- Pregnancy: (int) 0 = no, 1 = yes
- Smoking: (int) 0 = no, 1 = yes
- salt_content_in_the_diet: (int) mg/day
- alcohol_consumption_per_day: (int) ml/day
- Level_of_Stress: (int) 1 = low, 2 = normal, 3 = high (ordinal)
- Chronic_kidney_disease: (int) 0 = no, 1 = yes
- Adrenal_and_thyroid_disorders: (int) 0 = no, 1 = yes

TABLE 2: activity (longitudinal, multiple rows per patient)
- Patient_Number: (int) key into health
- Day_Number: (int) 1 to 10
- Physical_activity: (int) steps per day over the last 10 days
";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("could not read dataset file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("dataset is empty: {0}")]
    Empty(String),
    #[error("{origin} line {line}: expected {expected} cells, found {actual}")]
    ColumnMismatch { origin: String, line: usize, expected: usize, actual: usize },
    #[error("{origin} line {line}: cell is not numeric")]
    InvalidNumber { origin: String, line: usize },
    #[error("dataset `{table}` is missing required column `{column}`")]
    MissingColumn { table: String, column: String },
}

/// Immutable dataset handles bound into the analysis tool.
#[derive(Clone, Debug, PartialEq)]
pub struct Datasets {
    pub health: Table,
    pub activity: Table,
}

impl Datasets {
    pub fn new(health: Table, activity: Table) -> Result<Self, DatasetError> {
        for table in [&health, &activity] {
            if !table.has_column(PATIENT_KEY) {
                return Err(DatasetError::MissingColumn {
                    table: table.name().to_string(),
                    column: PATIENT_KEY.to_string(),
                });
            }
        }
        Ok(Self { health: health.renamed(HEALTH_TABLE), activity: activity.renamed(ACTIVITY_TABLE) })
    }

    /// Reads both CSV files when configured, otherwise synthesizes the mock cohort.
    pub fn load(config: &DatasetConfig) -> Result<Self, DatasetError> {
        match (&config.health_path, &config.activity_path) {
            (Some(health_path), Some(activity_path)) => {
                let health = loader::read_csv_table(HEALTH_TABLE, health_path)?;
                let activity = loader::read_csv_table(ACTIVITY_TABLE, activity_path)?;
                info!(
                    event_name = "system.datasets.loaded",
                    correlation_id = "bootstrap",
                    source = "csv",
                    health_rows = health.len(),
                    activity_rows = activity.len(),
                    "datasets loaded from csv"
                );
                Self::new(health, activity)
            }
            _ => {
                let datasets = Self::mock(config.mock_patients, config.mock_seed);
                info!(
                    event_name = "system.datasets.loaded",
                    correlation_id = "bootstrap",
                    source = "mock",
                    seed = config.mock_seed,
                    health_rows = datasets.health.len(),
                    activity_rows = datasets.activity.len(),
                    "synthetic datasets generated"
                );
                Ok(datasets)
            }
        }
    }

    pub fn mock(patients: usize, seed: u64) -> Self {
        let (health, activity) = mock::generate(patients, seed);
        Self { health, activity }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        match name {
            HEALTH_TABLE => Some(&self.health),
            ACTIVITY_TABLE => Some(&self.activity),
            _ => None,
        }
    }

    pub fn schema_context(&self) -> &'static str {
        SCHEMA_CONTEXT
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{DatasetError, Datasets, Table, ACTIVITY_TABLE, HEALTH_TABLE};
    use crate::config::DatasetConfig;

    #[test]
    fn load_without_paths_uses_mock_cohort() {
        let config = DatasetConfig { mock_patients: 40, ..DatasetConfig::default() };
        let datasets = Datasets::load(&config).expect("mock datasets");

        assert_eq!(datasets.health.len(), 40);
        assert_eq!(datasets.activity.len(), 400);
        assert_eq!(datasets.table(HEALTH_TABLE).map(Table::name), Some(HEALTH_TABLE));
        assert!(datasets.table("patients").is_none());
    }

    #[test]
    fn load_reads_configured_csv_files() {
        let dir = TempDir::new().expect("tempdir");
        let health_path = dir.path().join("health.csv");
        let activity_path = dir.path().join("activity.csv");
        fs::write(&health_path, "Patient_Number,Smoking\n1,1\n2,0\n").expect("write health");
        fs::write(&activity_path, "Patient_Number,Day_Number,Physical_activity\n1,1,300\n")
            .expect("write activity");

        let datasets = Datasets::load(&DatasetConfig {
            health_path: Some(health_path),
            activity_path: Some(activity_path),
            ..DatasetConfig::default()
        })
        .expect("csv datasets");

        assert_eq!(datasets.health.len(), 2);
        assert_eq!(datasets.activity.name(), ACTIVITY_TABLE);
    }

    #[test]
    fn tables_without_patient_key_are_rejected() {
        let health = Table::new("h", vec!["Age".to_string()], vec![vec![40.0]]);
        let activity = Table::new("a", vec!["Patient_Number".to_string()], vec![vec![1.0]]);

        assert!(matches!(
            Datasets::new(health, activity),
            Err(DatasetError::MissingColumn { ref column, .. }) if column == "Patient_Number"
        ));
    }

    #[test]
    fn schema_context_names_both_tables() {
        let datasets = Datasets::mock(1, 42);
        let schema = datasets.schema_context();
        assert!(schema.contains("health"));
        assert!(schema.contains("activity"));
        assert!(schema.contains("Chronic_kidney_disease"));
    }
}
