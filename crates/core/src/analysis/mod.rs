//! A small pipeline language over the cohort tables.
//!
//! Scripts are newline separated statements. Each statement is a pipeline
//! that starts from a table (`health`, `activity`, or an earlier `let`
//! binding) and threads it through stages:
//!
//! ```text
//! let steps = activity | summarize mean(Physical_activity) as avg_steps by Patient_Number
//! health
//!   | where Smoking == 1 and Chronic_kidney_disease == 1
//!   | join steps on Patient_Number
//!   | summarize mean(avg_steps)
//! ```
//!
//! Every statement that is not a `let` prints its result. A single value
//! prints bare; tables print aligned and capped at twenty rows.

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod render;

use thiserror::Error;

use crate::dataset::Datasets;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("unknown table `{0}` (available: health, activity, or a name bound with let)")]
    UnknownTable(String),
    #[error("column `{column}` not found in `{table}` (available: {available})")]
    UnknownColumn { table: String, column: String, available: String },
    #[error("aggregate `{function}` does not take {actual} column argument(s)")]
    AggregateArity { function: String, actual: usize },
}

/// Parses and evaluates `code` against the datasets, returning printed output.
pub fn run_script(code: &str, datasets: &Datasets) -> Result<String, AnalysisError> {
    let script = parser::parse(code)?;
    eval::execute(&script, datasets)
}
