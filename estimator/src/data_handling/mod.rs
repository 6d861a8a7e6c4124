//! Loaders that map tabular behavioral data onto `Trial` records. The numeric
//! core never sees a DataFrame; the `Trial` shape is the whole contract.

use std::path::Path;

use anyhow::{bail, Context, Result};
use polars::prelude::*;

use crate::models::Trial;

pub mod csv_trials;
pub mod xlsx_trials;

pub use csv_trials::CsvTrials;
pub use xlsx_trials::XlsxTrials;

/// Required columns in any tabular source.
pub const REQUIRED_COLUMNS: [&str; 4] = ["subject", "category", "soa_ms", "simultaneous"];

pub trait TrialSource {
    fn load(&self) -> Result<Vec<Trial>>;
}

/// Dispatch on file extension: `.xlsx`/`.xls` via calamine, anything else is
/// read as CSV.
pub fn load_trials(path: &str) -> Result<Vec<Trial>> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "xlsx" | "xls" => XlsxTrials { path: path.to_string(), sheet: 0 }.load(),
        _ => CsvTrials { path: path.to_string() }.load(),
    }
}

/// Convert a loaded DataFrame into trial records. Columns arrive as strings
/// from the Excel reader, so everything is cast through Float64 first.
pub(crate) fn trials_from_dataframe(df: &DataFrame) -> Result<Vec<Trial>> {
    for name in REQUIRED_COLUMNS {
        if !df.get_column_names().iter().any(|c| c.as_str() == name) {
            bail!("input is missing required column `{name}`");
        }
    }

    let df = df
        .clone()
        .lazy()
        .with_columns(REQUIRED_COLUMNS.map(|name| col(name).cast(DataType::Float64)))
        .collect()
        .context("casting trial columns to Float64")?;

    let subject = df.column("subject")?.f64()?;
    let category = df.column("category")?.f64()?;
    let soa_ms = df.column("soa_ms")?.f64()?;
    let simultaneous = df.column("simultaneous")?.f64()?;

    let mut trials = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let (Some(subj), Some(cat), Some(soa), Some(sim)) = (
            subject.get(i),
            category.get(i),
            soa_ms.get(i),
            simultaneous.get(i),
        ) else {
            bail!("row {i}: null value in a required column");
        };
        if subj < 0.0 || cat < 0.0 {
            bail!("row {i}: negative subject or category id");
        }
        trials.push(Trial {
            subject: subj.round() as u32,
            category: cat.round() as u32,
            soa_ms: soa,
            simultaneous: sim != 0.0,
        });
    }
    Ok(trials)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataframe_conversion_maps_all_fields() {
        let df = df![
            "subject" => [1i64, 1, 2],
            "category" => [1i64, 2, 1],
            "soa_ms" => [-150.0, 0.0, 220.5],
            "simultaneous" => [0i64, 1, 0],
        ]
        .unwrap();

        let trials = trials_from_dataframe(&df).unwrap();
        assert_eq!(trials.len(), 3);
        assert_eq!(trials[0].subject, 1);
        assert_eq!(trials[1].category, 2);
        assert!(trials[1].simultaneous);
        assert_eq!(trials[2].soa_ms, 220.5);
        assert!(!trials[2].simultaneous);
    }

    #[test]
    fn missing_column_is_reported_by_name() {
        let df = df![
            "subject" => [1i64],
            "category" => [1i64],
            "soa_ms" => [0.0],
        ]
        .unwrap();

        let err = trials_from_dataframe(&df).unwrap_err();
        assert!(err.to_string().contains("simultaneous"), "{err}");
    }
}
