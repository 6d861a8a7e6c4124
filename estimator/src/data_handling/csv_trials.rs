//! CSV trial loader backed by the polars reader.

use std::path::PathBuf;

use anyhow::{Context, Result};
use polars::prelude::{CsvReadOptions, SerReader};
use tracing::info;

use crate::models::Trial;

use super::{trials_from_dataframe, TrialSource};

pub struct CsvTrials {
    pub path: String,
}

impl TrialSource for CsvTrials {
    fn load(&self) -> Result<Vec<Trial>> {
        info!("Loading trial CSV {}", self.path);
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(PathBuf::from(&self.path)))
            .with_context(|| format!("opening {}", self.path))?
            .finish()
            .with_context(|| format!("parsing {}", self.path))?;

        let trials = trials_from_dataframe(&df)?;
        info!("Loaded {} trials from {}", trials.len(), self.path);
        Ok(trials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn round_trips_a_small_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trials.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "subject,category,soa_ms,simultaneous").unwrap();
        writeln!(file, "1,1,-200,0").unwrap();
        writeln!(file, "1,1,-50.5,1").unwrap();
        writeln!(file, "2,3,310,0").unwrap();

        let trials = CsvTrials { path: path.to_string_lossy().into_owned() }
            .load()
            .unwrap();

        assert_eq!(trials.len(), 3);
        assert_eq!(trials[0], Trial { subject: 1, category: 1, soa_ms: -200.0, simultaneous: false });
        assert_eq!(trials[1].soa_ms, -50.5);
        assert!(trials[1].simultaneous);
        assert_eq!(trials[2].category, 3);
    }

    #[test]
    fn missing_file_is_an_error() {
        let res = CsvTrials { path: "/nonexistent/trials.csv".into() }.load();
        assert!(res.is_err());
    }
}
