//! Excel workbook trial loader: calamine sheet → string DataFrame → trials.

use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook_auto, Reader};
use polars::prelude::*;
use tracing::{debug, info};

use crate::models::Trial;

use super::{trials_from_dataframe, TrialSource};

pub struct XlsxTrials {
    pub path: String,
    /// Zero-based worksheet index.
    pub sheet: usize,
}

fn cell_to_string(cell: &calamine::DataType) -> String {
    use calamine::DataType as Ct;
    match cell {
        Ct::String(s) => s.clone(),
        Ct::Empty => String::new(),
        Ct::Bool(b) => b.to_string(),
        Ct::Error(e) => format!("ERR({e:?})"),
        Ct::Float(n) | Ct::Duration(n) => n.to_string(),
        Ct::Int(i) => i.to_string(),
        Ct::DateTime(f) => f.to_string(),
        Ct::DateTimeIso(s) | Ct::DurationIso(s) => s.clone(),
    }
}

/// Minimal xlsx → String DataFrame reader; numeric casting happens in
/// `trials_from_dataframe`.
fn read_excel(path: &str, sheet_idx: usize) -> Result<DataFrame> {
    let mut wb = open_workbook_auto(path).with_context(|| format!("opening {path}"))?;
    let range = wb
        .worksheet_range_at(sheet_idx)
        .ok_or_else(|| anyhow!("{path}: worksheet {sheet_idx} missing"))?
        .map_err(|e| anyhow!("{path}: {e}"))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| anyhow!("{path}: empty sheet"))?
        .iter()
        .map(cell_to_string)
        .collect();
    debug!("Trial sheet header = {:?}", headers);

    let mut cols: Vec<Vec<Option<String>>> =
        vec![Vec::with_capacity(range.height()); headers.len()];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            cols[i].push(match cell {
                calamine::DataType::Empty => None,
                _ => Some(cell_to_string(cell)),
            });
        }
    }

    let series: Vec<Series> = headers
        .into_iter()
        .zip(cols)
        .map(|(h, c)| Series::new(PlSmallStr::from(h), c))
        .collect();

    DataFrame::new(series.into_iter().map(Into::into).collect()).map_err(Into::into)
}

impl TrialSource for XlsxTrials {
    fn load(&self) -> Result<Vec<Trial>> {
        info!("Loading trial workbook {}", self.path);
        let df = read_excel(&self.path, self.sheet)?;
        let trials = trials_from_dataframe(&df)?;
        info!("Loaded {} trials from {}", trials.len(), self.path);
        Ok(trials)
    }
}
