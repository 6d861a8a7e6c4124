use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::data_handling::load_trials;
use crate::group::aggregate;
use crate::models::{EstimatorConfig, SubjectResult, Trial};
use crate::subject::estimate_subject;

mod data_handling;
mod figures;
mod group;
mod models;
mod numeric;
mod subject;

/// Group inclusion cutoff on a subject's minimum TBW (ms, strict).
const THRESHOLD_MS: f64 = 0.0;
const DEFAULT_DATA_PATH: &str = "./data/tbw_trials.csv";
const OUTPUT_DIR: &str = "./results";

#[derive(Serialize)]
struct FitReport {
    key: String,
    b_av: [f64; 2],
    b_va: [f64; 2],
    bind_av_ms: f64,
    bind_va_ms: f64,
    tbw_ms: f64,
}

#[derive(Serialize)]
struct SubjectReport {
    subject: u32,
    fits: Vec<FitReport>,
    failures: Vec<CategoryFailure>,
}

#[derive(Serialize)]
struct CategoryFailure {
    key: String,
    error: String,
}

#[derive(Serialize)]
struct GroupReport {
    key: String,
    n_subjects_used: usize,
    correlation_r: Option<f64>,
    correlation_p: Option<f64>,
    mean_tbw_ms: f64,
    tbw_t: f64,
    tbw_pvalue: f64,
    left_boundary_ms: f64,
    right_boundary_ms: f64,
}

#[derive(Serialize)]
struct RunConfig<'a> {
    data_path: &'a str,
    estimator: &'a EstimatorConfig,
    threshold_ms: f64,
}

fn subject_report(result: &SubjectResult) -> SubjectReport {
    let mut fits = Vec::new();
    let mut failures = Vec::new();
    for (key, fit) in &result.fits {
        match fit {
            Ok(f) => fits.push(FitReport {
                key: key.to_string(),
                b_av: f.b_av,
                b_va: f.b_va,
                bind_av_ms: f.bind_av_ms,
                bind_va_ms: f.bind_va_ms,
                tbw_ms: f.tbw_ms,
            }),
            Err(e) => failures.push(CategoryFailure {
                key: key.to_string(),
                error: e.to_string(),
            }),
        }
    }
    SubjectReport { subject: result.subject, fits, failures }
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting the TBW pipeline");

    let data_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_DATA_PATH.to_string());
    let cfg = EstimatorConfig::default();

    let out_dir = Path::new(OUTPUT_DIR);
    let figure_dir = out_dir.join("figures");
    fs::create_dir_all(&figure_dir)?;
    write_json(
        &RunConfig { data_path: &data_path, estimator: &cfg, threshold_ms: THRESHOLD_MS },
        &out_dir.join("run_config.json"),
    )?;

    // Load trials and bucket them per subject.
    let trials = load_trials(&data_path)?;
    let mut by_subject: BTreeMap<u32, Vec<Trial>> = BTreeMap::new();
    for t in trials {
        by_subject.entry(t.subject).or_default().push(t);
    }
    info!("{} subject(s) in {}", by_subject.len(), data_path);

    // Subject-level estimation; category failures are logged inside and kept
    // in the result so every other subject and category still runs.
    let mut results: Vec<SubjectResult> = Vec::with_capacity(by_subject.len());
    for (subject, trials) in &by_subject {
        let result = estimate_subject(*subject, trials, &cfg);
        write_json(
            &subject_report(&result),
            &out_dir.join(format!("subject_{subject}.json")),
        )?;
        if let Err(e) = figures::plot_subject(
            &result,
            cfg.hoi,
            figure_dir.join(format!("subject_{subject}.png")).to_str().unwrap(),
        ) {
            warn!("subject {subject}: figure not written ({e})");
        }
        results.push(result);
    }

    // Group aggregation: structural errors abort, per-category failures are
    // reported and skipped.
    let outcomes = aggregate(&results, cfg.hoi, THRESHOLD_MS)?;
    let mut group_reports = Vec::new();
    for (key, outcome) in &outcomes {
        match outcome {
            Ok(summary) => {
                info!(
                    "{key}: n = {}, mean TBW = {:.1} ms (p = {:.4}), boundaries [{:.1}, {:.1}] ms",
                    summary.n_subjects_used,
                    summary.mean_tbw_ms,
                    summary.tbw_pvalue,
                    summary.left_boundary_ms,
                    summary.right_boundary_ms
                );
                group_reports.push(GroupReport {
                    key: key.to_string(),
                    n_subjects_used: summary.n_subjects_used,
                    correlation_r: summary.correlation.map(|c| c.r),
                    correlation_p: summary.correlation.map(|c| c.p),
                    mean_tbw_ms: summary.mean_tbw_ms,
                    tbw_t: summary.tbw_t,
                    tbw_pvalue: summary.tbw_pvalue,
                    left_boundary_ms: summary.left_boundary_ms,
                    right_boundary_ms: summary.right_boundary_ms,
                });

                let scatter = figure_dir.join(format!("group_{key}_scatter.png"));
                if let Err(e) = figures::plot_group_scatter(summary, scatter.to_str().unwrap()) {
                    warn!("{key}: scatter figure not written ({e})");
                }
                let curve = figure_dir.join(format!("group_{key}_mean_curve.png"));
                if let Err(e) = figures::plot_group_mean_curve(
                    summary,
                    &cfg.grid,
                    cfg.hoi,
                    curve.to_str().unwrap(),
                ) {
                    warn!("{key}: mean-curve figure not written ({e})");
                }
            }
            Err(e) => warn!("{key}: no group summary ({e})"),
        }
    }
    write_json(&group_reports, &out_dir.join("group_summary.json"))?;

    info!("Results written to {}", out_dir.display());
    Ok(())
}
