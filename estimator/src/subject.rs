//! subject.rs – per-subject temporal binding window estimation: split each
//! category's trials into AV / VA halves, fit a logistic curve to each, read
//! the binding points at the target level and splice the combined curve.

use linfa::prelude::*;
use linfa_logistic::LogisticRegression;
use log::{info, warn};
use ndarray::{Array1, Array2};

use crate::models::{CategoryFit, CategoryKey, EstimatorConfig, SubjectResult, Trial, TbwError};
use crate::numeric::{logistic_curve, nearest_to_level};

// ───────── helpers ─────────

fn fit_logistic_half(rows: &[(f64, bool)], side: &str) -> Result<[f64; 2], TbwError> {
    if rows.len() < 2 {
        return Err(TbwError::InsufficientData(format!(
            "{side} half has {} trial(s), need at least 2",
            rows.len()
        )));
    }
    let positives = rows.iter().filter(|(_, s)| *s).count();
    if positives == 0 || positives == rows.len() {
        return Err(TbwError::InsufficientData(format!(
            "{side} half responses do not vary ({positives}/{} simultaneous)",
            rows.len()
        )));
    }

    let mut x = Array2::<f64>::zeros((rows.len(), 1));
    for (i, (soa, _)) in rows.iter().enumerate() {
        x[[i, 0]] = *soa;
    }
    let y: Array1<u8> = rows.iter().map(|(_, s)| u8::from(*s)).collect();

    // Plain maximum-likelihood fit; only the point estimates are consumed.
    let model = LogisticRegression::default()
        .max_iterations(100)
        .gradient_tolerance(1e-6)
        .alpha(0.0)
        .fit(&Dataset::new(x, y))
        .map_err(|e| TbwError::InsufficientData(format!("{side} logistic fit failed: {e}")))?;

    Ok([model.intercept(), model.params()[0]])
}

/// Concatenate the AV curve up to and including the first index where it
/// exceeds the VA curve, then the VA curve after that index.
pub(crate) fn splice_curves(y_av: &[f64], y_va: &[f64]) -> Result<Vec<f64>, TbwError> {
    let cut_id = y_av
        .iter()
        .zip(y_va)
        .position(|(av, va)| av > va)
        .ok_or_else(|| {
            TbwError::DegenerateCurve("AV curve never exceeds VA curve on the grid".into())
        })?;

    let mut curve = Vec::with_capacity(y_av.len());
    curve.extend_from_slice(&y_av[..=cut_id]);
    curve.extend_from_slice(&y_va[cut_id + 1..]);
    Ok(curve)
}

// ───────── per-category fit ─────────

fn fit_category(
    subject: u32,
    key: CategoryKey,
    mut rows: Vec<(f64, bool)>,
    cfg: &EstimatorConfig,
    xs: &[f64],
) -> Result<CategoryFit, TbwError> {
    if xs.len() < 2 {
        return Err(TbwError::InsufficientData(
            "evaluation grid has fewer than two points".into(),
        ));
    }
    if rows.len() < 2 {
        return Err(TbwError::InsufficientData(format!(
            "{} trial(s) in {key}, need at least 2",
            rows.len()
        )));
    }

    // Sort by SOA, then split positionally: first ceil(n/2) rows are the
    // audio-leading half, the rest the visual-leading half.
    rows.sort_by(|a, b| a.0.total_cmp(&b.0));
    let half = (rows.len() + 1) / 2;
    let (av_rows, va_rows) = rows.split_at(half);

    let b_av = fit_logistic_half(av_rows, "AV")?;
    let b_va = fit_logistic_half(va_rows, "VA")?;

    let y_av = logistic_curve(&b_av, xs);
    let y_va = logistic_curve(&b_va, xs);

    let bind_av_ms = xs[nearest_to_level(&y_av, cfg.hoi).expect("grid is non-empty")];
    let bind_va_ms = xs[nearest_to_level(&y_va, cfg.hoi).expect("grid is non-empty")];

    // Negate-then-add convention: the AV binding point sits at negative SOA
    // for a well-formed fit, so this is the width of the window.
    let tbw_ms = bind_va_ms + (-bind_av_ms);
    if tbw_ms < 0.0 {
        warn!(
            "subject {subject} {key}: negative TBW ({tbw_ms:.1} ms, \
             bind_av = {bind_av_ms:.1}, bind_va = {bind_va_ms:.1})"
        );
    }

    let binding_curve = splice_curves(&y_av, &y_va)?;

    Ok(CategoryFit {
        key,
        b_av,
        b_va,
        bind_av_ms,
        bind_va_ms,
        tbw_ms,
        binding_curve,
    })
}

// ───────── public API ─────────

/// Fit every observed category of one subject, plus the pooled all-trials
/// category (always last). Failed categories are kept as errors so the rest
/// of the subject's fits still come through.
pub fn estimate_subject(subject: u32, trials: &[Trial], cfg: &EstimatorConfig) -> SubjectResult {
    let xs = cfg.grid.values();

    let mut observed: Vec<u32> = trials.iter().map(|t| t.category).collect();
    observed.sort_unstable();
    observed.dedup();

    let mut keys: Vec<CategoryKey> =
        observed.iter().map(|&c| CategoryKey::Observed(c)).collect();
    keys.push(CategoryKey::Pooled);

    let mut fits = Vec::with_capacity(keys.len());
    for key in keys {
        let rows: Vec<(f64, bool)> = trials
            .iter()
            .filter(|t| match key {
                CategoryKey::Observed(c) => t.category == c,
                CategoryKey::Pooled => true,
            })
            .map(|t| (t.soa_ms, t.simultaneous))
            .collect();

        let fit = fit_category(subject, key, rows, cfg, &xs);
        match &fit {
            Ok(f) => info!(
                "subject {subject} {key}: bind_av = {:.1} ms, bind_va = {:.1} ms, TBW = {:.1} ms",
                f.bind_av_ms, f.bind_va_ms, f.tbw_ms
            ),
            Err(e) => warn!("subject {subject} {key}: {e}"),
        }
        fits.push((key, fit));
    }

    SubjectResult { subject, grid: cfg.grid, fits }
}

/// Sanity check used by callers that want to flag anomalous subjects early:
/// a well-formed fit has its AV binding point at or left of zero and its VA
/// binding point at or right of zero.
pub fn is_well_formed(fit: &CategoryFit) -> bool {
    fit.bind_av_ms <= 0.0 && fit.bind_va_ms >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GridSpec;

    fn test_config() -> EstimatorConfig {
        // Coarser grid than production keeps the tests fast; the estimator
        // only sees the grid through GridSpec.
        EstimatorConfig {
            hoi: 0.5,
            grid: GridSpec { x_bound_ms: 750.0, dx_ms: 1.0 },
        }
    }

    /// 20 trials, offsets evenly spaced over ±500 ms, judged simultaneous
    /// inside ±100 ms.
    fn window_trials(subject: u32, category: u32) -> Vec<Trial> {
        (0..20)
            .map(|i| {
                let soa_ms = -500.0 + i as f64 * (1000.0 / 19.0);
                Trial {
                    subject,
                    category,
                    soa_ms,
                    simultaneous: soa_ms.abs() < 100.0,
                }
            })
            .collect()
    }

    #[test]
    fn single_category_subject_recovers_a_window() {
        let trials = window_trials(1, 1);
        let result = estimate_subject(1, &trials, &test_config());

        assert_eq!(result.fits.len(), 2);
        assert_eq!(result.fits[0].0, CategoryKey::Observed(1));
        assert_eq!(result.fits[1].0, CategoryKey::Pooled);

        for (_, fit) in &result.fits {
            let fit = fit.as_ref().expect("both categories should fit");
            assert!(fit.bind_av_ms <= 0.0, "bind_av = {}", fit.bind_av_ms);
            assert!(fit.bind_va_ms >= 0.0, "bind_va = {}", fit.bind_va_ms);
            assert!(fit.tbw_ms > 0.0, "tbw = {}", fit.tbw_ms);
            assert!(is_well_formed(fit));
            assert_eq!(fit.binding_curve.len(), test_config().grid.len());
            // Steep fits may saturate to 0/1 in f64 at the grid extremes.
            assert!(fit.binding_curve.iter().all(|y| (0.0..=1.0).contains(y)));
            let peak = fit.binding_curve.iter().cloned().fold(0.0, f64::max);
            assert!(peak > 0.5, "peak = {peak}");
        }
    }

    #[test]
    fn estimation_is_idempotent() {
        let trials = window_trials(7, 3);
        let cfg = test_config();
        let a = estimate_subject(7, &trials, &cfg);
        let b = estimate_subject(7, &trials, &cfg);
        assert_eq!(a, b);
    }

    #[test]
    fn flat_response_category_fails_alone() {
        let mut trials = window_trials(2, 1);
        // Second category: never judged simultaneous anywhere.
        trials.extend((0..20).map(|i| Trial {
            subject: 2,
            category: 2,
            soa_ms: -500.0 + i as f64 * (1000.0 / 19.0),
            simultaneous: false,
        }));

        let result = estimate_subject(2, &trials, &test_config());
        assert_eq!(result.fits.len(), 3);

        assert!(result.fits[0].1.is_ok(), "category 1 should still fit");
        match &result.fits[1].1 {
            Err(TbwError::InsufficientData(_)) => {}
            other => panic!("expected InsufficientData for category 2, got {other:?}"),
        }
        // Pooled mixes both categories, so it still has response variation.
        assert!(result.fits[2].1.is_ok(), "pooled category should still fit");
    }

    #[test]
    fn tiny_category_is_insufficient() {
        let trials = vec![Trial { subject: 3, category: 1, soa_ms: 0.0, simultaneous: true }];
        let result = estimate_subject(3, &trials, &test_config());
        for (_, fit) in &result.fits {
            assert!(matches!(fit, Err(TbwError::InsufficientData(_))));
        }
    }

    #[test]
    fn single_point_grid_is_rejected() {
        let cfg = EstimatorConfig {
            hoi: 0.5,
            grid: GridSpec { x_bound_ms: 0.0, dx_ms: 0.1 },
        };
        let result = estimate_subject(4, &window_trials(4, 1), &cfg);
        for (_, fit) in &result.fits {
            assert!(matches!(fit, Err(TbwError::InsufficientData(_))));
        }
    }

    #[test]
    fn splice_keeps_av_left_of_cut_and_va_right_of_it() {
        let y_av = vec![0.1, 0.3, 0.6, 0.8, 0.9];
        let y_va = vec![0.9, 0.8, 0.5, 0.3, 0.1];
        // First index where AV exceeds VA is 2.
        let curve = splice_curves(&y_av, &y_va).unwrap();
        assert_eq!(curve.len(), y_av.len());
        assert_eq!(curve[1], y_av[1]);
        assert_eq!(curve[2], y_av[2]);
        assert_eq!(curve[3], y_va[3]);
        assert_eq!(&curve[..=2], &y_av[..=2]);
        assert_eq!(&curve[3..], &y_va[3..]);
    }

    #[test]
    fn splice_without_crossing_is_degenerate() {
        let y_av = vec![0.1, 0.2, 0.3];
        let y_va = vec![0.5, 0.6, 0.7];
        assert!(matches!(
            splice_curves(&y_av, &y_va),
            Err(TbwError::DegenerateCurve(_))
        ));
    }
}
