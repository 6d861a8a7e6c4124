//! group.rs – cross-subject aggregation: inclusion filtering on minimum TBW,
//! binding-point correlation, mean-TBW t-test, and mean-curve boundary
//! read-off.

use statrs::distribution::{ContinuousCDF, StudentsT};
use tracing::{info, warn};

use crate::models::{CategoryKey, GroupSummary, PearsonCorrelation, SubjectResult, TbwError};
use crate::numeric::regional_minima;

/// Aggregation outcome per category; per-category failures are isolated.
pub type GroupOutcomes = Vec<(CategoryKey, Result<GroupSummary, TbwError>)>;

// ───────── statistics helpers ─────────

/// Pearson's correlation coefficient; `None` when either side has zero
/// variance (or fewer than two points).
fn pearson_correlation(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut numerator = 0.0;
    let mut denom_x = 0.0;
    let mut denom_y = 0.0;
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        numerator += dx * dy;
        denom_x += dx * dx;
        denom_y += dy * dy;
    }

    let denominator = denom_x.sqrt() * denom_y.sqrt();
    if denominator == 0.0 {
        return None;
    }
    Some(numerator / denominator)
}

/// Two-sided p-value for a Pearson r over `n` pairs via the t transform.
/// Two points always correlate perfectly and carry no evidence, so n = 2
/// reports p = 1.
fn pearson_pvalue(r: f64, n: usize) -> f64 {
    if n <= 2 {
        return 1.0;
    }
    let df = (n - 2) as f64;
    let denom = 1.0 - r * r;
    if denom <= f64::EPSILON {
        return 0.0;
    }
    let t = r * (df / denom).sqrt();
    let dist = StudentsT::new(0.0, 1.0, df).expect("df >= 1");
    2.0 * (1.0 - dist.cdf(t.abs()))
}

/// One-sample, right-tailed t-test against a null mean of zero.
/// Returns (t, p). A zero-variance sample is handled explicitly rather than
/// producing NaN: every value above zero is maximal evidence, every value at
/// or below zero is none.
fn one_sample_t_right(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let sd = var.sqrt();

    if sd == 0.0 {
        return if mean > 0.0 {
            (f64::INFINITY, 0.0)
        } else if mean < 0.0 {
            (f64::NEG_INFINITY, 1.0)
        } else {
            (0.0, 1.0)
        };
    }

    let t = mean / (sd / n.sqrt());
    let dist = StudentsT::new(0.0, 1.0, n - 1.0).expect("df >= 1");
    (t, 1.0 - dist.cdf(t))
}

// ───────── structural validation ─────────

fn validate_shapes(results: &[SubjectResult]) -> Result<Vec<CategoryKey>, TbwError> {
    let first = results
        .first()
        .ok_or_else(|| TbwError::ShapeMismatch("no subject results to aggregate".into()))?;

    let keys: Vec<CategoryKey> = first.fits.iter().map(|(k, _)| *k).collect();
    if keys.last() != Some(&CategoryKey::Pooled) {
        return Err(TbwError::ShapeMismatch(format!(
            "subject {} is missing the pooled category in last position",
            first.subject
        )));
    }

    for r in results {
        if r.grid != first.grid {
            return Err(TbwError::ShapeMismatch(format!(
                "subject {} uses grid {:?}, expected {:?}",
                r.subject, r.grid, first.grid
            )));
        }
        let r_keys: Vec<CategoryKey> = r.fits.iter().map(|(k, _)| *k).collect();
        if r_keys != keys {
            return Err(TbwError::ShapeMismatch(format!(
                "subject {} category set {:?} differs from {:?}",
                r.subject, r_keys, keys
            )));
        }
    }
    Ok(keys)
}

// ───────── public API ─────────

/// Aggregate per-subject results into one summary per category.
///
/// A subject is included only if every one of its categories fitted and its
/// minimum TBW across all categories strictly exceeds `threshold`; the filter
/// is all-or-nothing per subject. Structural problems (differing grids,
/// missing pooled category) abort the whole run.
pub fn aggregate(
    results: &[SubjectResult],
    hoi: f64,
    threshold: f64,
) -> Result<GroupOutcomes, TbwError> {
    let keys = validate_shapes(results)?;
    let xs = results[0].grid.values();

    let included: Vec<&SubjectResult> = results
        .iter()
        .filter(|r| {
            let mut min_tbw = f64::INFINITY;
            for (key, fit) in &r.fits {
                match fit {
                    Ok(f) => min_tbw = min_tbw.min(f.tbw_ms),
                    Err(e) => {
                        warn!("excluding subject {} ({key} did not fit: {e})", r.subject);
                        return false;
                    }
                }
            }
            if min_tbw > threshold {
                true
            } else {
                info!(
                    "excluding subject {}: minimum TBW {min_tbw:.1} ms not above {threshold}",
                    r.subject
                );
                false
            }
        })
        .collect();

    info!("{} of {} subjects pass the inclusion filter", included.len(), results.len());

    let outcomes = keys
        .iter()
        .enumerate()
        .map(|(ci, &key)| (key, summarize_category(key, ci, &included, &xs, hoi)))
        .collect();
    Ok(outcomes)
}

fn summarize_category(
    key: CategoryKey,
    category_index: usize,
    included: &[&SubjectResult],
    xs: &[f64],
    hoi: f64,
) -> Result<GroupSummary, TbwError> {
    let n = included.len();
    if n < 2 {
        return Err(TbwError::UnderpoweredGroup(format!(
            "{n} subject(s) included for {key}, need at least 2"
        )));
    }

    let mut neg_bind_av = Vec::with_capacity(n);
    let mut bind_va = Vec::with_capacity(n);
    let mut tbw = Vec::with_capacity(n);
    let mut curves: Vec<&[f64]> = Vec::with_capacity(n);
    for r in included {
        // Inclusion guarantees every category fitted.
        let fit = r.fits[category_index].1.as_ref().expect("included subjects have full fits");
        neg_bind_av.push(-fit.bind_av_ms);
        bind_va.push(fit.bind_va_ms);
        tbw.push(fit.tbw_ms);
        curves.push(&fit.binding_curve);
    }

    let correlation = match pearson_correlation(&neg_bind_av, &bind_va) {
        Some(r) => Some(PearsonCorrelation { r, p: pearson_pvalue(r, n) }),
        None => {
            warn!("{key}: binding points have zero variance across subjects, correlation undefined");
            None
        }
    };

    let mean_tbw_ms = tbw.iter().sum::<f64>() / n as f64;
    let (tbw_t, tbw_pvalue) = one_sample_t_right(&tbw);

    // Element-wise mean and (ddof = 1) standard deviation of the stacked
    // binding curves.
    let len = xs.len();
    let mut mean_curve = vec![0.0; len];
    for c in &curves {
        for (m, y) in mean_curve.iter_mut().zip(c.iter()) {
            *m += y;
        }
    }
    for m in &mut mean_curve {
        *m /= n as f64;
    }
    let mut sd_curve = vec![0.0; len];
    for c in &curves {
        for (s, (y, m)) in sd_curve.iter_mut().zip(c.iter().zip(&mean_curve)) {
            *s += (y - m).powi(2);
        }
    }
    for s in &mut sd_curve {
        *s = (*s / (n - 1) as f64).sqrt();
    }

    let diff: Vec<f64> = mean_curve.iter().map(|m| (m - hoi).abs()).collect();
    let minima = regional_minima(&diff);
    let (&first_min, &last_min) = match (minima.first(), minima.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => {
            return Err(TbwError::DegenerateCurve(format!(
                "mean curve for {key} has no regional minimum of |mean - {hoi}|"
            )))
        }
    };

    Ok(GroupSummary {
        key,
        n_subjects_used: n,
        correlation,
        mean_tbw_ms,
        tbw_t,
        tbw_pvalue,
        left_boundary_ms: xs[first_min],
        right_boundary_ms: xs[last_min],
        neg_bind_av_ms: neg_bind_av,
        bind_va_ms: bind_va,
        mean_curve,
        sd_curve,
    })
}
