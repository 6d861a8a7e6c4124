//! Shared data structures and error kinds for the TBW pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One behavioral trial: a stimulus-onset asynchrony (SOA, ms) and the
/// subject's simultaneity judgment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trial {
    pub subject: u32,
    pub category: u32,
    pub soa_ms: f64,
    pub simultaneous: bool,
}

/// A per-subject category: either one of the observed category ids, or the
/// synthetic pooled category that aggregates every trial of that subject.
/// The pooled category is always present and always last in a subject's fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CategoryKey {
    Observed(u32),
    Pooled,
}

impl std::fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CategoryKey::Observed(id) => write!(f, "category_{id}"),
            CategoryKey::Pooled => write!(f, "pooled"),
        }
    }
}

/// The shared evaluation grid: symmetric about 0, from `-x_bound_ms` to
/// `+x_bound_ms` inclusive in steps of `dx_ms`. Every subject in a run is
/// evaluated on the same grid so curves can be stacked at group level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub x_bound_ms: f64,
    pub dx_ms: f64,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self { x_bound_ms: 750.0, dx_ms: 0.1 }
    }
}

impl GridSpec {
    pub fn len(&self) -> usize {
        (2.0 * self.x_bound_ms / self.dx_ms).round() as usize + 1
    }

    pub fn values(&self) -> Vec<f64> {
        let n = self.len();
        (0..n).map(|i| -self.x_bound_ms + i as f64 * self.dx_ms).collect()
    }
}

/// Subject-level estimation parameters. `hoi` is the target probability level
/// the binding points are read at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub hoi: f64,
    pub grid: GridSpec,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self { hoi: 0.5, grid: GridSpec::default() }
    }
}

/// Fitted result for one subject/category pair.
///
/// `b_av`/`b_va` are (intercept, slope) of the two logistic fits. The binding
/// points are grid values where each curve is closest to the target level;
/// `tbw_ms = bind_va_ms - bind_av_ms`. `binding_curve` is the spliced
/// AV-then-VA curve on the shared grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryFit {
    pub key: CategoryKey,
    pub b_av: [f64; 2],
    pub b_va: [f64; 2],
    pub bind_av_ms: f64,
    pub bind_va_ms: f64,
    pub tbw_ms: f64,
    pub binding_curve: Vec<f64>,
}

/// All category fits for one subject. Failed categories are carried alongside
/// successful ones so one bad category cannot hide the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectResult {
    pub subject: u32,
    pub grid: GridSpec,
    pub fits: Vec<(CategoryKey, Result<CategoryFit, TbwError>)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PearsonCorrelation {
    pub r: f64,
    pub p: f64,
}

/// Group-level summary for one category across included subjects.
///
/// `correlation` is `None` when either binding-point vector has zero variance
/// across subjects (r undefined). Boundaries are read off the mean binding
/// curve at its regional minima of |mean - hoi|.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub key: CategoryKey,
    pub n_subjects_used: usize,
    pub correlation: Option<PearsonCorrelation>,
    pub mean_tbw_ms: f64,
    pub tbw_t: f64,
    pub tbw_pvalue: f64,
    pub left_boundary_ms: f64,
    pub right_boundary_ms: f64,
    /// Per included subject, aligned: negated AV binding point and VA binding
    /// point (the correlation inputs, kept for scatter plotting).
    pub neg_bind_av_ms: Vec<f64>,
    pub bind_va_ms: Vec<f64>,
    pub mean_curve: Vec<f64>,
    pub sd_curve: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TbwError {
    /// Too few observations, or no response variation, to fit a logistic
    /// model (also covers a grid degenerated to fewer than two points).
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// The AV/VA curves never cross when splicing, or the mean-curve minimum
    /// search found no regional minimum.
    #[error("degenerate curve: {0}")]
    DegenerateCurve(String),

    /// Fewer than two subjects passed the inclusion filter; correlation and
    /// t-test are undefined.
    #[error("underpowered group: {0}")]
    UnderpoweredGroup(String),

    /// Structural precondition violated across subjects (grid differs, pooled
    /// category missing). Fatal for a group aggregation run.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
}
