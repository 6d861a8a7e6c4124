//! Small numeric primitives shared by the subject estimator and the group
//! aggregator: sigmoid evaluation, nearest-point search, regional minima.

/// Standard logistic function.
pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Evaluate a fitted logistic curve `sigmoid(b0 + b1 * x)` on a grid.
pub fn logistic_curve(b: &[f64; 2], xs: &[f64]) -> Vec<f64> {
    xs.iter().map(|&x| sigmoid(b[0] + b[1] * x)).collect()
}

/// Index of the grid point whose curve value is closest to `level`.
/// Ties break to the first occurrence in ascending-x order.
pub fn nearest_to_level(ys: &[f64], level: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &y) in ys.iter().enumerate() {
        let d = (y - level).abs();
        match best {
            Some((_, bd)) if d >= bd => {}
            _ => best = Some((i, d)),
        }
    }
    best.map(|(i, _)| i)
}

/// Indices of regional minima: interior points that are `<=` both neighbors.
/// Plateau points all qualify, so a flat valley contributes its whole run.
/// Grid endpoints are never reported (they lack two neighbors).
pub fn regional_minima(ys: &[f64]) -> Vec<usize> {
    if ys.len() < 3 {
        return Vec::new();
    }
    (1..ys.len() - 1)
        .filter(|&i| ys[i] <= ys[i - 1] && ys[i] <= ys[i + 1])
        .collect()
}
