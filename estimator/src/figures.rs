//! figures.rs – diagnostic plots: per-subject binding curves, the group
//! binding-point scatter, and the mean curve with its dispersion band.

use anyhow::{anyhow, Result};
use plotters::prelude::*;
use tracing::info;

use crate::models::{GridSpec, GroupSummary, SubjectResult};
use crate::numeric::logistic_curve;

// ---------- fixed colour map ----------
fn colour_for_category(idx: usize) -> RGBColor {
    const PALETTE: [RGBColor; 6] = [
        RGBColor(0, 114, 189),
        RGBColor(217, 83, 25),
        RGBColor(237, 177, 32),
        RGBColor(126, 47, 142),
        RGBColor(119, 172, 48),
        RGBColor(77, 190, 238),
    ];
    PALETTE[idx % PALETTE.len()]
}

fn chart_err(e: impl std::fmt::Display) -> anyhow::Error {
    anyhow!("plotting failed: {e}")
}

/// Closed polygon outline for a mean ± SD band, clamped to the plotted
/// probability range: upper edge left to right, then lower edge back.
fn band_points(xs: &[f64], mean: &[f64], sd: &[f64]) -> Vec<(f64, f64)> {
    xs.iter()
        .zip(mean.iter().zip(sd))
        .map(|(&x, (&m, &s))| (x, (m + s).min(1.05)))
        .chain(
            xs.iter()
                .zip(mean.iter().zip(sd))
                .rev()
                .map(|(&x, (&m, &s))| (x, (m - s).max(0.0))),
        )
        .collect()
}

/// One figure per subject: fitted AV/VA sigmoids per category, the spliced
/// binding curve on top, and vertical markers at both binding points.
pub fn plot_subject(result: &SubjectResult, hoi: f64, output_path: &str) -> Result<()> {
    let caption_font = ("sans-serif bold", 24);
    let axis_font = ("sans-serif", 20);
    let label_font = ("sans-serif", 16);

    let xs = result.grid.values();
    let bound = result.grid.x_bound_ms;

    let root = BitMapBackend::new(output_path, (900, 650)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Subject {}: temporal binding curves", result.subject), caption_font)
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(50)
        .build_cartesian_2d(-bound..bound, 0.0..1.0)
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .x_desc("Stimulus onset asynchrony (ms)")
        .y_desc("P(simultaneous)")
        .axis_desc_style(axis_font)
        .label_style(label_font)
        .draw()
        .map_err(chart_err)?;

    for (idx, (key, fit)) in result.fits.iter().enumerate() {
        let Ok(fit) = fit else { continue };
        let colour = colour_for_category(idx);

        let y_av = logistic_curve(&fit.b_av, &xs);
        let y_va = logistic_curve(&fit.b_va, &xs);
        chart
            .draw_series(LineSeries::new(
                xs.iter().zip(&y_av).map(|(&x, &y)| (x, y)),
                colour.mix(0.4).stroke_width(1),
            ))
            .map_err(chart_err)?;
        chart
            .draw_series(LineSeries::new(
                xs.iter().zip(&y_va).map(|(&x, &y)| (x, y)),
                colour.mix(0.4).stroke_width(1),
            ))
            .map_err(chart_err)?;

        chart
            .draw_series(LineSeries::new(
                xs.iter().zip(&fit.binding_curve).map(|(&x, &y)| (x, y)),
                colour.stroke_width(3),
            ))
            .map_err(chart_err)?
            .label(format!("{key} (TBW = {:.0} ms)", fit.tbw_ms))
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 25, y)], colour.stroke_width(3))
            });

        for bind in [fit.bind_av_ms, fit.bind_va_ms] {
            chart
                .draw_series(LineSeries::new(
                    vec![(bind, 0.0), (bind, hoi)],
                    colour.mix(0.6).stroke_width(1),
                ))
                .map_err(chart_err)?;
        }
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(&BLACK)
        .label_font(label_font)
        .position(SeriesLabelPosition::LowerRight)
        .draw()
        .map_err(chart_err)?;

    info!("Subject figure saved to {}", output_path);
    Ok(())
}

/// Group scatter of (-bind_AV, bind_VA) per subject with a least-squares
/// line and the r/p/n annotation.
pub fn plot_group_scatter(summary: &GroupSummary, output_path: &str) -> Result<()> {
    let xs = &summary.neg_bind_av_ms;
    let ys = &summary.bind_va_ms;

    let min_x = xs.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_x = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min_y = ys.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_y = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let pad_x = ((max_x - min_x) * 0.1).max(1.0);
    let pad_y = ((max_y - min_y) * 0.1).max(1.0);

    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let caption = match summary.correlation {
        Some(c) => format!(
            "{}: r = {:.3}, p = {:.3}, n = {}",
            summary.key, c.r, c.p, summary.n_subjects_used
        ),
        None => format!(
            "{}: correlation undefined, n = {}",
            summary.key, summary.n_subjects_used
        ),
    };

    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif bold", 22))
        .margin(25)
        .x_label_area_size(50)
        .y_label_area_size(50)
        .build_cartesian_2d(min_x - pad_x..max_x + pad_x, min_y - pad_y..max_y + pad_y)
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("-bind_AV (ms)")
        .y_desc("bind_VA (ms)")
        .draw()
        .map_err(chart_err)?;

    chart
        .draw_series(
            xs.iter()
                .zip(ys.iter())
                .map(|(&x, &y)| Circle::new((x, y), 4, BLUE.filled())),
        )
        .map_err(chart_err)?;

    // Least-squares line over the plotted x-range.
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let var_x: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    if var_x > 0.0 {
        let cov: f64 = xs
            .iter()
            .zip(ys.iter())
            .map(|(x, y)| (x - mean_x) * (y - mean_y))
            .sum();
        let slope = cov / var_x;
        let intercept = mean_y - slope * mean_x;
        let (x0, x1) = (min_x - pad_x, max_x + pad_x);
        chart
            .draw_series(LineSeries::new(
                vec![(x0, intercept + slope * x0), (x1, intercept + slope * x1)],
                RED.stroke_width(2),
            ))
            .map_err(chart_err)?;
    }

    info!("Group scatter saved to {}", output_path);
    Ok(())
}

/// Mean binding curve with the mean ± SD band and the two TBW boundary
/// markers read off the mean curve.
pub fn plot_group_mean_curve(
    summary: &GroupSummary,
    grid: &GridSpec,
    hoi: f64,
    output_path: &str,
) -> Result<()> {
    let xs = grid.values();
    let bound = grid.x_bound_ms;

    let root = BitMapBackend::new(output_path, (900, 650)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!(
                "{}: mean binding curve (mean TBW = {:.0} ms, p = {:.3})",
                summary.key, summary.mean_tbw_ms, summary.tbw_pvalue
            ),
            ("sans-serif bold", 22),
        )
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(50)
        .build_cartesian_2d(-bound..bound, 0.0..1.05)
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .x_desc("Stimulus onset asynchrony (ms)")
        .y_desc("P(simultaneous)")
        .draw()
        .map_err(chart_err)?;

    let band = band_points(&xs, &summary.mean_curve, &summary.sd_curve);
    chart
        .draw_series(std::iter::once(Polygon::new(band, BLUE.mix(0.15))))
        .map_err(chart_err)?;

    chart
        .draw_series(LineSeries::new(
            xs.iter().zip(&summary.mean_curve).map(|(&x, &y)| (x, y)),
            BLUE.stroke_width(3),
        ))
        .map_err(chart_err)?;

    for boundary in [summary.left_boundary_ms, summary.right_boundary_ms] {
        chart
            .draw_series(LineSeries::new(
                vec![(boundary, 0.0), (boundary, 1.05)],
                BLACK.mix(0.6).stroke_width(2),
            ))
            .map_err(chart_err)?;
    }
    chart
        .draw_series(LineSeries::new(
            vec![(-bound, hoi), (bound, hoi)],
            BLACK.mix(0.2).stroke_width(1),
        ))
        .map_err(chart_err)?;

    info!("Group mean-curve figure saved to {}", output_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_traces_upper_then_lower_edge() {
        // Dyadic values keep the arithmetic exact.
        let xs = [-1.0, 0.0, 1.0];
        let mean = [0.25, 0.5, 0.75];
        let sd = [0.125, 0.25, 0.125];
        let band = band_points(&xs, &mean, &sd);

        assert_eq!(band.len(), 6);
        assert_eq!(band[0], (-1.0, 0.375));
        assert_eq!(band[1], (0.0, 0.75));
        assert_eq!(band[2], (1.0, 0.875));
        // Lower edge comes back right to left.
        assert_eq!(band[3], (1.0, 0.625));
        assert_eq!(band[4], (0.0, 0.25));
        assert_eq!(band[5], (-1.0, 0.125));
    }

    #[test]
    fn band_is_clamped_to_plot_range() {
        let xs = [0.0];
        let band = band_points(&xs, &[0.75], &[0.5]);
        assert_eq!(band[0].1, 1.05);
        assert_eq!(band[1].1, 0.25);

        let band_low = band_points(&xs, &[0.25], &[0.5]);
        assert_eq!(band_low[1].1, 0.0);
    }

    #[test]
    fn category_palette_wraps_around() {
        assert_eq!(colour_for_category(0), colour_for_category(6));
        assert_ne!(colour_for_category(0), colour_for_category(1));
    }
}
