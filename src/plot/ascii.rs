//! ASCII plotting for terminal output.
//!
//! Fixed-size character grid with a logarithmic lag-time axis, meant for a
//! quick look at a fit without leaving the terminal. Output is deterministic.
//!
//! Plot elements:
//! - fitted points: `o`
//! - fitted model: `-` line
//!
//! Lags at `τ ≤ 0` cannot sit on a log axis and are left out.

use crate::domain::{FitResult, ResultFile};
use crate::fit::{FitData, fitted_curve, log_space};

/// Render the fit input points with the fitted model on top.
pub fn render_fit_plot(data: &FitData, fit: &FitResult, width: usize, height: usize) -> String {
    let points = positive_pairs(&data.tau, &data.y);
    let curve = match tau_range(&points) {
        Some((t_min, t_max)) => {
            let tau = log_space(t_min, t_max, width.max(2)).unwrap_or_default();
            let y = fitted_curve(fit, &tau);
            tau.into_iter().zip(y).collect()
        }
        None => Vec::new(),
    };
    render_plot(&points, &curve, width, height)
}

/// Render a saved result file (fit points plus the stored model grid).
pub fn render_result_plot(result: &ResultFile, width: usize, height: usize) -> String {
    let points = positive_pairs(&result.data.tau, &result.data.y);
    let curve = positive_pairs(&result.grid.tau, &result.grid.y);
    render_plot(&points, &curve, width, height)
}

fn render_plot(points: &[(f64, f64)], curve: &[(f64, f64)], width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let all: Vec<(f64, f64)> = points.iter().chain(curve).copied().collect();
    let (t_min, t_max) = tau_range(&all).unwrap_or((1e-6, 1.0));
    let (x_min, x_max) = (t_min.log10(), t_max.log10());
    let (y_min, y_max) = y_range(&all).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Curve first so points overlay it.
    let mut prev = None;
    for &(t, y) in curve {
        let x = map_x(t.log10(), x_min, x_max, width);
        let yy = map_y(y, y_min, y_max, height);
        match prev {
            Some((x0, y0)) => draw_line(&mut grid, x0, y0, x, yy, '-'),
            None => grid[yy][x] = '-',
        }
        prev = Some((x, yy));
    }

    for &(t, y) in points {
        let x = map_x(t.log10(), x_min, x_max, width);
        let yy = map_y(y, y_min, y_max, height);
        grid[yy][x] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: tau=[{t_min:.3e}, {t_max:.3e}] s (log) | y=[{y_min:.3}, {y_max:.3}]\n"
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn positive_pairs(tau: &[f64], y: &[f64]) -> Vec<(f64, f64)> {
    tau.iter()
        .zip(y)
        .filter(|(t, v)| **t > 0.0 && t.is_finite() && v.is_finite())
        .map(|(&t, &v)| (t, v))
        .collect()
}

fn tau_range(pairs: &[(f64, f64)]) -> Option<(f64, f64)> {
    let min_t = pairs.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let max_t = pairs.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    if min_t.is_finite() && max_t.is_finite() && max_t > min_t {
        Some((min_t, max_t))
    } else {
        None
    }
}

fn y_range(pairs: &[(f64, f64)]) -> Option<(f64, f64)> {
    let min_y = pairs.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let max_y = pairs.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
    if min_y.is_finite() && max_y.is_finite() && max_y >= min_y {
        Some((min_y, max_y))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y_max is row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

/// Integer line drawing (Bresenham).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plot_golden_snapshot_small() {
        let points = [(1e-3, 1.0), (1e-1, 0.0)];
        let txt = render_plot(&points, &points, 10, 5);
        let expected = concat!(
            "Plot: tau=[1.000e-3, 1.000e-1] s (log) | y=[-0.050, 1.050]\n",
            "o-        \n",
            "  --      \n",
            "    --    \n",
            "      --  \n",
            "        -o\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn zero_lag_is_left_out() {
        let pairs = positive_pairs(&[0.0, 1e-4, 1e-3], &[1.0, 0.9, 0.5]);
        assert_eq!(pairs, vec![(1e-4, 0.9), (1e-3, 0.5)]);
    }

    #[test]
    fn fit_plot_has_requested_size() {
        use crate::domain::FitConfig;
        use crate::fit::{FitContext, fit_and_select};

        let tau: Vec<f64> = (0..40).map(|i| i as f64 * 1e-4).collect();
        let y: Vec<f64> = tau.iter().map(|&t| (-300.0 * t).exp()).collect();
        let data = FitData {
            lags: (0..tau.len()).collect(),
            tau,
            y,
            warnings: Vec::new(),
        };
        let ctx = FitContext {
            beta: 0.5,
            mean_countrate: None,
        };
        let selection = fit_and_select(&data, &ctx, &FitConfig::default()).unwrap();
        let txt = render_fit_plot(&data, &selection.best, 40, 12);
        let lines: Vec<&str> = txt.lines().collect();
        assert_eq!(lines.len(), 13);
        assert!(lines[1..].iter().all(|l| l.chars().count() == 40));
        assert!(txt.contains('o'));
    }
}
