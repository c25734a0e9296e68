//! Grid numerics shared by density extraction, statistics and matching.
//!
//! All routines take a strictly increasing abscissa `x` (possibly
//! non-uniform) and a sample vector `y` of the same length. Callers are
//! responsible for the length check.

/// `n` evenly spaced points from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            let mut out: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            out[n - 1] = end;
            out
        }
    }
}

/// Trapezoid-rule integral of `y` over `x`.
pub fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| 0.5 * (ys[0] + ys[1]) * (xs[1] - xs[0]))
        .sum()
}

/// Running trapezoid integral, starting at zero on `x[0]`.
pub fn cumulative_trapezoid(x: &[f64], y: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(x.len());
    let mut acc = 0.0;
    if !x.is_empty() {
        out.push(0.0);
    }
    for (xs, ys) in x.windows(2).zip(y.windows(2)) {
        acc += 0.5 * (ys[0] + ys[1]) * (xs[1] - xs[0]);
        out.push(acc);
    }
    out
}

/// Derivative estimate dy/dx on a possibly non-uniform grid.
///
/// Second-order accurate central differences in the interior, first-order
/// one-sided differences at both ends. Fewer than two points yield zeros.
pub fn gradient(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut d = vec![0.0; n];
    if n < 2 {
        return d;
    }
    d[0] = (y[1] - y[0]) / (x[1] - x[0]);
    d[n - 1] = (y[n - 1] - y[n - 2]) / (x[n - 1] - x[n - 2]);
    for i in 1..n - 1 {
        let h0 = x[i] - x[i - 1];
        let h1 = x[i + 1] - x[i];
        d[i] = (h0 * h0 * y[i + 1] + (h1 * h1 - h0 * h0) * y[i] - h1 * h1 * y[i - 1])
            / (h0 * h1 * (h0 + h1));
    }
    d
}

/// Piecewise-linear interpolation of `(x, y)` at `xq`, clamped to the end
/// values outside `[x[0], x[n-1]]`.
pub fn interp_linear(x: &[f64], y: &[f64], xq: f64) -> f64 {
    let n = x.len();
    if n == 0 {
        return f64::NAN;
    }
    if xq <= x[0] {
        return y[0];
    }
    if xq >= x[n - 1] {
        return y[n - 1];
    }
    let i = x.partition_point(|&v| v <= xq) - 1;
    let t = (xq - x[i]) / (x[i + 1] - x[i]);
    y[i] + t * (y[i + 1] - y[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn linspace_endpoints_and_spacing() {
        let g = linspace(0.5, 2.0, 4);
        assert_eq!(g, vec![0.5, 1.0, 1.5, 2.0]);
        assert!(linspace(1.0, 2.0, 0).is_empty());
        assert_eq!(linspace(3.0, 9.0, 1), vec![3.0]);
    }

    #[test]
    fn trapezoid_is_exact_for_linear() {
        let x = linspace(0.0, 2.0, 7);
        let y: Vec<f64> = x.iter().map(|v| 3.0 * v + 1.0).collect();
        assert_abs_diff_eq!(trapezoid(&x, &y), 8.0, epsilon = 1e-12);
    }

    #[test]
    fn cumulative_ends_at_total() {
        let x = vec![0.0, 0.5, 1.5, 2.0];
        let y = vec![1.0, 2.0, 0.0, 4.0];
        let c = cumulative_trapezoid(&x, &y);
        assert_eq!(c.len(), 4);
        assert_eq!(c[0], 0.0);
        assert_abs_diff_eq!(c[3], trapezoid(&x, &y), epsilon = 1e-15);
        assert!(cumulative_trapezoid(&[], &[]).is_empty());
    }

    #[test]
    fn gradient_exact_for_quadratic_interior() {
        // Central differences are exact for quadratics, even on uneven grids.
        let x = vec![0.0, 0.3, 1.0, 1.2, 2.0, 3.5];
        let y: Vec<f64> = x.iter().map(|v| v * v).collect();
        let d = gradient(&x, &y);
        for i in 1..x.len() - 1 {
            assert_abs_diff_eq!(d[i], 2.0 * x[i], epsilon = 1e-12);
        }
        // One-sided ends are the secant slopes.
        assert_abs_diff_eq!(d[0], 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(d[5], 5.5, epsilon = 1e-12);
    }

    #[test]
    fn gradient_of_short_input() {
        assert_eq!(gradient(&[1.0], &[2.0]), vec![0.0]);
        assert_eq!(gradient(&[0.0, 2.0], &[1.0, 5.0]), vec![2.0, 2.0]);
    }

    #[test]
    fn interp_linear_inside_and_clamped() {
        let x = vec![1.0, 2.0, 4.0];
        let y = vec![10.0, 20.0, 0.0];
        assert_abs_diff_eq!(interp_linear(&x, &y, 1.5), 15.0, epsilon = 1e-12);
        assert_abs_diff_eq!(interp_linear(&x, &y, 3.0), 10.0, epsilon = 1e-12);
        assert_eq!(interp_linear(&x, &y, 0.0), 10.0);
        assert_eq!(interp_linear(&x, &y, 9.0), 0.0);
        assert_eq!(interp_linear(&x, &y, 2.0), 20.0);
    }
}
