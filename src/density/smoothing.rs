//! Savitzky–Golay smoothing on a uniform grid.
//!
//! Each output sample is the value at its position of the least-squares
//! polynomial fitted to the surrounding window. Interior points use the
//! centred window; the first and last half-windows are read off the
//! polynomial fitted to the first and last full window, so the output has
//! the input's length and polynomials up to `order` pass through unchanged.

use nalgebra::DMatrix;

/// Smooth `y` with an odd `window` and polynomial `order < window`.
///
/// Returns `None` when the input is shorter than the window or the local
/// least-squares system cannot be solved.
pub(crate) fn savitzky_golay(y: &[f64], window: usize, order: usize) -> Option<Vec<f64>> {
    let n = y.len();
    if window % 2 == 0 || order >= window || n < window {
        return None;
    }
    let projection = projection_matrix(window, order)?;
    let half = window / 2;

    let apply = |row: usize, start: usize| -> f64 {
        (0..window).map(|j| projection[(row, j)] * y[start + j]).sum()
    };

    let mut out = vec![0.0; n];
    for (i, v) in out.iter_mut().enumerate() {
        *v = if i < half {
            apply(i, 0)
        } else if i + half >= n {
            apply(window - (n - i), n - window)
        } else {
            apply(half, i - half)
        };
    }
    Some(out)
}

/// Hat matrix `A (AᵀA)⁻¹ Aᵀ` of the polynomial design on one window.
fn projection_matrix(window: usize, order: usize) -> Option<DMatrix<f64>> {
    let half = (window / 2) as f64;
    // Positions scaled to [-1, 1] keep AᵀA well conditioned.
    let a = DMatrix::<f64>::from_fn(window, order + 1, |i, j| {
        ((i as f64 - half) / half).powi(j as i32)
    });
    let at = a.transpose();
    let ata = &at * &a;
    let coeffs = ata.qr().solve(&at)?;
    Some(a * coeffs)
}
