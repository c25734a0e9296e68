//! Internal optimization utilities for smile calibration.

/// Configuration for the bounded Nelder-Mead simplex optimizer.
pub(crate) struct NelderMeadConfig<const N: usize> {
    /// Maximum number of iterations.
    pub max_iter: usize,
    /// Convergence threshold on simplex diameter.
    pub diameter_tol: f64,
    /// Convergence threshold on objective value spread.
    pub fvalue_tol: f64,
    /// Lower bound per coordinate.
    pub lower: [f64; N],
    /// Upper bound per coordinate.
    pub upper: [f64; N],
}

impl<const N: usize> NelderMeadConfig<N> {
    /// Project a point onto the feasible box.
    fn project(&self, mut x: [f64; N]) -> [f64; N] {
        for (j, v) in x.iter_mut().enumerate() {
            *v = v.clamp(self.lower[j], self.upper[j]);
        }
        x
    }
}

/// Result of a Nelder-Mead optimization.
pub(crate) struct NelderMeadResult<const N: usize> {
    /// Best vertex found.
    pub x: [f64; N],
    /// Objective value at the best vertex.
    pub fval: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// Whether a tolerance was met before the iteration cap.
    pub converged: bool,
}

/// Minimize `objective(x)` over a box using the Nelder-Mead simplex method.
///
/// Starts from `x0` with per-coordinate perturbations `step` to form the
/// initial simplex. Every trial point is projected onto
/// `[config.lower, config.upper]`, so the objective is only evaluated at
/// feasible points. Returns the best vertex found together with a
/// convergence flag.
pub(crate) fn nelder_mead<const N: usize, F>(
    objective: F,
    x0: [f64; N],
    step: [f64; N],
    config: &NelderMeadConfig<N>,
) -> NelderMeadResult<N>
where
    F: Fn(&[f64; N]) -> f64,
{
    let x0 = config.project(x0);
    let mut simplex: Vec<[f64; N]> = Vec::with_capacity(N + 1);
    simplex.push(x0);
    for j in 0..N {
        let mut v = x0;
        v[j] += step[j];
        // Step inward when the seed sits on the upper bound.
        if v[j] > config.upper[j] {
            v[j] = x0[j] - step[j];
        }
        simplex.push(config.project(v));
    }
    let mut f_vals: Vec<f64> = simplex.iter().map(|v| objective(v)).collect();

    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iter {
        // Sort by objective value
        let mut idx: Vec<usize> = (0..=N).collect();
        idx.sort_by(|&a, &b| f_vals[a].total_cmp(&f_vals[b]));
        simplex = idx.iter().map(|&i| simplex[i]).collect();
        f_vals = idx.iter().map(|&i| f_vals[i]).collect();

        // Check convergence
        let diameter = simplex
            .iter()
            .flat_map(|a| simplex.iter().map(move |b| distance(a, b)))
            .fold(0.0_f64, f64::max);
        let f_spread = f_vals[N] - f_vals[0];

        if diameter < config.diameter_tol || f_spread.abs() < config.fvalue_tol {
            converged = true;
            break;
        }
        iterations += 1;

        // Centroid of all but the worst vertex
        let mut centroid = [0.0; N];
        for v in &simplex[..N] {
            for j in 0..N {
                centroid[j] += v[j] / N as f64;
            }
        }
        let along = |t: f64, toward: &[f64; N]| -> [f64; N] {
            let mut p = [0.0; N];
            for j in 0..N {
                p[j] = centroid[j] + t * (toward[j] - centroid[j]);
            }
            config.project(p)
        };

        let worst = simplex[N];

        // Reflection
        let reflected = along(-1.0, &worst);
        let fr = objective(&reflected);

        if fr < f_vals[N - 1] && fr >= f_vals[0] {
            simplex[N] = reflected;
            f_vals[N] = fr;
        } else if fr < f_vals[0] {
            // Expansion
            let expanded = along(-2.0, &worst);
            let fe = objective(&expanded);
            if fe < fr {
                simplex[N] = expanded;
                f_vals[N] = fe;
            } else {
                simplex[N] = reflected;
                f_vals[N] = fr;
            }
        } else {
            // Contraction
            let contracted = if fr < f_vals[N] {
                along(-0.5, &worst)
            } else {
                along(0.5, &worst)
            };
            let fc = objective(&contracted);
            if fc < f_vals[N].min(fr) {
                simplex[N] = contracted;
                f_vals[N] = fc;
            } else {
                // Shrink toward best vertex
                let best = simplex[0];
                for i in 1..=N {
                    for j in 0..N {
                        simplex[i][j] = best[j] + 0.5 * (simplex[i][j] - best[j]);
                    }
                    f_vals[i] = objective(&simplex[i]);
                }
            }
        }
    }

    let best_idx = (0..=N)
        .min_by(|&a, &b| f_vals[a].total_cmp(&f_vals[b]))
        .unwrap_or(0);

    NelderMeadResult {
        x: simplex[best_idx],
        fval: f_vals[best_idx],
        iterations,
        converged,
    }
}

fn distance<const N: usize>(a: &[f64; N], b: &[f64; N]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}
