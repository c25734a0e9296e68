//! Risk-neutral density extraction (Breeden–Litzenberger).
//!
//! The density of the terminal price is the discounted-back second strike
//! derivative of the call price curve:
//!
//! ```text
//! f(K) = e^{rT} · ∂²C/∂K²
//! ```
//!
//! [`extract_density`] evaluates the fitted smile on an evenly spaced strike
//! grid, reprices calls with Black–Scholes, differentiates twice, clamps
//! numerical noise below zero, optionally smooths with a Savitzky–Golay
//! filter and normalizes to unit mass. The resulting [`DensityCurve`] is
//! immutable and answers probability queries directly.
//!
//! Two finite differences amplify any smile error quadratically, so the
//! [`ExtractionMetadata`] describing how a curve was produced is always
//! returned alongside it.
//!
//! # References
//! - Breeden, D. & Litzenberger, R. "Prices of State-Contingent Claims
//!   Implicit in Option Prices" (1978)

pub(crate) mod smoothing;

use serde::{Deserialize, Serialize};

use crate::config::ExtractionConfig;
use crate::error::{self, DensityError};
use crate::implied::black_scholes_price;
use crate::numeric::{cumulative_trapezoid, gradient, interp_linear, linspace, trapezoid};
use crate::quotes::prepare_smile;
use crate::surface::{interpolate, CalibrationMethod, SabrParams, SurfaceModel};
use crate::types::{MarketContext, OptionType, QuoteRow};

/// Relative tolerance on the integral of a curve accepted by [`DensityCurve::new`].
const NORMALIZATION_TOLERANCE: f64 = 1e-9;
/// Relative deviation of any grid step from the mean step.
const SPACING_TOLERANCE: f64 = 1e-6;
/// Bisection steps for [`DensityCurve::quantile`].
const QUANTILE_MAX_ITER: usize = 200;

/// A normalized density sampled on an evenly spaced strike grid.
///
/// Invariants: `strikes` and `values` have equal length (at least 2),
/// strikes are positive and evenly spaced, every value is finite and
/// non-negative, and the trapezoid integral is 1.
///
/// # Examples
///
/// ```
/// use rndensity::density::DensityCurve;
///
/// // Triangle on [1, 3] peaking at 2.
/// let curve = DensityCurve::from_unnormalized(vec![1.0, 2.0, 3.0], vec![0.0, 5.0, 0.0])?;
/// assert!((curve.integral() - 1.0).abs() < 1e-12);
/// assert!((curve.probability_below(2.0) - 0.5).abs() < 1e-12);
/// # Ok::<(), rndensity::DensityError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DensityCurveRaw", into = "DensityCurveRaw")]
pub struct DensityCurve {
    strikes: Vec<f64>,
    values: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct DensityCurveRaw {
    strikes: Vec<f64>,
    values: Vec<f64>,
}

impl TryFrom<DensityCurveRaw> for DensityCurve {
    type Error = DensityError;
    fn try_from(raw: DensityCurveRaw) -> Result<Self, Self::Error> {
        Self::new(raw.strikes, raw.values)
    }
}

impl From<DensityCurve> for DensityCurveRaw {
    fn from(c: DensityCurve) -> Self {
        Self {
            strikes: c.strikes,
            values: c.values,
        }
    }
}

impl DensityCurve {
    /// Wrap an already normalized density.
    ///
    /// # Errors
    /// Returns [`DensityError::InvalidInput`] if the shape invariants fail or
    /// the integral differs from 1 by more than 1e-9 relative.
    pub fn new(strikes: Vec<f64>, values: Vec<f64>) -> error::Result<Self> {
        check_shape(&strikes, &values)?;
        let integral = trapezoid(&strikes, &values);
        if (integral - 1.0).abs() > NORMALIZATION_TOLERANCE {
            return Err(DensityError::InvalidInput {
                message: format!("density must integrate to 1, got {integral}"),
            });
        }
        Ok(Self { strikes, values })
    }

    /// Normalize a non-negative sampled function to unit mass.
    ///
    /// # Errors
    /// Returns [`DensityError::InvalidInput`] if the shape invariants fail and
    /// [`DensityError::DegenerateDensity`] if the integral is not positive.
    pub fn from_unnormalized(strikes: Vec<f64>, values: Vec<f64>) -> error::Result<Self> {
        check_shape(&strikes, &values)?;
        let integral = trapezoid(&strikes, &values);
        if !integral.is_finite() || integral <= 0.0 {
            return Err(DensityError::DegenerateDensity {
                request: None,
                integral,
            });
        }
        let values = values.into_iter().map(|v| v / integral).collect();
        Ok(Self { strikes, values })
    }

    pub fn strikes(&self) -> &[f64] {
        &self.strikes
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of grid points.
    pub fn len(&self) -> usize {
        self.strikes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strikes.is_empty()
    }

    /// Lowest and highest grid strike.
    pub fn range(&self) -> (f64, f64) {
        (self.strikes[0], self.strikes[self.strikes.len() - 1])
    }

    /// Trapezoid integral over the grid.
    pub fn integral(&self) -> f64 {
        trapezoid(&self.strikes, &self.values)
    }

    /// Cumulative probability at each grid strike.
    pub fn cdf(&self) -> Vec<f64> {
        cumulative_trapezoid(&self.strikes, &self.values)
    }

    /// Probability that the terminal price is at most `x`.
    ///
    /// Exact for the piecewise-linear density: inside a grid cell the mass
    /// is the trapezoid up to the linearly interpolated value at `x`.
    pub fn cdf_at(&self, x: f64) -> f64 {
        let (lo, hi) = self.range();
        if x.is_nan() {
            return f64::NAN;
        }
        if x <= lo {
            return 0.0;
        }
        if x >= hi {
            return 1.0;
        }
        let i = self.strikes.partition_point(|&k| k <= x) - 1;
        let below: f64 = self.strikes[..=i]
            .windows(2)
            .zip(self.values[..=i].windows(2))
            .map(|(k, f)| 0.5 * (f[0] + f[1]) * (k[1] - k[0]))
            .sum();
        let fx = interp_linear(&self.strikes, &self.values, x);
        let partial = 0.5 * (self.values[i] + fx) * (x - self.strikes[i]);
        ((below + partial) / self.integral()).clamp(0.0, 1.0)
    }

    /// `P(S_T < x)`.
    pub fn probability_below(&self, x: f64) -> f64 {
        self.cdf_at(x)
    }

    /// `P(S_T > x)`.
    pub fn probability_above(&self, x: f64) -> f64 {
        1.0 - self.cdf_at(x)
    }

    /// `P(a < S_T < b)`; zero when `b <= a`.
    pub fn probability_between(&self, a: f64, b: f64) -> f64 {
        (self.cdf_at(b) - self.cdf_at(a)).max(0.0)
    }

    /// Smallest strike whose cumulative probability reaches `p`.
    ///
    /// # Errors
    /// Returns [`DensityError::InvalidInput`] unless `0 <= p <= 1`.
    pub fn quantile(&self, p: f64) -> error::Result<f64> {
        if !(0.0..=1.0).contains(&p) {
            return Err(DensityError::InvalidInput {
                message: format!("quantile level must be in [0, 1], got {p}"),
            });
        }
        Ok(self.invert_cdf(p))
    }

    /// Bisection on [`cdf_at`](Self::cdf_at) for a level already in `[0, 1]`.
    pub(crate) fn invert_cdf(&self, p: f64) -> f64 {
        let (mut lo, mut hi) = self.range();
        let tol = 1e-12 * (hi - lo);
        for _ in 0..QUANTILE_MAX_ITER {
            if hi - lo <= tol {
                break;
            }
            let mid = 0.5 * (lo + hi);
            if self.cdf_at(mid) < p {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    }

    /// Strike with the highest density (first one on ties).
    pub fn mode(&self) -> f64 {
        let mut best = 0;
        for (i, &v) in self.values.iter().enumerate() {
            if v > self.values[best] {
                best = i;
            }
        }
        self.strikes[best]
    }
}

fn check_shape(strikes: &[f64], values: &[f64]) -> error::Result<()> {
    if strikes.len() != values.len() {
        return Err(DensityError::InvalidInput {
            message: format!(
                "strikes and values must have the same length, got {} and {}",
                strikes.len(),
                values.len()
            ),
        });
    }
    if strikes.len() < 2 {
        return Err(DensityError::InvalidInput {
            message: "density needs at least 2 grid points".into(),
        });
    }
    if strikes.iter().any(|k| !k.is_finite() || *k <= 0.0) {
        return Err(DensityError::InvalidInput {
            message: "density strikes must be positive and finite".into(),
        });
    }
    if strikes.windows(2).any(|w| w[1] <= w[0]) {
        return Err(DensityError::InvalidInput {
            message: "density strikes must be strictly increasing".into(),
        });
    }
    let step = (strikes[strikes.len() - 1] - strikes[0]) / (strikes.len() - 1) as f64;
    if let Some(w) = strikes
        .windows(2)
        .find(|w| ((w[1] - w[0]) - step).abs() > SPACING_TOLERANCE * step)
    {
        return Err(DensityError::InvalidInput {
            message: format!(
                "density strikes must be evenly spaced: step {} at strike {} against {step}",
                w[1] - w[0],
                w[0]
            ),
        });
    }
    if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(DensityError::InvalidInput {
            message: "density values must be finite and non-negative".into(),
        });
    }
    Ok(())
}

/// Smoothing actually applied to a curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedSmoothing {
    /// Window used after narrowing to the density's width.
    pub window: usize,
    /// Window asked for by the configuration.
    pub requested_window: usize,
    pub order: usize,
    /// Samples the filter pushed below zero, clamped back to zero.
    pub clamped_points: usize,
}

/// How a density was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub method: CalibrationMethod,
    pub fallback_reason: Option<String>,
    pub sabr: Option<SabrParams>,
    pub fit_rms_error: Option<f64>,
    /// Nelder–Mead iterations of the accepted SABR fit.
    pub fit_iterations: Option<usize>,
    /// Distinct observed strikes behind the smile.
    pub observed_strikes: usize,
    /// Lowest and highest observed strike.
    pub observed_range: (f64, f64),
    pub grid_points: usize,
    /// Lowest and highest grid strike.
    pub strike_range: (f64, f64),
    /// `None` when disabled or when the density is too narrow to smooth.
    pub smoothing: Option<AppliedSmoothing>,
    /// Raw second-derivative samples below zero, clamped before smoothing.
    pub clamped_points: usize,
    /// Integral of the clamped (and smoothed) density before normalization.
    pub raw_integral: f64,
}

/// A density curve together with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensityExtraction {
    pub curve: DensityCurve,
    pub metadata: ExtractionMetadata,
}

/// Extract the risk-neutral density implied by a calibrated smile.
///
/// `quotes` are re-checked first, so a request with too few usable strikes
/// fails before any grid work. The grid is `config.grid.points` evenly
/// spaced strikes on `[lower·S, upper·S]`.
///
/// # Errors
/// - [`DensityError::InvalidInput`] for an invalid config
/// - [`DensityError::InsufficientData`] / [`DensityError::InvalidQuotes`]
///   from the quote checks
/// - [`DensityError::NumericDomainError`] if a vol, price or derivative
///   becomes non-finite
/// - [`DensityError::DegenerateDensity`] if no probability mass survives
///
/// All request-level errors carry `ctx`'s request.
pub fn extract_density(
    quotes: &[QuoteRow],
    ctx: &MarketContext,
    model: &SurfaceModel,
    config: &ExtractionConfig,
) -> error::Result<DensityExtraction> {
    config.validate()?;
    let observed = prepare_smile(quotes, ctx, config)?;

    let spot = ctx.spot();
    let rate = ctx.rate();
    let expiry = ctx.time_to_expiry();
    let grid = linspace(
        config.grid.lower_multiple * spot,
        config.grid.upper_multiple * spot,
        config.grid.points,
    );

    #[cfg(feature = "logging")]
    tracing::debug!(
        request = ?ctx.request(),
        method = ?model.method(),
        grid_points = grid.len(),
        "density extraction started"
    );

    let vols = interpolate(model, &grid).map_err(|e| ctx.numeric_error(e.to_string()))?;

    let calls: Vec<f64> = grid
        .iter()
        .zip(vols.iter())
        .map(|(&k, v)| black_scholes_price(spot, k, rate, expiry, v.0, OptionType::Call))
        .collect();
    if let Some(i) = calls.iter().position(|c| !c.is_finite()) {
        return Err(ctx.numeric_error(format!("call price at strike {} is not finite", grid[i])));
    }

    let first = gradient(&grid, &calls);
    let second = gradient(&grid, &first);
    let growth = ctx.discount_factor().recip();

    let mut density = Vec::with_capacity(grid.len());
    let mut clamped_points = 0;
    for (&k, &d2) in grid.iter().zip(second.iter()) {
        let f = growth * d2;
        if !f.is_finite() {
            return Err(ctx.numeric_error(format!("second derivative at strike {k} is not finite")));
        }
        if f < 0.0 {
            clamped_points += 1;
            density.push(0.0);
        } else {
            density.push(f);
        }
    }

    let step = grid[1] - grid[0];
    let narrowed = config.smoothing.and_then(|sg| {
        let window = sg.effective_window(step, spread(&grid, &density)?)?;
        Some((sg, window))
    });
    #[cfg(feature = "logging")]
    {
        let applied = narrowed.map(|(_, w)| w);
        if let Some(sg) = config.smoothing.filter(|sg| applied != Some(sg.window)) {
            tracing::debug!(
                request = ?ctx.request(),
                requested_window = sg.window,
                applied_window = ?applied,
                "smoothing window narrowed to the density width"
            );
        }
    }
    let smoothing = match narrowed {
        Some((sg, window)) => {
            let smoothed = smoothing::savitzky_golay(&density, window, sg.order).ok_or_else(|| {
                ctx.numeric_error(format!(
                    "Savitzky-Golay filter (window {window}, order {}) could not be applied",
                    sg.order
                ))
            })?;
            let mut reclamped = 0;
            density = smoothed
                .into_iter()
                .map(|v| {
                    if v < 0.0 {
                        reclamped += 1;
                        0.0
                    } else {
                        v
                    }
                })
                .collect();
            Some(AppliedSmoothing {
                window,
                requested_window: sg.window,
                order: sg.order,
                clamped_points: reclamped,
            })
        }
        None => None,
    };

    let raw_integral = trapezoid(&grid, &density);
    if !raw_integral.is_finite() || raw_integral <= 0.0 {
        return Err(DensityError::DegenerateDensity {
            request: ctx.request().cloned(),
            integral: raw_integral,
        });
    }
    let values: Vec<f64> = density.into_iter().map(|v| v / raw_integral).collect();

    let strike_range = (grid[0], grid[grid.len() - 1]);
    let metadata = ExtractionMetadata {
        method: model.method(),
        fallback_reason: model.fallback_reason().map(str::to_owned),
        sabr: model.sabr_params(),
        fit_rms_error: model.rms_error(),
        fit_iterations: model.iterations(),
        observed_strikes: observed.len(),
        observed_range: model.observed_range(),
        grid_points: grid.len(),
        strike_range,
        smoothing,
        clamped_points,
        raw_integral,
    };

    #[cfg(feature = "logging")]
    tracing::debug!(
        request = ?ctx.request(),
        raw_integral,
        clamped_points,
        "density extraction complete"
    );

    Ok(DensityExtraction {
        curve: DensityCurve {
            strikes: grid,
            values,
        },
        metadata,
    })
}

/// Standard deviation of a non-negative sampled function, `None` without mass.
fn spread(grid: &[f64], density: &[f64]) -> Option<f64> {
    let mass = trapezoid(grid, density);
    if !mass.is_finite() || mass <= 0.0 {
        return None;
    }
    let weighted = |g: &dyn Fn(f64) -> f64| -> f64 {
        let y: Vec<f64> = grid.iter().zip(density).map(|(&k, &f)| g(k) * f).collect();
        trapezoid(grid, &y) / mass
    };
    let mean = weighted(&|k| k);
    Some(weighted(&|k| (k - mean).powi(2)).max(0.0).sqrt())
}
