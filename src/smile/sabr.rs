//! SABR (Stochastic Alpha Beta Rho) smile model.
//!
//! SABR models the forward price as a CEV process with stochastic volatility:
//!
//! ```text
//! dF = σ · F^β · dW₁
//! dσ = ν · σ · dW₂
//! dW₁·dW₂ = ρ dt
//! ```
//!
//! The Hagan formula provides a closed-form approximation for Black implied
//! volatility as a function of strike.
//!
//! # Calibration units
//!
//! The optimizer works on the *normalized* alpha `α / F^{1−β}`, which is
//! roughly the ATM lognormal vol. Its bounds are therefore independent of the
//! price level of the underlying; [`SabrSmile::alpha`] still reports the raw
//! Hagan α.
//!
//! # References
//! - Hagan, P. et al. "Managing Smile Risk" (2002)

use serde::{Deserialize, Serialize};

use crate::config::SabrConfig;
use crate::conventions::log_moneyness;
use crate::error::{self, DensityError};
use crate::optim::{nelder_mead, NelderMeadConfig, NelderMeadResult};
use crate::smile::SmileSection;
use crate::types::Vol;
use crate::validate::{validate_non_negative, validate_positive};

/// Objective value returned for parameter sets the Hagan formula cannot price.
const PENALTY: f64 = 1e10;
/// Simplex diameter convergence threshold.
const NM_DIAMETER_TOL: f64 = 1e-8;
/// Objective value spread convergence threshold.
const NM_FVALUE_TOL: f64 = 1e-14;
/// Initial simplex steps for (normalized alpha, rho, nu).
const NM_STEP: [f64; 3] = [0.05, 0.1, 0.1];
/// Minimum observations for a 3-parameter fit.
const MIN_POINTS: usize = 3;

/// SABR volatility smile with 4 parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SabrSmileRaw", into = "SabrSmileRaw")]
pub struct SabrSmile {
    forward: f64,
    expiry: f64,
    /// Vol scale α > 0 (raw Hagan units).
    alpha: f64,
    /// CEV exponent β ∈ \[0, 1\].
    beta: f64,
    /// Spot-vol correlation ρ ∈ (−1, 1).
    rho: f64,
    /// Vol-of-vol ν ≥ 0 (ν = 0 reduces to CEV model).
    nu: f64,
}

#[derive(Serialize, Deserialize)]
struct SabrSmileRaw {
    forward: f64,
    expiry: f64,
    alpha: f64,
    beta: f64,
    rho: f64,
    nu: f64,
}

impl TryFrom<SabrSmileRaw> for SabrSmile {
    type Error = DensityError;
    fn try_from(raw: SabrSmileRaw) -> Result<Self, Self::Error> {
        Self::new(raw.forward, raw.expiry, raw.alpha, raw.beta, raw.rho, raw.nu)
    }
}

impl From<SabrSmile> for SabrSmileRaw {
    fn from(s: SabrSmile) -> Self {
        Self {
            forward: s.forward,
            expiry: s.expiry,
            alpha: s.alpha,
            beta: s.beta,
            rho: s.rho,
            nu: s.nu,
        }
    }
}

/// Outcome of a successful SABR calibration.
#[derive(Debug, Clone)]
pub struct SabrCalibration {
    pub smile: SabrSmile,
    /// Calibrated alpha in normalized units (α / F^{1−β}).
    pub normalized_alpha: f64,
    /// RMS error between model and market vols on the observed strikes.
    pub rms_error: f64,
    /// Nelder-Mead iterations used.
    pub iterations: usize,
}

impl SabrSmile {
    /// Create a SABR smile from calibrated parameters.
    ///
    /// # Errors
    /// Returns [`DensityError::InvalidInput`] if parameters are out of range.
    pub fn new(
        forward: f64,
        expiry: f64,
        alpha: f64,
        beta: f64,
        rho: f64,
        nu: f64,
    ) -> error::Result<Self> {
        validate_positive(forward, "forward")?;
        validate_positive(expiry, "expiry")?;
        validate_positive(alpha, "alpha")?;

        if !(0.0..=1.0).contains(&beta) {
            return Err(DensityError::InvalidInput {
                message: format!("beta must be in [0, 1], got {beta}"),
            });
        }

        if rho.abs() >= 1.0 || rho.is_nan() {
            return Err(DensityError::InvalidInput {
                message: format!("rho must be in (-1, 1), got {rho}"),
            });
        }

        validate_non_negative(nu, "nu")?;

        Ok(Self {
            forward,
            expiry,
            alpha,
            beta,
            rho,
            nu,
        })
    }

    /// Returns the alpha parameter in raw Hagan units.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Returns alpha divided by F^{1−β}, the scale the calibrator bounds.
    pub fn normalized_alpha(&self) -> f64 {
        self.alpha / self.forward.powf(1.0 - self.beta)
    }

    /// Returns the beta (CEV exponent) parameter.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Returns the rho (spot-vol correlation) parameter.
    pub fn rho(&self) -> f64 {
        self.rho
    }

    /// Returns the nu (vol-of-vol) parameter.
    pub fn nu(&self) -> f64 {
        self.nu
    }

    /// Calibrate (alpha, rho, nu) to market (strike, vol) observations with β fixed.
    ///
    /// Minimizes the sum of squared vol errors with a bounded Nelder-Mead
    /// simplex seeded at `config.initial_guess`.
    ///
    /// # Errors
    /// Returns [`DensityError::InvalidInput`] for fewer than 3 points or
    /// invalid scalars, and [`DensityError::CalibrationFailure`] when the
    /// optimizer does not converge within `config.max_iterations`, a fitted
    /// vol on an observed strike is non-positive or non-finite, or the fit
    /// RMS error exceeds `config.max_rmse`.
    pub fn calibrate(
        forward: f64,
        expiry: f64,
        market_vols: &[(f64, f64)],
        config: &SabrConfig,
    ) -> error::Result<SabrCalibration> {
        #[cfg(feature = "logging")]
        tracing::debug!(
            forward,
            expiry,
            beta = config.beta,
            n_quotes = market_vols.len(),
            "SABR calibration started"
        );

        validate_positive(forward, "forward")?;
        validate_positive(expiry, "expiry")?;
        config.validate()?;
        if market_vols.len() < MIN_POINTS {
            return Err(DensityError::InvalidInput {
                message: format!(
                    "at least {MIN_POINTS} market points required, got {}",
                    market_vols.len()
                ),
            });
        }
        for &(strike, vol) in market_vols {
            validate_positive(strike, "strike")?;
            validate_positive(vol, "implied vol")?;
        }

        let beta = config.beta;
        let scale = forward.powf(1.0 - beta);

        let objective = |p: &[f64; 3]| -> f64 {
            let alpha = p[0] * scale;
            let mut sse = 0.0;
            for &(k, v) in market_vols {
                let model = hagan_lognormal_vol(forward, k, expiry, alpha, beta, p[1], p[2]);
                if !model.is_finite() {
                    return PENALTY;
                }
                sse += (model - v).powi(2);
            }
            sse
        };

        let nm_config = NelderMeadConfig {
            max_iter: config.max_iterations,
            diameter_tol: NM_DIAMETER_TOL,
            fvalue_tol: NM_FVALUE_TOL,
            lower: [config.alpha_bounds.0, config.rho_bounds.0, config.nu_bounds.0],
            upper: [config.alpha_bounds.1, config.rho_bounds.1, config.nu_bounds.1],
        };
        let NelderMeadResult {
            x,
            fval,
            iterations,
            converged,
        } = nelder_mead(objective, config.initial_guess, NM_STEP, &nm_config);

        let rms_error = (fval / market_vols.len() as f64).sqrt();
        let [norm_alpha, rho, nu] = x;

        if !converged {
            return Err(DensityError::CalibrationFailure {
                message: format!("Nelder-Mead did not converge within {iterations} iterations"),
                rms_error: rms_error.is_finite().then_some(rms_error),
            });
        }

        let smile = Self::new(forward, expiry, norm_alpha * scale, beta, rho, nu).map_err(|e| {
            DensityError::CalibrationFailure {
                message: format!("calibrated params invalid: {e}"),
                rms_error: None,
            }
        })?;

        for &(k, _) in market_vols {
            let v = smile.raw_vol(k);
            if !v.is_finite() || v <= 0.0 {
                return Err(DensityError::CalibrationFailure {
                    message: format!("fitted vol {v} at observed strike {k} is out of domain"),
                    rms_error: None,
                });
            }
        }

        if let Some(max_rmse) = config.max_rmse {
            if !(rms_error <= max_rmse) {
                return Err(DensityError::CalibrationFailure {
                    message: format!("fit RMS error {rms_error:.6} exceeds {max_rmse}"),
                    rms_error: Some(rms_error),
                });
            }
        }

        #[cfg(feature = "logging")]
        tracing::debug!(
            alpha = norm_alpha,
            rho,
            nu,
            rms_error,
            iterations,
            "SABR calibration complete"
        );

        Ok(SabrCalibration {
            smile,
            normalized_alpha: norm_alpha,
            rms_error,
            iterations,
        })
    }

    fn raw_vol(&self, strike: f64) -> f64 {
        hagan_lognormal_vol(
            self.forward,
            strike,
            self.expiry,
            self.alpha,
            self.beta,
            self.rho,
            self.nu,
        )
    }
}

/// Hagan et al. (2002) lognormal implied vol approximation, eq. (2.17a).
///
/// The ATM limit is handled through the `z / x(z)` expansion, so the formula
/// is continuous through K = F.
fn hagan_lognormal_vol(
    forward: f64,
    strike: f64,
    expiry: f64,
    alpha: f64,
    beta: f64,
    rho: f64,
    nu: f64,
) -> f64 {
    let omb = 1.0 - beta;
    let fk = forward * strike;
    let fk_half = fk.powf(0.5 * omb);
    let log_fk = -log_moneyness(strike, forward);
    let log_fk2 = log_fk * log_fk;

    let denom =
        fk_half * (1.0 + omb * omb / 24.0 * log_fk2 + omb.powi(4) / 1920.0 * log_fk2 * log_fk2);

    let z = nu / alpha * fk_half * log_fk;
    let z_over_x = if z.abs() < 1e-7 {
        1.0 - 0.5 * rho * z
    } else {
        let x = (((1.0 - 2.0 * rho * z + z * z).sqrt() + z - rho) / (1.0 - rho)).ln();
        z / x
    };

    let correction = 1.0
        + (omb * omb / 24.0 * alpha * alpha / (fk_half * fk_half)
            + 0.25 * rho * beta * nu * alpha / fk_half
            + (2.0 - 3.0 * rho * rho) / 24.0 * nu * nu)
            * expiry;

    alpha / denom * z_over_x * correction
}

impl SmileSection for SabrSmile {
    fn vol(&self, strike: f64) -> error::Result<Vol> {
        validate_positive(strike, "strike")?;
        let v = self.raw_vol(strike);
        if !v.is_finite() || v <= 0.0 {
            return Err(DensityError::NumericDomainError {
                request: None,
                message: format!("SABR vol {v} at strike {strike} is out of domain"),
            });
        }
        Ok(Vol(v))
    }

    fn forward(&self) -> f64 {
        self.forward
    }

    fn expiry(&self) -> f64 {
        self.expiry
    }
}
