//! Single-expiry volatility surface: calibrate once, interpolate anywhere.
//!
//! [`calibrate`] fits a SABR smile (β fixed) to the prepared quotes and
//! falls back to a monotone cubic spline through the observed vols when the
//! fit is unusable. [`interpolate`] evaluates the fitted smile on an
//! arbitrary strike grid. The method actually used is always recorded on
//! the [`SurfaceModel`].

use serde::{Deserialize, Serialize};

use crate::config::{CalibrationPreference, ExtractionConfig};
use crate::error;
use crate::quotes::prepare_smile;
use crate::smile::{SabrSmile, SmileSection, SplineSmile};
use crate::types::{MarketContext, QuoteRow, RequestId, Vol};

/// Which smile model ended up describing the market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationMethod {
    Sabr,
    Spline,
}

/// The fitted smile, tagged by model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum FittedSmile {
    Sabr(SabrSmile),
    Spline(SplineSmile),
}

impl FittedSmile {
    pub fn method(&self) -> CalibrationMethod {
        match self {
            Self::Sabr(_) => CalibrationMethod::Sabr,
            Self::Spline(_) => CalibrationMethod::Spline,
        }
    }
}

impl SmileSection for FittedSmile {
    fn vol(&self, strike: f64) -> error::Result<Vol> {
        match self {
            Self::Sabr(s) => s.vol(strike),
            Self::Spline(s) => s.vol(strike),
        }
    }

    fn forward(&self) -> f64 {
        match self {
            Self::Sabr(s) => s.forward(),
            Self::Spline(s) => s.forward(),
        }
    }

    fn expiry(&self) -> f64 {
        match self {
            Self::Sabr(s) => s.expiry(),
            Self::Spline(s) => s.expiry(),
        }
    }
}

/// Calibrated SABR parameters as reported to callers.
///
/// `alpha` is in normalized units (α / F^{1−β}), comparable across
/// underlyings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SabrParams {
    pub alpha: f64,
    pub beta: f64,
    pub rho: f64,
    pub nu: f64,
}

/// Result of calibrating the surface for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceModel {
    smile: FittedSmile,
    sabr: Option<SabrParams>,
    rms_error: Option<f64>,
    iterations: Option<usize>,
    fallback_reason: Option<String>,
    observed: Vec<(f64, f64)>,
    request: Option<RequestId>,
}

impl SurfaceModel {
    /// Calibration method actually used.
    pub fn method(&self) -> CalibrationMethod {
        self.smile.method()
    }

    pub fn smile(&self) -> &FittedSmile {
        &self.smile
    }

    /// SABR parameters, present only when SABR was used.
    pub fn sabr_params(&self) -> Option<SabrParams> {
        self.sabr
    }

    /// RMS vol error of the SABR fit on the observed strikes.
    pub fn rms_error(&self) -> Option<f64> {
        self.rms_error
    }

    /// Nelder–Mead iterations of the accepted SABR fit.
    pub fn iterations(&self) -> Option<usize> {
        self.iterations
    }

    /// Why SABR was rejected, when the spline fallback fired.
    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }

    /// Prepared `(strike, vol)` pairs the smile was fitted to.
    pub fn observed(&self) -> &[(f64, f64)] {
        &self.observed
    }

    /// Lowest and highest observed strike.
    pub fn observed_range(&self) -> (f64, f64) {
        match (self.observed.first(), self.observed.last()) {
            (Some(lo), Some(hi)) => (lo.0, hi.0),
            _ => (f64::NAN, f64::NAN),
        }
    }

    pub fn request(&self) -> Option<&RequestId> {
        self.request.as_ref()
    }
}

/// Fit the volatility smile for one request.
///
/// Runs quote preparation, then SABR with β fixed by `config.sabr.beta`.
/// Any SABR failure (non-convergence, out-of-domain fitted vol, RMSE above
/// `config.sabr.max_rmse`) is recovered by a monotone cubic spline through
/// the observed vols; the reason is kept in
/// [`SurfaceModel::fallback_reason`].
///
/// # Errors
/// - [`DensityError::InvalidInput`](crate::DensityError::InvalidInput) for an invalid config
/// - [`DensityError::InvalidQuotes`](crate::DensityError::InvalidQuotes) and
///   [`DensityError::InsufficientData`](crate::DensityError::InsufficientData)
///   from quote preparation
pub fn calibrate(
    quotes: &[QuoteRow],
    ctx: &MarketContext,
    config: &ExtractionConfig,
) -> error::Result<SurfaceModel> {
    config.validate()?;
    let observed = prepare_smile(quotes, ctx, config)?;
    let forward = ctx.forward();
    let expiry = ctx.time_to_expiry();

    #[cfg(feature = "logging")]
    tracing::debug!(
        request = ?ctx.request(),
        forward,
        expiry,
        n_strikes = observed.len(),
        preference = ?config.preference,
        "surface calibration started"
    );

    let sabr_attempt = match config.preference {
        CalibrationPreference::SabrWithFallback => {
            Some(SabrSmile::calibrate(forward, expiry, &observed, &config.sabr))
        }
        CalibrationPreference::SplineOnly => None,
    };

    let model = match sabr_attempt {
        Some(Ok(fit)) => SurfaceModel {
            sabr: Some(SabrParams {
                alpha: fit.normalized_alpha,
                beta: fit.smile.beta(),
                rho: fit.smile.rho(),
                nu: fit.smile.nu(),
            }),
            rms_error: Some(fit.rms_error),
            iterations: Some(fit.iterations),
            smile: FittedSmile::Sabr(fit.smile),
            fallback_reason: None,
            observed,
            request: ctx.request().cloned(),
        },
        Some(Err(e)) => {
            #[cfg(feature = "logging")]
            tracing::warn!(
                request = ?ctx.request(),
                reason = %e,
                "SABR rejected, falling back to monotone spline"
            );
            spline_model(observed, ctx, Some(e.to_string()))?
        }
        None => spline_model(observed, ctx, None)?,
    };

    #[cfg(feature = "logging")]
    tracing::debug!(
        request = ?ctx.request(),
        method = ?model.method(),
        rms_error = ?model.rms_error,
        "surface calibration complete"
    );

    Ok(model)
}

fn spline_model(
    observed: Vec<(f64, f64)>,
    ctx: &MarketContext,
    fallback_reason: Option<String>,
) -> error::Result<SurfaceModel> {
    let (strikes, vols): (Vec<f64>, Vec<f64>) = observed.iter().copied().unzip();
    let spline = SplineSmile::new(ctx.forward(), ctx.time_to_expiry(), strikes, vols)
        .map_err(|e| ctx.invalid_quotes(e.to_string()))?;
    Ok(SurfaceModel {
        smile: FittedSmile::Spline(spline),
        sabr: None,
        rms_error: None,
        iterations: None,
        fallback_reason,
        observed,
        request: ctx.request().cloned(),
    })
}

/// Evaluate the fitted smile on a strike grid.
///
/// # Errors
/// [`DensityError::NumericDomainError`](crate::DensityError::NumericDomainError),
/// carrying the model's request, if any vol is non-finite or non-positive.
pub fn interpolate(model: &SurfaceModel, strikes: &[f64]) -> error::Result<Vec<Vol>> {
    strikes
        .iter()
        .map(|&k| {
            model.smile.vol(k).map_err(|e| crate::DensityError::NumericDomainError {
                request: model.request.clone(),
                message: format!("smile evaluation failed at strike {k}: {e}"),
            })
        })
        .collect()
}
