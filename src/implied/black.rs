//! Black–Scholes pricing and implied volatility inversion.
//!
//! Spot-based Black–Scholes with a continuously compounded rate and no
//! dividends:
//!
//! ```text
//! C = S·Φ(d₁) − K·e^{−rT}·Φ(d₂)
//! P = K·e^{−rT}·Φ(−d₂) − S·Φ(−d₁)
//! d₁ = [ln(S/K) + (r + σ²/2)T] / (σ√T),  d₂ = d₁ − σ√T
//! ```

use std::f64::consts::{FRAC_1_SQRT_2, PI};

use statrs::function::erf::erfc;

use crate::error::{self, DensityError};
use crate::types::{OptionType, Vol};
use crate::validate::{validate_finite, validate_positive};

/// Upper end of the implied vol search bracket (1000%).
const VOL_CEILING: f64 = 10.0;
/// Lower end of the implied vol search bracket.
const VOL_FLOOR: f64 = 1e-6;
/// Price tolerance for the inversion.
const PRICE_TOL: f64 = 1e-10;
/// Iteration cap for the safeguarded Newton search.
const MAX_ITER: usize = 100;

/// Standard normal cumulative distribution function.
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x * FRAC_1_SQRT_2)
}

/// Standard normal probability density function.
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Black–Scholes price of a European option.
///
/// `vol` and `expiry` must be positive; the result is non-finite otherwise.
pub fn black_scholes_price(
    spot: f64,
    strike: f64,
    rate: f64,
    expiry: f64,
    vol: f64,
    option_type: OptionType,
) -> f64 {
    let sqrt_t = expiry.sqrt();
    let d1 = ((spot / strike).ln() + (rate + 0.5 * vol * vol) * expiry) / (vol * sqrt_t);
    let d2 = d1 - vol * sqrt_t;
    let df = (-rate * expiry).exp();
    match option_type {
        OptionType::Call => spot * norm_cdf(d1) - strike * df * norm_cdf(d2),
        OptionType::Put => strike * df * norm_cdf(-d2) - spot * norm_cdf(-d1),
    }
}

/// Black–Scholes vega ∂V/∂σ (identical for calls and puts).
pub fn black_scholes_vega(spot: f64, strike: f64, rate: f64, expiry: f64, vol: f64) -> f64 {
    let sqrt_t = expiry.sqrt();
    let d1 = ((spot / strike).ln() + (rate + 0.5 * vol * vol) * expiry) / (vol * sqrt_t);
    spot * norm_pdf(d1) * sqrt_t
}

/// Black–Scholes implied volatility calculator.
///
/// Newton iteration on vega, safeguarded by a shrinking bisection bracket so
/// that every step stays inside `[1e-6, 10]`.
pub struct BlackScholesImpliedVol;

impl BlackScholesImpliedVol {
    /// Compute the implied volatility of a quoted option premium.
    ///
    /// # Arguments
    /// * `option_price` — Market premium (must be > 0)
    /// * `spot` — Spot price (must be > 0)
    /// * `strike` — Strike price (must be > 0)
    /// * `rate` — Continuously compounded risk-free rate
    /// * `expiry` — Time to expiry in years (must be > 0)
    /// * `option_type` — Call or Put
    ///
    /// # Errors
    /// Returns [`DensityError::InvalidInput`] for non-positive inputs or a
    /// premium outside the no-arbitrage bounds, and
    /// [`DensityError::NumericDomainError`] if the search does not converge.
    pub fn compute(
        option_price: f64,
        spot: f64,
        strike: f64,
        rate: f64,
        expiry: f64,
        option_type: OptionType,
    ) -> error::Result<Vol> {
        validate_positive(option_price, "option price")?;
        validate_positive(spot, "spot")?;
        validate_positive(strike, "strike")?;
        validate_finite(rate, "rate")?;
        validate_positive(expiry, "expiry")?;

        let df = (-rate * expiry).exp();
        let (lower, upper) = match option_type {
            OptionType::Call => ((spot - strike * df).max(0.0), spot),
            OptionType::Put => ((strike * df - spot).max(0.0), strike * df),
        };
        if option_price <= lower || option_price >= upper {
            return Err(DensityError::InvalidInput {
                message: format!(
                    "price {option_price} at strike {strike} is outside no-arbitrage bounds \
                     ({lower}, {upper})"
                ),
            });
        }

        let price_at = |v: f64| black_scholes_price(spot, strike, rate, expiry, v, option_type);

        let mut lo = VOL_FLOOR;
        let mut hi = VOL_CEILING;
        if price_at(hi) < option_price {
            return Err(DensityError::InvalidInput {
                message: format!(
                    "price {option_price} at strike {strike} implies vol above {VOL_CEILING}"
                ),
            });
        }

        let mut vol = 0.3;
        for _ in 0..MAX_ITER {
            let diff = price_at(vol) - option_price;
            if diff.abs() < PRICE_TOL {
                return Ok(Vol(vol));
            }
            // Price is increasing in vol, so the sign of diff moves the bracket.
            if diff > 0.0 {
                hi = vol;
            } else {
                lo = vol;
            }
            let vega = black_scholes_vega(spot, strike, rate, expiry, vol);
            let newton = vol - diff / vega;
            vol = if vega > 1e-12 && newton > lo && newton < hi {
                newton
            } else {
                0.5 * (lo + hi)
            };
            if hi - lo < 1e-14 {
                return Ok(Vol(vol));
            }
        }

        Err(DensityError::NumericDomainError {
            request: None,
            message: format!("implied vol search did not converge for strike {strike}"),
        })
    }
}
