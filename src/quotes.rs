//! Quote table preparation.
//!
//! Turns raw quote rows into the sorted `(strike, vol)` smile that both the
//! SABR fit and the spline fallback consume.

use crate::config::ExtractionConfig;
use crate::conventions::moneyness;
use crate::error::{self, DensityError};
use crate::implied::BlackScholesImpliedVol;
use crate::types::{MarketContext, QuoteRow, QuoteValue};

/// Relative tolerance under which two strikes are treated as the same listing.
const STRIKE_MERGE_TOL: f64 = 1e-9;

/// Filter, validate and deduplicate a quote table into a smile.
///
/// Rows of `config.option_type` inside the optional strike window are kept.
/// Price-only rows are inverted to Black–Scholes implied vols. Duplicate
/// strikes are merged by averaging their vols. The result is sorted by
/// strike.
///
/// # Errors
/// - [`DensityError::InvalidQuotes`] if any row carries a non-positive or
///   non-finite strike, vol or price, or a price outside no-arbitrage bounds
/// - [`DensityError::InsufficientData`] if fewer than `config.min_strikes`
///   distinct strikes survive
pub fn prepare_smile(
    quotes: &[QuoteRow],
    ctx: &MarketContext,
    config: &ExtractionConfig,
) -> error::Result<Vec<(f64, f64)>> {
    for (i, row) in quotes.iter().enumerate() {
        check_row(i, row, ctx)?;
    }

    let mut points = Vec::with_capacity(quotes.len());
    for row in quotes.iter().filter(|r| r.option_type == config.option_type) {
        if let Some((lo, hi)) = config.strike_window {
            let m = moneyness(row.strike, ctx.spot());
            if m < lo || m > hi {
                continue;
            }
        }
        let vol = match row.value {
            QuoteValue::ImpliedVol(v) => v,
            QuoteValue::Price(p) => BlackScholesImpliedVol::compute(
                p,
                ctx.spot(),
                row.strike,
                ctx.rate(),
                ctx.time_to_expiry(),
                row.option_type,
            )
            .map_err(|e| {
                ctx.invalid_quotes(format!("cannot invert price at strike {}: {e}", row.strike))
            })?
            .0,
        };
        points.push((row.strike, vol));
    }

    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    let smile = merge_duplicates(points);

    if smile.len() < config.min_strikes {
        return Err(DensityError::InsufficientData {
            request: ctx.request().cloned(),
            required: config.min_strikes,
            found: smile.len(),
        });
    }

    Ok(smile)
}

fn check_row(index: usize, row: &QuoteRow, ctx: &MarketContext) -> error::Result<()> {
    if !row.strike.is_finite() || row.strike <= 0.0 {
        return Err(ctx.invalid_quotes(format!(
            "row {index}: strike {} must be positive and finite",
            row.strike
        )));
    }
    match row.value {
        QuoteValue::ImpliedVol(v) if !v.is_finite() || v <= 0.0 => Err(ctx.invalid_quotes(format!(
            "row {index}: implied vol {v} at strike {} must be positive and finite",
            row.strike
        ))),
        QuoteValue::Price(p) if !p.is_finite() || p <= 0.0 => Err(ctx.invalid_quotes(format!(
            "row {index}: price {p} at strike {} must be positive and finite",
            row.strike
        ))),
        _ => Ok(()),
    }
}

/// Average vols of consecutive equal strikes in a strike-sorted list.
fn merge_duplicates(sorted: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    let mut out: Vec<(f64, f64)> = Vec::with_capacity(sorted.len());
    let mut count = 0usize;
    for (k, v) in sorted {
        match out.last_mut() {
            Some(last) if (k - last.0).abs() <= STRIKE_MERGE_TOL * k => {
                count += 1;
                last.1 += (v - last.1) / count as f64;
            }
            _ => {
                out.push((k, v));
                count = 1;
            }
        }
    }
    out
}
