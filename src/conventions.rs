//! Market conventions shared by the smile models and the density pipeline.

/// Convert a strike to log-moneyness: k = ln(K / F).
pub fn log_moneyness(strike: f64, forward: f64) -> f64 {
    (strike / forward).ln()
}

/// Convert a strike to simple moneyness: m = K / S.
pub fn moneyness(strike: f64, spot: f64) -> f64 {
    strike / spot
}

/// Compute forward price from spot: F = S · exp(r · T).
pub fn forward_price(spot: f64, rate: f64, expiry: f64) -> f64 {
    spot * (rate * expiry).exp()
}
