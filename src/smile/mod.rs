//! Single-expiry volatility smile models.
//!
//! A smile represents how implied volatility varies with strike at a fixed
//! expiry. Both models implement the [`SmileSection`] trait.
//!
//! ## Models
//!
//! - [`SabrSmile`] — SABR stochastic vol model (Hagan et al.), β held fixed
//! - [`SplineSmile`] — monotone cubic spline on vol, non-parametric fallback

pub mod sabr;
pub mod spline;

pub use sabr::{SabrCalibration, SabrSmile};
pub use spline::SplineSmile;

use crate::error;
use crate::types::Vol;

/// A single-expiry volatility smile.
///
/// # Thread Safety
/// All implementations must be `Send + Sync` so fitted smiles can be moved
/// across worker threads.
///
/// # Error Handling
/// Methods return `Result` so implementations can report numerical failures
/// (e.g., negative vol, NaN) rather than panicking.
pub trait SmileSection: Send + Sync {
    /// Implied Black–Scholes volatility σ at the given strike.
    fn vol(&self, strike: f64) -> error::Result<Vol>;

    /// Forward price F at this expiry.
    fn forward(&self) -> f64;

    /// Time to expiry T in years.
    fn expiry(&self) -> f64;
}
