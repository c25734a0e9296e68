//! Error types for the rndensity library.
//!
//! All fallible operations return `Result<T, DensityError>` rather than panicking.
//! Request-level failures carry the ticker/expiration of the [`MarketContext`]
//! they were raised for, so the calling service can report them without
//! threading its own context through.
//!
//! [`MarketContext`]: crate::types::MarketContext

use thiserror::Error;

use crate::types::RequestId;

/// Convenience type alias for results in this crate.
pub type Result<T> = std::result::Result<T, DensityError>;

/// Errors that can occur while extracting or analysing a risk-neutral density.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DensityError {
    /// Too few usable strikes of the requested option type to fit a smile.
    #[error(
        "insufficient data for {}: need at least {required} distinct strikes, got {found}",
        describe(.request)
    )]
    InsufficientData {
        request: Option<RequestId>,
        required: usize,
        found: usize,
    },

    /// Quote rows carry non-positive or non-finite strikes, vols or prices.
    #[error("invalid quotes for {}: {message}", describe(.request))]
    InvalidQuotes {
        request: Option<RequestId>,
        message: String,
    },

    /// SABR calibration did not produce a usable fit.
    ///
    /// Recovered inside [`calibrate`](crate::surface::calibrate) by falling back
    /// to the spline smile; it only reaches callers as metadata.
    #[error("calibration failed: {message}")]
    CalibrationFailure {
        message: String,
        /// RMS vol error of the rejected fit, if one was produced.
        rms_error: Option<f64>,
    },

    /// The pre-normalization density integral was non-positive or non-finite.
    #[error(
        "degenerate density for {}: pre-normalization integral is {integral}",
        describe(.request)
    )]
    DegenerateDensity {
        request: Option<RequestId>,
        integral: f64,
    },

    /// An intermediate value (vol, price, derivative) became non-finite.
    #[error("numeric domain error for {}: {message}", describe(.request))]
    NumericDomainError {
        request: Option<RequestId>,
        message: String,
    },

    /// Caller-supplied context, configuration or curve data is invalid.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl DensityError {
    /// The request this error was raised for, if the context carried one.
    pub fn request(&self) -> Option<&RequestId> {
        match self {
            Self::InsufficientData { request, .. }
            | Self::InvalidQuotes { request, .. }
            | Self::DegenerateDensity { request, .. }
            | Self::NumericDomainError { request, .. } => request.as_ref(),
            Self::CalibrationFailure { .. } | Self::InvalidInput { .. } => None,
        }
    }
}

fn describe(request: &Option<RequestId>) -> String {
    match request {
        Some(id) => id.to_string(),
        None => "unlabelled request".to_string(),
    }
}
