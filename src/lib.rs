//! # rndensity
//!
//! Risk-neutral probability densities from a single expiration's option
//! quotes.
//!
//! Provides the full pipeline: raw quote table → smile calibration (SABR
//! with a monotone spline fallback) → Breeden–Litzenberger density →
//! summary statistics → similarity search over archived densities.
//!
//! ## Architecture
//!
//! - **`quotes`** — Quote filtering, price → implied vol inversion, deduplication
//! - **`smile`** — Single-expiry smile models (SABR, monotone cubic spline)
//! - **`surface`** — Calibrate-or-fallback and grid interpolation
//! - **`density`** — Breeden–Litzenberger extraction and [`DensityCurve`] queries
//! - **`stats`** — Moments, intervals and tail probabilities
//! - **`pattern`** — Ranking of historical densities by shape and statistics
//!
//! ## Design
//!
//! - **Pure functions.** Every stage takes immutable inputs and an explicit
//!   [`ExtractionConfig`]; there is no global state and no caching. Requests
//!   for different tickers or expirations can run on any thread.
//! - **No panics.** Every fallible operation returns [`Result`]. Library code
//!   never calls `unwrap()` or `expect()`.
//! - **Method is always reported.** When SABR is rejected the spline fallback
//!   is used and the reason travels with the [`ExtractionMetadata`].
//! - **Serializable.** Configuration, curves, summaries and metadata
//!   implement Serde `Serialize` / `Deserialize`, with validation on
//!   deserialization where invariants exist.
//!
//! ## Example
//!
//! ```
//! use rndensity::{analyze, ExtractionConfig, MarketContext, OptionType, QuoteRow};
//!
//! let ctx = MarketContext::new(100.0, 0.03, 30.0 / 365.0)?;
//! let quotes: Vec<QuoteRow> = (0..20)
//!     .map(|i| QuoteRow::implied_vol(80.0 + 2.0 * i as f64, 0.2, OptionType::Call))
//!     .collect();
//!
//! let analysis = analyze(&quotes, &ctx, &ExtractionConfig::default())?;
//! assert!((analysis.curve.integral() - 1.0).abs() < 1e-9);
//! assert!(analysis.summary.std_dev > 0.0);
//! # Ok::<(), rndensity::DensityError>(())
//! ```

pub mod config;
pub mod conventions;
pub mod density;
pub mod error;
pub mod implied;
pub(crate) mod numeric;
mod optim;
pub mod pattern;
pub mod quotes;
pub mod smile;
pub mod stats;
pub mod surface;
pub mod types;
mod validate;

use serde::{Deserialize, Serialize};

#[doc(inline)]
pub use config::{CalibrationPreference, ExtractionConfig, GridConfig, SabrConfig, SmoothingConfig};
#[doc(inline)]
pub use density::{extract_density, DensityCurve, DensityExtraction, ExtractionMetadata};
#[doc(inline)]
pub use error::{DensityError, Result};
#[doc(inline)]
pub use pattern::{HistoricalSnapshot, PatternConfig, PatternIndex, SimilarityMatch};
#[doc(inline)]
pub use smile::SmileSection;
#[doc(inline)]
pub use stats::{summarize, DistributionSummary};
#[doc(inline)]
pub use surface::{calibrate, interpolate, CalibrationMethod, SurfaceModel};
#[doc(inline)]
pub use types::{MarketContext, OptionType, QuoteRow, QuoteValue, RequestId, Vol};

/// Everything produced for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub curve: DensityCurve,
    pub summary: DistributionSummary,
    pub metadata: ExtractionMetadata,
}

/// Calibrate, extract and summarize in one call.
///
/// # Errors
/// Any error of [`calibrate`] or [`extract_density`].
pub fn analyze(
    quotes: &[QuoteRow],
    ctx: &MarketContext,
    config: &ExtractionConfig,
) -> Result<Analysis> {
    let model = calibrate(quotes, ctx, config)?;
    let DensityExtraction { curve, metadata } = extract_density(quotes, ctx, &model, config)?;
    let summary = summarize(&curve, ctx);
    Ok(Analysis {
        curve,
        summary,
        metadata,
    })
}
