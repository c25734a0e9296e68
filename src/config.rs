//! Per-request configuration.
//!
//! Every knob of the pipeline lives in an explicit [`ExtractionConfig`] value
//! passed into each call. There is no process-wide state, so concurrent
//! requests with different policies never interfere.
//!
//! ```
//! use rndensity::config::{ExtractionConfig, SmoothingConfig};
//! use rndensity::types::OptionType;
//!
//! let config = ExtractionConfig::default()
//!     .with_option_type(OptionType::Put)
//!     .with_grid_points(400)
//!     .with_smoothing(Some(SmoothingConfig::new(15, 3)));
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{self, DensityError};
use crate::types::OptionType;
use crate::validate::{validate_positive, validate_range};

/// Smallest strike grid accepted by the extractor.
pub const MIN_GRID_POINTS: usize = 100;

/// Which smile model the surface should try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationPreference {
    /// Fit SABR, falling back to the spline smile when the fit is unusable.
    #[default]
    SabrWithFallback,
    /// Skip SABR and interpolate the observed smile directly.
    SplineOnly,
}

/// SABR calibration policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SabrConfig {
    /// CEV exponent β ∈ \[0, 1\], held fixed during calibration.
    pub beta: f64,
    /// Seed for (alpha, rho, nu). Alpha is the normalized ATM vol scale.
    pub initial_guess: [f64; 3],
    /// Bounds on normalized alpha.
    pub alpha_bounds: (f64, f64),
    /// Bounds on rho.
    pub rho_bounds: (f64, f64),
    /// Bounds on nu.
    pub nu_bounds: (f64, f64),
    /// Nelder-Mead iteration cap.
    pub max_iterations: usize,
    /// Fits with a larger RMS vol error are rejected. `None` disables the check.
    pub max_rmse: Option<f64>,
}

impl Default for SabrConfig {
    fn default() -> Self {
        Self {
            beta: 0.5,
            initial_guess: [0.2, -0.3, 0.3],
            alpha_bounds: (0.001, 2.0),
            rho_bounds: (-0.999, 0.999),
            nu_bounds: (0.001, 2.0),
            max_iterations: 1000,
            max_rmse: Some(0.05),
        }
    }
}

impl SabrConfig {
    /// # Errors
    /// Returns [`DensityError::InvalidInput`] for out-of-range settings.
    pub fn validate(&self) -> error::Result<()> {
        if !(0.0..=1.0).contains(&self.beta) {
            return Err(DensityError::InvalidInput {
                message: format!("beta must be in [0, 1], got {}", self.beta),
            });
        }
        let (a_lo, a_hi) = self.alpha_bounds;
        let (r_lo, r_hi) = self.rho_bounds;
        let (n_lo, n_hi) = self.nu_bounds;
        validate_range(a_lo, a_hi, "alpha bounds")?;
        validate_range(r_lo, r_hi, "rho bounds")?;
        validate_range(n_lo, n_hi, "nu bounds")?;
        if a_lo <= 0.0 || n_lo < 0.0 || r_lo <= -1.0 || r_hi >= 1.0 {
            return Err(DensityError::InvalidInput {
                message: "alpha must stay positive, nu non-negative and |rho| < 1".into(),
            });
        }
        let [a0, r0, n0] = self.initial_guess;
        if !(a_lo..=a_hi).contains(&a0)
            || !(r_lo..=r_hi).contains(&r0)
            || !(n_lo..=n_hi).contains(&n0)
        {
            return Err(DensityError::InvalidInput {
                message: format!("initial guess {:?} lies outside the bounds", self.initial_guess),
            });
        }
        if self.max_iterations == 0 {
            return Err(DensityError::InvalidInput {
                message: "max_iterations must be at least 1".into(),
            });
        }
        if let Some(rmse) = self.max_rmse {
            validate_positive(rmse, "max_rmse")?;
        }
        Ok(())
    }
}

/// Strike grid used for the density.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Number of grid points (at least [`MIN_GRID_POINTS`]).
    pub points: usize,
    /// Lowest grid strike as a multiple of spot.
    pub lower_multiple: f64,
    /// Highest grid strike as a multiple of spot.
    pub upper_multiple: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            points: 500,
            lower_multiple: 0.5,
            upper_multiple: 2.0,
        }
    }
}

impl GridConfig {
    /// # Errors
    /// Returns [`DensityError::InvalidInput`] for a grid that is too small or
    /// a strike range that is empty or non-positive.
    pub fn validate(&self) -> error::Result<()> {
        if self.points < MIN_GRID_POINTS {
            return Err(DensityError::InvalidInput {
                message: format!(
                    "grid needs at least {MIN_GRID_POINTS} points, got {}",
                    self.points
                ),
            });
        }
        validate_positive(self.lower_multiple, "lower strike multiple")?;
        validate_range(self.lower_multiple, self.upper_multiple, "strike multiples")?;
        Ok(())
    }
}

/// Savitzky–Golay smoothing applied to the clamped density.
///
/// `window` is an upper bound in grid points. The extractor narrows it so
/// the window spans at most `max_width_std` standard deviations of the
/// unsmoothed density, and skips the filter when the narrowed window can no
/// longer hold more points than the polynomial has coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Odd window length in grid points.
    pub window: usize,
    /// Local polynomial order, smaller than `window`.
    pub order: usize,
    /// Widest window in strike terms, in standard deviations of the density.
    pub max_width_std: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window: 21,
            order: 3,
            max_width_std: 1.0,
        }
    }
}

impl SmoothingConfig {
    /// Savitzky–Golay settings with the default width cap.
    pub fn new(window: usize, order: usize) -> Self {
        Self {
            window,
            order,
            ..Self::default()
        }
    }

    /// # Errors
    /// Returns [`DensityError::InvalidInput`] for an even window, an order
    /// that does not fit inside it or a non-positive width cap.
    pub fn validate(&self) -> error::Result<()> {
        if self.window < 3 || self.window % 2 == 0 {
            return Err(DensityError::InvalidInput {
                message: format!("smoothing window must be odd and >= 3, got {}", self.window),
            });
        }
        if self.order >= self.window {
            return Err(DensityError::InvalidInput {
                message: format!(
                    "smoothing order {} must be smaller than window {}",
                    self.order, self.window
                ),
            });
        }
        validate_positive(self.max_width_std, "smoothing max_width_std")?;
        Ok(())
    }

    /// Window actually applied on a grid with spacing `step` to a density
    /// with standard deviation `std_dev`, or `None` when it is too narrow
    /// to smooth anything.
    pub fn effective_window(&self, step: f64, std_dev: f64) -> Option<usize> {
        let half_cap = 0.5 * self.max_width_std * std_dev / step;
        let window = if half_cap.is_finite() && half_cap >= 0.0 {
            // Saturating float-to-int cast.
            self.window.min(2 * (half_cap as usize).min(self.window / 2) + 1)
        } else {
            self.window
        };
        (window > self.order + 1).then_some(window)
    }
}

/// Everything one extraction request needs besides quotes and market data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Option type whose quotes drive the smile.
    pub option_type: OptionType,
    /// Minimum number of distinct usable strikes.
    pub min_strikes: usize,
    /// Keep only quotes with `lo·S ≤ K ≤ hi·S`. `None` keeps all.
    pub strike_window: Option<(f64, f64)>,
    pub preference: CalibrationPreference,
    pub sabr: SabrConfig,
    pub grid: GridConfig,
    /// `None` disables smoothing.
    pub smoothing: Option<SmoothingConfig>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            option_type: OptionType::Call,
            min_strikes: 10,
            strike_window: None,
            preference: CalibrationPreference::SabrWithFallback,
            sabr: SabrConfig::default(),
            grid: GridConfig::default(),
            smoothing: Some(SmoothingConfig::default()),
        }
    }
}

impl ExtractionConfig {
    pub fn with_option_type(mut self, option_type: OptionType) -> Self {
        self.option_type = option_type;
        self
    }

    pub fn with_min_strikes(mut self, min_strikes: usize) -> Self {
        self.min_strikes = min_strikes;
        self
    }

    pub fn with_strike_window(mut self, lo: f64, hi: f64) -> Self {
        self.strike_window = Some((lo, hi));
        self
    }

    pub fn with_preference(mut self, preference: CalibrationPreference) -> Self {
        self.preference = preference;
        self
    }

    pub fn with_sabr(mut self, sabr: SabrConfig) -> Self {
        self.sabr = sabr;
        self
    }

    pub fn with_grid_points(mut self, points: usize) -> Self {
        self.grid.points = points;
        self
    }

    pub fn with_strike_range(mut self, lower_multiple: f64, upper_multiple: f64) -> Self {
        self.grid.lower_multiple = lower_multiple;
        self.grid.upper_multiple = upper_multiple;
        self
    }

    pub fn with_smoothing(mut self, smoothing: Option<SmoothingConfig>) -> Self {
        self.smoothing = smoothing;
        self
    }

    /// Check every section of the configuration.
    ///
    /// # Errors
    /// Returns [`DensityError::InvalidInput`] describing the first bad setting.
    pub fn validate(&self) -> error::Result<()> {
        // Spline smiles need at least three knots.
        if self.min_strikes < 3 {
            return Err(DensityError::InvalidInput {
                message: format!("min_strikes must be at least 3, got {}", self.min_strikes),
            });
        }
        if let Some((lo, hi)) = self.strike_window {
            validate_positive(lo, "strike window lower bound")?;
            validate_range(lo, hi, "strike window")?;
        }
        self.sabr.validate()?;
        self.grid.validate()?;
        if let Some(smoothing) = &self.smoothing {
            smoothing.validate()?;
            if smoothing.window > self.grid.points {
                return Err(DensityError::InvalidInput {
                    message: format!(
                        "smoothing window {} exceeds grid size {}",
                        smoothing.window, self.grid.points
                    ),
                });
            }
        }
        Ok(())
    }
}
