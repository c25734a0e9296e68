//! Core domain types: quote rows, market context and output newtypes.
//!
//! # Newtype Strategy
//!
//! **Outputs use newtypes** where mixing is a real hazard: [`Vol`] wraps the
//! implied volatilities returned by the surface so they cannot be confused
//! with prices or densities sampled on the same grid.
//!
//! **Inputs use bare `f64`** with validation in constructors
//! ([`QuoteRow::implied_vol`], [`MarketContext::new`]).
//!
//! # Why no `Eq` or `Ord`?
//! These types wrap `f64`, which does not implement `Eq` or `Ord` because `NaN`
//! breaks total ordering. We derive `PartialEq` and `PartialOrd` only.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{self, DensityError};
use crate::validate::{validate_finite, validate_positive};

/// Implied volatility `σ`, measured as annualized standard deviation.
///
/// # Examples
/// ```
/// use rndensity::types::Vol;
/// let vol = Vol(0.18);
/// assert_eq!(vol.0, 0.18);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Vol(pub f64);

/// Option type: call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    /// Right to buy at strike price.
    #[default]
    Call,
    /// Right to sell at strike price.
    Put,
}

/// What the market-data collaborator quoted for a contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteValue {
    /// Annualized Black–Scholes implied volatility (0.18 = 18%).
    ImpliedVol(f64),
    /// Option premium; converted to an implied vol before calibration.
    Price(f64),
}

/// One row of the option quote table.
///
/// Rows are not validated on construction: the quote table is external data
/// and bad rows are reported as [`DensityError::InvalidQuotes`] by the
/// pipeline, with the request context attached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteRow {
    pub strike: f64,
    pub value: QuoteValue,
    pub option_type: OptionType,
}

impl QuoteRow {
    /// A quote carrying an implied volatility.
    pub fn implied_vol(strike: f64, vol: f64, option_type: OptionType) -> Self {
        Self {
            strike,
            value: QuoteValue::ImpliedVol(vol),
            option_type,
        }
    }

    /// A quote carrying only a premium.
    pub fn price(strike: f64, price: f64, option_type: OptionType) -> Self {
        Self {
            strike,
            value: QuoteValue::Price(price),
            option_type,
        }
    }
}

/// Identifies a single extraction request (one ticker, one expiration).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId {
    ticker: String,
    expiration: NaiveDate,
}

impl RequestId {
    pub fn new(ticker: impl Into<String>, expiration: NaiveDate) -> Self {
        Self {
            ticker: ticker.into(),
            expiration,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn expiration(&self) -> NaiveDate {
        self.expiration
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ticker, self.expiration)
    }
}

/// Market inputs for one expiration, supplied by the caller.
///
/// Immutable once constructed. The risk-free rate is continuously compounded
/// and may be negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MarketContextRaw", into = "MarketContextRaw")]
pub struct MarketContext {
    spot: f64,
    rate: f64,
    time_to_expiry: f64,
    request: Option<RequestId>,
}

#[derive(Serialize, Deserialize)]
struct MarketContextRaw {
    spot: f64,
    rate: f64,
    time_to_expiry: f64,
    #[serde(default)]
    request: Option<RequestId>,
}

impl TryFrom<MarketContextRaw> for MarketContext {
    type Error = DensityError;
    fn try_from(raw: MarketContextRaw) -> Result<Self, Self::Error> {
        let ctx = Self::new(raw.spot, raw.rate, raw.time_to_expiry)?;
        Ok(match raw.request {
            Some(id) => ctx.with_request(id),
            None => ctx,
        })
    }
}

impl From<MarketContext> for MarketContextRaw {
    fn from(c: MarketContext) -> Self {
        Self {
            spot: c.spot,
            rate: c.rate,
            time_to_expiry: c.time_to_expiry,
            request: c.request,
        }
    }
}

impl MarketContext {
    /// Create a market context.
    ///
    /// # Errors
    /// Returns [`DensityError::InvalidInput`] if `spot` or `time_to_expiry` is
    /// not positive and finite, or `rate` is not finite.
    pub fn new(spot: f64, rate: f64, time_to_expiry: f64) -> error::Result<Self> {
        validate_positive(spot, "spot")?;
        validate_finite(rate, "rate")?;
        validate_positive(time_to_expiry, "time to expiry")?;
        Ok(Self {
            spot,
            rate,
            time_to_expiry,
            request: None,
        })
    }

    /// Attach the ticker/expiration reported on request-level errors.
    pub fn with_request(mut self, request: RequestId) -> Self {
        self.request = Some(request);
        self
    }

    pub fn spot(&self) -> f64 {
        self.spot
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn time_to_expiry(&self) -> f64 {
        self.time_to_expiry
    }

    pub fn request(&self) -> Option<&RequestId> {
        self.request.as_ref()
    }

    /// Forward price F = S · exp(r · T).
    pub fn forward(&self) -> f64 {
        crate::conventions::forward_price(self.spot, self.rate, self.time_to_expiry)
    }

    /// Discount factor exp(−r · T).
    pub fn discount_factor(&self) -> f64 {
        (-self.rate * self.time_to_expiry).exp()
    }

    pub(crate) fn invalid_quotes(&self, message: impl Into<String>) -> DensityError {
        DensityError::InvalidQuotes {
            request: self.request.clone(),
            message: message.into(),
        }
    }

    pub(crate) fn numeric_error(&self, message: impl Into<String>) -> DensityError {
        DensityError::NumericDomainError {
            request: self.request.clone(),
            message: message.into(),
        }
    }
}
