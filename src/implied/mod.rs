//! Black–Scholes pricing and implied volatility extraction.
//!
//! - [`black_scholes_price`] reconstructs call prices on the density grid
//! - [`BlackScholesImpliedVol`] turns premium-only quotes into implied vols

pub mod black;

pub use black::{
    black_scholes_price, black_scholes_vega, norm_cdf, norm_pdf, BlackScholesImpliedVol,
};
