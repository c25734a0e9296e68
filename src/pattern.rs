//! Historical pattern matching of densities.
//!
//! [`PatternIndex::find_similar`] ranks a corpus of archived densities
//! against the current one. Each candidate gets a shape score (cosine
//! similarity of both curves resampled onto their common strike range) and a
//! stats score (closeness of skewness, excess kurtosis and implied move),
//! blended as `0.7·shape + 0.3·stats` by default.
//!
//! The corpus is read-only input owned by the caller's persistence layer;
//! nothing is cached between calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::density::DensityCurve;
use crate::error::{self, DensityError};
use crate::numeric::{interp_linear, linspace};
use crate::stats::DistributionSummary;

/// The features of a [`DistributionSummary`] used for stats matching.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapshotStatistics {
    pub skewness: f64,
    pub excess_kurtosis: f64,
    pub implied_move_pct: f64,
}

impl From<&DistributionSummary> for SnapshotStatistics {
    fn from(s: &DistributionSummary) -> Self {
        Self {
            skewness: s.skewness,
            excess_kurtosis: s.excess_kurtosis,
            implied_move_pct: s.implied_move_pct,
        }
    }
}

/// An archived density.
///
/// Loaded from external storage, so the curve is not re-validated: a
/// snapshot whose samples are unusable simply scores zero on shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSnapshot {
    pub strikes: Vec<f64>,
    pub values: Vec<f64>,
    pub statistics: SnapshotStatistics,
    pub timestamp: DateTime<Utc>,
    /// Optional tag such as "pre-earnings".
    #[serde(default)]
    pub event: Option<String>,
}

impl HistoricalSnapshot {
    /// Archive a freshly extracted density.
    pub fn from_curve(
        curve: &DensityCurve,
        summary: &DistributionSummary,
        timestamp: DateTime<Utc>,
        event: Option<String>,
    ) -> Self {
        Self {
            strikes: curve.strikes().to_vec(),
            values: curve.values().to_vec(),
            statistics: summary.into(),
            timestamp,
            event,
        }
    }
}

/// Scoring knobs for [`PatternIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub shape_weight: f64,
    pub stats_weight: f64,
    /// Points of the common grid both curves are resampled onto.
    pub resample_points: usize,
    pub skew_scale: f64,
    pub kurtosis_scale: f64,
    /// In percent points of spot.
    pub move_scale: f64,
    /// Drop matches scoring below this. `None` keeps all.
    pub min_score: Option<f64>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            shape_weight: 0.7,
            stats_weight: 0.3,
            resample_points: 100,
            skew_scale: 1.0,
            kurtosis_scale: 1.0,
            move_scale: 5.0,
            min_score: None,
        }
    }
}

impl PatternConfig {
    /// # Errors
    /// Returns [`DensityError::InvalidInput`] for negative weights or weights
    /// not summing to 1, fewer than 2 resample points, non-positive scales,
    /// or a `min_score` outside `[0, 1]`.
    pub fn validate(&self) -> error::Result<()> {
        let invalid = |message: String| Err(DensityError::InvalidInput { message });
        if !(self.shape_weight >= 0.0 && self.stats_weight >= 0.0)
            || (self.shape_weight + self.stats_weight - 1.0).abs() > 1e-9
        {
            return invalid(format!(
                "pattern weights must be non-negative and sum to 1, got {} and {}",
                self.shape_weight, self.stats_weight
            ));
        }
        if self.resample_points < 2 {
            return invalid(format!("resample_points must be >= 2, got {}", self.resample_points));
        }
        for (scale, name) in [
            (self.skew_scale, "skew_scale"),
            (self.kurtosis_scale, "kurtosis_scale"),
            (self.move_scale, "move_scale"),
        ] {
            if !(scale.is_finite() && scale > 0.0) {
                return invalid(format!("{name} must be positive and finite, got {scale}"));
            }
        }
        if let Some(m) = self.min_score {
            if !(0.0..=1.0).contains(&m) {
                return invalid(format!("min_score must be in [0, 1], got {m}"));
            }
        }
        Ok(())
    }
}

/// One ranked corpus entry.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityMatch<'a> {
    pub snapshot: &'a HistoricalSnapshot,
    /// Blended score in `[0, 1]`.
    pub score: f64,
    pub shape_score: f64,
    pub stats_score: f64,
    /// E.g. "heavy left tail, moderate volatility, (pre-earnings)".
    pub description: String,
}

/// Ranks archived densities by similarity to a query density.
#[derive(Debug, Clone, Default)]
pub struct PatternIndex {
    config: PatternConfig,
}

impl PatternIndex {
    /// # Errors
    /// Returns [`DensityError::InvalidInput`] if `config` is invalid.
    pub fn new(config: PatternConfig) -> error::Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    /// The `top_k` corpus entries most similar to `curve`, best first.
    ///
    /// Equal scores rank the newer snapshot first. An empty corpus yields an
    /// empty result.
    pub fn find_similar<'a>(
        &self,
        curve: &DensityCurve,
        summary: &DistributionSummary,
        corpus: &'a [HistoricalSnapshot],
        top_k: usize,
    ) -> Vec<SimilarityMatch<'a>> {
        let query = SnapshotStatistics::from(summary);
        let score_one = |snapshot: &'a HistoricalSnapshot| -> SimilarityMatch<'a> {
            let shape_score = shape_similarity(
                curve.strikes(),
                curve.values(),
                &snapshot.strikes,
                &snapshot.values,
                self.config.resample_points,
            );
            let stats_score = stats_similarity(&query, &snapshot.statistics, &self.config);
            SimilarityMatch {
                snapshot,
                score: self.config.shape_weight * shape_score
                    + self.config.stats_weight * stats_score,
                shape_score,
                stats_score,
                description: describe(snapshot),
            }
        };

        #[cfg(feature = "parallel")]
        let scored = corpus.par_iter().map(score_one).collect::<Vec<_>>();
        #[cfg(not(feature = "parallel"))]
        let scored = corpus.iter().map(score_one).collect::<Vec<_>>();

        let mut matches: Vec<SimilarityMatch<'a>> = match self.config.min_score {
            Some(min) => scored.into_iter().filter(|m| m.score >= min).collect(),
            None => scored,
        };
        matches.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.snapshot.timestamp.cmp(&a.snapshot.timestamp))
        });
        matches.truncate(top_k);

        #[cfg(feature = "logging")]
        tracing::debug!(
            corpus = corpus.len(),
            returned = matches.len(),
            best = ?matches.first().map(|m| m.score),
            "pattern search complete"
        );

        matches
    }
}

/// Cosine similarity of two sampled curves on their overlapping range.
///
/// Both curves are linearly resampled onto `points` evenly spaced strikes
/// spanning the overlap. Disjoint ranges, malformed samples or a zero curve
/// score zero. The result is clamped to `[0, 1]`.
pub fn shape_similarity(
    strikes_a: &[f64],
    values_a: &[f64],
    strikes_b: &[f64],
    values_b: &[f64],
    points: usize,
) -> f64 {
    if !usable(strikes_a, values_a) || !usable(strikes_b, values_b) || points < 2 {
        return 0.0;
    }
    let lo = strikes_a[0].max(strikes_b[0]);
    let hi = strikes_a[strikes_a.len() - 1].min(strikes_b[strikes_b.len() - 1]);
    if hi <= lo {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0, 0.0, 0.0);
    for x in linspace(lo, hi, points) {
        let a = interp_linear(strikes_a, values_a, x);
        let b = interp_linear(strikes_b, values_b, x);
        dot += a * b;
        norm_a += a * a;
        norm_b += b * b;
    }
    let denom = (norm_a * norm_b).sqrt();
    if !denom.is_finite() || denom <= 0.0 {
        return 0.0;
    }
    (dot / denom).clamp(0.0, 1.0)
}

fn usable(strikes: &[f64], values: &[f64]) -> bool {
    strikes.len() >= 2
        && strikes.len() == values.len()
        && strikes.iter().all(|k| k.is_finite())
        && strikes.windows(2).all(|w| w[1] > w[0])
        && values.iter().all(|v| v.is_finite())
}

/// `1 − mean(min(1, |Δ|/scale))` over skewness, excess kurtosis and implied
/// move, clamped to `[0, 1]`.
pub fn stats_similarity(
    a: &SnapshotStatistics,
    b: &SnapshotStatistics,
    config: &PatternConfig,
) -> f64 {
    let term = |x: f64, y: f64, scale: f64| -> f64 {
        let d = (x - y).abs() / scale;
        if d.is_finite() {
            d.min(1.0)
        } else {
            1.0
        }
    };
    let penalty = (term(a.skewness, b.skewness, config.skew_scale)
        + term(a.excess_kurtosis, b.excess_kurtosis, config.kurtosis_scale)
        + term(a.implied_move_pct, b.implied_move_pct, config.move_scale))
        / 3.0;
    (1.0 - penalty).clamp(0.0, 1.0)
}

fn describe(snapshot: &HistoricalSnapshot) -> String {
    let s = &snapshot.statistics;
    let tail = if s.skewness < -0.3 {
        "heavy left tail"
    } else if s.skewness > 0.3 {
        "heavy right tail"
    } else {
        "symmetric"
    };
    let regime = if s.implied_move_pct > 4.0 {
        "high volatility"
    } else if s.implied_move_pct < 2.0 {
        "low volatility"
    } else {
        "moderate volatility"
    };
    let mut parts = vec![tail.to_owned(), regime.to_owned()];
    if let Some(event) = &snapshot.event {
        parts.push(format!("({event})"));
    }
    parts.join(", ")
}
