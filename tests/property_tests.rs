//! Property-based tests using proptest.
//!
//! These tests verify invariant properties across random inputs rather than
//! testing fixed examples. They help catch edge cases and ensure robustness.

use proptest::prelude::*;
use rndensity::pattern::{shape_similarity, stats_similarity, SnapshotStatistics};
use rndensity::smile::{SmileSection, SplineSmile};
use rndensity::{
    analyze, CalibrationPreference, DensityCurve, ExtractionConfig, MarketContext, OptionType,
    PatternConfig, QuoteRow,
};

fn strikes_around(spot: f64) -> Vec<f64> {
    (0..15).map(|i| spot * (0.85 + 0.3 * i as f64 / 14.0)).collect()
}

// --- Property Test 1: extracted densities are normalized and non-negative ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Flat smiles over a wide range of markets always yield a unit-mass,
    /// non-negative density, whichever smile model ends up being used.
    #[test]
    fn flat_smile_density_is_a_density(
        vol in 0.1_f64..0.5,
        spot in 20.0_f64..2000.0,
        rate in -0.01_f64..0.08,
        expiry in 0.02_f64..0.5,
    ) {
        let ctx = MarketContext::new(spot, rate, expiry).unwrap();
        let quotes: Vec<QuoteRow> = strikes_around(spot)
            .into_iter()
            .map(|k| QuoteRow::implied_vol(k, vol, OptionType::Call))
            .collect();
        let analysis = analyze(&quotes, &ctx, &ExtractionConfig::default()).unwrap();

        prop_assert!((analysis.curve.integral() - 1.0).abs() < 1e-9);
        prop_assert!(analysis.curve.values().iter().all(|&v| v >= 0.0 && v.is_finite()));
        prop_assert!(analysis.summary.std_dev > 0.0);
    }
}

// --- Property Test 2: skewed spline smiles ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Downward-sloping smiles through the spline path keep the density
    /// invariants and produce a heavier left tail than right tail.
    #[test]
    fn skewed_spline_density_is_a_density(
        base in 0.15_f64..0.4,
        slope in 0.2_f64..0.8,
        expiry in 0.05_f64..0.5,
    ) {
        let spot = 100.0;
        let ctx = MarketContext::new(spot, 0.02, expiry).unwrap();
        let quotes: Vec<QuoteRow> = strikes_around(spot)
            .into_iter()
            .map(|k| QuoteRow::implied_vol(k, base + slope * (spot - k) / spot, OptionType::Put))
            .collect();
        let config = ExtractionConfig::default()
            .with_option_type(OptionType::Put)
            .with_preference(CalibrationPreference::SplineOnly);
        let analysis = analyze(&quotes, &ctx, &config).unwrap();

        prop_assert!((analysis.curve.integral() - 1.0).abs() < 1e-9);
        prop_assert!(analysis.curve.values().iter().all(|&v| v >= 0.0));
        prop_assert!(analysis.summary.ci_lower <= analysis.summary.median);
        prop_assert!(analysis.summary.median <= analysis.summary.ci_upper);
    }
}

// --- Property Test 3: monotone spline never overshoots ---

proptest! {
    /// Between any two knots the spline stays inside the range of the two
    /// knot vols, so positive inputs can never produce a non-positive vol.
    #[test]
    fn spline_stays_within_knot_range(
        vols in prop::collection::vec(0.05_f64..1.0, 3..12),
    ) {
        let strikes: Vec<f64> = (0..vols.len()).map(|i| 80.0 + 5.0 * i as f64).collect();
        let smile = SplineSmile::new(100.0, 0.5, strikes.clone(), vols.clone()).unwrap();
        for i in 0..vols.len() - 1 {
            let (lo, hi) = (vols[i].min(vols[i + 1]), vols[i].max(vols[i + 1]));
            for j in 1..10 {
                let k = strikes[i] + (strikes[i + 1] - strikes[i]) * j as f64 / 10.0;
                let v = smile.vol(k).unwrap().0;
                prop_assert!(
                    v >= lo - 1e-12 && v <= hi + 1e-12,
                    "vol {} at strike {} outside [{}, {}]",
                    v, k, lo, hi
                );
            }
        }
    }
}

// --- Property Test 4: CDF and quantile consistency ---

proptest! {
    /// The CDF of any normalized curve is non-decreasing from 0 to 1, and
    /// quantiles invert it.
    #[test]
    fn cdf_is_monotone_and_quantile_inverts_it(
        values in prop::collection::vec(0.01_f64..10.0, 3..40),
        p in 0.01_f64..0.99,
    ) {
        let strikes: Vec<f64> = (0..values.len()).map(|i| 50.0 + 2.5 * i as f64).collect();
        let curve = DensityCurve::from_unnormalized(strikes, values).unwrap();

        let cdf = curve.cdf();
        prop_assert!(cdf.windows(2).all(|w| w[1] >= w[0]));
        prop_assert!((cdf[cdf.len() - 1] - 1.0).abs() < 1e-12);

        let q = curve.quantile(p).unwrap();
        prop_assert!((curve.cdf_at(q) - p).abs() < 1e-8);
    }
}

// --- Property Test 5: similarity scores are bounded and symmetric ---

proptest! {
    #[test]
    fn similarity_scores_are_bounded_and_symmetric(
        skew_a in -2.0_f64..2.0, skew_b in -2.0_f64..2.0,
        kurt_a in -1.0_f64..5.0, kurt_b in -1.0_f64..5.0,
        move_a in 0.5_f64..20.0, move_b in 0.5_f64..20.0,
        shift in -30.0_f64..30.0,
    ) {
        let config = PatternConfig::default();
        let a = SnapshotStatistics {
            skewness: skew_a,
            excess_kurtosis: kurt_a,
            implied_move_pct: move_a,
        };
        let b = SnapshotStatistics {
            skewness: skew_b,
            excess_kurtosis: kurt_b,
            implied_move_pct: move_b,
        };
        let s_ab = stats_similarity(&a, &b, &config);
        prop_assert!((0.0..=1.0).contains(&s_ab));
        prop_assert!((s_ab - stats_similarity(&b, &a, &config)).abs() < 1e-15);

        let k1: Vec<f64> = (0..60).map(|i| 70.0 + i as f64).collect();
        let k2: Vec<f64> = k1.iter().map(|k| k + shift).collect();
        let f1: Vec<f64> = k1.iter().map(|k| (-(k - 100.0_f64).powi(2) / 50.0).exp()).collect();
        let f2: Vec<f64> = k2.iter().map(|k| (-(k - 105.0_f64).powi(2) / 80.0).exp()).collect();
        let sh_ab = shape_similarity(&k1, &f1, &k2, &f2, 100);
        let sh_ba = shape_similarity(&k2, &f2, &k1, &f1, 100);
        prop_assert!((0.0..=1.0).contains(&sh_ab));
        prop_assert!((sh_ab - sh_ba).abs() < 1e-12);
    }
}
