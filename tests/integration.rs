//! Integration tests for the rndensity pipeline.
//!
//! Exercises the full path from a quote table through calibration, density
//! extraction, summary statistics and historical pattern ranking, including
//! the fallback and failure paths a production caller sees.

use std::sync::Arc;
use std::thread;

use approx::assert_abs_diff_eq;
use chrono::{NaiveDate, TimeZone, Utc};
use rndensity::implied::black_scholes_price;
use rndensity::{
    analyze, calibrate, extract_density, summarize, CalibrationMethod, CalibrationPreference,
    DensityError, ExtractionConfig, HistoricalSnapshot, MarketContext, OptionType, PatternConfig,
    PatternIndex, QuoteRow, QuoteValue, RequestId, SabrConfig,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SPOT: f64 = 685.69;
const RATE: f64 = 0.045;

fn spy() -> RequestId {
    RequestId::new("SPY", NaiveDate::from_ymd_opt(2025, 11, 21).unwrap())
}

fn spy_context() -> MarketContext {
    MarketContext::new(SPOT, RATE, 30.0 / 365.0).unwrap().with_request(spy())
}

/// 40 evenly spaced strikes from 600 to 770.
fn spy_strikes() -> Vec<f64> {
    (0..40).map(|i| 600.0 + 170.0 * i as f64 / 39.0).collect()
}

fn flat_calls(vol: f64) -> Vec<QuoteRow> {
    spy_strikes()
        .into_iter()
        .map(|k| QuoteRow::implied_vol(k, vol, OptionType::Call))
        .collect()
}

/// Flat 18% calls plus puts whose vols rise steadily toward the downside and
/// stay above the call vol at every strike.
fn skewed_chain() -> Vec<QuoteRow> {
    let mut quotes = flat_calls(0.18);
    quotes.extend(spy_strikes().into_iter().map(|k| {
        let iv = 0.20 + 0.4 * (770.0 - k) / SPOT;
        QuoteRow::implied_vol(k, iv, OptionType::Put)
    }));
    quotes
}

// ---------------------------------------------------------------------------
// End-to-end scenarios
// ---------------------------------------------------------------------------

#[test]
fn flat_smile_scenario() {
    let ctx = spy_context();
    let analysis = analyze(&flat_calls(0.18), &ctx, &ExtractionConfig::default()).unwrap();

    assert_abs_diff_eq!(analysis.curve.integral(), 1.0, epsilon = 1e-9);
    assert!(analysis.curve.values().iter().all(|&v| v >= 0.0));

    let s = &analysis.summary;
    assert!((s.mean - SPOT).abs() / SPOT < 0.01, "mean {}", s.mean);
    assert!((s.annualized_vol - 0.18).abs() < 0.01, "annualized vol {}", s.annualized_vol);
    assert!(s.ci_lower < s.median && s.median < s.ci_upper);
    assert!(s.ci95_lower < s.ci_lower && s.ci_upper < s.ci95_upper);
    assert!(s.tail_prob_down_10 > 0.0 && s.tail_prob_up_10 > 0.0);
    assert!(s.tail_prob_down_5 > s.tail_prob_down_10);

    let m = &analysis.metadata;
    assert_eq!(m.grid_points, 500);
    assert_abs_diff_eq!(m.strike_range.0, 0.5 * SPOT, epsilon = 1e-9);
    assert_abs_diff_eq!(m.strike_range.1, 2.0 * SPOT, epsilon = 1e-9);
    assert_eq!(m.observed_strikes, 40);
    let smoothing = m.smoothing.unwrap();
    assert_eq!((smoothing.requested_window, smoothing.order), (21, 3));
    assert!(smoothing.window <= 21 && smoothing.window % 2 == 1);
}

#[test]
fn coarse_grid_keeps_flat_smile_width() {
    let ctx = spy_context();
    let config = ExtractionConfig::default().with_grid_points(100);
    let analysis = analyze(&flat_calls(0.18), &ctx, &config).unwrap();
    let s = &analysis.summary;
    assert!((s.annualized_vol - 0.18).abs() < 0.01, "annualized vol {}", s.annualized_vol);
    // One std dev spans under four grid steps, too few for a cubic filter.
    assert!(analysis.metadata.smoothing.is_none());
}

#[test]
fn one_day_expiry_keeps_flat_smile_width() {
    let ctx = MarketContext::new(SPOT, RATE, 1.0 / 365.0).unwrap().with_request(spy());
    let analysis = analyze(&flat_calls(0.18), &ctx, &ExtractionConfig::default()).unwrap();
    let s = &analysis.summary;
    assert!((s.annualized_vol - 0.18).abs() < 0.01, "annualized vol {}", s.annualized_vol);
    assert!(s.excess_kurtosis.abs() < 0.3, "excess kurtosis {}", s.excess_kurtosis);
    assert_abs_diff_eq!(analysis.curve.integral(), 1.0, epsilon = 1e-9);
}

#[test]
fn put_skew_gives_negative_skewness() {
    let ctx = spy_context();
    let chain = skewed_chain();
    let put_vols: Vec<f64> = chain
        .iter()
        .filter(|q| q.option_type == OptionType::Put)
        .map(|q| match q.value {
            QuoteValue::ImpliedVol(v) => v,
            QuoteValue::Price(_) => unreachable!(),
        })
        .collect();
    assert!(put_vols.iter().all(|&v| v > 0.18));
    assert!(put_vols.windows(2).all(|w| w[1] < w[0]));

    let config = ExtractionConfig::default().with_option_type(OptionType::Put);
    let analysis = analyze(&chain, &ctx, &config).unwrap();

    let s = &analysis.summary;
    assert!(s.skewness < 0.0, "skewness {}", s.skewness);
    assert!(s.tail_prob_down_10 > s.tail_prob_up_10);
    assert!(s.median - s.ci_lower > s.ci_upper - s.median);
}

#[test]
fn call_and_put_sides_of_the_same_chain_differ() {
    let ctx = spy_context();
    let chain = skewed_chain();
    let calls = analyze(&chain, &ctx, &ExtractionConfig::default()).unwrap();
    let put_config = ExtractionConfig::default().with_option_type(OptionType::Put);
    let puts = analyze(&chain, &ctx, &put_config).unwrap();
    assert!(puts.summary.skewness < calls.summary.skewness);
}

#[test]
fn price_quotes_match_vol_quotes() {
    let ctx = spy_context();
    let t = ctx.time_to_expiry();
    let priced: Vec<QuoteRow> = spy_strikes()
        .into_iter()
        .map(|k| {
            let price = black_scholes_price(SPOT, k, RATE, t, 0.18, OptionType::Call);
            QuoteRow::price(k, price, OptionType::Call)
        })
        .collect();
    let config = ExtractionConfig::default().with_preference(CalibrationPreference::SplineOnly);
    let from_prices = analyze(&priced, &ctx, &config).unwrap();
    let from_vols = analyze(&flat_calls(0.18), &ctx, &config).unwrap();
    assert_abs_diff_eq!(from_prices.summary.mean, from_vols.summary.mean, epsilon = 1e-3);
    assert_abs_diff_eq!(from_prices.summary.std_dev, from_vols.summary.std_dev, epsilon = 1e-3);
}

// ---------------------------------------------------------------------------
// Failure and fallback paths
// ---------------------------------------------------------------------------

#[test]
fn three_strikes_is_insufficient_data() {
    let ctx = spy_context();
    let quotes: Vec<QuoteRow> = flat_calls(0.18).into_iter().take(3).collect();
    let err = analyze(&quotes, &ctx, &ExtractionConfig::default()).unwrap_err();
    match &err {
        DensityError::InsufficientData { request, required, found } => {
            assert_eq!(request.as_ref(), Some(&spy()));
            assert_eq!(*required, 10);
            assert_eq!(*found, 3);
        }
        other => panic!("unexpected error {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("SPY 2025-11-21"), "{message}");
}

#[test]
fn bad_vol_is_invalid_quotes_with_request() {
    let ctx = spy_context();
    let mut quotes = flat_calls(0.18);
    quotes[7] = QuoteRow::implied_vol(quotes[7].strike, -0.1, OptionType::Call);
    let err = analyze(&quotes, &ctx, &ExtractionConfig::default()).unwrap_err();
    assert!(matches!(err, DensityError::InvalidQuotes { .. }));
    assert_eq!(err.request(), Some(&spy()));
}

#[test]
fn forced_sabr_failure_falls_back_to_spline() {
    let ctx = spy_context();
    let config = ExtractionConfig::default().with_sabr(SabrConfig {
        max_iterations: 2,
        ..SabrConfig::default()
    });
    let config = config.with_option_type(OptionType::Put);
    let analysis = analyze(&skewed_chain(), &ctx, &config).unwrap();

    let m = &analysis.metadata;
    assert_eq!(m.method, CalibrationMethod::Spline);
    assert!(m.sabr.is_none());
    assert!(m.fallback_reason.as_deref().is_some_and(|r| r.contains("converge")));
    assert_abs_diff_eq!(analysis.curve.integral(), 1.0, epsilon = 1e-9);
    assert!(analysis.curve.values().iter().all(|&v| v >= 0.0));
}

#[test]
fn spline_preference_is_reported_without_reason() {
    let ctx = spy_context();
    let config = ExtractionConfig::default().with_preference(CalibrationPreference::SplineOnly);
    let analysis = analyze(&flat_calls(0.18), &ctx, &config).unwrap();
    assert_eq!(analysis.metadata.method, CalibrationMethod::Spline);
    assert!(analysis.metadata.fallback_reason.is_none());
    assert!((analysis.summary.annualized_vol - 0.18).abs() < 0.01);
}

#[test]
fn unreachable_rmse_bound_forces_fallback() {
    let ctx = spy_context();
    // A fixed-beta backbone cannot reproduce a perfectly flat smile.
    let config = ExtractionConfig::default().with_sabr(SabrConfig {
        max_rmse: Some(1e-12),
        ..SabrConfig::default()
    });
    let model = calibrate(&flat_calls(0.18), &ctx, &config).unwrap();
    assert_eq!(model.method(), CalibrationMethod::Spline);
    assert!(model.fallback_reason().is_some_and(|r| r.contains("RMS")));
}

// ---------------------------------------------------------------------------
// Numerical properties
// ---------------------------------------------------------------------------

#[test]
fn extraction_is_idempotent() {
    let ctx = spy_context();
    let config = ExtractionConfig::default().with_option_type(OptionType::Put);
    let a = analyze(&skewed_chain(), &ctx, &config).unwrap();
    let b = analyze(&skewed_chain(), &ctx, &config).unwrap();
    assert_eq!(a.curve, b.curve);
    assert_eq!(a.summary, b.summary);
    assert_eq!(a.metadata, b.metadata);
}

#[test]
fn mean_converges_with_grid_size() {
    let ctx = spy_context();
    let quotes = flat_calls(0.18);
    let base = ExtractionConfig::default();
    let model = calibrate(&quotes, &ctx, &base).unwrap();

    let mean_at = |points: usize| {
        let config = base.clone().with_grid_points(points);
        let out = extract_density(&quotes, &ctx, &model, &config).unwrap();
        summarize(&out.curve, &ctx).mean
    };
    let coarse = mean_at(100);
    let fine = mean_at(400);
    assert!((coarse - fine).abs() / SPOT < 0.005, "coarse {coarse}, fine {fine}");
}

#[test]
fn grid_below_floor_is_rejected() {
    let ctx = spy_context();
    let config = ExtractionConfig::default().with_grid_points(50);
    let err = analyze(&flat_calls(0.18), &ctx, &config).unwrap_err();
    assert!(matches!(err, DensityError::InvalidInput { .. }));
}

#[test]
fn requests_are_independent_across_threads() {
    let quotes = Arc::new(skewed_chain());
    let config = ExtractionConfig::default().with_option_type(OptionType::Put);
    let sequential = analyze(&quotes, &spy_context(), &config).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let quotes = Arc::clone(&quotes);
            let config = config.clone();
            thread::spawn(move || analyze(&quotes, &spy_context(), &config).unwrap())
        })
        .collect();
    for h in handles {
        let parallel = h.join().unwrap();
        assert_eq!(parallel.summary, sequential.summary);
    }
}

// ---------------------------------------------------------------------------
// Pattern matching
// ---------------------------------------------------------------------------

#[test]
fn identical_snapshot_ranks_first() {
    let ctx = spy_context();
    let flat = analyze(&flat_calls(0.18), &ctx, &ExtractionConfig::default()).unwrap();
    let high_vol = analyze(&flat_calls(0.35), &ctx, &ExtractionConfig::default()).unwrap();
    let skewed = analyze(
        &skewed_chain(),
        &ctx,
        &ExtractionConfig::default().with_option_type(OptionType::Put),
    )
    .unwrap();

    let at = |day: u32| Utc.with_ymd_and_hms(2025, 10, day, 20, 0, 0).unwrap();
    let corpus = vec![
        HistoricalSnapshot::from_curve(
            &high_vol.curve,
            &high_vol.summary,
            at(1),
            Some("selloff".into()),
        ),
        HistoricalSnapshot::from_curve(&flat.curve, &flat.summary, at(2), None),
        HistoricalSnapshot::from_curve(&skewed.curve, &skewed.summary, at(3), None),
    ];

    let index = PatternIndex::new(PatternConfig::default()).unwrap();
    let matches = index.find_similar(&flat.curve, &flat.summary, &corpus, 3);

    assert_eq!(matches.len(), 3);
    assert_eq!(matches[0].snapshot.timestamp, at(2));
    assert_abs_diff_eq!(matches[0].score, 1.0, epsilon = 1e-9);
    assert!(matches.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(matches.iter().all(|m| (0.0..=1.0 + 1e-12).contains(&m.score)));
}

#[test]
fn ties_break_toward_newer_snapshot() {
    let ctx = spy_context();
    let flat = analyze(&flat_calls(0.18), &ctx, &ExtractionConfig::default()).unwrap();
    let older = Utc.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap();
    let newer = Utc.with_ymd_and_hms(2025, 6, 1, 20, 0, 0).unwrap();
    let corpus = vec![
        HistoricalSnapshot::from_curve(&flat.curve, &flat.summary, older, None),
        HistoricalSnapshot::from_curve(&flat.curve, &flat.summary, newer, None),
    ];
    let matches = PatternIndex::default().find_similar(&flat.curve, &flat.summary, &corpus, 1);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].snapshot.timestamp, newer);
}

#[test]
fn empty_corpus_yields_empty_result() {
    let ctx = spy_context();
    let flat = analyze(&flat_calls(0.18), &ctx, &ExtractionConfig::default()).unwrap();
    let matches = PatternIndex::default().find_similar(&flat.curve, &flat.summary, &[], 5);
    assert!(matches.is_empty());
}

#[test]
fn min_score_filters_weak_matches() {
    let ctx = spy_context();
    let flat = analyze(&flat_calls(0.18), &ctx, &ExtractionConfig::default()).unwrap();
    let high_vol = analyze(&flat_calls(0.60), &ctx, &ExtractionConfig::default()).unwrap();
    let t = Utc.with_ymd_and_hms(2025, 1, 2, 20, 0, 0).unwrap();
    let corpus = vec![
        HistoricalSnapshot::from_curve(&flat.curve, &flat.summary, t, None),
        HistoricalSnapshot::from_curve(&high_vol.curve, &high_vol.summary, t, None),
    ];
    let index = PatternIndex::new(PatternConfig {
        min_score: Some(0.95),
        ..PatternConfig::default()
    })
    .unwrap();
    let matches = index.find_similar(&flat.curve, &flat.summary, &corpus, 10);
    assert_eq!(matches.len(), 1);
    assert!(matches[0].description.contains("volatility"));
}

#[test]
fn analysis_serializes_for_downstream() {
    let ctx = spy_context();
    let analysis = analyze(&flat_calls(0.18), &ctx, &ExtractionConfig::default()).unwrap();
    let json = serde_json::to_string(&analysis).unwrap();
    assert!(json.contains("\"method\":\"sabr\"") || json.contains("\"method\":\"spline\""));
    let back: rndensity::Analysis = serde_json::from_str(&json).unwrap();
    assert_eq!(back.metadata.grid_points, 500);
    assert_eq!(back.curve.len(), analysis.curve.len());
}
