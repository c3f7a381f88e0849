//! Indicator Engine (SPEC_FULL §4.5, §2 item 5).
//!
//! `IndicatorEngine::compute` takes an ordered price history (oldest first) and returns
//! the latest value of every indicator named in SPEC_FULL §4.5. Below the minimum
//! history length every field comes back `None` ("insufficient_data") rather than a
//! synthetic zero — the same convention `technical-analysis::indicators` uses throughout.

mod core;

pub use core::{
    adx, atr, bollinger_bands, bollinger_percent_b, cci, ema, finite_or, macd, obv,
    pivot_points, rsi, sma, stochastic, support_resistance, swing_high_low, vpt, vwap,
    week_52_high_low, AdxResult, BollingerBands, MacdResult, PivotPoints, StochasticResult,
    SupportResistance,
};

use pipeline_core::Bar;

/// Minimum bars required to compute anything; below this every field is `None`.
pub const MIN_HISTORY: usize = 100;
/// Bar count at which every indicator (including the 200-EMA) has real data behind it.
pub const PREFERRED_HISTORY: usize = 200;

/// The latest reading of every indicator named in SPEC_FULL §4.5 — the same field set
/// `pipeline_core::PricePoint` carries for persistence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSnapshot {
    pub ema_20: Option<f64>,
    pub ema_50: Option<f64>,
    pub ema_100: Option<f64>,
    pub ema_200: Option<f64>,
    pub rsi_14: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub bb_percent_b: Option<f64>,
    pub atr_14: Option<f64>,
    pub adx_14: Option<f64>,
    pub cci_20: Option<f64>,
    pub stoch_k: Option<f64>,
    pub stoch_d: Option<f64>,
    pub vwap: Option<f64>,
    pub obv: Option<f64>,
    pub vpt: Option<f64>,
    pub pivot: Option<f64>,
    pub resistance: Option<f64>,
    pub support: Option<f64>,
    pub swing_high_5: Option<f64>,
    pub swing_low_5: Option<f64>,
    pub swing_high_10: Option<f64>,
    pub swing_low_10: Option<f64>,
    pub swing_high_20: Option<f64>,
    pub swing_low_20: Option<f64>,
    pub week_52_high: Option<f64>,
    pub week_52_low: Option<f64>,
}

pub struct IndicatorEngine;

impl IndicatorEngine {
    /// Computes the latest value of every named indicator from an ordered (oldest-first)
    /// price history. Returns an all-`None` snapshot when `bars.len() < MIN_HISTORY`.
    pub fn compute(bars: &[Bar]) -> IndicatorSnapshot {
        if bars.len() < MIN_HISTORY {
            tracing::debug!(bars = bars.len(), required = MIN_HISTORY, "insufficient history for indicator computation");
            return IndicatorSnapshot::default();
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

        let ema_20 = core::ema(&closes, 20).last().copied();
        let ema_50 = core::ema(&closes, 50).last().copied();
        let ema_100 = core::ema(&closes, 100).last().copied();
        let ema_200 = core::ema(&closes, 200).last().copied();

        let rsi_14 = core::rsi(&closes, 14).last().copied();

        let macd_result = core::macd(&closes, 12, 26, 9);
        let macd_line = macd_result.macd_line.last().copied();
        let macd_signal = macd_result.signal_line.last().copied();
        let macd_histogram = macd_result.histogram.last().copied();

        let bands = core::bollinger_bands(&closes, 20, 2.0);
        let bb_upper = bands.upper.last().copied();
        let bb_middle = bands.middle.last().copied();
        let bb_lower = bands.lower.last().copied();
        let bb_percent_b = match (bb_upper, bb_lower) {
            (Some(u), Some(l)) => Some(core::bollinger_percent_b(closes[closes.len() - 1], u, l)),
            _ => None,
        };

        let atr_14 = core::atr(bars, 14).last().copied();
        let adx_14 = core::adx(bars, 14).adx.last().copied();
        let cci_20 = core::cci(bars, 20).last().copied();

        let stoch = core::stochastic(bars, 14, 3);
        let stoch_k = stoch.k.last().copied();
        let stoch_d = stoch.d.last().copied();

        let vwap = core::vwap(bars).last().copied();
        let obv = core::obv(bars).last().copied();
        let vpt = core::vpt(bars).last().copied();

        let pivots = core::pivot_points(bars);
        let pivot = pivots.as_ref().map(|p| p.pivot);

        let sr = core::support_resistance(bars, 50.min(bars.len()));

        let (swing_high_5, swing_low_5) = core::swing_high_low(bars, 5).unwrap_or((f64::NAN, f64::NAN));
        let (swing_high_10, swing_low_10) = core::swing_high_low(bars, 10).unwrap_or((f64::NAN, f64::NAN));
        let (swing_high_20, swing_low_20) = core::swing_high_low(bars, 20).unwrap_or((f64::NAN, f64::NAN));
        let (week_52_high, week_52_low) = core::week_52_high_low(bars).unwrap_or((f64::NAN, f64::NAN));

        let finite = |v: f64| if v.is_finite() { Some(v) } else { None };

        IndicatorSnapshot {
            ema_20,
            ema_50,
            ema_100,
            ema_200,
            rsi_14,
            macd: macd_line,
            macd_signal,
            macd_histogram,
            bb_upper,
            bb_middle,
            bb_lower,
            bb_percent_b,
            atr_14,
            adx_14,
            cci_20,
            stoch_k,
            stoch_d,
            vwap,
            obv,
            vpt,
            pivot,
            resistance: sr.resistance,
            support: sr.support,
            swing_high_5: finite(swing_high_5),
            swing_low_5: finite(swing_low_5),
            swing_high_10: finite(swing_high_10),
            swing_low_10: finite(swing_low_10),
            swing_high_20: finite(swing_high_20),
            swing_low_20: finite(swing_low_20),
            week_52_high: finite(week_52_high),
            week_52_low: finite(week_52_low),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.1).sin() * 5.0 + i as f64 * 0.02;
                Bar { open: base, high: base + 1.0, low: base - 1.0, close: base + 0.3, volume: 1_000_000.0 }
            })
            .collect()
    }

    #[test]
    fn insufficient_history_yields_all_none() {
        let bars = synthetic_bars(50);
        let snapshot = IndicatorEngine::compute(&bars);
        assert_eq!(snapshot, IndicatorSnapshot::default());
    }

    #[test]
    fn sufficient_history_populates_the_named_fields() {
        let bars = synthetic_bars(260);
        let snapshot = IndicatorEngine::compute(&bars);
        assert!(snapshot.ema_20.is_some());
        assert!(snapshot.ema_200.is_some());
        assert!(snapshot.rsi_14.is_some());
        assert!(snapshot.macd.is_some());
        assert!(snapshot.cci_20.is_some());
        assert!(snapshot.week_52_high.is_some());
        assert!(snapshot.vpt.is_some());
    }

    #[test]
    fn rsi_and_stochastic_stay_within_clipped_bounds() {
        let bars = synthetic_bars(200);
        let snapshot = IndicatorEngine::compute(&bars);
        if let Some(rsi) = snapshot.rsi_14 {
            assert!((0.0..=100.0).contains(&rsi));
        }
        if let Some(k) = snapshot.stoch_k {
            assert!((0.0..=100.0).contains(&k));
        }
    }

    #[test]
    fn no_field_is_ever_nan_or_infinite() {
        let bars = synthetic_bars(260);
        let snapshot = IndicatorEngine::compute(&bars);
        for value in [
            snapshot.ema_20, snapshot.ema_50, snapshot.ema_100, snapshot.ema_200, snapshot.rsi_14,
            snapshot.macd, snapshot.macd_signal, snapshot.macd_histogram, snapshot.bb_upper,
            snapshot.bb_middle, snapshot.bb_lower, snapshot.bb_percent_b, snapshot.atr_14,
            snapshot.adx_14, snapshot.cci_20, snapshot.stoch_k, snapshot.stoch_d, snapshot.vwap,
            snapshot.obv, snapshot.vpt,
        ] {
            if let Some(v) = value {
                assert!(v.is_finite());
            }
        }
    }
}
