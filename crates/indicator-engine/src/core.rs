//! Pure numeric indicator math (SPEC_FULL §4.5).
//!
//! Reused near-verbatim from `technical-analysis::indicators`: `finite_or`, `sma`, `ema`,
//! `rsi`, `macd`, `bollinger_bands`, `atr`, `stochastic`, `obv`, `adx`, `support_resistance`,
//! `vwap`, and `pivot_points` keep the source's math and null-safety idiom unchanged, just
//! retargeted at this crate's `Bar` (no timestamp/vwap fields). `cci`, `vpt`, `swing_high`,
//! `swing_low`, and `week_52_high_low` are new additions in the same style, covering the
//! indicators the source engine didn't implement.

use pipeline_core::Bar;

/// Returns `val` if finite, otherwise `default`. Never lets a NaN/Inf escape this module.
#[inline]
pub fn finite_or(val: f64, default: f64) -> f64 {
    if val.is_finite() {
        val
    } else {
        default
    }
}

pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }
    let mut result = Vec::with_capacity(data.len() - period + 1);
    for i in period - 1..data.len() {
        let sum: f64 = data[i + 1 - period..=i].iter().sum();
        result.push(finite_or(sum / period as f64, 0.0));
    }
    result
}

pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.is_empty() {
        return vec![];
    }
    let multiplier = 2.0 / (period as f64 + 1.0);
    if data.len() < period {
        let avg = data.iter().sum::<f64>() / data.len() as f64;
        return vec![finite_or(avg, 0.0)];
    }

    let sma_seed = finite_or(data[..period].iter().sum::<f64>() / period as f64, 0.0);
    let mut result = Vec::with_capacity(data.len());
    for _ in 0..period {
        result.push(sma_seed);
    }
    for i in period..data.len() {
        let prev_ema = result[i - 1];
        let ema_val = (data[i] - prev_ema) * multiplier + prev_ema;
        result.push(finite_or(ema_val, prev_ema));
    }
    result
}

/// RSI(period) with Wilder smoothing.
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period + 1 {
        return vec![];
    }
    let mut gains = Vec::new();
    let mut losses = Vec::new();
    for i in 1..data.len() {
        let change = data[i] - data[i - 1];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;
    let mut values = Vec::with_capacity(data.len() - period);
    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        let rs = if avg_loss == 0.0 { 100.0 } else { avg_gain / avg_loss };
        let value = 100.0 - (100.0 / (1.0 + rs));
        values.push(finite_or(value, 50.0).clamp(0.0, 100.0));
    }
    values
}

pub struct MacdResult {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(data: &[f64], fast_period: usize, slow_period: usize, signal_period: usize) -> MacdResult {
    if fast_period == 0 || slow_period == 0 || signal_period == 0 || slow_period < fast_period {
        return MacdResult { macd_line: vec![], signal_line: vec![], histogram: vec![] };
    }
    let ema_fast = ema(data, fast_period);
    let ema_slow = ema(data, slow_period);
    let offset = slow_period - fast_period;
    let mut macd_line = Vec::new();
    for i in offset..ema_fast.len() {
        macd_line.push(ema_fast[i] - ema_slow[i - offset]);
    }
    let signal_line = ema(&macd_line, signal_period);
    let hist_offset = macd_line.len().saturating_sub(signal_line.len());
    let histogram = (0..signal_line.len()).map(|i| macd_line[i + hist_offset] - signal_line[i]).collect();
    MacdResult { macd_line, signal_line, histogram }
}

pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger_bands(data: &[f64], period: usize, std_dev: f64) -> BollingerBands {
    if period == 0 || data.len() < period {
        return BollingerBands { upper: vec![], middle: vec![], lower: vec![] };
    }
    let middle = sma(data, period);
    let mut upper = Vec::with_capacity(middle.len());
    let mut lower = Vec::with_capacity(middle.len());
    for i in period - 1..data.len() {
        let slice = &data[i + 1 - period..=i];
        let mean = middle[i + 1 - period];
        let variance: f64 = slice.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
        let std = variance.sqrt();
        upper.push(finite_or(mean + std_dev * std, mean));
        lower.push(finite_or(mean - std_dev * std, mean));
    }
    BollingerBands { upper, middle, lower }
}

/// %B: literal position of the close within the band; may exceed [0,1] by design.
pub fn bollinger_percent_b(close: f64, upper: f64, lower: f64) -> f64 {
    let width = upper - lower;
    if width.abs() < f64::EPSILON {
        0.5
    } else {
        finite_or((close - lower) / width, 0.5)
    }
}

pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() < period + 1 {
        return vec![];
    }
    let mut true_ranges = Vec::new();
    for i in 1..bars.len() {
        let high_low = bars[i].high - bars[i].low;
        let high_close = (bars[i].high - bars[i - 1].close).abs();
        let low_close = (bars[i].low - bars[i - 1].close).abs();
        true_ranges.push(high_low.max(high_close).max(low_close));
    }
    let mut values = Vec::new();
    let mut atr_val = finite_or(true_ranges[..period].iter().sum::<f64>() / period as f64, 0.0);
    values.push(atr_val);
    for tr in &true_ranges[period..] {
        atr_val = (atr_val * (period - 1) as f64 + tr) / period as f64;
        values.push(finite_or(atr_val, 0.0));
    }
    values
}

pub struct StochasticResult {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

pub fn stochastic(bars: &[Bar], k_period: usize, d_period: usize) -> StochasticResult {
    if k_period == 0 || bars.len() < k_period {
        return StochasticResult { k: vec![], d: vec![] };
    }
    let mut k_values = Vec::new();
    for i in k_period - 1..bars.len() {
        let slice = &bars[i + 1 - k_period..=i];
        let highest = slice.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let lowest = slice.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let k = if highest == lowest { 50.0 } else { 100.0 * (bars[i].close - lowest) / (highest - lowest) };
        k_values.push(finite_or(k, 50.0).clamp(0.0, 100.0));
    }
    let d_values = sma(&k_values, d_period);
    StochasticResult { k: k_values, d: d_values }
}

pub fn obv(bars: &[Bar]) -> Vec<f64> {
    if bars.is_empty() {
        return vec![];
    }
    let mut values = Vec::with_capacity(bars.len());
    values.push(bars[0].volume);
    for i in 1..bars.len() {
        let prev = values[i - 1];
        let next = if bars[i].close > bars[i - 1].close {
            prev + bars[i].volume
        } else if bars[i].close < bars[i - 1].close {
            prev - bars[i].volume
        } else {
            prev
        };
        values.push(next);
    }
    values
}

/// Volume Price Trend: cumulative volume-weighted close-change, guarded against
/// division by a zero previous close.
pub fn vpt(bars: &[Bar]) -> Vec<f64> {
    if bars.is_empty() {
        return vec![];
    }
    let mut values = Vec::with_capacity(bars.len());
    values.push(0.0);
    for i in 1..bars.len() {
        let prev_close = bars[i - 1].close;
        let pct_change = if prev_close.abs() > f64::EPSILON {
            (bars[i].close - prev_close) / prev_close
        } else {
            0.0
        };
        let next = values[i - 1] + bars[i].volume * pct_change;
        values.push(finite_or(next, values[i - 1]));
    }
    values
}

pub struct AdxResult {
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
}

pub fn adx(bars: &[Bar], period: usize) -> AdxResult {
    if period == 0 || bars.len() < period * 2 + 1 {
        return AdxResult { adx: vec![], plus_di: vec![], minus_di: vec![] };
    }
    let mut plus_dm = Vec::with_capacity(bars.len() - 1);
    let mut minus_dm = Vec::with_capacity(bars.len() - 1);
    let mut true_range = Vec::with_capacity(bars.len() - 1);
    for i in 1..bars.len() {
        let up_move = bars[i].high - bars[i - 1].high;
        let down_move = bars[i - 1].low - bars[i].low;
        plus_dm.push(if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 });
        minus_dm.push(if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 });
        let hl = bars[i].high - bars[i].low;
        let hc = (bars[i].high - bars[i - 1].close).abs();
        let lc = (bars[i].low - bars[i - 1].close).abs();
        true_range.push(hl.max(hc).max(lc));
    }

    let mut smoothed_plus_dm = plus_dm[..period].iter().sum::<f64>();
    let mut smoothed_minus_dm = minus_dm[..period].iter().sum::<f64>();
    let mut smoothed_tr = true_range[..period].iter().sum::<f64>();

    let mut plus_di_values = Vec::new();
    let mut minus_di_values = Vec::new();
    let mut dx_values = Vec::new();
    for i in period..plus_dm.len() {
        smoothed_plus_dm = smoothed_plus_dm - smoothed_plus_dm / period as f64 + plus_dm[i];
        smoothed_minus_dm = smoothed_minus_dm - smoothed_minus_dm / period as f64 + minus_dm[i];
        smoothed_tr = smoothed_tr - smoothed_tr / period as f64 + true_range[i];

        let pdi = if smoothed_tr > 0.0 { 100.0 * smoothed_plus_dm / smoothed_tr } else { 0.0 };
        let mdi = if smoothed_tr > 0.0 { 100.0 * smoothed_minus_dm / smoothed_tr } else { 0.0 };
        plus_di_values.push(pdi);
        minus_di_values.push(mdi);

        let di_sum = pdi + mdi;
        dx_values.push(if di_sum > 0.0 { 100.0 * (pdi - mdi).abs() / di_sum } else { 0.0 });
    }

    if dx_values.len() < period {
        return AdxResult { adx: vec![], plus_di: plus_di_values, minus_di: minus_di_values };
    }

    let mut adx_values = Vec::new();
    let mut adx_val = finite_or(dx_values[..period].iter().sum::<f64>() / period as f64, 0.0);
    adx_values.push(adx_val.clamp(0.0, 100.0));
    for dx in &dx_values[period..] {
        adx_val = (adx_val * (period - 1) as f64 + dx) / period as f64;
        adx_values.push(finite_or(adx_val, 0.0).clamp(0.0, 100.0));
    }

    AdxResult { adx: adx_values, plus_di: plus_di_values, minus_di: minus_di_values }
}

/// Commodity Channel Index with the standard 0.015 scaling factor, clipped to [-300, 300].
pub fn cci(bars: &[Bar], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() < period {
        return vec![];
    }
    let typical_prices: Vec<f64> = bars.iter().map(|b| (b.high + b.low + b.close) / 3.0).collect();
    let mut values = Vec::with_capacity(typical_prices.len() - period + 1);
    for i in period - 1..typical_prices.len() {
        let slice = &typical_prices[i + 1 - period..=i];
        let mean: f64 = slice.iter().sum::<f64>() / period as f64;
        let mean_deviation: f64 = slice.iter().map(|tp| (tp - mean).abs()).sum::<f64>() / period as f64;
        let value = if mean_deviation.abs() > f64::EPSILON {
            (typical_prices[i] - mean) / (0.015 * mean_deviation)
        } else {
            0.0
        };
        values.push(finite_or(value, 0.0).clamp(-300.0, 300.0));
    }
    values
}

pub struct SupportResistance {
    pub support: Option<f64>,
    pub resistance: Option<f64>,
}

pub fn support_resistance(bars: &[Bar], lookback: usize) -> SupportResistance {
    if bars.len() < lookback + 2 {
        return SupportResistance { support: None, resistance: None };
    }
    let recent = &bars[bars.len() - lookback..];
    let mut swing_highs: Vec<f64> = Vec::new();
    let mut swing_lows: Vec<f64> = Vec::new();
    for i in 2..recent.len() - 2 {
        if recent[i].high > recent[i - 1].high
            && recent[i].high > recent[i - 2].high
            && recent[i].high > recent[i + 1].high
            && recent[i].high > recent[i + 2].high
        {
            swing_highs.push(recent[i].high);
        }
        if recent[i].low < recent[i - 1].low
            && recent[i].low < recent[i - 2].low
            && recent[i].low < recent[i + 1].low
            && recent[i].low < recent[i + 2].low
        {
            swing_lows.push(recent[i].low);
        }
    }
    let current_price = bars.last().unwrap().close;
    let resistance = swing_highs.iter().filter(|&&h| h > current_price).copied().reduce(f64::min);
    let support = swing_lows.iter().filter(|&&l| l < current_price).copied().reduce(f64::max);
    SupportResistance { support, resistance }
}

/// Highest high / lowest low over the trailing `window` bars — the "N-bar swing high/low"
/// reading used alongside the 2-bar-confirmed `support_resistance` pivots above.
pub fn swing_high_low(bars: &[Bar], window: usize) -> Option<(f64, f64)> {
    if bars.is_empty() || window == 0 {
        return None;
    }
    let start = bars.len().saturating_sub(window);
    let slice = &bars[start..];
    let high = slice.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let low = slice.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    Some((high, low))
}

/// 52-week high/low over up to the trailing 252 trading-day bars.
pub fn week_52_high_low(bars: &[Bar]) -> Option<(f64, f64)> {
    const TRADING_DAYS_PER_YEAR: usize = 252;
    swing_high_low(bars, TRADING_DAYS_PER_YEAR.min(bars.len().max(1)))
}

pub fn vwap(bars: &[Bar]) -> Vec<f64> {
    if bars.is_empty() {
        return vec![];
    }
    let mut values = Vec::with_capacity(bars.len());
    let mut cumulative_tpv = 0.0;
    let mut cumulative_volume = 0.0;
    for bar in bars {
        let typical_price = (bar.high + bar.low + bar.close) / 3.0;
        cumulative_tpv += typical_price * bar.volume;
        cumulative_volume += bar.volume;
        let value = if cumulative_volume > 0.0 { cumulative_tpv / cumulative_volume } else { typical_price };
        values.push(finite_or(value, typical_price));
    }
    values
}

pub struct PivotPoints {
    pub pivot: f64,
    pub r1: f64,
    pub s1: f64,
}

pub fn pivot_points(bars: &[Bar]) -> Option<PivotPoints> {
    let bar = bars.last()?;
    let pivot = (bar.high + bar.low + bar.close) / 3.0;
    Some(PivotPoints { pivot, r1: 2.0 * pivot - bar.low, s1: 2.0 * pivot - bar.high })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_bars(n: usize, price: f64) -> Vec<Bar> {
        (0..n).map(|_| Bar { open: price, high: price, low: price, close: price, volume: 1_000.0 }).collect()
    }

    #[test]
    fn ema_seeds_with_sma_and_never_produces_nan() {
        let data: Vec<f64> = (1..=30).map(|i| i as f64).collect();
        let values = ema(&data, 10);
        assert_eq!(values.len(), data.len());
        assert!(values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn rsi_is_clamped_to_0_100() {
        let mut data = vec![10.0; 20];
        for (i, v) in data.iter_mut().enumerate() {
            *v = 10.0 + i as f64;
        }
        let values = rsi(&data, 14);
        assert!(values.iter().all(|v| (0.0..=100.0).contains(v)));
    }

    #[test]
    fn rsi_returns_empty_below_minimum_length() {
        let data = vec![1.0, 2.0, 3.0];
        assert!(rsi(&data, 14).is_empty());
    }

    #[test]
    fn cci_handles_zero_mean_deviation_without_nan() {
        let bars = flat_bars(25, 50.0);
        let values = cci(&bars, 20);
        assert!(values.iter().all(|v| v.is_finite() && (-300.0..=300.0).contains(v)));
    }

    #[test]
    fn vpt_guards_against_zero_previous_close() {
        let mut bars = flat_bars(5, 0.0);
        bars[1].close = 10.0;
        let values = vpt(&bars);
        assert!(values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn swing_high_low_uses_full_history_when_shorter_than_window() {
        let bars = vec![
            Bar { open: 1.0, high: 12.0, low: 8.0, close: 10.0, volume: 1.0 },
            Bar { open: 1.0, high: 15.0, low: 9.0, close: 11.0, volume: 1.0 },
        ];
        let (high, low) = swing_high_low(&bars, 20).unwrap();
        assert_eq!(high, 15.0);
        assert_eq!(low, 8.0);
    }

    #[test]
    fn week_52_high_low_matches_trailing_window() {
        let bars = flat_bars(300, 5.0);
        let (high, low) = week_52_high_low(&bars).unwrap();
        assert_eq!(high, 5.0);
        assert_eq!(low, 5.0);
    }

    #[test]
    fn bollinger_percent_b_reports_literal_position_beyond_unit_range() {
        let value = bollinger_percent_b(120.0, 110.0, 100.0);
        assert!((value - 2.0).abs() < 1e-9);
    }

    #[test]
    fn atr_insufficient_history_returns_empty() {
        let bars = flat_bars(5, 100.0);
        assert!(atr(&bars, 14).is_empty());
    }
}
