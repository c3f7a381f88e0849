//! Component-score math (SPEC_FULL §4.7). Every component is built the way
//! `fundamental-analysis::analyze_enhanced` builds its overall signal: a list of
//! `(name, weight, bullish)` votes, summed and normalized to a -100..100 score, then
//! rescaled to 0..100 the way `StockScreener::create_suggestion` rescales
//! `SignalStrength::to_score()` (`(raw + 100) / 200`).

use indicator_engine::IndicatorSnapshot;
use pipeline_core::{ComponentScore, Grade, RatioRow};

pub(crate) struct Vote {
    pub name: &'static str,
    pub weight: i32,
    pub bullish: bool,
}

pub(crate) struct Votes {
    pub cast: Vec<Vote>,
    pub populated: u32,
    pub required: u32,
    pub missing: Vec<&'static str>,
}

impl Votes {
    pub(crate) fn new(required: u32) -> Self {
        Self { cast: Vec::new(), populated: 0, required, missing: Vec::new() }
    }

    pub(crate) fn field(&mut self, name: &'static str, value: Option<f64>) -> Option<f64> {
        match value {
            Some(v) => {
                self.populated += 1;
                Some(v)
            }
            None => {
                self.missing.push(name);
                None
            }
        }
    }

    pub(crate) fn cast(&mut self, name: &'static str, weight: i32, bullish: bool) {
        self.cast.push(Vote { name, weight, bullish });
    }

    /// Normalizes the cast votes to a `ComponentScore` on 0..100 plus the data
    /// confidence for this component (`populated / required`).
    pub(crate) fn finish(self) -> (ComponentScore, f64) {
        let total_weight: i32 = self.cast.iter().map(|v| v.weight).sum();
        let raw = if total_weight > 0 {
            let total_score: i32 = self
                .cast
                .iter()
                .map(|v| if v.bullish { v.weight } else { -v.weight })
                .sum();
            (total_score as f64 / total_weight as f64) * 100.0
        } else {
            0.0
        };
        let normalized = ((raw + 100.0) / 200.0 * 100.0).clamp(0.0, 100.0);
        let confidence = if self.required > 0 {
            self.populated as f64 / self.required as f64
        } else {
            1.0
        };
        (ComponentScore { value: normalized, grade: Grade::from_score(normalized) }, confidence)
    }
}

pub struct Scored {
    pub score: ComponentScore,
    pub confidence: f64,
    pub missing_fields: Vec<&'static str>,
}

fn finalize(votes: Votes) -> Scored {
    let missing_fields = votes.missing.clone();
    let (score, confidence) = votes.finish();
    Scored { score, confidence, missing_fields }
}

/// Profitability, leverage, liquidity, growth.
pub fn fundamental_health(ratios: &RatioRow) -> Scored {
    let mut v = Votes::new(9);
    if let Some(roe) = v.field("roe", ratios.roe) {
        v.cast("ROE", 3, roe > 15.0);
        if roe < 5.0 {
            v.cast("Weak ROE", 2, false);
        }
    }
    if let Some(roic) = v.field("roic", ratios.roic) {
        v.cast("ROIC", 2, roic > 12.0);
    }
    if let Some(nm) = v.field("net_margin", ratios.net_margin) {
        v.cast("Net margin", 3, nm > 10.0);
    }
    if let Some(gm) = v.field("gross_margin", ratios.gross_margin) {
        v.cast("Gross margin", 2, gm > 40.0);
    }
    if let Some(om) = v.field("operating_margin", ratios.operating_margin) {
        v.cast("Operating margin", 2, om > 15.0);
    }
    if let Some(d2e) = v.field("debt_to_equity", ratios.debt_to_equity) {
        v.cast("Leverage", 3, d2e < 1.0);
        if d2e > 2.0 {
            v.cast("High leverage", 2, false);
        }
    }
    if let Some(cr) = v.field("current_ratio", ratios.current_ratio) {
        v.cast("Liquidity", 2, cr > 1.5);
    }
    if let Some(growth) = v.field("revenue_growth_yoy", ratios.revenue_growth_yoy) {
        v.cast("Revenue growth", 3, growth > 5.0);
    }
    if let Some(fcf_ni) = v.field("fcf_to_net_income", ratios.fcf_to_net_income) {
        v.cast("Earnings quality", 2, fcf_ni > 0.8);
    }
    finalize(v)
}

/// Inverse weighting of valuation ratios — cheap relative to the PEG-adjusted
/// thresholds `fundamental-analysis::analyze_enhanced` uses is bullish.
pub fn value_investment(ratios: &RatioRow) -> Scored {
    let mut v = Votes::new(5);
    if let Some(pe) = v.field("pe", ratios.pe) {
        v.cast("P/E", 3, pe < 20.0);
        if pe > 35.0 {
            v.cast("Expensive P/E", 2, false);
        }
    }
    if let Some(pb) = v.field("pb", ratios.pb) {
        v.cast("P/B", 2, pb < 3.0);
    }
    if let Some(ps) = v.field("ps", ratios.ps) {
        v.cast("P/S", 2, ps < 4.0);
    }
    if let Some(ev_ebitda) = v.field("ev_to_ebitda", ratios.ev_to_ebitda) {
        v.cast("EV/EBITDA", 2, ev_ebitda < 15.0);
    }
    if let Some(peg) = v.field("peg", ratios.peg) {
        v.cast("PEG", 3, peg < 1.5);
        if peg < 1.0 {
            v.cast("Attractive PEG", 2, true);
        }
    }
    finalize(v)
}

/// Trend alignment (EMA stack), momentum (RSI/MACD), volatility (ATR/ADX), and
/// position within the Bollinger band.
pub fn technical_health(ind: &IndicatorSnapshot, price: Option<f64>) -> Scored {
    let mut v = Votes::new(6);
    if let (Some(e20), Some(e50), Some(e100), Some(e200)) =
        (v.field("ema_20", ind.ema_20), v.field("ema_50", ind.ema_50), v.field("ema_100", ind.ema_100), v.field("ema_200", ind.ema_200))
    {
        v.cast("EMA stack alignment", 4, e20 > e50 && e50 > e100 && e100 > e200);
    }
    if let Some(rsi) = v.field("rsi_14", ind.rsi_14) {
        v.cast("RSI momentum", 2, rsi > 50.0 && rsi < 70.0);
        if rsi > 80.0 {
            v.cast("Overbought", 2, false);
        }
    }
    if let Some(hist) = v.field("macd_histogram", ind.macd_histogram) {
        v.cast("MACD histogram", 3, hist > 0.0);
    }
    if let Some(adx) = v.field("adx_14", ind.adx_14) {
        v.cast("Trend strength", 2, adx > 20.0);
    }
    if let (Some(pct_b), Some(_)) = (v.field("bb_percent_b", ind.bb_percent_b), price) {
        v.cast("Bollinger position", 2, (0.2..0.8).contains(&pct_b));
    }
    finalize(v)
}

/// Momentum + breakout + volume confirmation.
pub fn trading_signal(ind: &IndicatorSnapshot, price: Option<f64>) -> Scored {
    let mut v = Votes::new(5);
    if let Some(rsi) = v.field("rsi_14", ind.rsi_14) {
        v.cast("RSI trending up", 2, rsi > 55.0);
    }
    if let (Some(k), Some(d)) = (v.field("stoch_k", ind.stoch_k), v.field("stoch_d", ind.stoch_d)) {
        v.cast("Stochastic cross", 2, k > d);
    }
    if let Some(hist) = v.field("macd_histogram", ind.macd_histogram) {
        v.cast("MACD confirmation", 2, hist > 0.0);
    }
    if let (Some(price), Some(resistance)) = (price, v.field("resistance", ind.resistance)) {
        v.cast("Breakout above resistance", 3, price > resistance);
    }
    if let (Some(price), Some(week_52_high)) = (price, v.field("week_52_high", ind.week_52_high)) {
        v.cast("Near 52-week high", 2, price >= week_52_high * 0.95);
    }
    finalize(v)
}

/// Technical-volatility risk augmented by valuation extremes and leverage.
/// Scored the same direction as the other components: a *high* value means *low*
/// risk, so `Grade::StrongBuy` reads as "safest" and `Grade::StrongSell` as
/// "riskiest", consistent with the bullish-is-high convention elsewhere.
pub fn risk(ind: &IndicatorSnapshot, ratios: &RatioRow, price: Option<f64>) -> Scored {
    let mut v = Votes::new(4);
    if let (Some(atr), Some(price)) = (v.field("atr_14", ind.atr_14), price) {
        if price > 0.0 {
            let atr_pct = atr / price;
            v.cast("Low volatility", 3, atr_pct < 0.03);
            if atr_pct > 0.06 {
                v.cast("High volatility", 2, false);
            }
        }
    }
    if let Some(adx) = v.field("adx_14", ind.adx_14) {
        v.cast("Orderly trend", 1, adx < 40.0);
    }
    if let Some(d2e) = v.field("debt_to_equity", ratios.debt_to_equity) {
        v.cast("Manageable leverage", 2, d2e < 1.5);
    }
    if let Some(peg) = v.field("peg", ratios.peg) {
        v.cast("Not a valuation extreme", 2, peg < 3.0 && peg > 0.0);
    }
    finalize(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_ratios() -> RatioRow {
        RatioRow {
            ticker: "TEST".to_string(),
            as_of_date: chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            pe: None, pb: None, ps: None, ev_to_ebitda: None, peg: None, graham_number: None,
            roe: None, roa: None, roic: None, gross_margin: None, operating_margin: None, net_margin: None,
            debt_to_equity: None, current_ratio: None, quick_ratio: None, interest_coverage: None, altman_z: None,
            asset_turnover: None, inventory_turnover: None, receivables_turnover: None,
            revenue_growth_yoy: None, earnings_growth_yoy: None, fcf_growth_yoy: None,
            fcf_to_net_income: None, cash_conversion_cycle: None,
            market_cap: None, enterprise_value: None,
        }
    }

    #[test]
    fn fundamental_health_with_no_inputs_has_zero_confidence() {
        let scored = fundamental_health(&empty_ratios());
        assert_eq!(scored.confidence, 0.0);
        assert_eq!(scored.score.value, 50.0);
    }

    #[test]
    fn strong_profitability_yields_a_high_score() {
        let mut ratios = empty_ratios();
        ratios.roe = Some(25.0);
        ratios.net_margin = Some(18.0);
        ratios.gross_margin = Some(55.0);
        ratios.operating_margin = Some(22.0);
        ratios.debt_to_equity = Some(0.3);
        ratios.current_ratio = Some(2.0);
        ratios.revenue_growth_yoy = Some(12.0);
        let scored = fundamental_health(&ratios);
        assert!(scored.score.value > 70.0);
        assert_eq!(scored.score.grade, Grade::StrongBuy);
    }

    #[test]
    fn technical_health_requires_indicator_history() {
        let ind = IndicatorSnapshot::default();
        let scored = technical_health(&ind, Some(100.0));
        assert_eq!(scored.confidence, 0.0);
        assert_eq!(scored.score.value, 50.0);
    }
}
