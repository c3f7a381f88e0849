//! Scorer (SPEC_FULL §4.7, §2 item 7).
//!
//! `Scorer::compute` blends the Ratio Engine's and Indicator Engine's outputs into the
//! five named component scores plus a weighted Composite, in the style of
//! `analysis-orchestrator::combine_results` (weighted blend with a conflict penalty)
//! and `fundamental-analysis`'s `quality_score` composite-counting idiom. `vwap_sr`
//! from `ScoringWeights` has no dedicated `ScoreRow` column — `pipeline_core::ScoreRow`
//! carries exactly five components plus Composite, so `vwap_sr`'s share is folded into
//! Technical Health's weight at blend time (see DESIGN.md).

mod core;

pub use core::{fundamental_health, risk, technical_health, trading_signal, value_investment, Scored};

use chrono::NaiveDate;
use indicator_engine::IndicatorSnapshot;
use pipeline_core::{ComponentScore, Grade, RatioRow, ScoreRow, ScoringWeights};

pub struct Scorer;

impl Scorer {
    /// `price` is the latest close, used for breakout/volatility-relative checks in
    /// the Technical Health, Trading Signal, and Risk components.
    pub fn compute(
        ticker: &str,
        as_of_date: NaiveDate,
        ratios: &RatioRow,
        indicators: &IndicatorSnapshot,
        price: Option<f64>,
        weights: &ScoringWeights,
        confidence_threshold: f64,
        version: u32,
    ) -> ScoreRow {
        let fundamental = fundamental_health(ratios);
        let value = value_investment(ratios);
        let technical = technical_health(indicators, price);
        let signal = trading_signal(indicators, price);
        let risk_component = risk(indicators, ratios, price);

        // vwap_sr folded into technical's weight (no standalone ScoreRow column).
        let technical_weight = weights.technical + weights.vwap_sr;
        let composite_value = (fundamental.score.value * weights.fundamental
            + technical.score.value * technical_weight
            + value.score.value * weights.value
            + signal.score.value * weights.signal
            + risk_component.score.value * weights.risk)
            .clamp(0.0, 100.0);
        let composite = ComponentScore { value: composite_value, grade: Grade::from_score(composite_value) };

        let mut missing_fields: Vec<String> = Vec::new();
        for scored in [&fundamental, &value, &technical, &signal, &risk_component] {
            missing_fields.extend(scored.missing_fields.iter().map(|f| f.to_string()));
        }
        missing_fields.sort();
        missing_fields.dedup();

        let weighted_confidence = fundamental.confidence * weights.fundamental
            + technical.confidence * technical_weight
            + value.confidence * weights.value
            + signal.confidence * weights.signal
            + risk_component.confidence * weights.risk;
        let low_confidence = weighted_confidence < confidence_threshold;

        ScoreRow {
            ticker: ticker.to_string(),
            as_of_date,
            fundamental_health: fundamental.score,
            value_investment: value.score,
            technical_health: technical.score,
            trading_signal: signal.score,
            risk: risk_component.score,
            composite,
            data_confidence: weighted_confidence,
            missing_fields,
            // The scorer never imputes a substitute value for a missing input — every
            // component either counts a field toward `populated` or lists it in
            // `missing_fields`. `estimated_fields` therefore stays empty until a future
            // imputation strategy is introduced.
            estimated_fields: Vec::new(),
            low_confidence,
            version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_ratios(ticker: &str) -> RatioRow {
        RatioRow {
            ticker: ticker.to_string(),
            as_of_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
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
    fn all_missing_inputs_yields_low_confidence_neutral_row() {
        let row = Scorer::compute(
            "TEST",
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            &empty_ratios("TEST"),
            &IndicatorSnapshot::default(),
            None,
            &ScoringWeights::default(),
            0.70,
            1,
        );
        assert!(row.low_confidence);
        assert_eq!(row.data_confidence, 0.0);
        assert_eq!(row.composite.value, 50.0);
        assert!(!row.missing_fields.is_empty());
    }

    #[test]
    fn strong_fundamentals_and_technicals_raise_the_composite() {
        let mut ratios = empty_ratios("TEST");
        ratios.roe = Some(25.0);
        ratios.net_margin = Some(20.0);
        ratios.gross_margin = Some(55.0);
        ratios.operating_margin = Some(25.0);
        ratios.debt_to_equity = Some(0.2);
        ratios.current_ratio = Some(2.5);
        ratios.revenue_growth_yoy = Some(15.0);
        ratios.pe = Some(12.0);
        ratios.pb = Some(1.5);

        let mut ind = IndicatorSnapshot::default();
        ind.ema_20 = Some(110.0);
        ind.ema_50 = Some(105.0);
        ind.ema_100 = Some(100.0);
        ind.ema_200 = Some(95.0);
        ind.rsi_14 = Some(60.0);
        ind.macd_histogram = Some(1.2);
        ind.adx_14 = Some(28.0);
        ind.bb_percent_b = Some(0.6);

        let row = Scorer::compute(
            "TEST",
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            &ratios,
            &ind,
            Some(110.0),
            &ScoringWeights::default(),
            0.70,
            1,
        );
        assert!(row.composite.value > 60.0);
        assert_eq!(row.fundamental_health.grade, Grade::StrongBuy);
    }
}
