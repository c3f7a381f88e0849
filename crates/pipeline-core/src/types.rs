use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Immutable identifier for a tracked equity. Retired only by the Existence Reaper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub ticker: String,
    pub name: String,
    pub sector: Option<String>,
    pub asset_class: Option<String>,
}

/// One OHLCV bar plus the indicator columns the Indicator Engine fills in.
/// Indicator fields are `None` until computed; a `None` never means zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,

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

/// A single bar with no ticker/date context, the shape engines actually consume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Closed enumeration of every fundamental quantity a `FundamentalSnapshot` may carry.
/// Used as the key of the parallel provenance map (SPEC_FULL §3.1) instead of a
/// dynamic field-bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FundamentalField {
    Revenue,
    NetIncome,
    TotalAssets,
    TotalDebt,
    TotalEquity,
    CurrentAssets,
    CurrentLiabilities,
    CostOfGoodsSold,
    OperatingIncome,
    Ebitda,
    FreeCashFlow,
    SharesOutstanding,
    MarketCap,
    EnterpriseValue,
    EpsDiluted,
    BookValuePerShare,
}

/// Per-field trust metadata. `confidence` is a per-provider base attenuated by staleness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldProvenance {
    pub source: String,
    pub confidence: f64,
    pub observed_at: DateTime<Utc>,
}

/// `(ticker, fiscal_period_end, source)` unique. A closed struct, not an open dictionary —
/// see SPEC_FULL §3.1 / DESIGN.md for why this replaces the source's dynamic metrics bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    pub ticker: String,
    pub fiscal_period_end: Option<NaiveDate>,

    pub revenue: Option<f64>,
    pub net_income: Option<f64>,
    pub total_assets: Option<f64>,
    pub total_debt: Option<f64>,
    pub total_equity: Option<f64>,
    pub current_assets: Option<f64>,
    pub current_liabilities: Option<f64>,
    pub cost_of_goods_sold: Option<f64>,
    pub operating_income: Option<f64>,
    pub ebitda: Option<f64>,
    pub free_cash_flow: Option<f64>,
    pub shares_outstanding: Option<f64>,
    pub market_cap: Option<f64>,
    pub enterprise_value: Option<f64>,
    pub eps_diluted: Option<f64>,
    pub book_value_per_share: Option<f64>,

    pub provenance: HashMap<FundamentalField, FieldProvenance>,
}

impl FundamentalSnapshot {
    pub fn get(&self, field: FundamentalField) -> Option<f64> {
        use FundamentalField::*;
        match field {
            Revenue => self.revenue,
            NetIncome => self.net_income,
            TotalAssets => self.total_assets,
            TotalDebt => self.total_debt,
            TotalEquity => self.total_equity,
            CurrentAssets => self.current_assets,
            CurrentLiabilities => self.current_liabilities,
            CostOfGoodsSold => self.cost_of_goods_sold,
            OperatingIncome => self.operating_income,
            Ebitda => self.ebitda,
            FreeCashFlow => self.free_cash_flow,
            SharesOutstanding => self.shares_outstanding,
            MarketCap => self.market_cap,
            EnterpriseValue => self.enterprise_value,
            EpsDiluted => self.eps_diluted,
            BookValuePerShare => self.book_value_per_share,
        }
    }

    /// Fraction of the 16 named fields that carry a value. Used to feed `data_confidence`.
    pub fn completeness(&self) -> f64 {
        use FundamentalField::*;
        let all = [
            Revenue, NetIncome, TotalAssets, TotalDebt, TotalEquity, CurrentAssets,
            CurrentLiabilities, CostOfGoodsSold, OperatingIncome, Ebitda, FreeCashFlow,
            SharesOutstanding, MarketCap, EnterpriseValue, EpsDiluted, BookValuePerShare,
        ];
        let populated = all.iter().filter(|f| self.get(**f).is_some()).count();
        populated as f64 / all.len() as f64
    }
}

/// `(ticker, as_of_date)` unique. Null fields mean "rejected by policy", never a
/// nonsense computed value (SPEC_FULL §4.6).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatioRow {
    pub ticker: String,
    pub as_of_date: NaiveDate,

    // Valuation
    pub pe: Option<f64>,
    pub pb: Option<f64>,
    pub ps: Option<f64>,
    pub ev_to_ebitda: Option<f64>,
    pub peg: Option<f64>,
    pub graham_number: Option<f64>,
    // Profitability
    pub roe: Option<f64>,
    pub roa: Option<f64>,
    pub roic: Option<f64>,
    pub gross_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub net_margin: Option<f64>,
    // Health
    pub debt_to_equity: Option<f64>,
    pub current_ratio: Option<f64>,
    pub quick_ratio: Option<f64>,
    pub interest_coverage: Option<f64>,
    pub altman_z: Option<f64>,
    // Efficiency
    pub asset_turnover: Option<f64>,
    pub inventory_turnover: Option<f64>,
    pub receivables_turnover: Option<f64>,
    // Growth YoY
    pub revenue_growth_yoy: Option<f64>,
    pub earnings_growth_yoy: Option<f64>,
    pub fcf_growth_yoy: Option<f64>,
    // Quality
    pub fcf_to_net_income: Option<f64>,
    pub cash_conversion_cycle: Option<f64>,
    // Market
    pub market_cap: Option<f64>,
    pub enterprise_value: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalystConsensus {
    pub strong_buy: u32,
    pub buy: u32,
    pub hold: u32,
    pub sell: u32,
    pub strong_sell: u32,
    pub consensus_score: Option<f64>,
    pub mean_target_price: Option<f64>,
    pub median_target_price: Option<f64>,
}

/// Five-level categorical label derived from a 0-100 score (GLOSSARY: Grade).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    StrongSell,
    Sell,
    Neutral,
    Buy,
    StrongBuy,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Grade::StrongBuy
        } else if score >= 60.0 {
            Grade::Buy
        } else if score >= 40.0 {
            Grade::Neutral
        } else if score >= 20.0 {
            Grade::Sell
        } else {
            Grade::StrongSell
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::StrongSell => "Strong Sell",
            Grade::Sell => "Sell",
            Grade::Neutral => "Neutral",
            Grade::Buy => "Buy",
            Grade::StrongBuy => "Strong Buy",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentScore {
    pub value: f64,
    pub grade: Grade,
}

/// `(ticker, as_of_date)` unique; history retained via `company_scores_historical`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRow {
    pub ticker: String,
    pub as_of_date: NaiveDate,
    pub fundamental_health: ComponentScore,
    pub value_investment: ComponentScore,
    pub technical_health: ComponentScore,
    pub trading_signal: ComponentScore,
    pub risk: ComponentScore,
    pub composite: ComponentScore,
    pub data_confidence: f64,
    pub missing_fields: Vec<String>,
    pub estimated_fields: Vec<String>,
    pub low_confidence: bool,
    pub version: u32,
}

/// Singleton per run. Decremented atomically on every adapter call.
#[derive(Debug, Clone, Default)]
pub struct ApiBudget {
    pub total: i64,
    pub remaining: i64,
    pub per_provider: HashMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsEvent {
    pub event_date: NaiveDate,
    pub reported: bool,
    pub source: String,
}

/// Outcome of a single adapter call (SPEC_FULL §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Ok,
    NotFound,
    RateLimited,
    TransientError,
    AuthError,
}

/// Named query kind an adapter can serve (GLOSSARY: Capability).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    PriceQuote,
    PriceHistory,
    FundamentalsSnapshot,
    EarningsCalendar,
    AnalystRecommendations,
    ExistenceProbe,
}
