//! Ratio Engine (SPEC_FULL §4.6, §2 item 6).
//!
//! `RatioEngine::compute` takes a `FundamentalSnapshot`, the prior-period snapshot (for
//! YoY growth), a current price, and the sector-plausibility table, and returns a
//! `RatioRow` with every ratio populated or `None`. A ratio is never emitted if any
//! required input is missing, non-positive where positivity is required, or implausible
//! for the ticker's sector — the same "null, never nonsense" convention
//! `fundamental-analysis` uses throughout.

mod core;

pub use core::{
    altman_z, asset_turnover, cash_conversion_cycle, current_ratio, debt_to_equity, ev_to_ebitda,
    fcf_to_net_income, graham_number, gross_margin, growth_yoy, interest_coverage,
    inventory_turnover, net_margin, operating_margin, pb, pe, peg, ps, quick_ratio,
    receivables_turnover, roa, roe, roic,
};

use chrono::NaiveDate;
use pipeline_core::{FundamentalSnapshot, RatioRow, SectorRanges};

pub struct RatioEngine;

impl RatioEngine {
    /// `current` and (optionally) `prior` are the two most recent fundamental
    /// snapshots for the ticker; `prior` enables the three YoY growth ratios. `price`
    /// is the latest close. `sector` and `sector_ranges` gate implausible results —
    /// a computed ratio outside its sector's configured `[min, max]` is dropped to
    /// `None` rather than persisted as a misleading outlier.
    pub fn compute(
        ticker: &str,
        as_of_date: NaiveDate,
        current: &FundamentalSnapshot,
        prior: Option<&FundamentalSnapshot>,
        price: f64,
        sector: Option<&str>,
        sector_ranges: &SectorRanges,
    ) -> RatioRow {
        let market_cap = current.market_cap.or_else(|| {
            match (current.shares_outstanding, price > 0.0) {
                (Some(shares), true) => Some(shares * price),
                _ => None,
            }
        });
        let enterprise_value = current.enterprise_value.or_else(|| {
            match (market_cap, current.total_debt) {
                (Some(mc), Some(debt)) => Some(mc + debt),
                _ => None,
            }
        });

        let eps = current.eps_diluted.or_else(|| {
            match (current.net_income, current.shares_outstanding) {
                (Some(ni), Some(shares)) if shares > 0.0 => Some(ni / shares),
                _ => None,
            }
        });

        let pe_ratio = eps.and_then(|e| pe(price, e));
        let revenue_growth = prior
            .and_then(|p| p.revenue)
            .zip(current.revenue)
            .and_then(|(prior_rev, cur_rev)| growth_yoy(cur_rev, prior_rev));

        let mut row = RatioRow {
            ticker: ticker.to_string(),
            as_of_date,
            pe: pe_ratio,
            pb: current
                .book_value_per_share
                .and_then(|bvps| pb(price, bvps)),
            ps: market_cap.zip(current.revenue).and_then(|(mc, rev)| ps(mc, rev)),
            ev_to_ebitda: enterprise_value
                .zip(current.ebitda)
                .and_then(|(ev, ebitda)| ev_to_ebitda(ev, ebitda)),
            peg: pe_ratio
                .zip(revenue_growth)
                .and_then(|(p, g)| peg(p, g)),
            graham_number: eps
                .zip(current.book_value_per_share)
                .and_then(|(e, b)| graham_number(e, b)),

            roe: current
                .net_income
                .zip(current.total_equity)
                .and_then(|(ni, eq)| roe(ni, eq)),
            roa: current
                .net_income
                .zip(current.total_assets)
                .and_then(|(ni, ta)| roa(ni, ta)),
            roic: match (current.operating_income, current.total_equity, current.total_debt) {
                (Some(oi), Some(eq), Some(debt)) => roic(oi, eq, debt),
                _ => None,
            },
            gross_margin: current
                .revenue
                .zip(current.cost_of_goods_sold)
                .and_then(|(rev, cogs)| gross_margin(rev, cogs)),
            operating_margin: current
                .operating_income
                .zip(current.revenue)
                .and_then(|(oi, rev)| operating_margin(oi, rev)),
            net_margin: current
                .net_income
                .zip(current.revenue)
                .and_then(|(ni, rev)| net_margin(ni, rev)),

            debt_to_equity: current
                .total_debt
                .zip(current.total_equity)
                .and_then(|(debt, eq)| debt_to_equity(debt, eq)),
            current_ratio: current
                .current_assets
                .zip(current.current_liabilities)
                .and_then(|(ca, cl)| current_ratio(ca, cl)),
            quick_ratio: None,
            interest_coverage: None,
            altman_z: None,

            asset_turnover: current
                .revenue
                .zip(current.total_assets)
                .and_then(|(rev, ta)| asset_turnover(rev, ta)),
            inventory_turnover: None,
            receivables_turnover: None,

            revenue_growth_yoy: revenue_growth,
            earnings_growth_yoy: prior
                .and_then(|p| p.net_income)
                .zip(current.net_income)
                .and_then(|(prior_ni, cur_ni)| growth_yoy(cur_ni, prior_ni)),
            fcf_growth_yoy: prior
                .and_then(|p| p.free_cash_flow)
                .zip(current.free_cash_flow)
                .and_then(|(prior_fcf, cur_fcf)| growth_yoy(cur_fcf, prior_fcf)),

            fcf_to_net_income: current
                .free_cash_flow
                .zip(current.net_income)
                .and_then(|(fcf, ni)| fcf_to_net_income(fcf, ni)),
            cash_conversion_cycle: None,

            market_cap,
            enterprise_value,
        };

        apply_sector_plausibility(&mut row, sector, sector_ranges);
        row
    }
}

/// Drops any populated ratio outside its sector's configured plausible range to
/// `None` rather than persisting it (SPEC_FULL §4.6: "emitted as null ... or outside
/// plausible sector ranges").
fn apply_sector_plausibility(row: &mut RatioRow, sector: Option<&str>, ranges: &SectorRanges) {
    macro_rules! gate {
        ($field:ident, $name:literal) => {
            if let Some(v) = row.$field {
                if !ranges.plausible(sector, $name, v) {
                    row.$field = None;
                }
            }
        };
    }
    gate!(pe, "pe");
    gate!(pb, "pb");
    gate!(ps, "ps");
    gate!(ev_to_ebitda, "ev_to_ebitda");
    gate!(peg, "peg");
    gate!(debt_to_equity, "debt_to_equity");
    gate!(current_ratio, "current_ratio");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn snapshot(ticker: &str) -> FundamentalSnapshot {
        FundamentalSnapshot {
            ticker: ticker.to_string(),
            fiscal_period_end: None,
            revenue: Some(1000.0),
            net_income: Some(150.0),
            total_assets: Some(2000.0),
            total_debt: Some(500.0),
            total_equity: Some(1000.0),
            current_assets: Some(600.0),
            current_liabilities: Some(300.0),
            cost_of_goods_sold: Some(600.0),
            operating_income: Some(250.0),
            ebitda: Some(300.0),
            free_cash_flow: Some(120.0),
            shares_outstanding: Some(100.0),
            market_cap: Some(5000.0),
            enterprise_value: Some(5500.0),
            eps_diluted: Some(1.5),
            book_value_per_share: Some(10.0),
            provenance: HashMap::new(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 30).unwrap()
    }

    #[test]
    fn populates_core_ratios_from_a_complete_snapshot() {
        let row = RatioEngine::compute(
            "ACME",
            date(),
            &snapshot("ACME"),
            None,
            50.0,
            None,
            &SectorRanges::default(),
        );
        assert!(row.pe.is_some());
        assert!(row.pb.is_some());
        assert!(row.roe.is_some());
        assert!(row.debt_to_equity.is_some());
        assert_eq!(row.quick_ratio, None);
        assert_eq!(row.revenue_growth_yoy, None);
    }

    #[test]
    fn growth_ratios_require_a_prior_period_snapshot() {
        let mut prior = snapshot("ACME");
        prior.revenue = Some(800.0);
        prior.net_income = Some(100.0);
        let row = RatioEngine::compute(
            "ACME",
            date(),
            &snapshot("ACME"),
            Some(&prior),
            50.0,
            None,
            &SectorRanges::default(),
        );
        assert_eq!(row.revenue_growth_yoy, Some(25.0));
        assert_eq!(row.earnings_growth_yoy, Some(50.0));
    }

    #[test]
    fn sector_implausible_pe_is_dropped_to_null() {
        let mut ranges = SectorRanges::default();
        let mut bucket = HashMap::new();
        bucket.insert("pe".to_string(), (0.0, 10.0));
        ranges.ranges.insert("tech".to_string(), bucket);

        let row = RatioEngine::compute(
            "ACME",
            date(),
            &snapshot("ACME"),
            None,
            500.0,
            Some("tech"),
            &ranges,
        );
        assert_eq!(row.pe, None);
    }

    #[test]
    fn missing_eps_and_shares_yields_null_pe() {
        let mut snap = snapshot("ACME");
        snap.eps_diluted = None;
        snap.net_income = None;
        snap.shares_outstanding = None;
        let row = RatioEngine::compute(
            "ACME",
            date(),
            &snap,
            None,
            50.0,
            None,
            &SectorRanges::default(),
        );
        assert_eq!(row.pe, None);
    }
}
