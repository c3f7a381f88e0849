//! Pure ratio math (SPEC_FULL §4.6). Every function takes plain `f64`/`Option<f64>`
//! inputs and returns `None` rather than a nonsense value when an input is missing or
//! fails a positivity check — the same guard style as
//! `fundamental-analysis::calculate_pe_ratio` and its siblings.

pub fn pe(price: f64, eps: f64) -> Option<f64> {
    if price > 0.0 && eps > 0.0 {
        Some(price / eps)
    } else {
        None
    }
}

pub fn pb(price: f64, book_value_per_share: f64) -> Option<f64> {
    if price > 0.0 && book_value_per_share > 0.0 {
        Some(price / book_value_per_share)
    } else {
        None
    }
}

pub fn ps(market_cap: f64, revenue: f64) -> Option<f64> {
    if market_cap > 0.0 && revenue > 0.0 {
        Some(market_cap / revenue)
    } else {
        None
    }
}

pub fn ev_to_ebitda(enterprise_value: f64, ebitda: f64) -> Option<f64> {
    if ebitda > 0.0 {
        Some(enterprise_value / ebitda)
    } else {
        None
    }
}

/// `growth_pct` is a whole-number percentage (e.g. `12.5` for 12.5%), matching
/// `fundamental-analysis`'s `revenue_growth` convention.
pub fn peg(pe_ratio: f64, growth_pct: f64) -> Option<f64> {
    if pe_ratio > 0.0 && growth_pct > 0.0 {
        Some(pe_ratio / growth_pct)
    } else {
        None
    }
}

/// Classic Benjamin Graham number: sqrt(22.5 * EPS * book value per share).
pub fn graham_number(eps: f64, book_value_per_share: f64) -> Option<f64> {
    if eps > 0.0 && book_value_per_share > 0.0 {
        Some((22.5 * eps * book_value_per_share).sqrt())
    } else {
        None
    }
}

pub fn roe(net_income: f64, equity: f64) -> Option<f64> {
    if equity > 0.0 {
        Some((net_income / equity) * 100.0)
    } else {
        None
    }
}

pub fn roa(net_income: f64, total_assets: f64) -> Option<f64> {
    if total_assets > 0.0 {
        Some((net_income / total_assets) * 100.0)
    } else {
        None
    }
}

/// After-tax operating income over invested capital, 21% US corporate tax rate —
/// the same 0.79 after-tax factor `fundamental-analysis::analyze_enhanced` uses.
pub fn roic(operating_income: f64, equity: f64, total_debt: f64) -> Option<f64> {
    let invested_capital = equity + total_debt;
    if invested_capital > 0.0 {
        Some((operating_income * 0.79 / invested_capital) * 100.0)
    } else {
        None
    }
}

pub fn gross_margin(revenue: f64, cost_of_goods_sold: f64) -> Option<f64> {
    if revenue > 0.0 {
        Some(((revenue - cost_of_goods_sold) / revenue) * 100.0)
    } else {
        None
    }
}

pub fn operating_margin(operating_income: f64, revenue: f64) -> Option<f64> {
    if revenue > 0.0 {
        Some((operating_income / revenue) * 100.0)
    } else {
        None
    }
}

pub fn net_margin(net_income: f64, revenue: f64) -> Option<f64> {
    if revenue > 0.0 {
        Some((net_income / revenue) * 100.0)
    } else {
        None
    }
}

pub fn debt_to_equity(total_debt: f64, equity: f64) -> Option<f64> {
    if equity > 0.0 {
        Some(total_debt / equity)
    } else {
        None
    }
}

pub fn current_ratio(current_assets: f64, current_liabilities: f64) -> Option<f64> {
    if current_liabilities > 0.0 {
        Some(current_assets / current_liabilities)
    } else {
        None
    }
}

/// Requires inventory, which `FundamentalSnapshot` does not model — always `None`
/// until a provider supplies it; kept as a real function rather than a stub so the
/// formula is correct the day that input exists.
pub fn quick_ratio(current_assets: f64, inventory: Option<f64>, current_liabilities: f64) -> Option<f64> {
    let inventory = inventory?;
    if current_liabilities > 0.0 {
        Some((current_assets - inventory) / current_liabilities)
    } else {
        None
    }
}

/// Requires interest expense, likewise unmodeled in `FundamentalSnapshot`.
pub fn interest_coverage(operating_income: f64, interest_expense: Option<f64>) -> Option<f64> {
    let interest_expense = interest_expense?;
    if interest_expense > 0.0 {
        Some(operating_income / interest_expense)
    } else {
        None
    }
}

/// Altman Z-Score. Requires retained earnings and total liabilities, neither of which
/// `FundamentalSnapshot` carries — `None` until those inputs exist.
#[allow(clippy::too_many_arguments)]
pub fn altman_z(
    working_capital: f64,
    total_assets: f64,
    retained_earnings: Option<f64>,
    ebit: f64,
    market_cap: f64,
    total_liabilities: Option<f64>,
    revenue: f64,
) -> Option<f64> {
    let retained_earnings = retained_earnings?;
    let total_liabilities = total_liabilities?;
    if total_assets <= 0.0 || total_liabilities <= 0.0 {
        return None;
    }
    let a = working_capital / total_assets;
    let b = retained_earnings / total_assets;
    let c = ebit / total_assets;
    let d = market_cap / total_liabilities;
    let e = revenue / total_assets;
    Some(1.2 * a + 1.4 * b + 3.3 * c + 0.6 * d + 1.0 * e)
}

pub fn asset_turnover(revenue: f64, total_assets: f64) -> Option<f64> {
    if total_assets > 0.0 {
        Some(revenue / total_assets)
    } else {
        None
    }
}

/// Requires average inventory, unmodeled in `FundamentalSnapshot`.
pub fn inventory_turnover(cost_of_goods_sold: f64, inventory: Option<f64>) -> Option<f64> {
    let inventory = inventory?;
    if inventory > 0.0 {
        Some(cost_of_goods_sold / inventory)
    } else {
        None
    }
}

/// Requires average receivables, unmodeled in `FundamentalSnapshot`.
pub fn receivables_turnover(revenue: f64, receivables: Option<f64>) -> Option<f64> {
    let receivables = receivables?;
    if receivables > 0.0 {
        Some(revenue / receivables)
    } else {
        None
    }
}

/// Year-over-year growth as a whole-number percentage. `None` unless the prior value
/// is a genuine positive base (a zero or negative base makes percentage growth
/// meaningless, matching `fundamental-analysis`'s `revenue_growth` guard).
pub fn growth_yoy(current: f64, prior: f64) -> Option<f64> {
    if prior > 0.0 {
        Some(((current - prior) / prior) * 100.0)
    } else {
        None
    }
}

pub fn fcf_to_net_income(free_cash_flow: f64, net_income: f64) -> Option<f64> {
    if net_income > 0.0 {
        Some(free_cash_flow / net_income)
    } else {
        None
    }
}

/// Days Inventory Outstanding + Days Sales Outstanding - Days Payable Outstanding.
/// Requires all three day-counts, none of which `FundamentalSnapshot` carries on its
/// own (they are themselves derived from inventory/receivables/payables).
pub fn cash_conversion_cycle(dio: Option<f64>, dso: Option<f64>, dpo: Option<f64>) -> Option<f64> {
    Some(dio? + dso? - dpo?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pe_is_null_on_nonpositive_eps() {
        assert_eq!(pe(100.0, 0.0), None);
        assert_eq!(pe(100.0, -2.0), None);
        assert!(pe(100.0, 5.0).is_some());
    }

    #[test]
    fn graham_number_is_null_on_negative_inputs() {
        assert_eq!(graham_number(-1.0, 10.0), None);
        assert!(graham_number(3.0, 20.0).unwrap() > 0.0);
    }

    #[test]
    fn quick_ratio_is_null_without_inventory() {
        assert_eq!(quick_ratio(100.0, None, 50.0), None);
        assert_eq!(quick_ratio(100.0, Some(30.0), 50.0), Some(1.4));
    }

    #[test]
    fn growth_yoy_is_null_on_nonpositive_prior() {
        assert_eq!(growth_yoy(100.0, 0.0), None);
        assert_eq!(growth_yoy(100.0, -10.0), None);
        assert_eq!(growth_yoy(110.0, 100.0), Some(10.0));
    }

    #[test]
    fn roic_uses_after_tax_operating_income() {
        let got = roic(100.0, 400.0, 100.0).unwrap();
        assert!((got - (100.0 * 0.79 / 500.0 * 100.0)).abs() < 1e-9);
    }
}
