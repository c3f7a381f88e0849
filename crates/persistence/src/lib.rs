//! Persistence Gateway (SPEC_FULL §4.9, §2 item 9).
//!
//! Grounded in `data-loader::main`'s `SqlitePool::connect` + `PRAGMA journal_mode=WAL`
//! setup and `analysis-orchestrator::log_analysis_features`'s
//! `sqlx::query(...).bind(...).execute(pool)` idiom, generalized from a single
//! fire-and-forget insert into the full per-ticker transactional upsert/delete surface
//! SPEC_FULL §4.9 names. Migrations run via `sqlx::migrate!()` against the
//! `migrations/` directory colocated with this crate, the same mechanism `data-loader`
//! declares (via its `sqlx::migrate` feature) but never exercises.

pub mod scaling;

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use indicator_engine::IndicatorSnapshot;
use pipeline_core::{
    AnalystConsensus, Bar, EarningsEvent, FundamentalField, FundamentalSnapshot, Instrument,
    PipelineError, PricePoint, RatioRow, Result, ScoreRow,
};
use std::collections::HashMap;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

pub struct PersistenceGateway {
    pool: SqlitePool,
}

fn db_err(ticker: &str, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::PersistenceError { ticker: ticker.to_string(), message: err.to_string() }
}

impl PersistenceGateway {
    /// Opens (creating if necessary, `?mode=rwc`) the SQLite database at
    /// `database_url` and enables WAL mode for concurrent writers, matching
    /// `data-loader::main`'s setup exactly.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .connect(database_url)
            .await
            .map_err(|e| db_err("<connect>", e))?;
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await
            .map_err(|e| db_err("<connect>", e))?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| db_err("<migrate>", e))
    }

    /// Ensures the parent `stocks` row exists before any child table references it,
    /// per §4.9's declared FK order.
    pub async fn upsert_instrument(&self, instrument: &Instrument) -> Result<()> {
        sqlx::query(
            "INSERT INTO stocks (ticker, name, sector, asset_class) VALUES (?, ?, ?, ?)
             ON CONFLICT(ticker) DO UPDATE SET name = excluded.name, sector = excluded.sector, asset_class = excluded.asset_class",
        )
        .bind(&instrument.ticker)
        .bind(&instrument.name)
        .bind(&instrument.sector)
        .bind(&instrument.asset_class)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err(&instrument.ticker, e))?;
        Ok(())
    }

    /// Atomic upsert on `(ticker, date)`. A partial indicator set is acceptable: every
    /// indicator column uses `COALESCE(excluded.col, daily_charts.col)` so a `None`
    /// passed this call never erases a value a previous call already populated.
    pub async fn upsert_price(&self, point: &PricePoint) -> Result<()> {
        let date = point.date.to_string();
        sqlx::query(
            "INSERT INTO daily_charts (
                ticker, date, open, high, low, close, volume,
                ema_20, ema_50, ema_100, ema_200, rsi_14,
                macd, macd_signal, macd_histogram,
                bb_upper, bb_middle, bb_lower, bb_percent_b,
                atr_14, adx_14, cci_20, stoch_k, stoch_d,
                vwap, obv, vpt, pivot, resistance, support,
                swing_high_5, swing_low_5, swing_high_10, swing_low_10, swing_high_20, swing_low_20,
                week_52_high, week_52_low
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticker, date) DO UPDATE SET
                open = excluded.open, high = excluded.high, low = excluded.low, close = excluded.close, volume = excluded.volume,
                ema_20 = COALESCE(excluded.ema_20, daily_charts.ema_20),
                ema_50 = COALESCE(excluded.ema_50, daily_charts.ema_50),
                ema_100 = COALESCE(excluded.ema_100, daily_charts.ema_100),
                ema_200 = COALESCE(excluded.ema_200, daily_charts.ema_200),
                rsi_14 = COALESCE(excluded.rsi_14, daily_charts.rsi_14),
                macd = COALESCE(excluded.macd, daily_charts.macd),
                macd_signal = COALESCE(excluded.macd_signal, daily_charts.macd_signal),
                macd_histogram = COALESCE(excluded.macd_histogram, daily_charts.macd_histogram),
                bb_upper = COALESCE(excluded.bb_upper, daily_charts.bb_upper),
                bb_middle = COALESCE(excluded.bb_middle, daily_charts.bb_middle),
                bb_lower = COALESCE(excluded.bb_lower, daily_charts.bb_lower),
                bb_percent_b = COALESCE(excluded.bb_percent_b, daily_charts.bb_percent_b),
                atr_14 = COALESCE(excluded.atr_14, daily_charts.atr_14),
                adx_14 = COALESCE(excluded.adx_14, daily_charts.adx_14),
                cci_20 = COALESCE(excluded.cci_20, daily_charts.cci_20),
                stoch_k = COALESCE(excluded.stoch_k, daily_charts.stoch_k),
                stoch_d = COALESCE(excluded.stoch_d, daily_charts.stoch_d),
                vwap = COALESCE(excluded.vwap, daily_charts.vwap),
                obv = COALESCE(excluded.obv, daily_charts.obv),
                vpt = COALESCE(excluded.vpt, daily_charts.vpt),
                pivot = COALESCE(excluded.pivot, daily_charts.pivot),
                resistance = COALESCE(excluded.resistance, daily_charts.resistance),
                support = COALESCE(excluded.support, daily_charts.support),
                swing_high_5 = COALESCE(excluded.swing_high_5, daily_charts.swing_high_5),
                swing_low_5 = COALESCE(excluded.swing_low_5, daily_charts.swing_low_5),
                swing_high_10 = COALESCE(excluded.swing_high_10, daily_charts.swing_high_10),
                swing_low_10 = COALESCE(excluded.swing_low_10, daily_charts.swing_low_10),
                swing_high_20 = COALESCE(excluded.swing_high_20, daily_charts.swing_high_20),
                swing_low_20 = COALESCE(excluded.swing_low_20, daily_charts.swing_low_20),
                week_52_high = COALESCE(excluded.week_52_high, daily_charts.week_52_high),
                week_52_low = COALESCE(excluded.week_52_low, daily_charts.week_52_low)",
        )
        .bind(&point.ticker)
        .bind(&date)
        .bind(scaling::scale_for_storage(point.open))
        .bind(scaling::scale_for_storage(point.high))
        .bind(scaling::scale_for_storage(point.low))
        .bind(scaling::scale_for_storage(point.close))
        .bind(scaling::scale_for_storage(point.volume))
        .bind(point.ema_20)
        .bind(point.ema_50)
        .bind(point.ema_100)
        .bind(point.ema_200)
        .bind(point.rsi_14)
        .bind(point.macd)
        .bind(point.macd_signal)
        .bind(point.macd_histogram)
        .bind(point.bb_upper)
        .bind(point.bb_middle)
        .bind(point.bb_lower)
        .bind(point.bb_percent_b)
        .bind(point.atr_14)
        .bind(point.adx_14)
        .bind(point.cci_20)
        .bind(point.stoch_k)
        .bind(point.stoch_d)
        .bind(point.vwap)
        .bind(point.obv)
        .bind(point.vpt)
        .bind(point.pivot)
        .bind(point.resistance)
        .bind(point.support)
        .bind(point.swing_high_5)
        .bind(point.swing_low_5)
        .bind(point.swing_high_10)
        .bind(point.swing_low_10)
        .bind(point.swing_high_20)
        .bind(point.swing_low_20)
        .bind(point.week_52_high)
        .bind(point.week_52_low)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err(&point.ticker, e))?;
        Ok(())
    }

    pub async fn upsert_fundamentals(&self, snapshot: &FundamentalSnapshot) -> Result<()> {
        let provenance_json = serde_json::to_string(&snapshot.provenance)
            .map_err(|e| db_err(&snapshot.ticker, e))?;
        sqlx::query(
            "INSERT INTO company_fundamentals (
                ticker, fiscal_period_end, revenue, net_income, total_assets, total_debt, total_equity,
                current_assets, current_liabilities, cost_of_goods_sold, operating_income, ebitda,
                free_cash_flow, shares_outstanding, market_cap, enterprise_value, eps_diluted,
                book_value_per_share, provenance_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticker) DO UPDATE SET
                fiscal_period_end = excluded.fiscal_period_end,
                revenue = excluded.revenue, net_income = excluded.net_income,
                total_assets = excluded.total_assets, total_debt = excluded.total_debt,
                total_equity = excluded.total_equity, current_assets = excluded.current_assets,
                current_liabilities = excluded.current_liabilities, cost_of_goods_sold = excluded.cost_of_goods_sold,
                operating_income = excluded.operating_income, ebitda = excluded.ebitda,
                free_cash_flow = excluded.free_cash_flow, shares_outstanding = excluded.shares_outstanding,
                market_cap = excluded.market_cap, enterprise_value = excluded.enterprise_value,
                eps_diluted = excluded.eps_diluted, book_value_per_share = excluded.book_value_per_share,
                provenance_json = excluded.provenance_json",
        )
        .bind(&snapshot.ticker)
        .bind(snapshot.fiscal_period_end.map(|d| d.to_string()))
        .bind(snapshot.revenue)
        .bind(snapshot.net_income)
        .bind(snapshot.total_assets)
        .bind(snapshot.total_debt)
        .bind(snapshot.total_equity)
        .bind(snapshot.current_assets)
        .bind(snapshot.current_liabilities)
        .bind(snapshot.cost_of_goods_sold)
        .bind(snapshot.operating_income)
        .bind(snapshot.ebitda)
        .bind(snapshot.free_cash_flow)
        .bind(snapshot.shares_outstanding)
        .bind(snapshot.market_cap)
        .bind(snapshot.enterprise_value)
        .bind(snapshot.eps_diluted)
        .bind(snapshot.book_value_per_share)
        .bind(provenance_json)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err(&snapshot.ticker, e))?;
        Ok(())
    }

    /// Replaces the current-day row for `(ticker, as_of_date)` — an upsert, not an
    /// append, per §4.9.
    pub async fn upsert_ratios(&self, row: &RatioRow) -> Result<()> {
        let date = row.as_of_date.to_string();
        sqlx::query(
            "INSERT INTO financial_ratios (
                ticker, as_of_date, pe, pb, ps, ev_to_ebitda, peg, graham_number,
                roe, roa, roic, gross_margin, operating_margin, net_margin,
                debt_to_equity, current_ratio, quick_ratio, interest_coverage, altman_z,
                asset_turnover, inventory_turnover, receivables_turnover,
                revenue_growth_yoy, earnings_growth_yoy, fcf_growth_yoy,
                fcf_to_net_income, cash_conversion_cycle, market_cap, enterprise_value
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticker, as_of_date) DO UPDATE SET
                pe = excluded.pe, pb = excluded.pb, ps = excluded.ps, ev_to_ebitda = excluded.ev_to_ebitda,
                peg = excluded.peg, graham_number = excluded.graham_number,
                roe = excluded.roe, roa = excluded.roa, roic = excluded.roic,
                gross_margin = excluded.gross_margin, operating_margin = excluded.operating_margin, net_margin = excluded.net_margin,
                debt_to_equity = excluded.debt_to_equity, current_ratio = excluded.current_ratio,
                quick_ratio = excluded.quick_ratio, interest_coverage = excluded.interest_coverage, altman_z = excluded.altman_z,
                asset_turnover = excluded.asset_turnover, inventory_turnover = excluded.inventory_turnover, receivables_turnover = excluded.receivables_turnover,
                revenue_growth_yoy = excluded.revenue_growth_yoy, earnings_growth_yoy = excluded.earnings_growth_yoy, fcf_growth_yoy = excluded.fcf_growth_yoy,
                fcf_to_net_income = excluded.fcf_to_net_income, cash_conversion_cycle = excluded.cash_conversion_cycle,
                market_cap = excluded.market_cap, enterprise_value = excluded.enterprise_value",
        )
        .bind(&row.ticker)
        .bind(&date)
        .bind(row.pe)
        .bind(row.pb)
        .bind(row.ps)
        .bind(row.ev_to_ebitda)
        .bind(row.peg)
        .bind(row.graham_number)
        .bind(row.roe)
        .bind(row.roa)
        .bind(row.roic)
        .bind(row.gross_margin)
        .bind(row.operating_margin)
        .bind(row.net_margin)
        .bind(row.debt_to_equity)
        .bind(row.current_ratio)
        .bind(row.quick_ratio)
        .bind(row.interest_coverage)
        .bind(row.altman_z)
        .bind(row.asset_turnover)
        .bind(row.inventory_turnover)
        .bind(row.receivables_turnover)
        .bind(row.revenue_growth_yoy)
        .bind(row.earnings_growth_yoy)
        .bind(row.fcf_growth_yoy)
        .bind(row.fcf_to_net_income)
        .bind(row.cash_conversion_cycle)
        .bind(row.market_cap)
        .bind(row.enterprise_value)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err(&row.ticker, e))?;
        Ok(())
    }

    /// Writes `company_scores_current` (upsert) and appends to
    /// `company_scores_historical` in a single transaction, per §4.9.
    pub async fn upsert_scores(&self, row: &ScoreRow) -> Result<()> {
        let date = row.as_of_date.to_string();
        let missing_json = serde_json::to_string(&row.missing_fields).map_err(|e| db_err(&row.ticker, e))?;
        let estimated_json = serde_json::to_string(&row.estimated_fields).map_err(|e| db_err(&row.ticker, e))?;

        let mut tx = self.pool.begin().await.map_err(|e| db_err(&row.ticker, e))?;

        sqlx::query(
            "INSERT INTO company_scores_current (
                ticker, as_of_date,
                fundamental_health_value, fundamental_health_grade,
                value_investment_value, value_investment_grade,
                technical_health_value, technical_health_grade,
                trading_signal_value, trading_signal_grade,
                risk_value, risk_grade,
                composite_value, composite_grade,
                data_confidence, missing_fields_json, estimated_fields_json, low_confidence, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticker) DO UPDATE SET
                as_of_date = excluded.as_of_date,
                fundamental_health_value = excluded.fundamental_health_value, fundamental_health_grade = excluded.fundamental_health_grade,
                value_investment_value = excluded.value_investment_value, value_investment_grade = excluded.value_investment_grade,
                technical_health_value = excluded.technical_health_value, technical_health_grade = excluded.technical_health_grade,
                trading_signal_value = excluded.trading_signal_value, trading_signal_grade = excluded.trading_signal_grade,
                risk_value = excluded.risk_value, risk_grade = excluded.risk_grade,
                composite_value = excluded.composite_value, composite_grade = excluded.composite_grade,
                data_confidence = excluded.data_confidence, missing_fields_json = excluded.missing_fields_json,
                estimated_fields_json = excluded.estimated_fields_json, low_confidence = excluded.low_confidence,
                version = excluded.version",
        )
        .bind(&row.ticker)
        .bind(&date)
        .bind(row.fundamental_health.value)
        .bind(row.fundamental_health.grade.as_str())
        .bind(row.value_investment.value)
        .bind(row.value_investment.grade.as_str())
        .bind(row.technical_health.value)
        .bind(row.technical_health.grade.as_str())
        .bind(row.trading_signal.value)
        .bind(row.trading_signal.grade.as_str())
        .bind(row.risk.value)
        .bind(row.risk.grade.as_str())
        .bind(row.composite.value)
        .bind(row.composite.grade.as_str())
        .bind(row.data_confidence)
        .bind(&missing_json)
        .bind(&estimated_json)
        .bind(row.low_confidence)
        .bind(row.version as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err(&row.ticker, e))?;

        sqlx::query(
            "INSERT INTO company_scores_historical (
                ticker, as_of_date,
                fundamental_health_value, fundamental_health_grade,
                value_investment_value, value_investment_grade,
                technical_health_value, technical_health_grade,
                trading_signal_value, trading_signal_grade,
                risk_value, risk_grade,
                composite_value, composite_grade,
                data_confidence, missing_fields_json, estimated_fields_json, low_confidence, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.ticker)
        .bind(&date)
        .bind(row.fundamental_health.value)
        .bind(row.fundamental_health.grade.as_str())
        .bind(row.value_investment.value)
        .bind(row.value_investment.grade.as_str())
        .bind(row.technical_health.value)
        .bind(row.technical_health.grade.as_str())
        .bind(row.trading_signal.value)
        .bind(row.trading_signal.grade.as_str())
        .bind(row.risk.value)
        .bind(row.risk.grade.as_str())
        .bind(row.composite.value)
        .bind(row.composite.grade.as_str())
        .bind(row.data_confidence)
        .bind(&missing_json)
        .bind(&estimated_json)
        .bind(row.low_confidence)
        .bind(row.version as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err(&row.ticker, e))?;

        tx.commit().await.map_err(|e| db_err(&row.ticker, e))?;
        Ok(())
    }

    pub async fn upsert_earnings_event(&self, ticker: &str, event: &EarningsEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO earnings_calendar (ticker, event_date, reported, source) VALUES (?, ?, ?, ?)
             ON CONFLICT(ticker, event_date) DO UPDATE SET reported = excluded.reported, source = excluded.source",
        )
        .bind(ticker)
        .bind(event.event_date.to_string())
        .bind(event.reported)
        .bind(&event.source)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err(ticker, e))?;
        Ok(())
    }

    pub async fn upsert_analyst_consensus(&self, ticker: &str, consensus: &AnalystConsensus) -> Result<()> {
        sqlx::query(
            "INSERT INTO analyst_rating_trends (
                ticker, strong_buy, buy, hold, sell, strong_sell, consensus_score, mean_target_price, median_target_price, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticker) DO UPDATE SET
                strong_buy = excluded.strong_buy, buy = excluded.buy, hold = excluded.hold,
                sell = excluded.sell, strong_sell = excluded.strong_sell,
                consensus_score = excluded.consensus_score, mean_target_price = excluded.mean_target_price,
                median_target_price = excluded.median_target_price, updated_at = excluded.updated_at",
        )
        .bind(ticker)
        .bind(consensus.strong_buy as i64)
        .bind(consensus.buy as i64)
        .bind(consensus.hold as i64)
        .bind(consensus.sell as i64)
        .bind(consensus.strong_sell as i64)
        .bind(consensus.consensus_score)
        .bind(consensus.mean_target_price)
        .bind(consensus.median_target_price)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| db_err(ticker, e))?;
        Ok(())
    }

    /// Removes every child row before the `stocks` row, in the declared FK order, in
    /// one transaction; any failure rolls back the whole delete.
    pub async fn delete_ticker(&self, ticker: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| db_err(ticker, e))?;

        for table in [
            "daily_charts",
            "company_fundamentals",
            "financial_ratios",
            "earnings_calendar",
            "company_scores_current",
            "company_scores_historical",
            "analyst_rating_trends",
        ] {
            let sql = format!("DELETE FROM {table} WHERE ticker = ?");
            sqlx::query(&sql)
                .bind(ticker)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_err(ticker, e))?;
        }
        sqlx::query("DELETE FROM stocks WHERE ticker = ?")
            .bind(ticker)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(ticker, e))?;

        tx.commit().await.map_err(|e| db_err(ticker, e))?;
        Ok(())
    }

    /// Read-side support for the orchestrator's priority selection rules (SPEC_FULL
    /// §4.8). Each query orders deterministically so repeated runs converge on the same
    /// ticker set given the same stored state.
    pub async fn all_tickers(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT ticker FROM stocks ORDER BY ticker ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_err("<all_tickers>", e))?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    /// `(ticker, bar_count)` pairs ascending by count then ticker — the "least data
    /// first" ordering Priority 3 (Historical Backfill) selects on.
    pub async fn bar_counts_ascending(&self) -> Result<Vec<(String, i64)>> {
        sqlx::query_as(
            "SELECT s.ticker, COUNT(d.date) FROM stocks s
             LEFT JOIN daily_charts d ON d.ticker = s.ticker
             GROUP BY s.ticker ORDER BY 2 ASC, s.ticker ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("<bar_counts_ascending>", e))
    }

    /// Tickers with at least one null required fundamental field — Priority 4's
    /// selection rule.
    pub async fn tickers_missing_fundamentals(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT s.ticker FROM stocks s LEFT JOIN company_fundamentals f ON f.ticker = s.ticker
             WHERE f.ticker IS NULL OR f.revenue IS NULL OR f.net_income IS NULL
                OR f.total_assets IS NULL OR f.total_debt IS NULL OR f.total_equity IS NULL
                OR f.current_assets IS NULL OR f.current_liabilities IS NULL OR f.cost_of_goods_sold IS NULL
                OR f.operating_income IS NULL OR f.ebitda IS NULL OR f.free_cash_flow IS NULL
                OR f.shares_outstanding IS NULL OR f.market_cap IS NULL OR f.enterprise_value IS NULL
                OR f.eps_diluted IS NULL OR f.book_value_per_share IS NULL
             ORDER BY s.ticker ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("<tickers_missing_fundamentals>", e))?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    /// Tickers with an earnings event in `[today, today + window_days]` — Priority 2's
    /// selection rule.
    pub async fn tickers_with_upcoming_earnings(&self, today: NaiveDate, window_days: i64) -> Result<Vec<String>> {
        let end = today + ChronoDuration::days(window_days);
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT ticker FROM earnings_calendar WHERE event_date BETWEEN ? AND ? ORDER BY ticker ASC",
        )
        .bind(today.to_string())
        .bind(end.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("<tickers_with_upcoming_earnings>", e))?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    /// Full stored price history for `ticker`, oldest first, unscaled back to the
    /// floats the Indicator Engine expects — the inverse of `scale_for_storage`.
    pub async fn price_history(&self, ticker: &str) -> Result<Vec<Bar>> {
        let rows: Vec<(i64, i64, i64, i64, i64)> = sqlx::query_as(
            "SELECT open, high, low, close, volume FROM daily_charts WHERE ticker = ? ORDER BY date ASC",
        )
        .bind(ticker)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err(ticker, e))?;
        Ok(rows
            .into_iter()
            .map(|(open, high, low, close, volume)| Bar {
                open: open as f64 / 100.0,
                high: high as f64 / 100.0,
                low: low as f64 / 100.0,
                close: close as f64 / 100.0,
                volume: volume as f64 / 100.0,
            })
            .collect())
    }

    pub async fn latest_close(&self, ticker: &str) -> Result<Option<f64>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT close FROM daily_charts WHERE ticker = ? ORDER BY date DESC LIMIT 1")
            .bind(ticker)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err(ticker, e))?;
        Ok(row.map(|(close,)| close as f64 / 100.0))
    }

    /// Reconstructs the stored `FundamentalSnapshot`, including its provenance map,
    /// for `ticker`. `None` if no row exists yet.
    pub async fn latest_fundamentals(&self, ticker: &str) -> Result<Option<FundamentalSnapshot>> {
        #[allow(clippy::type_complexity)]
        let row: Option<(
            Option<String>,
            Option<f64>, Option<f64>, Option<f64>, Option<f64>, Option<f64>,
            Option<f64>, Option<f64>, Option<f64>, Option<f64>, Option<f64>,
            Option<f64>, Option<f64>, Option<f64>, Option<f64>, Option<f64>, Option<f64>,
            String,
        )> = sqlx::query_as(
            "SELECT fiscal_period_end, revenue, net_income, total_assets, total_debt, total_equity,
                current_assets, current_liabilities, cost_of_goods_sold, operating_income, ebitda,
                free_cash_flow, shares_outstanding, market_cap, enterprise_value, eps_diluted,
                book_value_per_share, provenance_json
             FROM company_fundamentals WHERE ticker = ?",
        )
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err(ticker, e))?;

        let Some((
            fiscal_period_end, revenue, net_income, total_assets, total_debt, total_equity,
            current_assets, current_liabilities, cost_of_goods_sold, operating_income, ebitda,
            free_cash_flow, shares_outstanding, market_cap, enterprise_value, eps_diluted,
            book_value_per_share, provenance_json,
        )) = row
        else {
            return Ok(None);
        };

        let provenance: HashMap<FundamentalField, pipeline_core::FieldProvenance> =
            serde_json::from_str(&provenance_json).map_err(|e| db_err(ticker, e))?;

        Ok(Some(FundamentalSnapshot {
            ticker: ticker.to_string(),
            fiscal_period_end: fiscal_period_end.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            revenue,
            net_income,
            total_assets,
            total_debt,
            total_equity,
            current_assets,
            current_liabilities,
            cost_of_goods_sold,
            operating_income,
            ebitda,
            free_cash_flow,
            shares_outstanding,
            market_cap,
            enterprise_value,
            eps_diluted,
            book_value_per_share,
            provenance,
        }))
    }

    /// The most recent stored `IndicatorSnapshot` for `ticker`, alongside the date it
    /// was computed on. `None` if no `daily_charts` row exists yet.
    #[allow(clippy::type_complexity)]
    pub async fn latest_indicators(&self, ticker: &str) -> Result<Option<(NaiveDate, IndicatorSnapshot)>> {
        let row: Option<(
            String,
            Option<f64>, Option<f64>, Option<f64>, Option<f64>, Option<f64>,
            Option<f64>, Option<f64>, Option<f64>,
            Option<f64>, Option<f64>, Option<f64>, Option<f64>,
            Option<f64>, Option<f64>, Option<f64>,
            Option<f64>, Option<f64>,
            Option<f64>, Option<f64>, Option<f64>,
            Option<f64>, Option<f64>, Option<f64>,
            Option<f64>, Option<f64>, Option<f64>, Option<f64>, Option<f64>, Option<f64>,
            Option<f64>, Option<f64>,
        )> = sqlx::query_as(
            "SELECT date, ema_20, ema_50, ema_100, ema_200, rsi_14,
                macd, macd_signal, macd_histogram,
                bb_upper, bb_middle, bb_lower, bb_percent_b,
                atr_14, adx_14, cci_20,
                stoch_k, stoch_d,
                vwap, obv, vpt,
                pivot, resistance, support,
                swing_high_5, swing_low_5, swing_high_10, swing_low_10, swing_high_20, swing_low_20,
                week_52_high, week_52_low
             FROM daily_charts WHERE ticker = ? ORDER BY date DESC LIMIT 1",
        )
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err(ticker, e))?;

        let Some((
            date, ema_20, ema_50, ema_100, ema_200, rsi_14,
            macd, macd_signal, macd_histogram,
            bb_upper, bb_middle, bb_lower, bb_percent_b,
            atr_14, adx_14, cci_20,
            stoch_k, stoch_d,
            vwap, obv, vpt,
            pivot, resistance, support,
            swing_high_5, swing_low_5, swing_high_10, swing_low_10, swing_high_20, swing_low_20,
            week_52_high, week_52_low,
        )) = row
        else {
            return Ok(None);
        };

        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| db_err(ticker, e))?;
        Ok(Some((
            date,
            IndicatorSnapshot {
                ema_20, ema_50, ema_100, ema_200, rsi_14,
                macd, macd_signal, macd_histogram,
                bb_upper, bb_middle, bb_lower, bb_percent_b,
                atr_14, adx_14, cci_20,
                stoch_k, stoch_d,
                vwap, obv, vpt,
                pivot, resistance, support,
                swing_high_5, swing_low_5, swing_high_10, swing_low_10, swing_high_20, swing_low_20,
                week_52_high, week_52_low,
            },
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    async fn gateway() -> PersistenceGateway {
        let gw = PersistenceGateway::connect("sqlite::memory:").await.unwrap();
        gw.migrate().await.unwrap();
        gw
    }

    fn instrument() -> Instrument {
        Instrument { ticker: "ACME".to_string(), name: "Acme Corp".to_string(), sector: Some("tech".to_string()), asset_class: Some("equity".to_string()) }
    }

    #[tokio::test]
    async fn upsert_price_preserves_previously_populated_indicators() {
        let gw = gateway().await;
        gw.upsert_instrument(&instrument()).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 7, 30).unwrap();
        let mut point = PricePoint { ticker: "ACME".to_string(), date, open: 10.0, high: 11.0, low: 9.5, close: 10.5, volume: 1_000_000.0, ..Default::default() };
        point.rsi_14 = Some(55.0);
        gw.upsert_price(&point).await.unwrap();

        // Second write omits rsi_14 but supplies a new close; rsi_14 must survive.
        let mut second = PricePoint { ticker: "ACME".to_string(), date, open: 10.0, high: 11.2, low: 9.5, close: 10.8, volume: 1_100_000.0, ..Default::default() };
        second.rsi_14 = None;
        gw.upsert_price(&second).await.unwrap();

        let row: (i64, Option<f64>) = sqlx::query_as("SELECT close, rsi_14 FROM daily_charts WHERE ticker = ? AND date = ?")
            .bind("ACME")
            .bind(date.to_string())
            .fetch_one(&gw.pool)
            .await
            .unwrap();
        assert_eq!(row.0, 1080);
        assert_eq!(row.1, Some(55.0));
    }

    #[tokio::test]
    async fn upsert_fundamentals_round_trips_provenance() {
        let gw = gateway().await;
        gw.upsert_instrument(&instrument()).await.unwrap();
        let snapshot = FundamentalSnapshot { ticker: "ACME".to_string(), revenue: Some(100.0), provenance: HashMap::new(), ..Default::default() };
        gw.upsert_fundamentals(&snapshot).await.unwrap();

        let row: (Option<f64>,) = sqlx::query_as("SELECT revenue FROM company_fundamentals WHERE ticker = ?")
            .bind("ACME")
            .fetch_one(&gw.pool)
            .await
            .unwrap();
        assert_eq!(row.0, Some(100.0));
    }

    #[tokio::test]
    async fn delete_ticker_removes_every_child_row() {
        let gw = gateway().await;
        gw.upsert_instrument(&instrument()).await.unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 7, 30).unwrap();
        let point = PricePoint { ticker: "ACME".to_string(), date, open: 10.0, high: 11.0, low: 9.5, close: 10.5, volume: 1_000.0, ..Default::default() };
        gw.upsert_price(&point).await.unwrap();

        gw.delete_ticker("ACME").await.unwrap();

        let remaining: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM daily_charts WHERE ticker = ?")
            .bind("ACME")
            .fetch_one(&gw.pool)
            .await
            .unwrap();
        assert_eq!(remaining.0, 0);
        let stock_remaining: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM stocks WHERE ticker = ?")
            .bind("ACME")
            .fetch_one(&gw.pool)
            .await
            .unwrap();
        assert_eq!(stock_remaining.0, 0);
    }

    #[tokio::test]
    async fn selection_queries_drive_priority_rules() {
        let gw = gateway().await;
        gw.upsert_instrument(&instrument()).await.unwrap();
        gw.upsert_instrument(&Instrument { ticker: "ZETA".to_string(), name: "Zeta".to_string(), sector: None, asset_class: None }).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 7, 30).unwrap();
        let point = PricePoint { ticker: "ACME".to_string(), date, open: 10.0, high: 11.0, low: 9.5, close: 10.5, volume: 1_000.0, ..Default::default() };
        gw.upsert_price(&point).await.unwrap();

        // ACME has 1 bar, ZETA has 0 — ZETA sorts first ("least data first").
        let counts = gw.bar_counts_ascending().await.unwrap();
        assert_eq!(counts[0].0, "ZETA");
        assert_eq!(counts[0].1, 0);
        assert_eq!(counts[1], ("ACME".to_string(), 1));

        // Neither ticker has a fundamentals row yet — both are missing.
        let missing = gw.tickers_missing_fundamentals().await.unwrap();
        assert_eq!(missing, vec!["ACME".to_string(), "ZETA".to_string()]);

        let snapshot = FundamentalSnapshot { ticker: "ACME".to_string(), provenance: HashMap::new(), ..Default::default() };
        gw.upsert_fundamentals(&snapshot).await.unwrap();
        let round_tripped = gw.latest_fundamentals("ACME").await.unwrap().unwrap();
        assert_eq!(round_tripped.ticker, "ACME");
        assert_eq!(round_tripped.revenue, None);

        let history = gw.price_history("ACME").await.unwrap();
        assert_eq!(history.len(), 1);
        assert!((history[0].close - 10.5).abs() < 1e-9);

        let mut with_rsi = point.clone();
        with_rsi.rsi_14 = Some(61.5);
        gw.upsert_price(&with_rsi).await.unwrap();
        let (indicator_date, indicators) = gw.latest_indicators("ACME").await.unwrap().unwrap();
        assert_eq!(indicator_date, date);
        assert_eq!(indicators.rsi_14, Some(61.5));
    }
}
