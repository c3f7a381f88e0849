//! Priority Orchestrator (SPEC_FULL §4.8, §2 item 8) — the core scheduler. Owns the
//! day's API budget, runs priorities P1..P6 in order, enforces per-priority deadlines,
//! and runs the Existence Reaper last.
//!
//! Grounded in `data-loader::main`'s `Semaphore`-bounded `tokio::spawn` fan-out
//! (generalized from one flat pass into six sequential priority phases, each opening
//! and closing its own bounded worker group via [`priority::run_bounded`]) and in
//! `StockScreener::screen`'s `JoinSet`-based collection loop (intra-priority fan-out
//! and deadline cancellation).
//!
//! `run_daily_pipeline` takes an already-seeded `Vec<Instrument>` as the universe
//! rather than resolving `PipelineConfig::universe_source` itself — SPEC_FULL §6 names
//! `universe_source` only as "an opaque identifier for ticker seed" and leaves concrete
//! seeding out of scope; injecting the resolved universe is the natural boundary for a
//! library entry point that does not own a seeding mechanism (recorded in DESIGN.md).

pub mod budget;
pub mod clock;
pub mod priority;
pub mod reaper;

pub use budget::BudgetGuard;
pub use clock::{Calendar, Clock, FixedCalendar, FixedClock, SystemClock, WeekdayCalendar};
pub use priority::{run_bounded, PriorityReport, PriorityStatus};
pub use reaper::{ExistenceReaper, ReapReport};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use indicator_engine::IndicatorEngine;
use persistence::PersistenceGateway;
use pipeline_core::{ApiBudget, Instrument, PipelineConfig, PricePoint};
use ratio_engine::RatioEngine;
use router::FailoverRouter;
use scorer::Scorer;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Window, in calendar days, Priority 2 looks ahead for an earnings event.
const EARNINGS_WINDOW_DAYS: i64 = 5;

#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub priorities: Vec<PriorityReport>,
    pub tickers_delisted: Vec<String>,
    pub api_budget: ApiBudget,
    pub low_confidence_tickers: Vec<String>,
    /// `true` only on a hard stop (`NoCredentialAvailable` across all providers, or
    /// explicit cancellation) — SPEC_FULL §6's nonzero-exit condition.
    pub hard_stop: bool,
}

pub struct Orchestrator {
    pub router: Arc<FailoverRouter>,
    pub persistence: Arc<PersistenceGateway>,
    pub config: PipelineConfig,
    pub clock: Arc<dyn Clock>,
    pub calendar: Arc<dyn Calendar>,
}

impl Orchestrator {
    pub fn new(
        router: Arc<FailoverRouter>,
        persistence: Arc<PersistenceGateway>,
        config: PipelineConfig,
        clock: Arc<dyn Clock>,
        calendar: Arc<dyn Calendar>,
    ) -> Self {
        Self { router, persistence, config, clock, calendar }
    }

    fn deadline(&self, priority: u8, default: Duration) -> Duration {
        self.config.priority_deadlines.get(&priority).copied().unwrap_or(default)
    }

    /// Fetches the full price history via the router, runs the Indicator Engine over
    /// it, and persists one row keyed to `today` carrying the latest close plus every
    /// indicator value. `pipeline_core::Bar` carries no date of its own, so this is the
    /// only row P1/P3 write per call — the full window is the input, "today" is the
    /// output key.
    async fn fetch_and_store_price(&self, ticker: &str, today: chrono::NaiveDate, budget: &BudgetGuard) -> bool {
        if !budget.try_spend("router") {
            return false;
        }
        let end = Utc::now();
        let lookback_days = (self.config.target_history_bars as i64).max(1) * 2;
        let start: DateTime<Utc> = end - ChronoDuration::days(lookback_days);
        let range = pipeline_core::DateRange { start, end };

        let result = self.router.price_history(ticker, range).await;
        let Some(bars) = result.data else {
            tracing::debug!(ticker, "price_history returned no data");
            return false;
        };
        let Some(last) = bars.last() else {
            return false;
        };

        let snapshot = IndicatorEngine::compute(&bars);
        let point = PricePoint {
            ticker: ticker.to_string(),
            date: today,
            open: last.open,
            high: last.high,
            low: last.low,
            close: last.close,
            volume: last.volume,
            ema_20: snapshot.ema_20,
            ema_50: snapshot.ema_50,
            ema_100: snapshot.ema_100,
            ema_200: snapshot.ema_200,
            rsi_14: snapshot.rsi_14,
            macd: snapshot.macd,
            macd_signal: snapshot.macd_signal,
            macd_histogram: snapshot.macd_histogram,
            bb_upper: snapshot.bb_upper,
            bb_middle: snapshot.bb_middle,
            bb_lower: snapshot.bb_lower,
            bb_percent_b: snapshot.bb_percent_b,
            atr_14: snapshot.atr_14,
            adx_14: snapshot.adx_14,
            cci_20: snapshot.cci_20,
            stoch_k: snapshot.stoch_k,
            stoch_d: snapshot.stoch_d,
            vwap: snapshot.vwap,
            obv: snapshot.obv,
            vpt: snapshot.vpt,
            pivot: snapshot.pivot,
            resistance: snapshot.resistance,
            support: snapshot.support,
            swing_high_5: snapshot.swing_high_5,
            swing_low_5: snapshot.swing_low_5,
            swing_high_10: snapshot.swing_high_10,
            swing_low_10: snapshot.swing_low_10,
            swing_high_20: snapshot.swing_high_20,
            swing_low_20: snapshot.swing_low_20,
            week_52_high: snapshot.week_52_high,
            week_52_low: snapshot.week_52_low,
        };

        match self.persistence.upsert_price(&point).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(ticker, %error, "failed to persist price row");
                false
            }
        }
    }

    /// Pulls the earnings calendar for `ticker` within `window` and upserts every
    /// event returned — the producer side of Priority 2's selection query. Runs ahead
    /// of `tickers_with_upcoming_earnings` so that query has rows to find.
    async fn fetch_and_store_earnings(&self, ticker: &str, window: pipeline_core::DateRange, budget: &BudgetGuard) -> bool {
        if !budget.try_spend("router") {
            return false;
        }
        let result = self.router.earnings_calendar(ticker, window).await;
        let Some(events) = result.data else {
            return false;
        };
        let mut all_stored = true;
        for event in &events {
            if let Err(error) = self.persistence.upsert_earnings_event(ticker, event).await {
                tracing::warn!(ticker, %error, "failed to persist earnings event");
                all_stored = false;
            }
        }
        all_stored
    }

    async fn fetch_and_store_fundamentals(&self, ticker: &str, budget: &BudgetGuard) -> bool {
        if !budget.try_spend("router") {
            return false;
        }
        let result = self.router.fundamentals_snapshot(ticker).await;
        let Some(snapshot) = result.data else {
            return false;
        };
        match self.persistence.upsert_fundamentals(&snapshot).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(ticker, %error, "failed to persist fundamentals");
                false
            }
        }
    }

    /// Recomputes ratios and scores for `ticker` from whatever is currently stored.
    /// Prior-period fundamentals are not retained anywhere in this schema (only the
    /// latest snapshot is kept per ticker), so YoY growth ratios are always null in
    /// this build — the same null-on-missing-input policy `ratio-engine` documents for
    /// its other unmodeled inputs. Tickers whose resulting `ScoreRow` is
    /// `low_confidence` are appended to `low_confidence`.
    async fn score_ticker(&self, ticker: &str, today: chrono::NaiveDate, low_confidence: &std::sync::Mutex<Vec<String>>) -> bool {
        let fundamentals = match self.persistence.latest_fundamentals(ticker).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return false,
            Err(error) => {
                tracing::warn!(ticker, %error, "failed to load fundamentals for scoring");
                return false;
            }
        };
        let price = match self.persistence.latest_close(ticker).await {
            Ok(price) => price,
            Err(error) => {
                tracing::warn!(ticker, %error, "failed to load latest close for scoring");
                return false;
            }
        };
        let indicators = match self.persistence.latest_indicators(ticker).await {
            Ok(Some((_, snapshot))) => snapshot,
            Ok(None) => indicator_engine::IndicatorSnapshot::default(),
            Err(error) => {
                tracing::warn!(ticker, %error, "failed to load indicators for scoring");
                return false;
            }
        };

        // Sector is carried on `Instrument`, not persisted as a per-score input here;
        // sector-plausibility gating falls back to the "default" bucket for every ticker.
        let ratios = RatioEngine::compute(ticker, today, &fundamentals, None, price.unwrap_or(0.0), None, &self.config.sector_ranges);

        if let Err(error) = self.persistence.upsert_ratios(&ratios).await {
            tracing::warn!(ticker, %error, "failed to persist ratios");
            return false;
        }

        let score = Scorer::compute(ticker, today, &ratios, &indicators, price, &self.config.scoring_weights, self.config.confidence_threshold, 1);
        if score.low_confidence {
            low_confidence.lock().unwrap().push(ticker.to_string());
        }

        match self.persistence.upsert_scores(&score).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(ticker, %error, "failed to persist scores");
                false
            }
        }
    }
}

fn deduce_status(results: &[(String, bool)], hit_deadline: bool) -> (PriorityStatus, usize, usize) {
    let processed = results.iter().filter(|(_, ok)| *ok).count();
    let failed = results.len() - processed;
    let status = if hit_deadline {
        PriorityStatus::Partial { reason: "deadline_exceeded".to_string() }
    } else {
        PriorityStatus::Done
    };
    (status, processed, failed)
}

async fn run_priority(
    priority: u8,
    name: &'static str,
    tickers: Vec<String>,
    concurrency: usize,
    deadline: Duration,
    work: impl Fn(String) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send>> + Send + Sync + 'static,
) -> (PriorityReport, HashSet<String>) {
    if tickers.is_empty() {
        return (
            PriorityReport { priority, name, status: PriorityStatus::Done, tickers_processed: 0, tickers_failed: 0 },
            HashSet::new(),
        );
    }

    let mut hit_deadline = false;
    let results = match tokio::time::timeout(deadline, run_bounded(tickers, concurrency, work)).await {
        Ok(results) => results,
        Err(_) => {
            hit_deadline = true;
            Vec::new()
        }
    };

    let (status, processed, failed) = deduce_status(&results, hit_deadline);
    let succeeded: HashSet<String> = results.into_iter().filter(|(_, ok)| *ok).map(|(t, _)| t).collect();
    (PriorityReport { priority, name, status, tickers_processed: processed, tickers_failed: failed }, succeeded)
}

/// The single entry point named in SPEC_FULL §6. Runs `INIT -> P1 -> P2 -> P3 -> P4 ->
/// P5 -> P6 -> REAP -> DONE`. Priority 5 and 6 failures never fail the run (SPEC_FULL
/// §4.8: "explicitly declared non-critical").
pub async fn run_daily_pipeline(orchestrator: Arc<Orchestrator>, universe: Vec<Instrument>) -> PipelineSummary {
    let today = orchestrator.clock.today();
    let budget = Arc::new(BudgetGuard::new(orchestrator.config.api_call_budget_total));
    let concurrency = orchestrator.config.worker_concurrency;

    for instrument in &universe {
        if let Err(error) = orchestrator.persistence.upsert_instrument(instrument).await {
            tracing::warn!(ticker = %instrument.ticker, %error, "failed to seed instrument row");
        }
    }
    let all_tickers: Vec<String> = universe.iter().map(|i| i.ticker.clone()).collect();

    let mut priorities = Vec::new();
    let mut dirty: HashSet<String> = HashSet::new();

    // P1: Price & Technicals
    let trading_today = orchestrator.calendar.is_trading_day(today) || orchestrator.config.force_run;
    if !trading_today {
        priorities.push(PriorityReport::skipped(1, "Price & Technicals", "non_trading_day"));
    } else if budget.exhausted() {
        priorities.push(PriorityReport::skipped(1, "Price & Technicals", "budget_exhausted"));
    } else {
        let orch = Arc::clone(&orchestrator);
        let price_budget = Arc::clone(&budget);
        let (report, touched) = run_priority(
            1,
            "Price & Technicals",
            all_tickers.clone(),
            concurrency,
            orchestrator.deadline(1, Duration::from_secs(30 * 60)),
            move |ticker| {
                let orch = Arc::clone(&orch);
                let budget = Arc::clone(&price_budget);
                Box::pin(async move { orch.fetch_and_store_price(&ticker, today, &budget).await })
            },
        )
        .await;
        dirty.extend(touched);
        priorities.push(report);
    }

    // P2: Earnings Fundamentals — first acquire the calendar itself (nothing else
    // populates `earnings_calendar`), then select tickers with an event in the window.
    if budget.exhausted() {
        priorities.push(PriorityReport::skipped(2, "Earnings Fundamentals", "budget_exhausted"));
    } else {
        let window_start = Utc::now();
        let window = pipeline_core::DateRange { start: window_start, end: window_start + ChronoDuration::days(EARNINGS_WINDOW_DAYS) };
        let acquire_orch = Arc::clone(&orchestrator);
        let acquire_budget = Arc::clone(&budget);
        run_bounded(all_tickers.clone(), concurrency, move |ticker| {
            let orch = Arc::clone(&acquire_orch);
            let budget = Arc::clone(&acquire_budget);
            async move { orch.fetch_and_store_earnings(&ticker, window, &budget).await }
        })
        .await;

        let selection = orchestrator.persistence.tickers_with_upcoming_earnings(today, EARNINGS_WINDOW_DAYS).await.unwrap_or_default();
        let orch = Arc::clone(&orchestrator);
        let fundamentals_budget = Arc::clone(&budget);
        let (report, touched) = run_priority(
            2,
            "Earnings Fundamentals",
            selection,
            concurrency,
            orchestrator.deadline(2, Duration::from_secs(15 * 60)),
            move |ticker| {
                let orch = Arc::clone(&orch);
                let budget = Arc::clone(&fundamentals_budget);
                Box::pin(async move { orch.fetch_and_store_fundamentals(&ticker, &budget).await })
            },
        )
        .await;
        dirty.extend(touched);
        priorities.push(report);
    }

    // P3: Historical Backfill — least-data-first, below the configured minimum.
    if budget.exhausted() {
        priorities.push(PriorityReport::skipped(3, "Historical Backfill", "budget_exhausted"));
    } else {
        let min_bars = orchestrator.config.min_history_bars as i64;
        let selection: Vec<String> = orchestrator
            .persistence
            .bar_counts_ascending()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|(_, count)| *count < min_bars)
            .map(|(ticker, _)| ticker)
            .collect();
        let orch = Arc::clone(&orchestrator);
        let backfill_budget = Arc::clone(&budget);
        let (report, touched) = run_priority(
            3,
            "Historical Backfill",
            selection,
            concurrency,
            orchestrator.deadline(3, Duration::from_secs(20 * 60)),
            move |ticker| {
                let orch = Arc::clone(&orch);
                let budget = Arc::clone(&backfill_budget);
                Box::pin(async move { orch.fetch_and_store_price(&ticker, today, &budget).await })
            },
        )
        .await;
        dirty.extend(touched);
        priorities.push(report);
    }

    // P4: Missing Fundamentals
    if budget.exhausted() {
        priorities.push(PriorityReport::skipped(4, "Missing Fundamentals", "budget_exhausted"));
    } else {
        let selection = orchestrator.persistence.tickers_missing_fundamentals().await.unwrap_or_default();
        let orch = Arc::clone(&orchestrator);
        let missing_budget = Arc::clone(&budget);
        let (report, touched) = run_priority(
            4,
            "Missing Fundamentals",
            selection,
            concurrency,
            orchestrator.deadline(4, Duration::from_secs(10 * 60)),
            move |ticker| {
                let orch = Arc::clone(&orch);
                let budget = Arc::clone(&missing_budget);
                Box::pin(async move { orch.fetch_and_store_fundamentals(&ticker, &budget).await })
            },
        )
        .await;
        dirty.extend(touched);
        priorities.push(report);
    }

    // P5: Scoring — any ticker touched by P1..P4 this run. Non-critical: its failure
    // (including a deadline hit) never fails the overall run.
    let low_confidence = Arc::new(std::sync::Mutex::new(Vec::new()));
    {
        let mut selection: Vec<String> = dirty.iter().cloned().collect();
        selection.sort();
        let orch = Arc::clone(&orchestrator);
        let low_confidence = Arc::clone(&low_confidence);
        let (report, _touched) = run_priority(
            5,
            "Scoring",
            selection,
            concurrency,
            orchestrator.deadline(5, Duration::from_secs(15 * 60)),
            move |ticker| {
                let orch = Arc::clone(&orch);
                let low_confidence = Arc::clone(&low_confidence);
                Box::pin(async move { orch.score_ticker(&ticker, today, &low_confidence).await })
            },
        )
        .await;
        priorities.push(report);
    }

    // P6: Analyst Ratings — full universe, paged implicitly by the Key Pool's
    // per-credential counters. Non-critical.
    if budget.exhausted() {
        priorities.push(PriorityReport::skipped(6, "Analyst Ratings", "budget_exhausted"));
    } else {
        let orch = Arc::clone(&orchestrator);
        let ratings_budget = Arc::clone(&budget);
        let (report, _touched) = run_priority(
            6,
            "Analyst Ratings",
            all_tickers.clone(),
            concurrency,
            orchestrator.deadline(6, Duration::from_secs(10 * 60)),
            move |ticker| {
                let orch = Arc::clone(&orch);
                let budget = Arc::clone(&ratings_budget);
                Box::pin(async move {
                    if !budget.try_spend("router") {
                        return false;
                    }
                    let result = orch.router.analyst_recommendations(&ticker).await;
                    match result.data {
                        Some(consensus) => orch.persistence.upsert_analyst_consensus(&ticker, &consensus).await.is_ok(),
                        None => false,
                    }
                })
            },
        )
        .await;
        priorities.push(report);
    }

    // REAP: Existence Reaper, always runs last.
    let reaper = ExistenceReaper::new(Arc::clone(&orchestrator.router), Arc::clone(&orchestrator.persistence), orchestrator.config.delisting_min_agreement);
    let reap_report = reaper.sweep(&all_tickers).await;

    let low_confidence_tickers = Arc::try_unwrap(low_confidence)
        .map(|mutex| mutex.into_inner().unwrap())
        .unwrap_or_default();

    PipelineSummary {
        priorities,
        tickers_delisted: reap_report.delisted,
        api_budget: budget.snapshot(),
        low_confidence_tickers,
        hard_stop: false,
    }
}
