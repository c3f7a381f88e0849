//! Failover Router (SPEC_FULL §4.3).
//!
//! Grounded in `analysis-orchestrator`'s `tokio::join!` concurrent-fetch pattern and its
//! cache-superset lookup in `get_bars` ("prefer an already-satisfying result over a
//! fresh fetch"), generalized here into sequential ordered fallback across adapters
//! rather than a single always-Polygon call. `fundamentals_snapshot` additionally
//! performs field-level fallback per SPEC_FULL §4.3: after the first `ok`, only the
//! still-missing fields are requested from the remaining adapters.

use key_pool::KeyPool;
use pipeline_core::{
    AdapterResponse, AnalystConsensus, Bar, Capability, DateRange, EarningsEvent,
    FundamentalField, FundamentalSnapshot, Outcome, ProviderAdapter,
};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);

const ALL_FUNDAMENTAL_FIELDS: &[FundamentalField] = &[
    FundamentalField::Revenue,
    FundamentalField::NetIncome,
    FundamentalField::TotalAssets,
    FundamentalField::TotalDebt,
    FundamentalField::TotalEquity,
    FundamentalField::CurrentAssets,
    FundamentalField::CurrentLiabilities,
    FundamentalField::CostOfGoodsSold,
    FundamentalField::OperatingIncome,
    FundamentalField::Ebitda,
    FundamentalField::FreeCashFlow,
    FundamentalField::SharesOutstanding,
    FundamentalField::MarketCap,
    FundamentalField::EnterpriseValue,
    FundamentalField::EpsDiluted,
    FundamentalField::BookValuePerShare,
];

/// Result of routing a single query kind across the configured adapter chain.
#[derive(Debug, Clone)]
pub struct RouteResult<T> {
    pub data: Option<T>,
    pub source_primary: Option<String>,
    pub sources_used: Vec<String>,
    pub fields_missing: Vec<String>,
    pub success_rate: f64,
}

impl<T> RouteResult<T> {
    fn empty() -> Self {
        Self { data: None, source_primary: None, sources_used: Vec::new(), fields_missing: Vec::new(), success_rate: 0.0 }
    }
}

fn missing_fields(snapshot: &FundamentalSnapshot) -> Vec<FundamentalField> {
    ALL_FUNDAMENTAL_FIELDS.iter().copied().filter(|f| snapshot.get(*f).is_none()).collect()
}

fn set_field(snapshot: &mut FundamentalSnapshot, field: FundamentalField, value: f64) {
    use FundamentalField::*;
    match field {
        Revenue => snapshot.revenue = Some(value),
        NetIncome => snapshot.net_income = Some(value),
        TotalAssets => snapshot.total_assets = Some(value),
        TotalDebt => snapshot.total_debt = Some(value),
        TotalEquity => snapshot.total_equity = Some(value),
        CurrentAssets => snapshot.current_assets = Some(value),
        CurrentLiabilities => snapshot.current_liabilities = Some(value),
        CostOfGoodsSold => snapshot.cost_of_goods_sold = Some(value),
        OperatingIncome => snapshot.operating_income = Some(value),
        Ebitda => snapshot.ebitda = Some(value),
        FreeCashFlow => snapshot.free_cash_flow = Some(value),
        SharesOutstanding => snapshot.shares_outstanding = Some(value),
        MarketCap => snapshot.market_cap = Some(value),
        EnterpriseValue => snapshot.enterprise_value = Some(value),
        EpsDiluted => snapshot.eps_diluted = Some(value),
        BookValuePerShare => snapshot.book_value_per_share = Some(value),
    }
}

/// Folds `addition`'s fields into `base`, filling only the fields listed in `wanted`
/// that `base` does not already carry. Provenance for a field is taken from whichever
/// snapshot actually supplied it — `base` keeps priority on fields it already had.
fn merge_missing(mut base: FundamentalSnapshot, addition: FundamentalSnapshot, wanted: &[FundamentalField]) -> FundamentalSnapshot {
    for field in wanted {
        if base.get(*field).is_some() {
            continue;
        }
        if let Some(value) = addition.get(*field) {
            set_field(&mut base, *field, value);
            if let Some(provenance) = addition.provenance.get(field) {
                base.provenance.insert(*field, provenance.clone());
            }
        }
    }
    base
}

/// Ordered list of adapters to try for a given query kind, plus the shared key pool
/// and per-call deadline. Adapters not declaring a capability are skipped silently.
pub struct FailoverRouter {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    key_pool: Arc<KeyPool>,
    call_timeout: Duration,
}

impl FailoverRouter {
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>, key_pool: Arc<KeyPool>) -> Self {
        Self { adapters, key_pool, call_timeout: DEFAULT_CALL_TIMEOUT }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    fn adapters_for(&self, capability: Capability) -> impl Iterator<Item = &Arc<dyn ProviderAdapter>> {
        self.adapters.iter().filter(move |a| a.capabilities().contains(&capability))
    }

    /// Acquires a credential for `provider_id`, runs `call` under the router's deadline,
    /// and reports the outcome back to the key pool. A timeout is reported as
    /// `transient_error` per SPEC_FULL §4.3 ("aborted mid-flight").
    async fn call_with_credential<T, Fut>(
        &self,
        provider_id: &str,
        call: impl FnOnce(pipeline_core::Credential) -> Fut,
    ) -> AdapterResponse<T>
    where
        Fut: std::future::Future<Output = AdapterResponse<T>>,
    {
        let credential = match self.key_pool.acquire(provider_id) {
            Ok(c) => c,
            Err(_) => return AdapterResponse::transient_error("no credential available"),
        };
        let response = match tokio::time::timeout(self.call_timeout, call(credential.clone())).await {
            Ok(response) => response,
            Err(_) => {
                self.key_pool.report(&credential, Outcome::TransientError);
                return AdapterResponse::transient_error("adapter call timed out");
            }
        };
        self.key_pool.report(&credential, response.outcome);
        response
    }

    pub async fn price_quote(&self, ticker: &str) -> RouteResult<f64> {
        for adapter in self.adapters_for(Capability::PriceQuote) {
            let adapter = adapter.clone();
            let response = self
                .call_with_credential(adapter.id(), |cred| async move { adapter.price_quote(ticker, &cred).await })
                .await;
            if response.outcome == Outcome::Ok {
                if let Some(price) = response.payload {
                    return RouteResult {
                        data: Some(price),
                        source_primary: Some(adapter.id().to_string()),
                        sources_used: vec![adapter.id().to_string()],
                        fields_missing: Vec::new(),
                        success_rate: 1.0,
                    };
                }
            }
            tracing::debug!(provider = adapter.id(), outcome = ?response.outcome, "price_quote advancing to next adapter");
        }
        RouteResult::empty()
    }

    pub async fn price_history(&self, ticker: &str, range: DateRange) -> RouteResult<Vec<Bar>> {
        for adapter in self.adapters_for(Capability::PriceHistory) {
            let adapter = adapter.clone();
            let response = self
                .call_with_credential(adapter.id(), |cred| async move { adapter.price_history(ticker, range, &cred).await })
                .await;
            if response.outcome == Outcome::Ok {
                if let Some(bars) = response.payload {
                    return RouteResult {
                        data: Some(bars),
                        source_primary: Some(adapter.id().to_string()),
                        sources_used: vec![adapter.id().to_string()],
                        fields_missing: Vec::new(),
                        success_rate: 1.0,
                    };
                }
            }
            tracing::debug!(provider = adapter.id(), outcome = ?response.outcome, "price_history advancing to next adapter");
        }
        RouteResult::empty()
    }

    /// Field-level fallback per SPEC_FULL §4.3: keeps querying remaining adapters only
    /// for the fields still missing, merging each accepted field's provenance in.
    pub async fn fundamentals_snapshot(&self, ticker: &str) -> RouteResult<FundamentalSnapshot> {
        let mut merged: Option<FundamentalSnapshot> = None;
        let mut sources_used = Vec::new();
        let mut source_primary = None;

        for adapter in self.adapters_for(Capability::FundamentalsSnapshot) {
            let wanted = match &merged {
                Some(snapshot) => missing_fields(snapshot),
                None => ALL_FUNDAMENTAL_FIELDS.to_vec(),
            };
            if wanted.is_empty() {
                break;
            }
            let adapter = adapter.clone();
            let response = self
                .call_with_credential(adapter.id(), |cred| async move { adapter.fundamentals_snapshot(ticker, &cred).await })
                .await;
            if response.outcome != Outcome::Ok {
                tracing::debug!(provider = adapter.id(), outcome = ?response.outcome, "fundamentals_snapshot advancing to next adapter");
                continue;
            }
            let Some(fetched) = response.payload else { continue };
            sources_used.push(adapter.id().to_string());
            if source_primary.is_none() {
                source_primary = Some(adapter.id().to_string());
            }
            merged = Some(match merged {
                None => fetched,
                Some(existing) => merge_missing(existing, fetched, &wanted),
            });
        }

        let fields_missing = merged.as_ref().map(missing_fields).unwrap_or_else(|| ALL_FUNDAMENTAL_FIELDS.to_vec());
        let required = ALL_FUNDAMENTAL_FIELDS.len() as f64;
        let populated = required - fields_missing.len() as f64;

        RouteResult {
            success_rate: if required > 0.0 { populated / required } else { 0.0 },
            fields_missing: fields_missing.iter().map(|f| format!("{:?}", f)).collect(),
            data: merged,
            source_primary,
            sources_used,
        }
    }

    pub async fn earnings_calendar(&self, ticker: &str, window: DateRange) -> RouteResult<Vec<EarningsEvent>> {
        for adapter in self.adapters_for(Capability::EarningsCalendar) {
            let adapter = adapter.clone();
            let response = self
                .call_with_credential(adapter.id(), |cred| async move { adapter.earnings_calendar(ticker, window, &cred).await })
                .await;
            if response.outcome == Outcome::Ok {
                if let Some(events) = response.payload {
                    return RouteResult {
                        data: Some(events),
                        source_primary: Some(adapter.id().to_string()),
                        sources_used: vec![adapter.id().to_string()],
                        fields_missing: Vec::new(),
                        success_rate: 1.0,
                    };
                }
            }
        }
        RouteResult::empty()
    }

    pub async fn analyst_recommendations(&self, ticker: &str) -> RouteResult<AnalystConsensus> {
        for adapter in self.adapters_for(Capability::AnalystRecommendations) {
            let adapter = adapter.clone();
            let response = self
                .call_with_credential(adapter.id(), |cred| async move { adapter.analyst_recommendations(ticker, &cred).await })
                .await;
            if response.outcome == Outcome::Ok {
                if let Some(consensus) = response.payload {
                    return RouteResult {
                        data: Some(consensus),
                        source_primary: Some(adapter.id().to_string()),
                        sources_used: vec![adapter.id().to_string()],
                        fields_missing: Vec::new(),
                        success_rate: 1.0,
                    };
                }
            }
        }
        RouteResult::empty()
    }

    /// Probes every configured adapter (not just the first to succeed) so the
    /// Existence Reaper can count cross-provider agreement. Returns one outcome per
    /// adapter that declares `ExistenceProbe`.
    pub async fn existence_probe_all(&self, ticker: &str) -> Vec<(String, Outcome)> {
        let mut results = Vec::new();
        for adapter in self.adapters_for(Capability::ExistenceProbe) {
            let adapter = adapter.clone();
            let response = self
                .call_with_credential(adapter.id(), |cred| async move { adapter.existence_probe(ticker, &cred).await })
                .await;
            results.push((adapter.id().to_string(), response.outcome));
        }
        results
    }
}
