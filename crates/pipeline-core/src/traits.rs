use crate::credential::Credential;
use crate::types::{AnalystConsensus, Bar, Capability, EarningsEvent, FundamentalSnapshot, Outcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Every adapter call returns one of these — never a bare payload, never a raw error.
/// `outcome` drives router/reaper/key-pool decisions independent of `payload`/`error`.
#[derive(Debug, Clone)]
pub struct AdapterResponse<T> {
    pub outcome: Outcome,
    pub payload: Option<T>,
    pub error: Option<String>,
}

impl<T> AdapterResponse<T> {
    pub fn ok(payload: T) -> Self {
        Self { outcome: Outcome::Ok, payload: Some(payload), error: None }
    }

    pub fn not_found() -> Self {
        Self { outcome: Outcome::NotFound, payload: None, error: None }
    }

    pub fn rate_limited(reason: impl Into<String>) -> Self {
        Self { outcome: Outcome::RateLimited, payload: None, error: Some(reason.into()) }
    }

    pub fn transient_error(reason: impl Into<String>) -> Self {
        Self { outcome: Outcome::TransientError, payload: None, error: Some(reason.into()) }
    }

    pub fn auth_error(reason: impl Into<String>) -> Self {
        Self { outcome: Outcome::AuthError, payload: None, error: Some(reason.into()) }
    }
}

/// One external data source. Translates a canonical request into the provider's shape
/// and back, and classifies every outcome. Implementations must **not** retry internally
/// (SPEC_FULL §4.2) — retry and fallback live one level up, in the Failover Router.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> &str;

    fn capabilities(&self) -> &'static [Capability];

    async fn price_quote(&self, ticker: &str, credential: &Credential) -> AdapterResponse<f64>;

    async fn price_history(
        &self,
        ticker: &str,
        range: DateRange,
        credential: &Credential,
    ) -> AdapterResponse<Vec<Bar>>;

    async fn fundamentals_snapshot(
        &self,
        ticker: &str,
        credential: &Credential,
    ) -> AdapterResponse<FundamentalSnapshot>;

    async fn earnings_calendar(
        &self,
        ticker: &str,
        window: DateRange,
        credential: &Credential,
    ) -> AdapterResponse<Vec<EarningsEvent>>;

    async fn analyst_recommendations(
        &self,
        ticker: &str,
        credential: &Credential,
    ) -> AdapterResponse<AnalystConsensus>;

    async fn existence_probe(&self, ticker: &str, credential: &Credential) -> AdapterResponse<()>;
}
