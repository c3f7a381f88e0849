use crate::credential::Credential;
use crate::error::{PipelineError, Result};
use crate::types::Capability;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default composite weights from SPEC_FULL §4.7. Configuration, not code — callers are
/// free to override any field as long as the five sum to 1.0 (checked by `validate`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub fundamental: f64,
    pub technical: f64,
    pub value: f64,
    pub signal: f64,
    pub risk: f64,
    pub vwap_sr: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            fundamental: 0.25,
            technical: 0.20,
            value: 0.20,
            signal: 0.10,
            risk: 0.10,
            vwap_sr: 0.15,
        }
    }
}

impl ScoringWeights {
    pub fn validate(&self) -> Result<()> {
        let sum = self.fundamental + self.technical + self.value + self.signal + self.risk + self.vwap_sr;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(PipelineError::ConfigurationError(format!(
                "scoring_weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }
}

/// `sector -> ratio_name -> [min, max]` plausibility bounds, with a default fallback
/// bucket keyed `"default"` applied when a ticker's sector is unmapped (SPEC_FULL §4.6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectorRanges {
    pub ranges: HashMap<String, HashMap<String, (f64, f64)>>,
}

impl SectorRanges {
    pub fn plausible(&self, sector: Option<&str>, ratio_name: &str, value: f64) -> bool {
        let bucket = sector
            .and_then(|s| self.ranges.get(s))
            .or_else(|| self.ranges.get("default"));
        match bucket.and_then(|b| b.get(ratio_name)) {
            Some((min, max)) => value >= *min && value <= *max,
            None => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub id: String,
    pub capabilities: Vec<Capability>,
    pub credentials: Vec<Credential>,
}

/// Full configuration surface enumerated in SPEC_FULL §6.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub timezone: String,
    pub universe_source: String,
    pub providers: Vec<ProviderConfig>,
    pub priority_deadlines: HashMap<u8, Duration>,
    pub api_call_budget_total: i64,
    pub worker_concurrency: usize,
    pub min_history_bars: usize,
    pub target_history_bars: usize,
    pub delisting_min_agreement: usize,
    pub scoring_weights: ScoringWeights,
    pub sector_ranges: SectorRanges,
    pub confidence_threshold: f64,
    pub force_run: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut priority_deadlines = HashMap::new();
        priority_deadlines.insert(1, Duration::from_secs(30 * 60));
        priority_deadlines.insert(2, Duration::from_secs(15 * 60));
        priority_deadlines.insert(3, Duration::from_secs(20 * 60));
        priority_deadlines.insert(4, Duration::from_secs(10 * 60));
        priority_deadlines.insert(5, Duration::from_secs(15 * 60));
        priority_deadlines.insert(6, Duration::from_secs(10 * 60));

        Self {
            timezone: "America/New_York".to_string(),
            universe_source: "default".to_string(),
            providers: Vec::new(),
            priority_deadlines,
            api_call_budget_total: 5000,
            worker_concurrency: 8,
            min_history_bars: 100,
            target_history_bars: 200,
            delisting_min_agreement: 2,
            scoring_weights: ScoringWeights::default(),
            sector_ranges: SectorRanges::default(),
            confidence_threshold: 0.70,
            force_run: false,
        }
    }
}

impl PipelineConfig {
    /// Reads credentials from the environment the way `PolygonClient::new` and
    /// `data-loader` already do (`std::env::var(...).expect(...)` for required keys),
    /// with `.env` loaded first via `dotenvy`. Everything else keeps the `Default`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        let mut providers = Vec::new();
        if let Ok(key) = std::env::var("POLYGON_API_KEY") {
            providers.push(ProviderConfig {
                id: "polygon".to_string(),
                capabilities: vec![
                    Capability::PriceHistory,
                    Capability::PriceQuote,
                    Capability::FundamentalsSnapshot,
                    Capability::ExistenceProbe,
                    Capability::AnalystRecommendations,
                ],
                credentials: vec![Credential::new("polygon", "default", key)],
            });
        }
        if let Ok(key) = std::env::var("ALPHA_VANTAGE_API_KEY") {
            providers.push(ProviderConfig {
                id: "alpha_vantage".to_string(),
                capabilities: vec![Capability::PriceHistory, Capability::FundamentalsSnapshot],
                credentials: vec![Credential::new("alpha_vantage", "default", key)],
            });
        }
        // Yahoo Finance's public endpoints are unauthenticated; it still participates
        // in the Key Pool with a placeholder credential so rate limiting applies uniformly.
        providers.push(ProviderConfig {
            id: "yahoo_finance".to_string(),
            capabilities: vec![
                Capability::PriceQuote,
                Capability::PriceHistory,
                Capability::FundamentalsSnapshot,
                Capability::ExistenceProbe,
            ],
            credentials: vec![Credential::new("yahoo_finance", "default", "")],
        });

        if providers.is_empty() {
            return Err(PipelineError::ConfigurationError(
                "no provider credentials found in environment".to_string(),
            ));
        }
        config.providers = providers;

        if let Ok(budget) = std::env::var("API_CALL_BUDGET_TOTAL") {
            config.api_call_budget_total = budget.parse().map_err(|_| {
                PipelineError::ConfigurationError("API_CALL_BUDGET_TOTAL must be an integer".to_string())
            })?;
        }
        if let Ok(concurrency) = std::env::var("WORKER_CONCURRENCY") {
            config.worker_concurrency = concurrency.parse().map_err(|_| {
                PipelineError::ConfigurationError("WORKER_CONCURRENCY must be an integer".to_string())
            })?;
        }

        config.scoring_weights.validate()?;
        Ok(config)
    }
}
