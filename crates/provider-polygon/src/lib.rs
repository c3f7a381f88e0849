//! Polygon-shaped provider adapter (SPEC_FULL §4.2).
//!
//! Grounded in `polygon-client::PolygonClient`'s aggregates/financials/news endpoint
//! shapes, stripped of its internal 429-retry-with-sleep loop: outcome classification
//! replaces retrying, and the adapter never calls `tokio::time::sleep`.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use pipeline_core::{
    AdapterResponse, AnalystConsensus, Bar, Capability, Credential, DateRange, EarningsEvent,
    FundamentalSnapshot, ProviderAdapter,
};

const CAPABILITIES: &[Capability] = &[
    Capability::PriceHistory,
    Capability::PriceQuote,
    Capability::FundamentalsSnapshot,
    Capability::EarningsCalendar,
    Capability::ExistenceProbe,
    Capability::AnalystRecommendations,
];

pub struct PolygonAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl PolygonAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .expect("reqwest client builds"),
            base_url: "https://api.polygon.io".to_string(),
        }
    }

    fn classify_status(status: reqwest::StatusCode) -> Option<pipeline_core::Outcome> {
        use pipeline_core::Outcome;
        if status == reqwest::StatusCode::NOT_FOUND {
            Some(Outcome::NotFound)
        } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Some(Outcome::RateLimited)
        } else if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            Some(Outcome::AuthError)
        } else if status.is_success() {
            None
        } else {
            Some(pipeline_core::Outcome::TransientError)
        }
    }
}

impl Default for PolygonAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(serde::Deserialize)]
struct AggsResponse {
    results: Option<Vec<AggBar>>,
    #[serde(rename = "resultsCount")]
    results_count: Option<i64>,
}

#[derive(serde::Deserialize)]
struct AggBar {
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

#[derive(serde::Deserialize)]
struct EarningsResponse {
    #[serde(default)]
    results: Vec<EarningsEntry>,
}

#[derive(serde::Deserialize)]
struct EarningsEntry {
    date: String,
    #[serde(rename = "date_status")]
    date_status: Option<String>,
}

#[derive(serde::Deserialize)]
struct RatingsResponse {
    #[serde(default)]
    results: Vec<RatingEntry>,
}

#[derive(serde::Deserialize)]
struct RatingEntry {
    rating_current: Option<String>,
    price_target_current: Option<f64>,
}

#[async_trait]
impl ProviderAdapter for PolygonAdapter {
    fn id(&self) -> &str {
        "polygon"
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    async fn price_quote(&self, ticker: &str, credential: &Credential) -> AdapterResponse<f64> {
        let url = format!(
            "{}/v2/last/trade/{}?apiKey={}",
            self.base_url, ticker, credential.secret
        );
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(_) => return AdapterResponse::transient_error("request failed"),
        };
        if let Some(outcome) = Self::classify_status(response.status()) {
            return AdapterResponse { outcome, payload: None, error: None };
        }
        let json: serde_json::Value = match response.json().await {
            Ok(j) => j,
            Err(_) => return AdapterResponse::transient_error("schema mismatch"),
        };
        match json.get("results").and_then(|r| r.get("p")).and_then(|p| p.as_f64()) {
            Some(price) => AdapterResponse::ok(price),
            None => AdapterResponse::not_found(),
        }
    }

    async fn price_history(
        &self,
        ticker: &str,
        range: DateRange,
        credential: &Credential,
    ) -> AdapterResponse<Vec<Bar>> {
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}?apiKey={}",
            self.base_url,
            ticker,
            range.start.format("%Y-%m-%d"),
            range.end.format("%Y-%m-%d"),
            credential.secret
        );
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(_) => return AdapterResponse::transient_error("request failed"),
        };
        if let Some(outcome) = Self::classify_status(response.status()) {
            return AdapterResponse { outcome, payload: None, error: None };
        }
        let parsed: AggsResponse = match response.json().await {
            Ok(j) => j,
            Err(_) => return AdapterResponse::transient_error("schema mismatch"),
        };
        match parsed.results {
            Some(bars) if !bars.is_empty() => AdapterResponse::ok(
                bars.into_iter()
                    .map(|b| Bar { open: b.o, high: b.h, low: b.l, close: b.c, volume: b.v })
                    .collect(),
            ),
            _ if parsed.results_count == Some(0) => AdapterResponse::not_found(),
            _ => AdapterResponse::not_found(),
        }
    }

    async fn fundamentals_snapshot(
        &self,
        ticker: &str,
        credential: &Credential,
    ) -> AdapterResponse<FundamentalSnapshot> {
        let url = format!(
            "{}/vX/reference/financials?ticker={}&apiKey={}",
            self.base_url, ticker, credential.secret
        );
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(_) => return AdapterResponse::transient_error("request failed"),
        };
        if let Some(outcome) = Self::classify_status(response.status()) {
            // Polygon returns 403 for fundamentals on unsupported tiers; this is an
            // access-degradation signal, not proof the ticker is delisted.
            return AdapterResponse { outcome, payload: None, error: None };
        }
        let json: serde_json::Value = match response.json().await {
            Ok(j) => j,
            Err(_) => return AdapterResponse::transient_error("schema mismatch"),
        };
        let results = json.get("results").and_then(|r| r.as_array());
        let Some(first) = results.and_then(|r| r.first()) else {
            return AdapterResponse::not_found();
        };
        let financials = first.get("financials");
        let income = financials.and_then(|f| f.get("income_statement"));
        let balance = financials.and_then(|f| f.get("balance_sheet"));
        let cashflow = financials.and_then(|f| f.get("cash_flow_statement"));

        let value_of = |obj: Option<&serde_json::Value>, key: &str| -> Option<f64> {
            obj.and_then(|o| o.get(key)).and_then(|v| v.get("value")).and_then(|v| v.as_f64())
        };

        let snapshot = FundamentalSnapshot {
            ticker: ticker.to_string(),
            revenue: value_of(income, "revenues"),
            net_income: value_of(income, "net_income_loss"),
            total_assets: value_of(balance, "assets"),
            total_equity: value_of(balance, "equity"),
            current_assets: value_of(balance, "current_assets"),
            current_liabilities: value_of(balance, "current_liabilities"),
            operating_income: value_of(income, "operating_income_loss"),
            cost_of_goods_sold: value_of(income, "cost_of_revenue"),
            free_cash_flow: None,
            ebitda: None,
            total_debt: None,
            shares_outstanding: None,
            market_cap: None,
            enterprise_value: None,
            eps_diluted: value_of(income, "diluted_earnings_per_share"),
            book_value_per_share: None,
            fiscal_period_end: None,
            provenance: stamp_provenance(
                "polygon",
                0.8,
                &[
                    "revenue", "net_income", "total_assets", "total_equity",
                    "current_assets", "current_liabilities", "operating_income",
                    "cost_of_goods_sold", "eps_diluted",
                ],
            ),
        };
        AdapterResponse::ok(snapshot)
    }

    async fn earnings_calendar(
        &self,
        ticker: &str,
        window: DateRange,
        credential: &Credential,
    ) -> AdapterResponse<Vec<EarningsEvent>> {
        let url = format!(
            "{}/benzinga/v1/earnings?ticker={}&date.gte={}&date.lte={}&apiKey={}",
            self.base_url,
            ticker,
            window.start.format("%Y-%m-%d"),
            window.end.format("%Y-%m-%d"),
            credential.secret
        );
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(_) => return AdapterResponse::transient_error("request failed"),
        };
        if let Some(outcome) = Self::classify_status(response.status()) {
            // Benzinga sub-integration is gracefully absent on lower Polygon tiers.
            return AdapterResponse { outcome, payload: None, error: None };
        }
        let body: EarningsResponse = match response.json().await {
            Ok(b) => b,
            Err(_) => return AdapterResponse::transient_error("schema mismatch"),
        };
        let events: Vec<EarningsEvent> = body
            .results
            .into_iter()
            .filter_map(|entry| {
                let event_date = NaiveDate::parse_from_str(&entry.date, "%Y-%m-%d").ok()?;
                Some(EarningsEvent {
                    event_date,
                    reported: entry.date_status.as_deref() == Some("reported"),
                    source: "polygon_benzinga".to_string(),
                })
            })
            .collect();
        if events.is_empty() {
            return AdapterResponse::not_found();
        }
        AdapterResponse::ok(events)
    }

    async fn analyst_recommendations(
        &self,
        ticker: &str,
        credential: &Credential,
    ) -> AdapterResponse<AnalystConsensus> {
        let url = format!(
            "{}/benzinga/v1/ratings?ticker={}&apiKey={}",
            self.base_url, ticker, credential.secret
        );
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(_) => return AdapterResponse::transient_error("request failed"),
        };
        if let Some(outcome) = Self::classify_status(response.status()) {
            // Benzinga sub-integration is gracefully absent on lower Polygon tiers.
            return AdapterResponse { outcome, payload: None, error: None };
        }
        let body: RatingsResponse = match response.json().await {
            Ok(b) => b,
            Err(_) => return AdapterResponse::transient_error("schema mismatch"),
        };
        if body.results.is_empty() {
            return AdapterResponse::not_found();
        }

        let mut consensus = AnalystConsensus::default();
        let mut targets: Vec<f64> = Vec::new();
        for entry in &body.results {
            match entry.rating_current.as_deref().map(str::to_lowercase).as_deref() {
                Some("strong buy") | Some("outperform") => consensus.strong_buy += 1,
                Some("buy") | Some("overweight") => consensus.buy += 1,
                Some("hold") | Some("neutral") | Some("market perform") => consensus.hold += 1,
                Some("sell") | Some("underweight") => consensus.sell += 1,
                Some("strong sell") | Some("underperform") => consensus.strong_sell += 1,
                _ => {}
            }
            if let Some(target) = entry.price_target_current {
                targets.push(target);
            }
        }

        let total = consensus.strong_buy + consensus.buy + consensus.hold + consensus.sell + consensus.strong_sell;
        if total > 0 {
            // Bucket weights mirror Grade::from_score's 0/25/50/75/100 ladder so a
            // unanimous "buy" book and a unanimous Grade::Buy composite read the same.
            let weighted = consensus.strong_buy as f64 * 100.0
                + consensus.buy as f64 * 75.0
                + consensus.hold as f64 * 50.0
                + consensus.sell as f64 * 25.0;
            consensus.consensus_score = Some(weighted / total as f64);
        }
        if !targets.is_empty() {
            consensus.mean_target_price = Some(targets.iter().sum::<f64>() / targets.len() as f64);
            targets.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let mid = targets.len() / 2;
            consensus.median_target_price = Some(if targets.len() % 2 == 0 {
                (targets[mid - 1] + targets[mid]) / 2.0
            } else {
                targets[mid]
            });
        }

        AdapterResponse::ok(consensus)
    }

    async fn existence_probe(&self, ticker: &str, credential: &Credential) -> AdapterResponse<()> {
        let url = format!(
            "{}/v3/reference/tickers/{}?apiKey={}",
            self.base_url, ticker, credential.secret
        );
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(_) => return AdapterResponse::transient_error("request failed"),
        };
        match Self::classify_status(response.status()) {
            Some(outcome) => AdapterResponse { outcome, payload: None, error: None },
            None => AdapterResponse::ok(()),
        }
    }
}

fn stamp_provenance(
    source: &str,
    confidence: f64,
    fields: &[&str],
) -> std::collections::HashMap<pipeline_core::FundamentalField, pipeline_core::FieldProvenance> {
    use pipeline_core::FundamentalField::*;
    let now = Utc::now();
    let mut map = std::collections::HashMap::new();
    for field in fields {
        let key = match *field {
            "revenue" => Revenue,
            "net_income" => NetIncome,
            "total_assets" => TotalAssets,
            "total_equity" => TotalEquity,
            "current_assets" => CurrentAssets,
            "current_liabilities" => CurrentLiabilities,
            "operating_income" => OperatingIncome,
            "cost_of_goods_sold" => CostOfGoodsSold,
            "eps_diluted" => EpsDiluted,
            _ => continue,
        };
        map.insert(
            key,
            pipeline_core::FieldProvenance { source: source.to_string(), confidence, observed_at: now },
        );
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_expected_capabilities() {
        let adapter = PolygonAdapter::new();
        assert!(adapter.capabilities().contains(&Capability::PriceHistory));
        assert!(adapter.capabilities().contains(&Capability::FundamentalsSnapshot));
        assert!(adapter.capabilities().contains(&Capability::EarningsCalendar));
        assert!(adapter.capabilities().contains(&Capability::AnalystRecommendations));
    }

    #[test]
    fn consensus_score_weights_bucket_counts_toward_buy() {
        let ratings = serde_json::json!({
            "results": [
                {"rating_current": "Buy", "price_target_current": 210.0},
                {"rating_current": "Buy", "price_target_current": 220.0},
                {"rating_current": "Hold", "price_target_current": 190.0},
            ]
        });
        let body: RatingsResponse = serde_json::from_value(ratings).unwrap();
        let mut strong_buy = 0u32;
        let mut buy = 0u32;
        let mut hold = 0u32;
        for entry in &body.results {
            match entry.rating_current.as_deref().map(str::to_lowercase).as_deref() {
                Some("strong buy") => strong_buy += 1,
                Some("buy") => buy += 1,
                Some("hold") => hold += 1,
                _ => {}
            }
        }
        assert_eq!((strong_buy, buy, hold), (0, 2, 1));
        let total = (strong_buy + buy + hold) as f64;
        let weighted = strong_buy as f64 * 100.0 + buy as f64 * 75.0 + hold as f64 * 50.0;
        assert!((weighted / total - 66.666).abs() < 0.01);
    }

    #[test]
    fn earnings_entry_parses_reported_flag_from_date_status() {
        let raw = serde_json::json!({
            "results": [
                {"date": "2026-08-14", "date_status": "upcoming"},
                {"date": "2026-05-01", "date_status": "reported"},
            ]
        });
        let body: EarningsResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(body.results.len(), 2);
        assert_eq!(body.results[0].date_status.as_deref(), Some("upcoming"));
        let reported = body.results[1].date_status.as_deref() == Some("reported");
        assert!(reported);
    }

    #[test]
    fn status_classification_matches_spec_table() {
        use pipeline_core::Outcome;
        assert_eq!(PolygonAdapter::classify_status(reqwest::StatusCode::NOT_FOUND), Some(Outcome::NotFound));
        assert_eq!(
            PolygonAdapter::classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS),
            Some(Outcome::RateLimited)
        );
        assert_eq!(PolygonAdapter::classify_status(reqwest::StatusCode::FORBIDDEN), Some(Outcome::AuthError));
        assert_eq!(PolygonAdapter::classify_status(reqwest::StatusCode::OK), None);
        assert_eq!(
            PolygonAdapter::classify_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
            Some(Outcome::TransientError)
        );
    }
}
