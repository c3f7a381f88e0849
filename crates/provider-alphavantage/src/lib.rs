//! Alpha-Vantage-shaped provider adapter (SPEC_FULL §4.2).
//!
//! Grounded in `validation::alpha_vantage::AlphaVantageClient`. Alpha Vantage reports
//! errors and rate limits inside a 200-OK JSON body rather than via HTTP status, so
//! this adapter's outcome classification inspects the body shape the way the source
//! client already did with its `"Error Message"`/`"Note"` checks — it just turns those
//! checks into `Outcome` instead of an `anyhow::Error`.

use async_trait::async_trait;
use chrono::Utc;
use pipeline_core::{
    AdapterResponse, AnalystConsensus, Bar, Capability, Credential, DateRange, EarningsEvent,
    FundamentalField, FundamentalSnapshot, Outcome, ProviderAdapter,
};
use std::collections::HashMap;

const BASE_URL: &str = "https://www.alphavantage.co/query";
const CAPABILITIES: &[Capability] = &[Capability::PriceHistory, Capability::FundamentalsSnapshot];

pub struct AlphaVantageAdapter {
    client: reqwest::Client,
}

impl AlphaVantageAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .expect("reqwest client builds"),
        }
    }

    /// Classifies a 200-OK body the way Alpha Vantage actually signals failure:
    /// no distinct HTTP status for rate limiting or unknown symbols.
    fn classify_body(json: &serde_json::Value) -> Option<Outcome> {
        if json.get("Note").is_some() {
            return Some(Outcome::RateLimited);
        }
        if let Some(msg) = json.get("Error Message").and_then(|v| v.as_str()) {
            if msg.to_lowercase().contains("invalid") {
                return Some(Outcome::NotFound);
            }
            return Some(Outcome::TransientError);
        }
        None
    }
}

impl Default for AlphaVantageAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for AlphaVantageAdapter {
    fn id(&self) -> &str {
        "alpha_vantage"
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    async fn price_quote(&self, _ticker: &str, _credential: &Credential) -> AdapterResponse<f64> {
        AdapterResponse::transient_error("price_quote not supported by this adapter")
    }

    async fn price_history(
        &self,
        ticker: &str,
        _range: DateRange,
        credential: &Credential,
    ) -> AdapterResponse<Vec<Bar>> {
        let url = format!(
            "{}?function=TIME_SERIES_DAILY&symbol={}&outputsize=full&apikey={}",
            BASE_URL, ticker, credential.secret
        );
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(_) => return AdapterResponse::transient_error("request failed"),
        };
        if !response.status().is_success() {
            return AdapterResponse::transient_error(format!("http {}", response.status()));
        }
        let json: serde_json::Value = match response.json().await {
            Ok(j) => j,
            Err(_) => return AdapterResponse::transient_error("schema mismatch"),
        };
        if let Some(outcome) = Self::classify_body(&json) {
            return AdapterResponse { outcome, payload: None, error: None };
        }
        let Some(series) = json.get("Time Series (Daily)").and_then(|v| v.as_object()) else {
            return AdapterResponse::not_found();
        };
        let mut bars: Vec<(String, Bar)> = series
            .iter()
            .filter_map(|(date, values)| {
                let f = |key: &str| values.get(key).and_then(|v| v.as_str()).and_then(|s| s.parse::<f64>().ok());
                Some((
                    date.clone(),
                    Bar {
                        open: f("1. open")?,
                        high: f("2. high")?,
                        low: f("3. low")?,
                        close: f("4. close")?,
                        volume: f("5. volume")?,
                    },
                ))
            })
            .collect();
        bars.sort_by(|a, b| a.0.cmp(&b.0));
        if bars.is_empty() {
            return AdapterResponse::not_found();
        }
        AdapterResponse::ok(bars.into_iter().map(|(_, b)| b).collect())
    }

    async fn fundamentals_snapshot(
        &self,
        ticker: &str,
        credential: &Credential,
    ) -> AdapterResponse<FundamentalSnapshot> {
        let url = format!("{}?function=OVERVIEW&symbol={}&apikey={}", BASE_URL, ticker, credential.secret);
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(_) => return AdapterResponse::transient_error("request failed"),
        };
        if !response.status().is_success() {
            return AdapterResponse::transient_error(format!("http {}", response.status()));
        }
        let json: serde_json::Value = match response.json().await {
            Ok(j) => j,
            Err(_) => return AdapterResponse::transient_error("schema mismatch"),
        };
        if let Some(outcome) = Self::classify_body(&json) {
            return AdapterResponse { outcome, payload: None, error: None };
        }
        let symbol = json.get("Symbol").and_then(|v| v.as_str());
        if symbol.is_none() || symbol == Some("") {
            return AdapterResponse::not_found();
        }
        let parse = |key: &str| json.get(key).and_then(|v| v.as_str()).and_then(|s| s.parse::<f64>().ok());

        let mut provenance = HashMap::new();
        let now = Utc::now();
        let mut stamp = |field: FundamentalField, present: bool| {
            if present {
                provenance.insert(
                    field,
                    pipeline_core::FieldProvenance { source: "alpha_vantage".to_string(), confidence: 0.7, observed_at: now },
                );
            }
        };

        let eps_diluted = parse("EPS");
        let book_value_per_share = parse("BookValue");
        let shares_outstanding = parse("SharesOutstanding");
        let market_cap = parse("MarketCapitalization");

        stamp(FundamentalField::EpsDiluted, eps_diluted.is_some());
        stamp(FundamentalField::BookValuePerShare, book_value_per_share.is_some());
        stamp(FundamentalField::SharesOutstanding, shares_outstanding.is_some());
        stamp(FundamentalField::MarketCap, market_cap.is_some());

        AdapterResponse::ok(FundamentalSnapshot {
            ticker: ticker.to_string(),
            eps_diluted,
            book_value_per_share,
            shares_outstanding,
            market_cap,
            provenance,
            ..Default::default()
        })
    }

    async fn earnings_calendar(
        &self,
        _ticker: &str,
        _window: DateRange,
        _credential: &Credential,
    ) -> AdapterResponse<Vec<EarningsEvent>> {
        AdapterResponse::ok(Vec::new())
    }

    async fn analyst_recommendations(
        &self,
        _ticker: &str,
        _credential: &Credential,
    ) -> AdapterResponse<AnalystConsensus> {
        AdapterResponse::transient_error("analyst_recommendations not supported by this adapter")
    }

    async fn existence_probe(&self, ticker: &str, credential: &Credential) -> AdapterResponse<()> {
        match self.fundamentals_snapshot(ticker, credential).await.outcome {
            Outcome::Ok => AdapterResponse::ok(()),
            other => AdapterResponse { outcome: other, payload: None, error: None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_body_detects_rate_limit_note() {
        let json = serde_json::json!({"Note": "Thank you for using Alpha Vantage"});
        assert_eq!(AlphaVantageAdapter::classify_body(&json), Some(Outcome::RateLimited));
    }

    #[test]
    fn classify_body_detects_invalid_symbol_as_not_found() {
        let json = serde_json::json!({"Error Message": "Invalid API call, unknown symbol"});
        assert_eq!(AlphaVantageAdapter::classify_body(&json), Some(Outcome::NotFound));
    }

    #[test]
    fn classify_body_treats_other_errors_as_transient() {
        let json = serde_json::json!({"Error Message": "internal server hiccup"});
        assert_eq!(AlphaVantageAdapter::classify_body(&json), Some(Outcome::TransientError));
    }

    #[test]
    fn classify_body_returns_none_for_clean_payload() {
        let json = serde_json::json!({"Symbol": "AAPL"});
        assert_eq!(AlphaVantageAdapter::classify_body(&json), None);
    }
}
