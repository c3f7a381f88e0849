//! Yahoo-Finance-shaped provider adapter (SPEC_FULL §4.2).
//!
//! Grounded in `validation::yahoo_finance::YahooFinanceClient`: its empty
//! `quoteResponse.result` array (the source's `ok_or_else(|| anyhow!("No quote data
//! found"))` path) becomes this adapter's `not_found` classification rather than an
//! error. Yahoo's public endpoints need no credential; this adapter still accepts one
//! so the Key Pool can apply uniform per-window limiting.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pipeline_core::{
    AdapterResponse, AnalystConsensus, Bar, Capability, Credential, DateRange, EarningsEvent,
    FundamentalField, FundamentalSnapshot, ProviderAdapter,
};
use std::collections::HashMap;

const QUOTE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/quote";
const CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const CAPABILITIES: &[Capability] = &[
    Capability::PriceQuote,
    Capability::PriceHistory,
    Capability::FundamentalsSnapshot,
    Capability::ExistenceProbe,
];

pub struct YahooAdapter {
    client: reqwest::Client,
}

impl YahooAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .expect("reqwest client builds"),
        }
    }

    async fn fetch_quote_result(&self, ticker: &str) -> Result<Option<serde_json::Value>, pipeline_core::Outcome> {
        let url = format!("{}?symbols={}", QUOTE_URL, ticker);
        let response = self.client.get(&url).send().await.map_err(|_| pipeline_core::Outcome::TransientError)?;
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(pipeline_core::Outcome::RateLimited);
        }
        if response.status() == reqwest::StatusCode::UNAUTHORIZED || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(pipeline_core::Outcome::AuthError);
        }
        if !response.status().is_success() {
            return Err(pipeline_core::Outcome::TransientError);
        }
        let json: serde_json::Value = response.json().await.map_err(|_| pipeline_core::Outcome::TransientError)?;
        let result = json
            .get("quoteResponse")
            .and_then(|v| v.get("result"))
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .cloned();
        Ok(result)
    }
}

impl Default for YahooAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for YahooAdapter {
    fn id(&self) -> &str {
        "yahoo_finance"
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    async fn price_quote(&self, ticker: &str, _credential: &Credential) -> AdapterResponse<f64> {
        match self.fetch_quote_result(ticker).await {
            Ok(Some(data)) => match data.get("regularMarketPrice").and_then(|v| v.as_f64()) {
                Some(price) => AdapterResponse::ok(price),
                None => AdapterResponse::not_found(),
            },
            Ok(None) => AdapterResponse::not_found(),
            Err(outcome) => AdapterResponse { outcome, payload: None, error: None },
        }
    }

    async fn price_history(
        &self,
        ticker: &str,
        range: DateRange,
        _credential: &Credential,
    ) -> AdapterResponse<Vec<Bar>> {
        let url = format!(
            "{}/{}?period1={}&period2={}&interval=1d",
            CHART_URL,
            ticker,
            range.start.timestamp(),
            range.end.timestamp()
        );
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(_) => return AdapterResponse::transient_error("request failed"),
        };
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return AdapterResponse::not_found();
        }
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return AdapterResponse::rate_limited("yahoo throttled");
        }
        if !response.status().is_success() {
            return AdapterResponse::transient_error(format!("http {}", response.status()));
        }
        let json: serde_json::Value = match response.json().await {
            Ok(j) => j,
            Err(_) => return AdapterResponse::transient_error("schema mismatch"),
        };
        let Some(chart) = json.get("chart").and_then(|v| v.get("result")).and_then(|v| v.as_array()).and_then(|a| a.first())
        else {
            return AdapterResponse::not_found();
        };
        let arr = |key: &str| chart.get("indicators").and_then(|i| i.get("quote")).and_then(|q| q.as_array()).and_then(|a| a.first()).and_then(|q| q.get(key)).and_then(|v| v.as_array()).cloned();
        let (opens, highs, lows, closes, volumes) = match (arr("open"), arr("high"), arr("low"), arr("close"), arr("volume")) {
            (Some(o), Some(h), Some(l), Some(c), Some(v)) => (o, h, l, c, v),
            _ => return AdapterResponse::not_found(),
        };
        let mut bars = Vec::with_capacity(opens.len());
        for i in 0..opens.len() {
            if let (Some(o), Some(h), Some(l), Some(c), Some(v)) = (
                opens[i].as_f64(),
                highs[i].as_f64(),
                lows[i].as_f64(),
                closes[i].as_f64(),
                volumes[i].as_f64(),
            ) {
                bars.push(Bar { open: o, high: h, low: l, close: c, volume: v });
            }
        }
        if bars.is_empty() {
            AdapterResponse::not_found()
        } else {
            AdapterResponse::ok(bars)
        }
    }

    async fn fundamentals_snapshot(
        &self,
        ticker: &str,
        _credential: &Credential,
    ) -> AdapterResponse<FundamentalSnapshot> {
        match self.fetch_quote_result(ticker).await {
            Ok(Some(data)) => {
                let f64_of = |key: &str| data.get(key).and_then(|v| v.as_f64());
                let market_cap = f64_of("marketCap");
                let eps_diluted = f64_of("epsTrailingTwelveMonths");
                let book_value_per_share = f64_of("bookValue");

                let mut provenance = HashMap::new();
                let now: DateTime<Utc> = Utc::now();
                for (field, present) in [
                    (FundamentalField::MarketCap, market_cap.is_some()),
                    (FundamentalField::EpsDiluted, eps_diluted.is_some()),
                    (FundamentalField::BookValuePerShare, book_value_per_share.is_some()),
                ] {
                    if present {
                        provenance.insert(
                            field,
                            pipeline_core::FieldProvenance { source: "yahoo_finance".to_string(), confidence: 0.6, observed_at: now },
                        );
                    }
                }

                AdapterResponse::ok(FundamentalSnapshot {
                    ticker: ticker.to_string(),
                    market_cap,
                    eps_diluted,
                    book_value_per_share,
                    provenance,
                    ..Default::default()
                })
            }
            Ok(None) => AdapterResponse::not_found(),
            Err(outcome) => AdapterResponse { outcome, payload: None, error: None },
        }
    }

    async fn earnings_calendar(
        &self,
        _ticker: &str,
        _window: DateRange,
        _credential: &Credential,
    ) -> AdapterResponse<Vec<EarningsEvent>> {
        AdapterResponse::transient_error("earnings_calendar not supported by this adapter")
    }

    async fn analyst_recommendations(
        &self,
        _ticker: &str,
        _credential: &Credential,
    ) -> AdapterResponse<AnalystConsensus> {
        AdapterResponse::transient_error("analyst_recommendations not supported by this adapter")
    }

    async fn existence_probe(&self, ticker: &str, credential: &Credential) -> AdapterResponse<()> {
        match self.price_quote(ticker, credential).await.outcome {
            pipeline_core::Outcome::Ok => AdapterResponse::ok(()),
            other => AdapterResponse { outcome: other, payload: None, error: None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_expected_capabilities() {
        let adapter = YahooAdapter::new();
        assert!(adapter.capabilities().contains(&Capability::PriceQuote));
        assert!(adapter.capabilities().contains(&Capability::ExistenceProbe));
        assert!(!adapter.capabilities().contains(&Capability::EarningsCalendar));
    }
}
