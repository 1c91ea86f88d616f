use crate::config::Settings;
use crate::ingest::types::{DailyBarsResponse, DailyPredictionsResponse};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PREDICTIONS_PATH: &str = "/v1/predictions";
const DEFAULT_BARS_PATH: &str = "/v1/daily_bars";
const DEFAULT_RETRIES: u32 = 3;

#[async_trait::async_trait]
pub trait PredictionFeed: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_daily_predictions(
        &self,
        as_of_date: NaiveDate,
    ) -> Result<DailyPredictionsResponse>;

    async fn fetch_daily_bars(&self, as_of_date: NaiveDate) -> Result<DailyBarsResponse>;
}

#[derive(Debug, Clone)]
pub struct HttpJsonFeed {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    predictions_path: String,
    bars_path: String,
    retries: u32,
}

impl HttpJsonFeed {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_provider_base_url()?.to_string();
        let api_key = settings.provider_api_key.clone();

        let timeout_secs = std::env::var("PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("PROVIDER_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES);

        let predictions_path = std::env::var("PROVIDER_PREDICTIONS_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PREDICTIONS_PATH.to_string());

        let bars_path = std::env::var("PROVIDER_BARS_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BARS_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build provider http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            predictions_path,
            bars_path,
            retries,
        })
    }

    fn url(&self, path: &str) -> String {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_once<T: DeserializeOwned>(
        &self,
        path: &str,
        as_of_date: NaiveDate,
    ) -> Result<T> {
        let url = self.url(path);
        let headers = self.headers()?;

        let res = self
            .http
            .get(url)
            .headers(headers)
            .query(&[("as_of_date", as_of_date.to_string())])
            .send()
            .await
            .context("provider request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read provider response")?;

        if !status.is_success() {
            anyhow::bail!("provider HTTP {status}: {text}");
        }

        serde_json::from_str::<T>(&text)
            .with_context(|| format!("failed to parse provider response: {text}"))
    }

    async fn fetch_with_retries<T: DeserializeOwned>(
        &self,
        path: &str,
        as_of_date: NaiveDate,
        validate: impl Fn(&T) -> Result<()>,
    ) -> Result<T> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once::<T>(path, as_of_date).await {
                Ok(parsed) => {
                    validate(&parsed)?;
                    return Ok(parsed);
                }
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(attempt, ?backoff, error = %err, "provider fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl PredictionFeed for HttpJsonFeed {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn fetch_daily_predictions(
        &self,
        as_of_date: NaiveDate,
    ) -> Result<DailyPredictionsResponse> {
        self.fetch_with_retries(&self.predictions_path, as_of_date, |resp| {
            validate_predictions(resp, as_of_date)
        })
        .await
    }

    async fn fetch_daily_bars(&self, as_of_date: NaiveDate) -> Result<DailyBarsResponse> {
        self.fetch_with_retries(&self.bars_path, as_of_date, |resp| {
            validate_bars(resp, as_of_date)
        })
        .await
    }
}

fn validate_predictions(resp: &DailyPredictionsResponse, expected: NaiveDate) -> Result<()> {
    anyhow::ensure!(
        resp.as_of_date == expected,
        "provider as_of_date mismatch: expected {expected}, got {}",
        resp.as_of_date
    );

    for item in &resp.items {
        anyhow::ensure!(!item.symbol.trim().is_empty(), "symbol must be non-empty");
        anyhow::ensure!(
            item.previous_close > 0.0,
            "previous_close must be positive for {} (got {})",
            item.symbol,
            item.previous_close
        );
        for (field, value) in [
            ("predicted_high", item.predicted_high),
            ("predicted_low", item.predicted_low),
            ("predicted_close", item.predicted_close),
        ] {
            anyhow::ensure!(
                value > 0.0,
                "{field} must be positive for {} (got {value})",
                item.symbol
            );
        }
        if let Some(confidence) = item.confidence {
            anyhow::ensure!(
                (0.0..=1.0).contains(&confidence),
                "confidence must be between 0 and 1 for {} (got {confidence})",
                item.symbol
            );
        }
    }

    Ok(())
}

fn validate_bars(resp: &DailyBarsResponse, expected: NaiveDate) -> Result<()> {
    anyhow::ensure!(
        resp.as_of_date == expected,
        "provider as_of_date mismatch: expected {expected}, got {}",
        resp.as_of_date
    );

    for item in &resp.items {
        anyhow::ensure!(!item.symbol.trim().is_empty(), "symbol must be non-empty");
        for (field, value) in [
            ("high", item.high),
            ("low", item.low),
            ("close", item.close),
        ] {
            anyhow::ensure!(
                value > 0.0,
                "{field} must be positive for {} (got {value})",
                item.symbol
            );
        }
        anyhow::ensure!(
            item.high >= item.low,
            "high must be >= low for {} (got {} < {})",
            item.symbol,
            item.high,
            item.low
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_predictions_payload() {
        let as_of = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let v = json!({
            "as_of_date": as_of,
            "items": [
                {
                    "symbol": "NVDA",
                    "rank": 1,
                    "predicted_high": 106.0,
                    "predicted_low": 99.0,
                    "predicted_close": 104.0,
                    "previous_close": 100.0,
                    "expected_gain_percentage": 5.0,
                    "confidence": 0.7,
                    "market_regime": "trending",
                    "signal": "momentum"
                }
            ]
        });

        let parsed: DailyPredictionsResponse = serde_json::from_value(v).unwrap();
        assert_eq!(parsed.as_of_date, as_of);
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].confidence, Some(0.7));
        assert!(validate_predictions(&parsed, as_of).is_ok());
    }

    #[test]
    fn rejects_date_mismatch() {
        let as_of = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let parsed = DailyBarsResponse {
            as_of_date: as_of,
            items: Vec::new(),
        };
        let other = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        assert!(validate_bars(&parsed, other).is_err());
    }

    #[test]
    fn rejects_non_positive_previous_close() {
        let as_of = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let v = json!({
            "as_of_date": as_of,
            "items": [
                {
                    "symbol": "NVDA",
                    "rank": 1,
                    "predicted_high": 106.0,
                    "predicted_low": 99.0,
                    "predicted_close": 104.0,
                    "previous_close": 0.0,
                    "expected_gain_percentage": 5.0,
                    "confidence": null,
                    "market_regime": null,
                    "signal": null
                }
            ]
        });

        let parsed: DailyPredictionsResponse = serde_json::from_value(v).unwrap();
        let err = validate_predictions(&parsed, as_of).unwrap_err();
        assert!(err.to_string().contains("previous_close"));
    }

    #[test]
    fn rejects_inverted_bar() {
        let as_of = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let v = json!({
            "as_of_date": as_of,
            "items": [
                {"symbol": "NVDA", "high": 99.0, "low": 101.0, "close": 100.0}
            ]
        });

        let parsed: DailyBarsResponse = serde_json::from_value(v).unwrap();
        assert!(validate_bars(&parsed, as_of).is_err());
    }
}
