use crate::domain::prediction::MarketRegime;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A day's predictions as published by the upstream feed. Ids are assigned
/// at ingest time; the feed keys records by symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyPredictionsResponse {
    pub as_of_date: NaiveDate,
    pub items: Vec<PredictionItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionItem {
    pub symbol: String,
    pub rank: i32,
    pub predicted_high: f64,
    pub predicted_low: f64,
    pub predicted_close: f64,
    pub previous_close: f64,
    pub expected_gain_percentage: f64,
    pub confidence: Option<f64>,
    pub market_regime: Option<MarketRegime>,
    pub signal: Option<String>,
}

/// Realized OHLC bars for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyBarsResponse {
    pub as_of_date: NaiveDate,
    pub items: Vec<DailyBarItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyBarItem {
    pub symbol: String,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}
