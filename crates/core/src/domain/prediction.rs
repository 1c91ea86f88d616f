//! Record types for the evaluation engine.
//!
//! Fields that depend on data not yet available (no outcome, insufficient
//! sample) are `Option`: `None` means "unresolved", which is a first-class
//! state distinct from `false` or `0.0`. No layer may collapse it into a
//! default; serialized output carries `null` and the presentation layer
//! renders "N/A".

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Market-regime tag supplied alongside a prediction by the upstream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    Trending,
    Choppy,
}

impl MarketRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketRegime::Trending => "trending",
            MarketRegime::Choppy => "choppy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trending" => Some(MarketRegime::Trending),
            "choppy" => Some(MarketRegime::Choppy),
            _ => None,
        }
    }
}

/// One forecast for one symbol on one trading date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Uuid,
    pub symbol: String,
    pub rank: i32,
    pub prediction_date: NaiveDate,
    pub predicted_high: f64,
    pub predicted_low: f64,
    pub predicted_close: f64,
    /// Prior session's close; anchor for the target price. Must be > 0.
    pub previous_close: f64,
    /// Signed; `>= 0` is a bullish call, `< 0` bearish.
    pub expected_gain_percentage: f64,
    /// Stated confidence in [0, 1], when the feed reports one.
    pub confidence: Option<f64>,
    pub market_regime: Option<MarketRegime>,
    /// Signal-category identifier, when the feed reports one.
    pub signal: Option<String>,
}

/// Realized market data for a prediction. Absence of the whole record is the
/// "unresolved" state, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub prediction_id: Uuid,
    pub actual_high: f64,
    pub actual_low: f64,
    pub actual_close: f64,
    /// Optional override; derived from prices when absent.
    pub direction_correct: Option<bool>,
}

/// A prediction joined against its outcome (if any). Derived on demand and
/// never persisted; recomputing from the same inputs yields the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedPrediction {
    pub id: Uuid,
    pub symbol: String,
    pub rank: i32,
    pub prediction_date: NaiveDate,
    pub target_price: f64,
    pub expected_gain_percentage: f64,
    pub confidence: Option<f64>,
    pub market_regime: Option<MarketRegime>,
    pub signal: Option<String>,
    pub hit_target: Option<bool>,
    pub closed_target: Option<bool>,
    pub direction_correct: Option<bool>,
    pub actual_gain_percentage: Option<f64>,
    pub high_accuracy: Option<f64>,
    pub low_accuracy: Option<f64>,
    pub close_accuracy: Option<f64>,
}

impl ClassifiedPrediction {
    /// Whether the outcome has arrived for this prediction.
    pub fn is_resolved(&self) -> bool {
        self.actual_gain_percentage.is_some()
    }
}

/// A prediction excluded from aggregation because it violates a structural
/// invariant. Reported to the caller, never thrown as a batch-fatal error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedPrediction {
    pub id: Uuid,
    pub reason: String,
}
