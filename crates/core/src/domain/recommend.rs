//! Rule-based recommendations over a day's metrics.
//!
//! An ordered table of independent rules, evaluated in table order; the
//! output keeps that order rather than sorting by priority. A rule whose
//! input field is unresolved does not fire at all. An empty result means
//! every check passed.

use crate::domain::metrics::DailyMetrics;
use serde::{Deserialize, Serialize};

const DIRECTIONAL_WARN_BELOW: f64 = 0.6;
const DIRECTIONAL_SUCCESS_ABOVE: f64 = 0.75;
const CORRELATION_WARN_BELOW: f64 = 0.3;
const REGIME_GAP_WARN: f64 = 0.2;
const PRICE_ACCURACY_WARN_BELOW: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    Improvement,
    Warning,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationKind,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub metric: Option<String>,
    pub value: Option<f64>,
}

type Rule = fn(&DailyMetrics) -> Option<Recommendation>;

const RULES: &[Rule] = &[
    low_directional_accuracy,
    strong_directional_accuracy,
    weak_confidence_correlation,
    lagging_signal,
    choppy_regime_gap,
    weak_price_targets,
];

/// Evaluate the rule table against one metrics record.
pub fn recommendations(metrics: &DailyMetrics) -> Vec<Recommendation> {
    RULES.iter().filter_map(|rule| rule(metrics)).collect()
}

fn low_directional_accuracy(m: &DailyMetrics) -> Option<Recommendation> {
    let accuracy = m.directional_accuracy?;
    if accuracy >= DIRECTIONAL_WARN_BELOW {
        return None;
    }
    Some(Recommendation {
        kind: RecommendationKind::Warning,
        title: "Directional accuracy below 60%".to_string(),
        description: format!(
            "Only {:.0}% of resolved predictions called the direction correctly. \
             Review the direction model before trusting target levels.",
            accuracy * 100.0
        ),
        priority: Priority::High,
        metric: Some("directional_accuracy".to_string()),
        value: Some(accuracy),
    })
}

fn strong_directional_accuracy(m: &DailyMetrics) -> Option<Recommendation> {
    let accuracy = m.directional_accuracy?;
    if accuracy <= DIRECTIONAL_SUCCESS_ABOVE {
        return None;
    }
    Some(Recommendation {
        kind: RecommendationKind::Success,
        title: "Directional accuracy above 75%".to_string(),
        description: format!(
            "{:.0}% of resolved predictions called the direction correctly.",
            accuracy * 100.0
        ),
        priority: Priority::Low,
        metric: Some("directional_accuracy".to_string()),
        value: Some(accuracy),
    })
}

fn weak_confidence_correlation(m: &DailyMetrics) -> Option<Recommendation> {
    let correlation = m.confidence_accuracy_correlation?;
    if correlation >= CORRELATION_WARN_BELOW {
        return None;
    }
    Some(Recommendation {
        kind: RecommendationKind::Improvement,
        title: "Confidence barely tracks accuracy".to_string(),
        description: format!(
            "Correlation between stated confidence and realized correctness is \
             {correlation:.2}. Stated confidence carries little signal; recalibrate it."
        ),
        priority: Priority::High,
        metric: Some("confidence_accuracy_correlation".to_string()),
        value: Some(correlation),
    })
}

fn lagging_signal(m: &DailyMetrics) -> Option<Recommendation> {
    let worst = m.worst_performing_signal.as_deref()?;
    Some(Recommendation {
        kind: RecommendationKind::Improvement,
        title: format!("Weakest signal: {worst}"),
        description: format!(
            "The '{worst}' signal category has the lowest resolved directional \
             accuracy among categories with enough samples. Consider reweighting it."
        ),
        priority: Priority::Medium,
        metric: Some("worst_performing_signal".to_string()),
        value: None,
    })
}

fn choppy_regime_gap(m: &DailyMetrics) -> Option<Recommendation> {
    let trending = m.trending_market_accuracy?;
    let choppy = m.choppy_market_accuracy?;
    if choppy >= trending - REGIME_GAP_WARN {
        return None;
    }
    Some(Recommendation {
        kind: RecommendationKind::Improvement,
        title: "Choppy-market accuracy lags trending".to_string(),
        description: format!(
            "Accuracy drops from {:.0}% in trending markets to {:.0}% in choppy \
             ones. Consider reducing position confidence when the regime is choppy.",
            trending * 100.0,
            choppy * 100.0
        ),
        priority: Priority::Medium,
        metric: Some("choppy_market_accuracy".to_string()),
        value: Some(choppy),
    })
}

fn weak_price_targets(m: &DailyMetrics) -> Option<Recommendation> {
    let mean = (m.high_accuracy_avg? + m.low_accuracy_avg? + m.close_accuracy_avg?) / 3.0;
    if mean >= PRICE_ACCURACY_WARN_BELOW {
        return None;
    }
    Some(Recommendation {
        kind: RecommendationKind::Warning,
        title: "Price targets far from realized prices".to_string(),
        description: format!(
            "Mean price-target accuracy across high/low/close is {:.0}%. \
             Predicted levels are too far from where the market actually traded.",
            mean * 100.0
        ),
        priority: Priority::High,
        metric: Some("price_accuracy".to_string()),
        value: Some(mean),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn metrics() -> DailyMetrics {
        DailyMetrics {
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            total_predictions: 10,
            directional_accuracy: None,
            high_accuracy_avg: None,
            low_accuracy_avg: None,
            close_accuracy_avg: None,
            average_confidence: None,
            confidence_calibration: None,
            confidence_accuracy_correlation: None,
            trending_market_accuracy: None,
            choppy_market_accuracy: None,
            best_performing_signal: None,
            worst_performing_signal: None,
        }
    }

    #[test]
    fn low_accuracy_fires_high_priority_warning() {
        let mut m = metrics();
        m.directional_accuracy = Some(0.55);
        let recs = recommendations(&m);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].kind, RecommendationKind::Warning);
        assert_eq!(recs[0].priority, Priority::High);
        assert_eq!(recs[0].metric.as_deref(), Some("directional_accuracy"));
        assert_eq!(recs[0].value, Some(0.55));
    }

    #[test]
    fn high_accuracy_fires_success_instead() {
        let mut m = metrics();
        m.directional_accuracy = Some(0.8);
        let recs = recommendations(&m);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].kind, RecommendationKind::Success);
        assert_eq!(recs[0].priority, Priority::Low);
    }

    #[test]
    fn accuracy_rules_are_mutually_exclusive() {
        // A mid-band value fires neither threshold rule.
        let mut m = metrics();
        m.directional_accuracy = Some(0.7);
        assert!(recommendations(&m).is_empty());
    }

    #[test]
    fn unresolved_fields_never_fire_rules() {
        // Everything unresolved: no rule may produce a false recommendation.
        assert!(recommendations(&metrics()).is_empty());
    }

    #[test]
    fn regime_gap_requires_both_partitions_resolved() {
        let mut m = metrics();
        m.trending_market_accuracy = Some(0.8);
        assert!(recommendations(&m).is_empty());

        m.choppy_market_accuracy = Some(0.55);
        let recs = recommendations(&m);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].kind, RecommendationKind::Improvement);
        assert_eq!(recs[0].priority, Priority::Medium);
    }

    #[test]
    fn price_accuracy_rule_averages_all_three_fields() {
        let mut m = metrics();
        m.high_accuracy_avg = Some(0.4);
        m.low_accuracy_avg = Some(0.5);
        m.close_accuracy_avg = Some(0.45);
        let recs = recommendations(&m);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].metric.as_deref(), Some("price_accuracy"));

        // One field unresolved: the rule must not fire on a partial mean.
        m.close_accuracy_avg = None;
        assert!(recommendations(&m).is_empty());
    }

    #[test]
    fn rules_evaluate_in_table_order_not_priority_order() {
        let mut m = metrics();
        m.directional_accuracy = Some(0.55);
        m.confidence_accuracy_correlation = Some(0.1);
        m.worst_performing_signal = Some("momentum".to_string());
        m.high_accuracy_avg = Some(0.3);
        m.low_accuracy_avg = Some(0.3);
        m.close_accuracy_avg = Some(0.3);

        let recs = recommendations(&m);
        let metrics_fired: Vec<_> = recs.iter().filter_map(|r| r.metric.as_deref()).collect();
        assert_eq!(
            metrics_fired,
            vec![
                "directional_accuracy",
                "confidence_accuracy_correlation",
                "worst_performing_signal",
                "price_accuracy",
            ]
        );
    }
}
