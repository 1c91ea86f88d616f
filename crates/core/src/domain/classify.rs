//! Target classification: join one prediction with its realized outcome (if
//! any) and decide whether the implied target was hit intraday or held at
//! close.

use crate::domain::prediction::{
    ClassifiedPrediction, Outcome, Prediction, SkippedPrediction,
};
use anyhow::ensure;
use std::collections::HashMap;
use uuid::Uuid;

/// Price level implied by the previous close and the expected gain.
pub fn target_price(prediction: &Prediction) -> f64 {
    prediction.previous_close * (1.0 + prediction.expected_gain_percentage / 100.0)
}

/// Per-prediction accuracy of one predicted price against the realized one,
/// clamped to [0, 1].
fn price_accuracy(predicted: f64, actual: f64) -> f64 {
    (1.0 - (predicted - actual).abs() / actual).clamp(0.0, 1.0)
}

fn validate_prediction(p: &Prediction) -> anyhow::Result<()> {
    ensure!(!p.id.is_nil(), "prediction id must be set");
    ensure!(!p.symbol.trim().is_empty(), "symbol must be non-empty");
    ensure!(
        p.previous_close.is_finite() && p.previous_close > 0.0,
        "previous_close must be positive (got {})",
        p.previous_close
    );
    ensure!(
        p.expected_gain_percentage.is_finite(),
        "expected_gain_percentage must be finite"
    );
    for (field, value) in [
        ("predicted_high", p.predicted_high),
        ("predicted_low", p.predicted_low),
        ("predicted_close", p.predicted_close),
    ] {
        ensure!(
            value.is_finite() && value > 0.0,
            "{field} must be positive (got {value})"
        );
    }
    if let Some(confidence) = p.confidence {
        ensure!(
            (0.0..=1.0).contains(&confidence),
            "confidence must be between 0 and 1 (got {confidence})"
        );
    }
    Ok(())
}

fn validate_outcome(o: &Outcome) -> anyhow::Result<()> {
    for (field, value) in [
        ("actual_high", o.actual_high),
        ("actual_low", o.actual_low),
        ("actual_close", o.actual_close),
    ] {
        ensure!(
            value.is_finite() && value > 0.0,
            "{field} must be positive (got {value})"
        );
    }
    ensure!(
        o.actual_high >= o.actual_low,
        "actual_high must be >= actual_low (got {} < {})",
        o.actual_high,
        o.actual_low
    );
    Ok(())
}

/// Classify one prediction against its outcome, if one exists yet.
///
/// The target price is computed unconditionally; all outcome-dependent
/// fields stay `None` until an outcome arrives. A bullish call (zero gain
/// included) hits when the intraday high reaches the target and closes it
/// when the close holds at or above it; a bearish call mirrors that against
/// the low.
pub fn classify(
    prediction: &Prediction,
    outcome: Option<&Outcome>,
) -> anyhow::Result<ClassifiedPrediction> {
    validate_prediction(prediction)?;

    let target = target_price(prediction);
    let bullish = prediction.expected_gain_percentage >= 0.0;

    let mut classified = ClassifiedPrediction {
        id: prediction.id,
        symbol: prediction.symbol.clone(),
        rank: prediction.rank,
        prediction_date: prediction.prediction_date,
        target_price: target,
        expected_gain_percentage: prediction.expected_gain_percentage,
        confidence: prediction.confidence,
        market_regime: prediction.market_regime,
        signal: prediction.signal.clone(),
        hit_target: None,
        closed_target: None,
        direction_correct: None,
        actual_gain_percentage: None,
        high_accuracy: None,
        low_accuracy: None,
        close_accuracy: None,
    };

    let Some(outcome) = outcome else {
        return Ok(classified);
    };
    validate_outcome(outcome)?;

    if bullish {
        classified.hit_target = Some(outcome.actual_high >= target);
        classified.closed_target = Some(outcome.actual_close >= target);
    } else {
        classified.hit_target = Some(outcome.actual_low <= target);
        classified.closed_target = Some(outcome.actual_close <= target);
    }

    classified.direction_correct = Some(outcome.direction_correct.unwrap_or(
        (outcome.actual_close > prediction.previous_close) == bullish,
    ));
    classified.actual_gain_percentage = Some(
        (outcome.actual_close - prediction.previous_close) / prediction.previous_close * 100.0,
    );
    classified.high_accuracy = Some(price_accuracy(prediction.predicted_high, outcome.actual_high));
    classified.low_accuracy = Some(price_accuracy(prediction.predicted_low, outcome.actual_low));
    classified.close_accuracy =
        Some(price_accuracy(prediction.predicted_close, outcome.actual_close));

    Ok(classified)
}

#[derive(Debug, Clone, Default)]
pub struct ClassifiedBatch {
    pub classified: Vec<ClassifiedPrediction>,
    pub skipped: Vec<SkippedPrediction>,
}

/// Classify a day's predictions against whatever outcomes exist.
///
/// Structurally invalid records are collected into `skipped` with the
/// offending invariant; the rest of the batch is unaffected.
pub fn classify_batch(
    predictions: &[Prediction],
    outcomes: &HashMap<Uuid, Outcome>,
) -> ClassifiedBatch {
    let mut batch = ClassifiedBatch::default();
    for prediction in predictions {
        match classify(prediction, outcomes.get(&prediction.id)) {
            Ok(classified) => batch.classified.push(classified),
            Err(err) => batch.skipped.push(SkippedPrediction {
                id: prediction.id,
                reason: format!("{err:#}"),
            }),
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn prediction(expected_gain_percentage: f64) -> Prediction {
        Prediction {
            id: Uuid::new_v4(),
            symbol: "NVDA".to_string(),
            rank: 1,
            prediction_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            predicted_high: 106.0,
            predicted_low: 99.0,
            predicted_close: 104.0,
            previous_close: 100.0,
            expected_gain_percentage,
            confidence: Some(0.7),
            market_regime: None,
            signal: None,
        }
    }

    fn outcome(id: Uuid, high: f64, low: f64, close: f64) -> Outcome {
        Outcome {
            prediction_id: id,
            actual_high: high,
            actual_low: low,
            actual_close: close,
            direction_correct: None,
        }
    }

    #[test]
    fn target_price_ignores_outcome_presence() {
        let p = prediction(5.0);
        assert_eq!(target_price(&p), 105.0);

        let classified = classify(&p, None).unwrap();
        assert_eq!(classified.target_price, 105.0);

        let p = prediction(-5.0);
        assert_eq!(target_price(&p), 95.0);
    }

    #[test]
    fn bullish_hit_but_not_closed() {
        let p = prediction(5.0);
        let o = outcome(p.id, 106.0, 99.0, 104.0);
        let c = classify(&p, Some(&o)).unwrap();
        assert_eq!(c.hit_target, Some(true));
        assert_eq!(c.closed_target, Some(false));
        assert_eq!(c.direction_correct, Some(true));
    }

    #[test]
    fn bearish_hit_but_not_closed() {
        let p = prediction(-5.0);
        let o = outcome(p.id, 101.0, 94.0, 96.0);
        let c = classify(&p, Some(&o)).unwrap();
        assert_eq!(c.target_price, 95.0);
        assert_eq!(c.hit_target, Some(true));
        assert_eq!(c.closed_target, Some(false));
        assert_eq!(c.direction_correct, Some(true));
    }

    #[test]
    fn zero_gain_takes_the_bullish_branch() {
        let p = prediction(0.0);
        let o = outcome(p.id, 101.0, 99.0, 100.5);
        let c = classify(&p, Some(&o)).unwrap();
        // Target == previous close; the high reached it and the close held.
        assert_eq!(c.hit_target, Some(true));
        assert_eq!(c.closed_target, Some(true));
        assert_eq!(c.direction_correct, Some(true));
    }

    #[test]
    fn missing_outcome_leaves_fields_unresolved() {
        let p = prediction(5.0);
        let c = classify(&p, None).unwrap();
        assert_eq!(c.hit_target, None);
        assert_eq!(c.closed_target, None);
        assert_eq!(c.direction_correct, None);
        assert_eq!(c.actual_gain_percentage, None);
        assert_eq!(c.high_accuracy, None);
    }

    #[test]
    fn outcome_override_beats_derived_direction() {
        let p = prediction(5.0);
        let mut o = outcome(p.id, 106.0, 99.0, 104.0);
        o.direction_correct = Some(false);
        let c = classify(&p, Some(&o)).unwrap();
        assert_eq!(c.direction_correct, Some(false));
    }

    #[test]
    fn batch_skips_invalid_records_and_keeps_the_rest() {
        let good = prediction(5.0);
        let mut bad = prediction(5.0);
        bad.previous_close = 0.0;

        let batch = classify_batch(&[good.clone(), bad.clone()], &HashMap::new());
        assert_eq!(batch.classified.len(), 1);
        assert_eq!(batch.classified[0].id, good.id);
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(batch.skipped[0].id, bad.id);
        assert!(batch.skipped[0].reason.contains("previous_close"));
    }

    #[test]
    fn actual_gain_percentage_is_relative_to_previous_close() {
        let p = prediction(5.0);
        let o = outcome(p.id, 106.0, 99.0, 104.0);
        let c = classify(&p, Some(&o)).unwrap();
        assert!((c.actual_gain_percentage.unwrap() - 4.0).abs() < 1e-12);
    }
}
