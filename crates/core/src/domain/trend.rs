//! Trend series: one point per calendar date in a range, gap-filled.
//!
//! Unlike `DailyMetrics`, every field here is a plain number so the series
//! is always plottable. A date with no predictions at all gets zeroed rate
//! fields and `no_data: true`; consumers must check the flag before reading
//! a 0 as a real accuracy floor. A live date (predictions stored, no
//! outcomes yet) keeps `no_data: false` and falls back to 0 rates and the
//! mean stated confidence.

use crate::domain::prediction::ClassifiedPrediction;
use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub accuracy: f64,
    pub confidence: f64,
    pub predictions_count: usize,
    pub hit_target_rate: f64,
    pub closed_target_rate: f64,
    pub high_accuracy: f64,
    pub low_accuracy: f64,
    pub no_data: bool,
}

fn no_data_point(date: NaiveDate) -> TrendPoint {
    TrendPoint {
        date,
        accuracy: 0.0,
        confidence: 0.0,
        predictions_count: 0,
        hit_target_rate: 0.0,
        closed_target_rate: 0.0,
        high_accuracy: 0.0,
        low_accuracy: 0.0,
        no_data: true,
    }
}

fn resolved_rate<F>(classified: &[ClassifiedPrediction], field: F) -> f64
where
    F: Fn(&ClassifiedPrediction) -> Option<bool>,
{
    let mut positive = 0usize;
    let mut total = 0usize;
    for c in classified {
        match field(c) {
            Some(true) => {
                positive += 1;
                total += 1;
            }
            Some(false) => total += 1,
            None => {}
        }
    }
    if total == 0 {
        0.0
    } else {
        positive as f64 / total as f64
    }
}

fn resolved_mean<F>(classified: &[ClassifiedPrediction], field: F) -> f64
where
    F: Fn(&ClassifiedPrediction) -> Option<f64>,
{
    let values: Vec<f64> = classified.iter().filter_map(field).collect();
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn point_for(date: NaiveDate, classified: &[ClassifiedPrediction]) -> TrendPoint {
    TrendPoint {
        date,
        accuracy: resolved_rate(classified, |c| c.direction_correct),
        confidence: resolved_mean(classified, |c| c.confidence),
        predictions_count: classified.len(),
        hit_target_rate: resolved_rate(classified, |c| c.hit_target),
        closed_target_rate: resolved_rate(classified, |c| c.closed_target),
        high_accuracy: resolved_mean(classified, |c| c.high_accuracy),
        low_accuracy: resolved_mean(classified, |c| c.low_accuracy),
        no_data: false,
    }
}

/// Build the ascending, gap-filled trend for `[start, end]`.
///
/// Deterministic and idempotent: the output depends only on the arguments,
/// never on the store's native ordering or on a clock.
pub fn build_trend(
    start: NaiveDate,
    end: NaiveDate,
    days: &BTreeMap<NaiveDate, Vec<ClassifiedPrediction>>,
) -> anyhow::Result<Vec<TrendPoint>> {
    anyhow::ensure!(
        start <= end,
        "trend range start {start} is after end {end}"
    );

    let mut points = Vec::new();
    let mut date = start;
    loop {
        match days.get(&date) {
            Some(classified) if !classified.is_empty() => {
                points.push(point_for(date, classified));
            }
            _ => points.push(no_data_point(date)),
        }
        if date == end {
            break;
        }
        date = date.succ_opt().context("date overflow while building trend")?;
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn day(offset: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap() + chrono::Duration::days(offset as i64)
    }

    fn classified(date: NaiveDate, resolved: bool, hit: bool) -> ClassifiedPrediction {
        ClassifiedPrediction {
            id: Uuid::new_v4(),
            symbol: "MSFT".to_string(),
            rank: 1,
            prediction_date: date,
            target_price: 105.0,
            expected_gain_percentage: 5.0,
            confidence: Some(0.6),
            market_regime: None,
            signal: None,
            hit_target: resolved.then_some(hit),
            closed_target: resolved.then_some(hit),
            direction_correct: resolved.then_some(hit),
            actual_gain_percentage: resolved.then_some(4.0),
            high_accuracy: resolved.then_some(0.95),
            low_accuracy: resolved.then_some(0.9),
            close_accuracy: resolved.then_some(0.92),
        }
    }

    #[test]
    fn fills_every_date_in_range_ascending() {
        // 7-day range, data on 5 dates; days 2 and 5 missing entirely.
        let mut days = BTreeMap::new();
        for offset in [0u64, 1, 3, 4, 6] {
            days.insert(
                day(offset),
                vec![classified(day(offset), true, offset % 2 == 0)],
            );
        }

        let trend = build_trend(day(0), day(6), &days).unwrap();
        assert_eq!(trend.len(), 7);
        for (i, point) in trend.iter().enumerate() {
            assert_eq!(point.date, day(i as u64));
        }
        let missing: Vec<bool> = trend.iter().map(|p| p.no_data).collect();
        assert_eq!(
            missing,
            vec![false, false, true, false, false, true, false]
        );
    }

    #[test]
    fn zero_prediction_date_is_flagged_not_just_zeroed() {
        let days = BTreeMap::new();
        let trend = build_trend(day(0), day(0), &days).unwrap();
        assert_eq!(trend.len(), 1);
        assert!(trend[0].no_data);
        assert_eq!(trend[0].hit_target_rate, 0.0);
        assert_eq!(trend[0].predictions_count, 0);
    }

    #[test]
    fn live_date_defaults_rates_but_keeps_confidence() {
        // Predictions stored, no outcomes yet: plottable defaults, no flag.
        let mut days = BTreeMap::new();
        days.insert(
            day(0),
            vec![
                classified(day(0), false, false),
                classified(day(0), false, false),
            ],
        );

        let trend = build_trend(day(0), day(0), &days).unwrap();
        assert!(!trend[0].no_data);
        assert_eq!(trend[0].predictions_count, 2);
        assert_eq!(trend[0].accuracy, 0.0);
        assert_eq!(trend[0].hit_target_rate, 0.0);
        assert!((trend[0].confidence - 0.6).abs() < 1e-12);
    }

    #[test]
    fn rates_use_resolved_subset_only() {
        let mut days = BTreeMap::new();
        days.insert(
            day(0),
            vec![
                classified(day(0), true, true),
                classified(day(0), true, false),
                classified(day(0), false, false),
            ],
        );

        let trend = build_trend(day(0), day(0), &days).unwrap();
        assert_eq!(trend[0].predictions_count, 3);
        assert_eq!(trend[0].hit_target_rate, 0.5);
        assert_eq!(trend[0].accuracy, 0.5);
    }

    #[test]
    fn identical_inputs_give_identical_series() {
        let mut days = BTreeMap::new();
        days.insert(day(0), vec![classified(day(0), true, true)]);
        days.insert(day(2), vec![classified(day(2), false, false)]);

        let a = build_trend(day(0), day(3), &days).unwrap();
        let b = build_trend(day(0), day(3), &days).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(build_trend(day(1), day(0), &BTreeMap::new()).is_err());
    }
}
