//! Per-day metric aggregation over a classified prediction set, and
//! multi-day rollups.
//!
//! Every ratio is computed over resolved predictions only; a partition with
//! no resolved members yields `None` for that field. `total_predictions` is
//! the only count that includes unresolved records.

use crate::domain::calibration;
use crate::domain::prediction::{ClassifiedPrediction, MarketRegime};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Signal categories with fewer resolved samples than this are excluded from
/// the best/worst comparison so a lucky 1-for-1 signal cannot top the board.
pub const MIN_SIGNAL_SAMPLE: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub date: NaiveDate,
    pub total_predictions: usize,
    pub directional_accuracy: Option<f64>,
    pub high_accuracy_avg: Option<f64>,
    pub low_accuracy_avg: Option<f64>,
    pub close_accuracy_avg: Option<f64>,
    pub average_confidence: Option<f64>,
    pub confidence_calibration: Option<f64>,
    pub confidence_accuracy_correlation: Option<f64>,
    pub trending_market_accuracy: Option<f64>,
    pub choppy_market_accuracy: Option<f64>,
    pub best_performing_signal: Option<String>,
    pub worst_performing_signal: Option<String>,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Fraction of resolved predictions whose direction was correct; `None` when
/// nothing in the set is resolved.
fn directional_accuracy<'a>(
    classified: impl Iterator<Item = &'a ClassifiedPrediction>,
) -> Option<f64> {
    let mut correct = 0usize;
    let mut total = 0usize;
    for c in classified {
        match c.direction_correct {
            Some(true) => {
                correct += 1;
                total += 1;
            }
            Some(false) => total += 1,
            None => {}
        }
    }
    if total == 0 {
        None
    } else {
        Some(correct as f64 / total as f64)
    }
}

fn signal_extremes(
    classified: &[ClassifiedPrediction],
) -> (Option<String>, Option<String>) {
    // (correct, total) per category, resolved predictions only.
    let mut counts: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for c in classified {
        let (Some(signal), Some(correct)) = (c.signal.as_deref(), c.direction_correct) else {
            continue;
        };
        let entry = counts.entry(signal).or_insert((0, 0));
        entry.1 += 1;
        if correct {
            entry.0 += 1;
        }
    }

    let mut scored: Vec<(f64, &str)> = counts
        .into_iter()
        .filter(|(_, (_, total))| *total >= MIN_SIGNAL_SAMPLE)
        .map(|(signal, (correct, total))| (correct as f64 / total as f64, signal))
        .collect();

    // Accuracy descending, then name, so equal-accuracy days stay stable.
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(b.1))
    });

    let best = scored.first().map(|(_, s)| s.to_string());
    let worst = scored.last().map(|(_, s)| s.to_string());
    (best, worst)
}

/// Aggregate one date's classified predictions into a metrics record.
///
/// Pure and idempotent; a new value replaces the old one when late outcomes
/// change the inputs.
pub fn daily_metrics(date: NaiveDate, classified: &[ClassifiedPrediction]) -> DailyMetrics {
    let (best_performing_signal, worst_performing_signal) = signal_extremes(classified);

    DailyMetrics {
        date,
        total_predictions: classified.len(),
        directional_accuracy: directional_accuracy(classified.iter()),
        high_accuracy_avg: mean(classified.iter().filter_map(|c| c.high_accuracy)),
        low_accuracy_avg: mean(classified.iter().filter_map(|c| c.low_accuracy)),
        close_accuracy_avg: mean(classified.iter().filter_map(|c| c.close_accuracy)),
        average_confidence: mean(classified.iter().filter_map(|c| c.confidence)),
        confidence_calibration: calibration::confidence_calibration(classified),
        confidence_accuracy_correlation: calibration::confidence_accuracy_correlation(classified),
        trending_market_accuracy: directional_accuracy(
            classified
                .iter()
                .filter(|c| c.market_regime == Some(MarketRegime::Trending)),
        ),
        choppy_market_accuracy: directional_accuracy(
            classified
                .iter()
                .filter(|c| c.market_regime == Some(MarketRegime::Choppy)),
        ),
        best_performing_signal,
        worst_performing_signal,
    }
}

/// Multi-day aggregate: the unweighted mean of per-day values.
///
/// Every field averages the days that resolved it, weighting each day
/// equally regardless of how many predictions it carried. This is a
/// deliberate simplification over a pooled recomputation from raw
/// predictions: a 2-prediction day counts as much as a 20-prediction day,
/// which can diverge materially from the pooled figure when daily volume
/// varies. Tests pin this choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupMetrics {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days_in_range: usize,
    pub days_with_data: usize,
    pub total_predictions: usize,
    pub directional_accuracy: Option<f64>,
    pub high_accuracy_avg: Option<f64>,
    pub low_accuracy_avg: Option<f64>,
    pub close_accuracy_avg: Option<f64>,
    pub average_confidence: Option<f64>,
    pub confidence_calibration: Option<f64>,
    pub confidence_accuracy_correlation: Option<f64>,
    pub trending_market_accuracy: Option<f64>,
    pub choppy_market_accuracy: Option<f64>,
}

pub fn rollup(start: NaiveDate, end: NaiveDate, days: &[DailyMetrics]) -> RollupMetrics {
    let days_in_range = (end - start).num_days().max(0) as usize + 1;

    RollupMetrics {
        start,
        end,
        days_in_range,
        days_with_data: days.iter().filter(|d| d.total_predictions > 0).count(),
        total_predictions: days.iter().map(|d| d.total_predictions).sum(),
        directional_accuracy: mean(days.iter().filter_map(|d| d.directional_accuracy)),
        high_accuracy_avg: mean(days.iter().filter_map(|d| d.high_accuracy_avg)),
        low_accuracy_avg: mean(days.iter().filter_map(|d| d.low_accuracy_avg)),
        close_accuracy_avg: mean(days.iter().filter_map(|d| d.close_accuracy_avg)),
        average_confidence: mean(days.iter().filter_map(|d| d.average_confidence)),
        confidence_calibration: mean(days.iter().filter_map(|d| d.confidence_calibration)),
        confidence_accuracy_correlation: mean(
            days.iter().filter_map(|d| d.confidence_accuracy_correlation),
        ),
        trending_market_accuracy: mean(days.iter().filter_map(|d| d.trending_market_accuracy)),
        choppy_market_accuracy: mean(days.iter().filter_map(|d| d.choppy_market_accuracy)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn classified(correct: Option<bool>) -> ClassifiedPrediction {
        ClassifiedPrediction {
            id: Uuid::new_v4(),
            symbol: "AAPL".to_string(),
            rank: 1,
            prediction_date: date(),
            target_price: 105.0,
            expected_gain_percentage: 5.0,
            confidence: Some(0.7),
            market_regime: None,
            signal: None,
            hit_target: correct,
            closed_target: correct.map(|_| false),
            direction_correct: correct,
            actual_gain_percentage: correct.map(|_| 4.0),
            high_accuracy: correct.map(|_| 0.98),
            low_accuracy: correct.map(|_| 0.97),
            close_accuracy: correct.map(|_| 0.96),
        }
    }

    fn with_signal(correct: bool, signal: &str) -> ClassifiedPrediction {
        let mut c = classified(Some(correct));
        c.signal = Some(signal.to_string());
        c
    }

    fn with_regime(correct: bool, regime: MarketRegime) -> ClassifiedPrediction {
        let mut c = classified(Some(correct));
        c.market_regime = Some(regime);
        c
    }

    #[test]
    fn unresolved_set_yields_unresolved_accuracy_not_zero() {
        let set = vec![classified(None), classified(None)];
        let m = daily_metrics(date(), &set);
        assert_eq!(m.total_predictions, 2);
        assert_eq!(m.directional_accuracy, None);
        assert_eq!(m.high_accuracy_avg, None);
        assert_eq!(m.trending_market_accuracy, None);
        // Stated confidence is known even before outcomes arrive.
        assert_eq!(m.average_confidence, Some(0.7));
    }

    #[test]
    fn directional_accuracy_ignores_unresolved_records() {
        let set = vec![
            classified(Some(true)),
            classified(Some(true)),
            classified(Some(false)),
            classified(None),
        ];
        let m = daily_metrics(date(), &set);
        assert_eq!(m.total_predictions, 4);
        assert!((m.directional_accuracy.unwrap() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let set = vec![
            classified(Some(true)),
            classified(Some(false)),
            classified(None),
            with_regime(true, MarketRegime::Trending),
            with_signal(false, "momentum"),
        ];
        assert_eq!(daily_metrics(date(), &set), daily_metrics(date(), &set));
    }

    #[test]
    fn regime_partitions_resolve_independently() {
        let set = vec![
            with_regime(true, MarketRegime::Trending),
            with_regime(false, MarketRegime::Trending),
            classified(Some(true)),
        ];
        let m = daily_metrics(date(), &set);
        assert_eq!(m.trending_market_accuracy, Some(0.5));
        // No choppy predictions at all: unresolved, not 0.
        assert_eq!(m.choppy_market_accuracy, None);
    }

    #[test]
    fn signal_extremes_require_minimum_sample() {
        let mut set = Vec::new();
        // "breakout": 5 resolved, 4 correct. "momentum": 5 resolved, 1 correct.
        for i in 0..5 {
            set.push(with_signal(i != 0, "breakout"));
            set.push(with_signal(i == 0, "momentum"));
        }
        // "lucky": 1-for-1, below the sample floor; must not win best.
        set.push(with_signal(true, "lucky"));

        let m = daily_metrics(date(), &set);
        assert_eq!(m.best_performing_signal.as_deref(), Some("breakout"));
        assert_eq!(m.worst_performing_signal.as_deref(), Some("momentum"));
    }

    #[test]
    fn no_qualifying_signals_leaves_extremes_unset() {
        let set = vec![with_signal(true, "breakout"), with_signal(false, "momentum")];
        let m = daily_metrics(date(), &set);
        assert_eq!(m.best_performing_signal, None);
        assert_eq!(m.worst_performing_signal, None);
    }

    #[test]
    fn rollup_is_unweighted_mean_of_days() {
        // Day A: 2 predictions, 100% accurate. Day B: 20 predictions, 50%.
        // The rollup must be 0.75, not the pooled 11/22 = 0.5.
        let day_a = daily_metrics(date(), &vec![classified(Some(true)); 2]);
        let mut day_b_set = vec![classified(Some(true)); 10];
        day_b_set.extend(vec![classified(Some(false)); 10]);
        let day_b = daily_metrics(date().succ_opt().unwrap(), &day_b_set);

        let r = rollup(date(), date().succ_opt().unwrap(), &[day_a, day_b]);
        assert_eq!(r.days_in_range, 2);
        assert_eq!(r.days_with_data, 2);
        assert_eq!(r.total_predictions, 22);
        assert!((r.directional_accuracy.unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn rollup_skips_unresolved_days_per_field() {
        let resolved_day = daily_metrics(date(), &[classified(Some(true))]);
        let unresolved_day =
            daily_metrics(date().succ_opt().unwrap(), &[classified(None)]);

        let r = rollup(
            date(),
            date().succ_opt().unwrap(),
            &[resolved_day, unresolved_day],
        );
        // Only the resolved day contributes to accuracy; both report confidence.
        assert_eq!(r.directional_accuracy, Some(1.0));
        assert_eq!(r.average_confidence, Some(0.7));
        assert_eq!(r.days_with_data, 2);
    }

    #[test]
    fn rollup_over_no_resolved_days_is_unresolved() {
        let r = rollup(date(), date(), &[]);
        assert_eq!(r.directional_accuracy, None);
        assert_eq!(r.total_predictions, 0);
        assert_eq!(r.days_with_data, 0);
        assert_eq!(r.days_in_range, 1);
    }
}
