//! Storage-to-engine glue shared by the worker and the API: load a date (or
//! range) of records, classify, and aggregate.

use crate::domain::classify;
use crate::domain::metrics::{self, DailyMetrics};
use crate::domain::prediction::{ClassifiedPrediction, SkippedPrediction};
use crate::storage;
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct EvaluatedDay {
    pub metrics: DailyMetrics,
    pub classified: Vec<ClassifiedPrediction>,
    pub skipped: Vec<SkippedPrediction>,
}

/// Load one date's stored records and run the engine over them.
pub async fn evaluate_date(
    pool: &sqlx::PgPool,
    as_of_date: NaiveDate,
) -> anyhow::Result<EvaluatedDay> {
    let predictions = storage::predictions::fetch_predictions_for_date(pool, as_of_date).await?;
    let outcomes = storage::outcomes::fetch_outcomes_for_date(pool, as_of_date).await?;

    let batch = classify::classify_batch(&predictions, &outcomes);
    if !batch.skipped.is_empty() {
        tracing::warn!(
            %as_of_date,
            skipped = batch.skipped.len(),
            "excluded structurally invalid predictions from aggregation"
        );
    }

    Ok(EvaluatedDay {
        metrics: metrics::daily_metrics(as_of_date, &batch.classified),
        classified: batch.classified,
        skipped: batch.skipped,
    })
}

/// Classified predictions for every stored date in `[start, end]`, grouped
/// by date. Dates with no stored predictions are simply absent; the trend
/// builder is the layer that gap-fills them.
pub async fn classified_range(
    pool: &sqlx::PgPool,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<(BTreeMap<NaiveDate, Vec<ClassifiedPrediction>>, Vec<SkippedPrediction>)> {
    let predictions = storage::predictions::fetch_predictions_in_range(pool, start, end).await?;
    let outcomes = storage::outcomes::fetch_outcomes_in_range(pool, start, end).await?;

    let batch = classify::classify_batch(&predictions, &outcomes);

    let mut days: BTreeMap<NaiveDate, Vec<ClassifiedPrediction>> = BTreeMap::new();
    for classified in batch.classified {
        days.entry(classified.prediction_date)
            .or_default()
            .push(classified);
    }

    Ok((days, batch.skipped))
}

/// Per-day metrics for every stored date in `[start, end]`, for rollups.
pub async fn metrics_range(
    pool: &sqlx::PgPool,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<(Vec<DailyMetrics>, Vec<SkippedPrediction>)> {
    let (days, skipped) = classified_range(pool, start, end).await?;
    let metrics = days
        .into_iter()
        .map(|(date, classified)| metrics::daily_metrics(date, &classified))
        .collect();
    Ok((metrics, skipped))
}
