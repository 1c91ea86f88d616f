use anyhow::Context;
use chrono::NaiveDate;
use hindsight_core::config::Settings;
use hindsight_core::domain::classify;
use hindsight_core::domain::metrics;
use hindsight_core::domain::prediction::{Outcome, Prediction};
use hindsight_core::domain::recommend;
use hindsight_core::ingest::provider::{HttpJsonFeed, PredictionFeed};
use hindsight_core::ingest::types::{DailyBarsResponse, DailyPredictionsResponse};
use hindsight_core::storage;
use std::collections::HashMap;
use uuid::Uuid;

/// Pull the day's predictions and realized bars from the provider and upsert
/// them into the store. Bars for symbols without a stored prediction are
/// ignored; predictions without a bar stay unresolved.
pub async fn ingest_day(
    pool: &sqlx::PgPool,
    feed: &impl PredictionFeed,
    as_of_date: NaiveDate,
) -> anyhow::Result<()> {
    let provider = feed.provider_name();

    let predictions_resp = feed
        .fetch_daily_predictions(as_of_date)
        .await
        .with_context(|| format!("fetch predictions from {provider} failed"))?;

    if predictions_resp.items.is_empty() {
        tracing::warn!(%as_of_date, provider, "provider returned no predictions");
    } else {
        let predictions = to_predictions(&predictions_resp, as_of_date);
        let upserted =
            storage::predictions::upsert_predictions_atomic(pool, as_of_date, &predictions)
                .await?;
        tracing::info!(%as_of_date, provider, upserted, "ingested predictions");
    }

    let bars_resp = feed
        .fetch_daily_bars(as_of_date)
        .await
        .with_context(|| format!("fetch daily bars from {provider} failed"))?;

    let stored = storage::predictions::fetch_predictions_for_date(pool, as_of_date).await?;
    let outcomes = match_outcomes(&stored, &bars_resp);

    if outcomes.is_empty() {
        tracing::info!(%as_of_date, provider, "no bars matched stored predictions");
        return Ok(());
    }

    let upserted = storage::outcomes::upsert_outcomes_atomic(pool, &outcomes).await?;
    tracing::info!(%as_of_date, provider, upserted, "ingested outcomes");
    Ok(())
}

/// Fetch and evaluate provider data entirely in memory. Nothing is written;
/// the metrics land in the log.
pub async fn dry_run(settings: &Settings, as_of_date: NaiveDate) -> anyhow::Result<()> {
    if settings.provider_base_url.is_none() {
        tracing::info!(%as_of_date, dry_run = true, "PROVIDER_BASE_URL not set; nothing to evaluate");
        return Ok(());
    }

    let feed = HttpJsonFeed::from_settings(settings)?;
    let predictions_resp = feed.fetch_daily_predictions(as_of_date).await?;
    let bars_resp = feed.fetch_daily_bars(as_of_date).await?;

    let predictions = to_predictions(&predictions_resp, as_of_date);
    let outcomes: HashMap<Uuid, Outcome> = match_outcomes(&predictions, &bars_resp)
        .into_iter()
        .map(|o| (o.prediction_id, o))
        .collect();

    let batch = classify::classify_batch(&predictions, &outcomes);
    let daily = metrics::daily_metrics(as_of_date, &batch.classified);
    let recommendations = recommend::recommendations(&daily);

    tracing::info!(
        %as_of_date,
        dry_run = true,
        total_predictions = daily.total_predictions,
        directional_accuracy = ?daily.directional_accuracy,
        skipped = batch.skipped.len(),
        recommendations = recommendations.len(),
        metrics = %serde_json::to_string(&daily)?,
        "dry-run evaluation"
    );
    Ok(())
}

fn to_predictions(resp: &DailyPredictionsResponse, as_of_date: NaiveDate) -> Vec<Prediction> {
    resp.items
        .iter()
        .map(|item| Prediction {
            id: Uuid::new_v4(),
            symbol: item.symbol.trim().to_string(),
            rank: item.rank,
            prediction_date: as_of_date,
            predicted_high: item.predicted_high,
            predicted_low: item.predicted_low,
            predicted_close: item.predicted_close,
            previous_close: item.previous_close,
            expected_gain_percentage: item.expected_gain_percentage,
            confidence: item.confidence,
            market_regime: item.market_regime,
            signal: item.signal.clone(),
        })
        .collect()
}

fn match_outcomes(predictions: &[Prediction], bars: &DailyBarsResponse) -> Vec<Outcome> {
    let by_symbol: HashMap<&str, Uuid> = predictions
        .iter()
        .map(|p| (p.symbol.as_str(), p.id))
        .collect();

    let mut out = Vec::new();
    for bar in &bars.items {
        let Some(&prediction_id) = by_symbol.get(bar.symbol.trim()) else {
            tracing::debug!(symbol = %bar.symbol, "bar has no stored prediction; ignored");
            continue;
        };
        out.push(Outcome {
            prediction_id,
            actual_high: bar.high,
            actual_low: bar.low,
            actual_close: bar.close,
            direction_correct: None,
        });
    }
    out
}
