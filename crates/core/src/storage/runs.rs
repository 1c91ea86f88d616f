use crate::domain::metrics::DailyMetrics;
use crate::domain::prediction::SkippedPrediction;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Record a successful evaluation run with its metrics snapshot.
pub async fn persist_success(
    pool: &sqlx::PgPool,
    metrics: &DailyMetrics,
    skipped: &[SkippedPrediction],
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let generated_at: DateTime<Utc> = Utc::now();

    // Both serialize from already-validated values.
    let metrics_json = serde_json::to_value(metrics).context("metrics serialize failed")?;
    let skipped_json = serde_json::to_value(skipped).context("skipped serialize failed")?;

    sqlx::query(
        "INSERT INTO daily_metrics_runs (id, as_of_date, generated_at, status, error, metrics, skipped) \
         VALUES ($1, $2, $3, 'success', NULL, $4, $5)",
    )
    .persistent(false)
    .bind(id)
    .bind(metrics.date)
    .bind(generated_at)
    .bind(metrics_json)
    .bind(skipped_json)
    .execute(pool)
    .await
    .context("insert daily_metrics_runs failed")?;

    Ok(id)
}

pub async fn persist_failure(
    pool: &sqlx::PgPool,
    as_of_date: NaiveDate,
    error: &str,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let generated_at: DateTime<Utc> = Utc::now();

    sqlx::query(
        "INSERT INTO daily_metrics_runs (id, as_of_date, generated_at, status, error, metrics, skipped) \
         VALUES ($1, $2, $3, 'error', $4, NULL, NULL)",
    )
    .persistent(false)
    .bind(id)
    .bind(as_of_date)
    .bind(generated_at)
    .bind(error)
    .execute(pool)
    .await
    .context("insert error daily_metrics_runs failed")?;

    Ok(id)
}

#[derive(Debug, Clone)]
pub struct PersistedRun {
    pub run_id: Uuid,
    pub as_of_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub metrics: DailyMetrics,
    pub skipped: Vec<SkippedPrediction>,
}

/// Most recent successful run, newest as-of date first.
pub async fn fetch_latest_success(pool: &sqlx::PgPool) -> anyhow::Result<Option<PersistedRun>> {
    let row = sqlx::query_as::<
        _,
        (
            Uuid,
            NaiveDate,
            DateTime<Utc>,
            serde_json::Value,
            Option<serde_json::Value>,
        ),
    >(
        "SELECT id, as_of_date, generated_at, metrics, skipped \
         FROM daily_metrics_runs \
         WHERE status = 'success' \
         ORDER BY as_of_date DESC, generated_at DESC \
         LIMIT 1",
    )
    .persistent(false)
    .fetch_optional(pool)
    .await
    .context("fetch latest daily_metrics_runs failed")?;

    let Some((run_id, as_of_date, generated_at, metrics, skipped)) = row else {
        return Ok(None);
    };

    let metrics: DailyMetrics = serde_json::from_value(metrics)
        .with_context(|| format!("invalid metrics JSON in run {run_id}"))?;
    let skipped: Vec<SkippedPrediction> = match skipped {
        Some(v) => serde_json::from_value(v)
            .with_context(|| format!("invalid skipped JSON in run {run_id}"))?,
        None => Vec::new(),
    };

    Ok(Some(PersistedRun {
        run_id,
        as_of_date,
        generated_at,
        metrics,
        skipped,
    }))
}
