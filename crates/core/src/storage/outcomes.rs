use crate::domain::prediction::Outcome;
use anyhow::Context;
use chrono::NaiveDate;
use std::collections::HashMap;
use uuid::Uuid;

pub async fn upsert_outcomes_atomic(
    pool: &sqlx::PgPool,
    items: &[Outcome],
) -> anyhow::Result<u64> {
    anyhow::ensure!(!items.is_empty(), "items must be non-empty");

    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let mut affected: u64 = 0;
    let chunk_size: usize = std::env::var("OUTCOMES_UPSERT_BATCH")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(200);

    anyhow::ensure!(chunk_size >= 1, "OUTCOMES_UPSERT_BATCH must be >= 1");

    for chunk in items.chunks(chunk_size) {
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO outcomes (prediction_id, actual_high, actual_low, actual_close, \
             direction_correct) ",
        );
        qb.push_values(chunk, |mut b, item| {
            b.push_bind(item.prediction_id)
                .push_bind(item.actual_high)
                .push_bind(item.actual_low)
                .push_bind(item.actual_close)
                .push_bind(item.direction_correct);
        });
        // Late corrections from the provider replace the whole record.
        qb.push(
            " ON CONFLICT (prediction_id) DO UPDATE \
               SET actual_high = EXCLUDED.actual_high, actual_low = EXCLUDED.actual_low, \
                   actual_close = EXCLUDED.actual_close, \
                   direction_correct = EXCLUDED.direction_correct",
        );

        let res = qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("batch upsert outcomes failed")?;
        affected += res.rows_affected();
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(affected)
}

/// Outcomes for one prediction date, keyed by prediction id. Predictions
/// without an outcome row are simply absent from the map.
pub async fn fetch_outcomes_for_date(
    pool: &sqlx::PgPool,
    as_of_date: NaiveDate,
) -> anyhow::Result<HashMap<Uuid, Outcome>> {
    fetch_outcomes_in_range(pool, as_of_date, as_of_date).await
}

pub async fn fetch_outcomes_in_range(
    pool: &sqlx::PgPool,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<HashMap<Uuid, Outcome>> {
    anyhow::ensure!(start <= end, "range start {start} is after end {end}");

    let rows = sqlx::query_as::<_, (Uuid, f64, f64, f64, Option<bool>)>(
        "SELECT o.prediction_id, o.actual_high, o.actual_low, o.actual_close, \
                o.direction_correct \
         FROM outcomes o \
         JOIN predictions p ON p.id = o.prediction_id \
         WHERE p.prediction_date >= $1 AND p.prediction_date <= $2",
    )
    .persistent(false)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await
    .context("fetch outcomes in range failed")?;

    let mut out = HashMap::with_capacity(rows.len());
    for (prediction_id, actual_high, actual_low, actual_close, direction_correct) in rows {
        out.insert(
            prediction_id,
            Outcome {
                prediction_id,
                actual_high,
                actual_low,
                actual_close,
                direction_correct,
            },
        );
    }
    Ok(out)
}
