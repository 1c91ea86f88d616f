use crate::domain::prediction::{MarketRegime, Prediction};
use anyhow::Context;
use chrono::NaiveDate;
use uuid::Uuid;

type PredictionRow = (
    Uuid,
    NaiveDate,
    String,
    i32,
    f64,
    f64,
    f64,
    f64,
    f64,
    Option<f64>,
    Option<String>,
    Option<String>,
);

const SELECT_COLUMNS: &str = "id, prediction_date, symbol, rank, predicted_high, predicted_low, \
     predicted_close, previous_close, expected_gain_percentage, confidence, market_regime, signal";

pub async fn upsert_predictions_atomic(
    pool: &sqlx::PgPool,
    as_of_date: NaiveDate,
    items: &[Prediction],
) -> anyhow::Result<u64> {
    anyhow::ensure!(!items.is_empty(), "items must be non-empty");

    let mut tx = pool.begin().await.context("begin transaction failed")?;

    // Batch the upsert to reduce round trips; keep it transactional.
    let mut affected: u64 = 0;
    let chunk_size: usize = std::env::var("PREDICTIONS_UPSERT_BATCH")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(200);

    anyhow::ensure!(chunk_size >= 1, "PREDICTIONS_UPSERT_BATCH must be >= 1");

    let mut batch_idx: usize = 0;
    for chunk in items.chunks(chunk_size) {
        batch_idx += 1;
        let t0 = std::time::Instant::now();
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO predictions (id, prediction_date, symbol, rank, predicted_high, \
             predicted_low, predicted_close, previous_close, expected_gain_percentage, \
             confidence, market_regime, signal) ",
        );
        qb.push_values(chunk, |mut b, item| {
            b.push_bind(item.id)
                .push_bind(as_of_date)
                .push_bind(item.symbol.trim())
                .push_bind(item.rank)
                .push_bind(item.predicted_high)
                .push_bind(item.predicted_low)
                .push_bind(item.predicted_close)
                .push_bind(item.previous_close)
                .push_bind(item.expected_gain_percentage)
                .push_bind(item.confidence)
                .push_bind(item.market_regime.map(|r| r.as_str()))
                .push_bind(item.signal.as_deref());
        });
        // Re-ingesting a day refreshes the forecast fields but keeps the
        // original id, so outcomes keyed on it stay attached.
        qb.push(
            " ON CONFLICT (prediction_date, symbol) DO UPDATE \
               SET rank = EXCLUDED.rank, predicted_high = EXCLUDED.predicted_high, \
                   predicted_low = EXCLUDED.predicted_low, \
                   predicted_close = EXCLUDED.predicted_close, \
                   previous_close = EXCLUDED.previous_close, \
                   expected_gain_percentage = EXCLUDED.expected_gain_percentage, \
                   confidence = EXCLUDED.confidence, \
                   market_regime = EXCLUDED.market_regime, signal = EXCLUDED.signal",
        );

        let res = qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("batch upsert predictions failed")?;
        affected += res.rows_affected();

        tracing::debug!(
            %as_of_date,
            batch_idx,
            batch_size = chunk.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "predictions batch upsert"
        );
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(affected)
}

pub async fn fetch_predictions_for_date(
    pool: &sqlx::PgPool,
    as_of_date: NaiveDate,
) -> anyhow::Result<Vec<Prediction>> {
    let rows = sqlx::query_as::<_, PredictionRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM predictions \
         WHERE prediction_date = $1 \
         ORDER BY rank ASC, symbol ASC",
    ))
    .persistent(false)
    .bind(as_of_date)
    .fetch_all(pool)
    .await
    .context("fetch predictions for date failed")?;

    Ok(rows.into_iter().map(row_to_prediction).collect())
}

pub async fn fetch_predictions_in_range(
    pool: &sqlx::PgPool,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<Vec<Prediction>> {
    anyhow::ensure!(start <= end, "range start {start} is after end {end}");

    let rows = sqlx::query_as::<_, PredictionRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM predictions \
         WHERE prediction_date >= $1 AND prediction_date <= $2 \
         ORDER BY prediction_date ASC, rank ASC, symbol ASC",
    ))
    .persistent(false)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await
    .context("fetch predictions in range failed")?;

    Ok(rows.into_iter().map(row_to_prediction).collect())
}

fn row_to_prediction(row: PredictionRow) -> Prediction {
    let (
        id,
        prediction_date,
        symbol,
        rank,
        predicted_high,
        predicted_low,
        predicted_close,
        previous_close,
        expected_gain_percentage,
        confidence,
        market_regime,
        signal,
    ) = row;

    Prediction {
        id,
        symbol,
        rank,
        prediction_date,
        predicted_high,
        predicted_low,
        predicted_close,
        previous_close,
        expected_gain_percentage,
        confidence,
        // Unknown tags read back as untagged rather than failing the fetch.
        market_regime: market_regime.as_deref().and_then(MarketRegime::parse),
        signal,
    }
}
