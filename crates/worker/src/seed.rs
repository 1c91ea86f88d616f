use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use uuid::Uuid;

const SIGNALS: &[&str] = &["momentum", "mean_reversion", "breakout"];

/// Deterministic stub predictions with partial outcomes for a dev database.
/// Every fifth prediction is left unresolved so the tri-state paths show up
/// in local output.
pub async fn seed_stub_records(
    pool: &sqlx::PgPool,
    as_of_date: NaiveDate,
    size: usize,
) -> anyhow::Result<u64> {
    anyhow::ensure!(
        (1..=2000).contains(&size),
        "seed size must be 1..=2000 (got {size})"
    );

    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let base = (as_of_date.num_days_from_ce() % 100) as f64;
    let mut inserted: u64 = 0;

    for i in 1..=size {
        let symbol = format!("STUB{i:04}");
        let previous_close = 50.0 + ((i as f64 + base) % 100.0);
        // Expected gain cycles through -5..=5 percent.
        let expected_gain = ((i % 11) as f64) - 5.0;
        let predicted_close = previous_close * (1.0 + expected_gain / 100.0);
        let predicted_high = predicted_close.max(previous_close) * 1.01;
        let predicted_low = predicted_close.min(previous_close) * 0.99;
        let confidence = 0.5 + ((i % 50) as f64) / 100.0;
        let market_regime = if i % 2 == 0 { "trending" } else { "choppy" };
        let signal = SIGNALS[i % SIGNALS.len()];

        let res = sqlx::query(
            "INSERT INTO predictions (id, prediction_date, symbol, rank, predicted_high, \
             predicted_low, predicted_close, previous_close, expected_gain_percentage, \
             confidence, market_regime, signal) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (prediction_date, symbol) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(as_of_date)
        .bind(&symbol)
        .bind(i as i32)
        .bind(predicted_high)
        .bind(predicted_low)
        .bind(predicted_close)
        .bind(previous_close)
        .bind(expected_gain)
        .bind(confidence)
        .bind(market_regime)
        .bind(signal)
        .execute(&mut *tx)
        .await
        .context("insert stub prediction failed")?;

        inserted += res.rows_affected();

        if i % 5 == 0 {
            continue;
        }

        // Realized move: mostly in the predicted direction, wrong every
        // third record, so accuracy metrics land strictly between 0 and 1.
        let realized_gain = if i % 3 == 0 {
            -expected_gain * 0.5
        } else {
            expected_gain * 1.2
        };
        let actual_close = previous_close * (1.0 + realized_gain / 100.0);
        let actual_high = actual_close.max(previous_close) * 1.015;
        let actual_low = actual_close.min(previous_close) * 0.985;

        sqlx::query(
            "INSERT INTO outcomes (prediction_id, actual_high, actual_low, actual_close, \
             direction_correct) \
             SELECT id, $3, $4, $5, NULL FROM predictions \
             WHERE prediction_date = $1 AND symbol = $2 \
             ON CONFLICT (prediction_id) DO NOTHING",
        )
        .bind(as_of_date)
        .bind(&symbol)
        .bind(actual_high)
        .bind(actual_low)
        .bind(actual_close)
        .execute(&mut *tx)
        .await
        .context("insert stub outcome failed")?;
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(inserted)
}
