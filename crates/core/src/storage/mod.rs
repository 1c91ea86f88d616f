use anyhow::Context;

pub mod lock;
pub mod outcomes;
pub mod predictions;
pub mod runs;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}
