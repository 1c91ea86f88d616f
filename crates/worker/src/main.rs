use anyhow::Context;
use clap::Parser;
use hindsight_core::domain::recommend;
use hindsight_core::ingest::provider::HttpJsonFeed;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod ingest;
mod seed;

#[derive(Debug, Parser)]
#[command(name = "hindsight_worker")]
struct Args {
    /// Market as-of date (YYYY-MM-DD). Defaults to the last closed session.
    #[arg(long)]
    as_of_date: Option<String>,

    /// Fetch and evaluate provider data in memory, without the database.
    #[arg(long)]
    dry_run: bool,

    /// Evaluate stored records only; do not call the provider.
    #[arg(long)]
    skip_ingest: bool,

    /// Seed N deterministic stub records instead of calling the provider.
    #[arg(long)]
    seed: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = hindsight_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let as_of_date = hindsight_core::time::market::resolve_as_of_date(
        args.as_of_date.as_deref(),
        chrono::Utc::now(),
    )?;

    if args.dry_run {
        return ingest::dry_run(&settings, as_of_date).await;
    }

    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    hindsight_core::storage::migrate(&pool).await?;

    let acquired =
        hindsight_core::storage::lock::try_acquire_run_lock(&pool, as_of_date).await?;
    if !acquired {
        tracing::warn!(%as_of_date, "as_of_date lock not acquired; another run in progress");
        return Ok(());
    }

    let result = run_eod(&pool, &settings, &args, as_of_date).await;

    match result {
        Ok(run_id) => {
            tracing::info!(%as_of_date, %run_id, "persisted daily metrics run");
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            match hindsight_core::storage::runs::persist_failure(
                &pool,
                as_of_date,
                &format!("{err:#}"),
            )
            .await
            {
                Ok(run_id) => {
                    tracing::error!(%as_of_date, %run_id, error = %err, "evaluation run failed");
                }
                Err(persist_err) => {
                    tracing::error!(
                        %as_of_date,
                        error = %err,
                        persist_error = %persist_err,
                        "evaluation run failed and the failure could not be recorded"
                    );
                }
            }
        }
    }

    let _ = hindsight_core::storage::lock::release_run_lock(&pool, as_of_date).await;
    Ok(())
}

async fn run_eod(
    pool: &sqlx::PgPool,
    settings: &hindsight_core::config::Settings,
    args: &Args,
    as_of_date: chrono::NaiveDate,
) -> anyhow::Result<uuid::Uuid> {
    if let Some(size) = args.seed {
        let seeded = seed::seed_stub_records(pool, as_of_date, size).await?;
        tracing::info!(%as_of_date, seeded, "seeded stub records");
    } else if args.skip_ingest {
        tracing::info!(%as_of_date, "provider ingest skipped by flag");
    } else if settings.provider_base_url.is_some() {
        let feed = HttpJsonFeed::from_settings(settings)?;
        ingest::ingest_day(pool, &feed, as_of_date).await?;
    } else {
        tracing::info!(%as_of_date, "PROVIDER_BASE_URL not set; evaluating stored records only");
    }

    let evaluated = hindsight_core::evaluate::evaluate_date(pool, as_of_date).await?;
    let recommendations = recommend::recommendations(&evaluated.metrics);

    let resolved = evaluated
        .classified
        .iter()
        .filter(|c| c.is_resolved())
        .count();

    tracing::info!(
        %as_of_date,
        total_predictions = evaluated.metrics.total_predictions,
        resolved,
        directional_accuracy = ?evaluated.metrics.directional_accuracy,
        confidence_calibration = ?evaluated.metrics.confidence_calibration,
        skipped = evaluated.skipped.len(),
        recommendations = recommendations.len(),
        "evaluated day"
    );

    hindsight_core::storage::runs::persist_success(pool, &evaluated.metrics, &evaluated.skipped)
        .await
}

fn init_sentry(
    settings: &hindsight_core::config::Settings,
) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
