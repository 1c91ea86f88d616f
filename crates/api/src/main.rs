use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use hindsight_core::domain::calibration::CalibrationBand;
use hindsight_core::domain::metrics::{self, DailyMetrics, RollupMetrics};
use hindsight_core::domain::prediction::SkippedPrediction;
use hindsight_core::domain::recommend::{self, Recommendation};
use hindsight_core::domain::trend::{self, TrendPoint};

// Widest range a single trend/rollup request may cover.
const MAX_RANGE_DAYS: i64 = 366;

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

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match hindsight_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let state = AppState { pool };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics/latest", get(get_latest_metrics))
        .route("/metrics/:as_of_date", get(get_metrics_by_date))
        .route("/trend/:start/:end", get(get_trend))
        .route("/rollup/:start/:end", get(get_rollup))
        .route("/recommendations/:as_of_date", get(get_recommendations))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    pool: Option<PgPool>,
}

impl AppState {
    fn pool(&self) -> Result<&PgPool, StatusCode> {
        self.pool.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)
    }
}

fn internal_error(e: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&e);
    StatusCode::INTERNAL_SERVER_ERROR
}

fn parse_date(s: &str) -> Result<NaiveDate, StatusCode> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| StatusCode::BAD_REQUEST)
}

fn parse_range(start: &str, end: &str) -> Result<(NaiveDate, NaiveDate), StatusCode> {
    let start = parse_date(start)?;
    let end = parse_date(end)?;
    if start > end || (end - start).num_days() >= MAX_RANGE_DAYS {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok((start, end))
}

#[derive(Debug, Serialize)]
struct ApiMetrics {
    as_of_date: NaiveDate,
    metrics: DailyMetrics,
    /// Display band for the calibration gap; null while unresolved.
    calibration_band: Option<CalibrationBand>,
    /// Predictions excluded from aggregation, with the violated invariant.
    skipped: Vec<SkippedPrediction>,
}

#[derive(Debug, Serialize)]
struct ApiRun {
    run_id: Uuid,
    as_of_date: NaiveDate,
    generated_at: DateTime<Utc>,
    metrics: DailyMetrics,
    skipped: Vec<SkippedPrediction>,
}

#[derive(Debug, Serialize)]
struct ApiTrend {
    start: NaiveDate,
    end: NaiveDate,
    points: Vec<TrendPoint>,
    skipped: Vec<SkippedPrediction>,
}

#[derive(Debug, Serialize)]
struct ApiRollup {
    rollup: RollupMetrics,
    skipped: Vec<SkippedPrediction>,
}

#[derive(Debug, Serialize)]
struct ApiRecommendations {
    as_of_date: NaiveDate,
    recommendations: Vec<Recommendation>,
    metrics: DailyMetrics,
}

/// Metrics recomputed fresh from stored records. A date with no stored
/// predictions is a valid empty day, not a 404; absence of data is a state
/// the metrics model represents.
async fn get_metrics_by_date(
    State(state): State<AppState>,
    Path(as_of_date): Path<String>,
) -> Result<Json<ApiMetrics>, StatusCode> {
    let pool = state.pool()?;
    let as_of_date = parse_date(&as_of_date)?;

    let evaluated = hindsight_core::evaluate::evaluate_date(pool, as_of_date)
        .await
        .map_err(internal_error)?;

    Ok(Json(ApiMetrics {
        as_of_date,
        calibration_band: evaluated
            .metrics
            .confidence_calibration
            .map(CalibrationBand::from_gap),
        metrics: evaluated.metrics,
        skipped: evaluated.skipped,
    }))
}

/// Most recent persisted evaluation run, as the worker recorded it.
async fn get_latest_metrics(
    State(state): State<AppState>,
) -> Result<Json<ApiRun>, StatusCode> {
    let pool = state.pool()?;

    let run = hindsight_core::storage::runs::fetch_latest_success(pool)
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ApiRun {
        run_id: run.run_id,
        as_of_date: run.as_of_date,
        generated_at: run.generated_at,
        metrics: run.metrics,
        skipped: run.skipped,
    }))
}

async fn get_trend(
    State(state): State<AppState>,
    Path((start, end)): Path<(String, String)>,
) -> Result<Json<ApiTrend>, StatusCode> {
    let pool = state.pool()?;
    let (start, end) = parse_range(&start, &end)?;

    let (days, skipped) = hindsight_core::evaluate::classified_range(pool, start, end)
        .await
        .map_err(internal_error)?;

    let points = trend::build_trend(start, end, &days).map_err(internal_error)?;

    Ok(Json(ApiTrend {
        start,
        end,
        points,
        skipped,
    }))
}

async fn get_rollup(
    State(state): State<AppState>,
    Path((start, end)): Path<(String, String)>,
) -> Result<Json<ApiRollup>, StatusCode> {
    let pool = state.pool()?;
    let (start, end) = parse_range(&start, &end)?;

    let (days, skipped) = hindsight_core::evaluate::metrics_range(pool, start, end)
        .await
        .map_err(internal_error)?;

    Ok(Json(ApiRollup {
        rollup: metrics::rollup(start, end, &days),
        skipped,
    }))
}

async fn get_recommendations(
    State(state): State<AppState>,
    Path(as_of_date): Path<String>,
) -> Result<Json<ApiRecommendations>, StatusCode> {
    let pool = state.pool()?;
    let as_of_date = parse_date(&as_of_date)?;

    let evaluated = hindsight_core::evaluate::evaluate_date(pool, as_of_date)
        .await
        .map_err(internal_error)?;

    Ok(Json(ApiRecommendations {
        as_of_date,
        recommendations: recommend::recommendations(&evaluated.metrics),
        metrics: evaluated.metrics,
    }))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
