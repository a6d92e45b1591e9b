// Major Income - Web Server
// Read-only REST API over the stored snapshot

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use clap::Parser;
use major_income::logging::init_logging;
use major_income::{Config, IncomeStore, MajorIncomeRecord, SqliteStore, StoreError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "income-server", about = "Serve stored major income data as JSON")]
struct Args {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind (overrides config)
    #[arg(long)]
    bind: Option<String>,
}

/// Shared application state. The store is only a path; each request opens
/// its own connection.
#[derive(Clone)]
struct AppState {
    store: Arc<SqliteStore>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Major response (simplified for API)
#[derive(Serialize, Deserialize)]
struct MajorResponse {
    id: String,
    major: String,
    income: u64,
    updated_at: String,
}

impl From<MajorIncomeRecord> for MajorResponse {
    fn from(record: MajorIncomeRecord) -> Self {
        Self {
            id: record.id.to_string(),
            major: record.major,
            income: record.income,
            updated_at: record.timestamp.to_rfc3339(),
        }
    }
}

#[derive(Deserialize)]
struct RangeParams {
    min: u64,
    max: u64,
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(ApiResponse::<()>::err(message))).into_response()
}

/// Run a blocking store call off the async runtime and map its outcome
async fn with_store<T, F>(state: AppState, f: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(&SqliteStore) -> Result<T, StoreError> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || f(&state.store)).await;

    match result {
        Ok(Ok(data)) => (StatusCode::OK, Json(ApiResponse::ok(data))).into_response(),
        Ok(Err(e @ StoreError::InvalidRange { .. })) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Ok(Err(e)) => {
            error!(error = %e, "store query failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            error!(error = %e, "store task panicked");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
        }
    }
}

fn to_responses(records: Vec<MajorIncomeRecord>) -> Vec<MajorResponse> {
    records.into_iter().map(MajorResponse::from).collect()
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/majors - All majors, highest income first
async fn get_majors(State(state): State<AppState>) -> Response {
    with_store(state, |store| store.get_all().map(to_responses)).await
}

/// GET /api/majors/top/:n
async fn get_top_majors(State(state): State<AppState>, Path(n): Path<usize>) -> Response {
    with_store(state, move |store| store.get_top_n(n).map(to_responses)).await
}

/// GET /api/majors/range?min=&max=
async fn get_majors_in_range(
    State(state): State<AppState>,
    Query(range): Query<RangeParams>,
) -> Response {
    with_store(state, move |store| {
        store
            .get_by_income_range(range.min, range.max)
            .map(to_responses)
    })
    .await
}

/// GET /api/majors/name/:major
async fn get_major(State(state): State<AppState>, Path(major): Path<String>) -> Response {
    let lookup = major.clone();
    let result = tokio::task::spawn_blocking(move || state.store.get_by_name(&lookup)).await;

    match result {
        Ok(Ok(Some(record))) => {
            (StatusCode::OK, Json(ApiResponse::ok(MajorResponse::from(record)))).into_response()
        }
        Ok(Ok(None)) => error_response(
            StatusCode::NOT_FOUND,
            format!("Major '{}' not found", major),
        ),
        Ok(Err(e)) => {
            error!(error = %e, "store query failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => {
            error!(error = %e, "store task panicked");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
        }
    }
}

/// GET /api/stats - Count, average, min, max
async fn get_stats(State(state): State<AppState>) -> Response {
    with_store(state, |store| store.get_statistics()).await
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/majors", get(get_majors))
        .route("/majors/top/:n", get(get_top_majors))
        .route("/majors/range", get(get_majors_in_range))
        .route("/majors/name/:major", get(get_major))
        .route("/stats", get(get_stats))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    println!("🌐 Major Income - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = Config::load(args.config.as_deref())?;
    let store = config.store();

    if !store.path().exists() {
        eprintln!("❌ Database not found at {:?}", store.path());
        eprintln!("   Run: major-income run --url <URL>");
        eprintln!("   to import the dataset first.");
        std::process::exit(1);
    }
    println!("✓ Database: {:?}", store.path());

    let state = AppState {
        store: Arc::new(store),
    };

    let addr = args.bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(%addr, "server listening");
    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/majors", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, router(state)).await?;
    Ok(())
}
