//! HTTP boundary over the task catalog.
//!
//! Thin by design: every handler reads one consistent catalog state, maps
//! it to JSON, and translates [`CatalogError`] into a status code
//! (`NotFound` → 404, `Unavailable` → 503). A background loop keeps the
//! snapshot fresh; request handling never waits on a refresh.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use serde::Deserialize;
use serde::Serialize;
use taskhunt_catalog::Catalog;
use taskhunt_catalog::CatalogError;
use taskhunt_catalog::CatalogStats;
use taskhunt_catalog::SnapshotInfo;
use taskhunt_catalog::SourceState;
use taskhunt_catalog::Task;
use taskhunt_catalog::TaskFilter;
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 500;
const DEFAULT_SEARCH_LIMIT: usize = 50;
const REFRESH_TICK: Duration = Duration::from_secs(30);

#[derive(Clone)]
struct AppState {
    catalog: Catalog,
}

pub fn router(catalog: Catalog) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/tasks", get(list_handler))
        .route("/api/tasks/search", get(search_handler))
        .route("/api/tasks/pr", get(pr_handler))
        .route("/api/tasks/{benchmark}/{task_id}", get(get_handler))
        .route("/api/stats", get(stats_handler))
        .with_state(AppState { catalog })
}

/// Bind, start the staleness loop, and serve until the process exits.
pub async fn serve(catalog: Catalog, bind: SocketAddr) -> anyhow::Result<()> {
    spawn_refresh_loop(catalog.clone());
    let listener = TcpListener::bind(bind).await?;
    let addr = listener.local_addr()?;
    info!("taskhunt api listening on {addr}");
    axum::serve(listener, router(catalog)).await?;
    Ok(())
}

fn spawn_refresh_loop(catalog: Catalog) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REFRESH_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if catalog.refresh_if_stale().await {
                debug!("triggered background catalog refresh");
            }
        }
    });
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

#[derive(Deserialize, Default)]
struct ListParams {
    benchmark: Option<String>,
    tag: Option<String>,
    state: Option<String>,
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct TaskListResponse {
    total: usize,
    snapshot: SnapshotInfo,
    tasks: Vec<Task>,
}

async fn list_handler(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<TaskListResponse>, AppError> {
    let source_state = params
        .state
        .as_deref()
        .map(parse_source_state)
        .transpose()?;
    let catalog_state = state.catalog.state().await?;
    let filter = TaskFilter {
        benchmark: params.benchmark,
        tag: params.tag,
        source_state,
    };
    let tasks = catalog_state.list(&filter);
    let total = tasks.len();
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let tasks: Vec<Task> = tasks.into_iter().skip(params.offset).take(limit).collect();
    Ok(Json(TaskListResponse {
        total,
        snapshot: catalog_state.info(),
        tasks,
    }))
}

#[derive(Deserialize)]
struct SearchParams {
    q: String,
    limit: Option<usize>,
}

async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<TaskListResponse>, AppError> {
    let catalog_state = state.catalog.state().await?;
    let mut tasks = catalog_state.search(&params.q);
    let total = tasks.len();
    tasks.truncate(params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).max(1));
    Ok(Json(TaskListResponse {
        total,
        snapshot: catalog_state.info(),
        tasks,
    }))
}

#[derive(Deserialize, Default)]
struct PrParams {
    benchmark: Option<String>,
    pr: Option<u64>,
}

async fn pr_handler(
    State(state): State<AppState>,
    Query(params): Query<PrParams>,
) -> Result<Json<TaskListResponse>, AppError> {
    let catalog_state = state.catalog.state().await?;
    let tasks: Vec<Task> = catalog_state
        .pr_tasks()
        .into_iter()
        .filter(|task| {
            params
                .benchmark
                .as_ref()
                .is_none_or(|benchmark| task.benchmark == *benchmark)
        })
        .filter(|task| params.pr.is_none_or(|number| task.pr_number == Some(number)))
        .collect();
    Ok(Json(TaskListResponse {
        total: tasks.len(),
        snapshot: catalog_state.info(),
        tasks,
    }))
}

#[derive(Deserialize, Default)]
struct GetParams {
    state: Option<String>,
}

async fn get_handler(
    State(state): State<AppState>,
    Path((benchmark, task_id)): Path<(String, String)>,
    Query(params): Query<GetParams>,
) -> Result<Json<Task>, AppError> {
    let task = match params.state.as_deref().map(parse_source_state).transpose()? {
        Some(source_state) => {
            state
                .catalog
                .get_with_state(&benchmark, &task_id, source_state)
                .await?
        }
        None => state.catalog.get(&benchmark, &task_id).await?,
    };
    Ok(Json(task))
}

async fn stats_handler(State(state): State<AppState>) -> Result<Json<CatalogStats>, AppError> {
    Ok(Json(state.catalog.stats().await?))
}

fn parse_source_state(value: &str) -> Result<SourceState, AppError> {
    match value.to_ascii_uppercase().as_str() {
        "COMMITTED" => Ok(SourceState::Committed),
        "PENDING_PR" => Ok(SourceState::PendingPr),
        other => Err(AppError::bad_request(format!(
            "unknown source state `{other}`; expected COMMITTED or PENDING_PR"
        ))),
    }
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        let status = match &err {
            CatalogError::NotFound { .. } => StatusCode::NOT_FOUND,
            CatalogError::Unavailable | CatalogError::Ingest(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}
