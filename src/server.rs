//! Control surface (C11): `GET /` status text and `GET /health` JSON, both with a default
//! cache-control directive. Non-GET on either route gets axum's built-in 405 via `MethodRouter`.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::header::CACHE_CONTROL;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use sysinfo::{Pid, System};

use crate::config::Config;
use crate::stats::totals::DatabaseTotals;
use crate::writelock::WriteLock;

const SERVICE_HEADER: &str = "x-galnet-collector";

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub write_lock: WriteLock,
    pub started_at: Instant,
    pub processed_count: Arc<std::sync::atomic::AtomicU64>,
    pub dedup_set_size: Arc<std::sync::atomic::AtomicUsize>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status_text))
        .route("/health", get(health))
        .with_state(state)
}

async fn status_text(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();
    let totals = read_latest_totals(&state.cfg);
    let memory_kb = current_process_memory_kb();

    let totals_line = totals
        .map(|t| {
            format!(
                "systems={} stations={} trade_orders={}",
                t.total_systems, t.station_count, t.trade_order_count
            )
        })
        .unwrap_or_else(|| "totals unavailable".to_string());

    let body = format!(
        "galnet-collector: up {uptime}s, {totals_line}, memory={memory_kb}KiB, \
         events_processed={}, dedup_set_size={}\n",
        state.processed_count.load(std::sync::atomic::Ordering::Relaxed),
        state.dedup_set_size.load(std::sync::atomic::Ordering::Relaxed),
    );

    with_default_headers(&state.cfg, body)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    version: &'static str,
    uptime: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    maintenance: Option<MaintenanceStatus>,
}

#[derive(Serialize)]
struct MaintenanceStatus {
    running: bool,
    duration: i64,
}

/// Never touches the databases, per the spec's latency guarantee — only the in-memory write-lock
/// and process clock.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let maintenance = state.write_lock.held_duration_secs().map(|duration| MaintenanceStatus { running: true, duration });

    let response = HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        maintenance,
    };

    with_default_headers(&state.cfg, Json(response))
}

fn with_default_headers<B: IntoResponse>(cfg: &Config, body: B) -> impl IntoResponse {
    let mut response = body.into_response();
    let headers = response.headers_mut();
    if let Ok(value) = cfg.cache_control.parse() {
        headers.insert(CACHE_CONTROL, value);
    }
    headers.insert(SERVICE_HEADER, axum::http::HeaderValue::from_static("galnet-collector"));
    response
}

fn read_latest_totals(cfg: &Config) -> Option<DatabaseTotals> {
    let path = cfg.cache_dir.join("database-stats.json");
    let text = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

fn current_process_memory_kb() -> u64 {
    let mut system = System::new();
    let pid = Pid::from_u32(std::process::id());
    system.refresh_process(pid);
    system.process(pid).map(|p| p.memory()).unwrap_or(0)
}
