use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, OnceLock};

use axum::{extract::State, http::StatusCode, Json};
use sysinfo::System;
use tracing::info;

use crate::models::DiagnosticsResponse;
use crate::AppState;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Aggregate live session and process statistics
pub async fn diagnostics(
    State(app_state): State<Arc<AppState>>,
) -> (StatusCode, Json<DiagnosticsResponse>) {
    let (n_sessions, n_participants, n_authority_sessions) = app_state.registry.counts().await;
    let n_conn = app_state.connections.load(Ordering::Relaxed);

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new_all()));
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0),
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Conn: {}, Sessions: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        n_conn,
        n_sessions
    );

    (
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_conn,
            n_sessions,
            n_participants,
            n_authority_sessions,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    )
}
