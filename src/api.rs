use crate::cache::CacheStats;
use crate::error::{ApiError, ApiResult};
use crate::minecraft::common::StatusRecord;
use crate::service::{RosterReport, ServerEntry, ServiceContext};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ServiceContext>,
    pub admin_token: Option<Arc<str>>,
    pub servers_file: Arc<PathBuf>,
}

#[derive(Deserialize, Default)]
pub struct AdminParams {
    token: Option<String>,
}

#[derive(Serialize)]
pub struct ServersResponse {
    servers: Vec<ServerEntry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/servers", get(list_servers))
        .route("/api/stats", get(stats_all))
        .route("/api/stats/direct/{*address}", get(stats_direct))
        .route("/api/stats/{name}", get(stats_by_name))
        .route("/api/admin/cache/clear", post(clear_cache))
        .route("/api/admin/cache/cleanup", post(cleanup_cache))
        .route("/api/admin/cache/stats", get(cache_stats))
        .route("/api/admin/reload", post(reload))
        .fallback(not_found)
        .with_state(state)
}

fn authorize(state: &AppState, params: &AdminParams) -> ApiResult<()> {
    match (&state.admin_token, &params.token) {
        (Some(expected), Some(given)) if **expected == *given.as_str() => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

pub async fn list_servers(State(state): State<AppState>) -> Json<ServersResponse> {
    Json(ServersResponse {
        servers: state.service.servers().await,
    })
}

pub async fn stats_all(State(state): State<AppState>) -> Json<RosterReport> {
    Json(state.service.query_all().await)
}

pub async fn stats_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<StatusRecord>> {
    Ok(Json(state.service.query_by_name(&name).await?))
}

pub async fn stats_direct(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<StatusRecord>> {
    Ok(Json(state.service.query_by_address(&address).await?))
}

pub async fn clear_cache(
    State(state): State<AppState>,
    Query(params): Query<AdminParams>,
) -> ApiResult<Json<serde_json::Value>> {
    authorize(&state, &params)?;
    let removed = state.service.cache().clear().await;
    info!("Cache cleared ({} entries)", removed);
    Ok(Json(json!({ "message": "cache cleared", "removed": removed })))
}

pub async fn cleanup_cache(
    State(state): State<AppState>,
    Query(params): Query<AdminParams>,
) -> ApiResult<Json<serde_json::Value>> {
    authorize(&state, &params)?;
    let removed = state.service.cache().cleanup().await;
    info!("Cache cleanup removed {} expired entries", removed);
    Ok(Json(json!({ "message": "expired entries removed", "removed": removed })))
}

pub async fn cache_stats(
    State(state): State<AppState>,
    Query(params): Query<AdminParams>,
) -> ApiResult<Json<CacheStats>> {
    authorize(&state, &params)?;
    Ok(Json(state.service.cache().stats().await))
}

pub async fn reload(
    State(state): State<AppState>,
    Query(params): Query<AdminParams>,
) -> ApiResult<Json<serde_json::Value>> {
    authorize(&state, &params)?;
    match state.service.reload_from_file(&state.servers_file).await {
        Ok(count) => {
            info!("Roster reloaded from {}", state.servers_file.display());
            Ok(Json(json!({ "message": "roster reloaded", "servers": count })))
        }
        Err(e) => {
            error!("Roster reload failed: {}", e);
            Err(ApiError::Internal(format!("reload failed: {}", e)))
        }
    }
}

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "resource not found",
            "endpoints": [
                "/health",
                "/api/servers",
                "/api/stats",
                "/api/stats/{name}",
                "/api/stats/direct/{host:port[:type]}",
                "/api/admin/cache/clear",
                "/api/admin/cache/cleanup",
                "/api/admin/cache/stats",
                "/api/admin/reload"
            ]
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::tests::StaticSrv;
    use crate::cache::TtlCache;
    use crate::minecraft::testing;
    use crate::service::ProbeSettings;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use std::time::Duration;
    use tower::ServiceExt;

    async fn app(lines: &[String]) -> Router {
        let service = Arc::new(ServiceContext::new(
            ProbeSettings {
                probe_timeout: Duration::from_millis(500),
                srv_timeout: Duration::from_millis(500),
                cache_enabled: true,
            },
            Arc::new(TtlCache::new(Duration::from_secs(60))),
            Arc::new(StaticSrv::default()),
        ));
        service.load_roster(lines).await;

        router(AppState {
            service,
            admin_token: Some(Arc::from("s3cret")),
            servers_file: Arc::new(PathBuf::from("/nonexistent/servers.txt")),
        })
    }

    async fn call(app: Router, method: Method, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = call(app(&[]).await, Method::GET, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn lists_roster() {
        let lines = vec!["hypixel=mc.hypixel.net:25565:java:false".to_string()];
        let (status, body) = call(app(&lines).await, Method::GET, "/api/servers").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["servers"][0]["name"], "hypixel");
        assert_eq!(body["servers"][0]["type"], "java");
        assert_eq!(body["servers"][0]["isSrv"], false);
    }

    #[tokio::test]
    async fn unknown_server_is_404() {
        let (status, body) = call(app(&[]).await, Method::GET, "/api/stats/ghost").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["online"], false);
    }

    #[tokio::test]
    async fn malformed_direct_address_is_400() {
        let (status, body) = call(app(&[]).await, Method::GET, "/api/stats/direct/localhost").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid request: missing port in 'localhost'");
        assert!(body["example"].is_string());
    }

    #[tokio::test]
    async fn direct_query_reaches_bedrock_server() {
        let addr = testing::spawn_bedrock(testing::bedrock_pong("MCPE;hi;686;1.21;1;5")).await;
        let uri = format!("/api/stats/direct/127.0.0.1:{}:bedrock", addr.port());

        let (status, body) = call(app(&[]).await, Method::GET, &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["online"], true);
        assert_eq!(body["type"], "bedrock");
        assert_eq!(body["players"]["max"], 5);
    }

    #[tokio::test]
    async fn stats_all_returns_offline_entries_with_200() {
        let (_socket, addr) = testing::silent_udp().await;
        let lines = vec![format!("quiet=127.0.0.1:{}:bedrock", addr.port())];

        let (status, body) = call(app(&lines).await, Method::GET, "/api/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["online"], 0);
        assert!(body["elapsedMs"].is_u64());
        assert!(body.get("elapsed_ms").is_none());
        assert_eq!(body["servers"]["quiet"]["online"], false);
        assert_eq!(body["servers"]["quiet"]["error_kind"], "probe_timeout");
    }

    #[tokio::test]
    async fn admin_routes_require_token() {
        let (status, _) = call(app(&[]).await, Method::POST, "/api/admin/cache/clear").await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) =
            call(app(&[]).await, Method::POST, "/api/admin/cache/clear?token=wrong").await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) =
            call(app(&[]).await, Method::POST, "/api/admin/cache/clear?token=s3cret").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], 0);

        let (status, body) =
            call(app(&[]).await, Method::GET, "/api/admin/cache/stats?token=s3cret").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hit_rate"], 0.0);
    }

    #[tokio::test]
    async fn reload_failure_is_500() {
        let (status, _) = call(app(&[]).await, Method::POST, "/api/admin/reload?token=s3cret").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn unknown_path_is_404_with_endpoints() {
        let (status, body) = call(app(&[]).await, Method::GET, "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["endpoints"].is_array());
    }
}
