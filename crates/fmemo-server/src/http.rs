//! HTTP query routes.
//!
//! ```text
//! GET /api/root          - Directory tree of the whole root
//! GET /api/tree?path=    - Directory tree below a root-relative path
//! GET /api/file/{*path}  - One memo file, raw and parsed
//! GET /api/files/{name}  - Parsed memos of a file in the root
//! GET /health            - Liveness and subscriber count
//! GET /ws                - WebSocket push of change notifications
//! ```

use crate::broadcast::SyncBroadcaster;
use crate::protocol::{ErrorBody, FileResponse, HealthResponse, MemosResponse, TreeQuery};
use crate::query::{QueryError, QueryService};
use crate::ws::ws_handler;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use fmemo_watcher::SnapshotStore;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

/// Shared state behind every route.
pub struct AppState {
    pub query: QueryService,
    pub broadcaster: Arc<SyncBroadcaster>,
    pub snapshot: Option<Arc<SnapshotStore>>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/root", get(get_root))
        .route("/api/tree", get(get_tree))
        .route("/api/file/{*path}", get(get_file))
        .route("/api/files/{name}", get(get_memos))
        .route("/health", get(health_check))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl QueryError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unsupported(_) | Self::OutsideRoot(_) => StatusCode::BAD_REQUEST,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Query failed: {}", self);
        } else {
            debug!("Query rejected: {}", self);
        }
        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

async fn get_root(State(state): State<Arc<AppState>>) -> Result<Response, QueryError> {
    let tree = state.query.get_tree("").await?;
    Ok(Json(&*tree).into_response())
}

async fn get_tree(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TreeQuery>,
) -> Result<Response, QueryError> {
    let tree = state.query.get_tree(&query.path).await?;
    Ok(Json(&*tree).into_response())
}

async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Json<FileResponse>, QueryError> {
    let file = state.query.get_file(&path).await?;
    Ok(Json(file.into()))
}

async fn get_memos(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<MemosResponse>, QueryError> {
    let file = state.query.get_file(&name).await?;
    Ok(Json(file.into()))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        subscribers: state.broadcaster.subscriber_count(),
        stale: state.snapshot.as_ref().is_some_and(|s| s.is_stale()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use fmemo_core::DirectoryTree;
    use fmemo_watcher::TreeOptions;
    use serde::de::DeserializeOwned;
    use std::fs;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    fn fixture() -> TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("top.md"), "# Top\nbody").unwrap();
        fs::write(
            dir.path().join("sub/nested file.fmemo"),
            "# Nested\n```sh\necho hi\n",
        )
        .unwrap();
        fs::write(dir.path().join("readme.txt"), "not a memo").unwrap();
        dir
    }

    fn router(dir: &TempDir) -> Router {
        create_router(Arc::new(AppState {
            query: QueryService::new(dir.path(), TreeOptions::default()),
            broadcaster: Arc::new(SyncBroadcaster::default()),
            snapshot: None,
        }))
    }

    async fn get<T: DeserializeOwned>(app: Router, uri: &str) -> (StatusCode, T) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_root_and_tree() {
        let dir = fixture();

        let (status, root): (_, DirectoryTree) = get(router(&dir), "/api/root").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(root.files, vec!["top.md"]);
        assert_eq!(root.subdirectories[0].files, vec!["nested file.fmemo"]);

        let (status, sub): (_, DirectoryTree) = get(router(&dir), "/api/tree?path=sub").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sub.path, "sub");

        let (status, same_root): (_, DirectoryTree) = get(router(&dir), "/api/tree").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(same_root, root);
    }

    #[tokio::test]
    async fn test_file_routes() {
        let dir = fixture();

        let (status, file): (_, FileResponse) =
            get(router(&dir), "/api/file/sub/nested%20file.fmemo").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(file.path, "sub/nested file.fmemo");
        assert_eq!(file.memos[0].title, "Nested");
        assert_eq!(file.memos[0].code_blocks[0].code, "echo hi\n");
        assert_eq!(file.warnings.len(), 1);

        let (status, memos): (_, MemosResponse) = get(router(&dir), "/api/files/top.md").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(memos.memos[0].content, "body");
        assert!(memos.last_modified.is_some());
    }

    #[tokio::test]
    async fn test_errors_are_json() {
        let dir = fixture();

        let (status, body): (_, ErrorBody) = get(router(&dir), "/api/file/missing.md").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.error.contains("missing.md"));

        let (status, _): (_, ErrorBody) = get(router(&dir), "/api/files/readme.txt").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _): (_, ErrorBody) = get(router(&dir), "/api/tree?path=../..").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _): (_, ErrorBody) = get(router(&dir), "/api/tree?path=nowhere").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health() {
        let dir = fixture();
        let broadcaster = Arc::new(SyncBroadcaster::default());
        let _sub = broadcaster.subscribe();
        let app = create_router(Arc::new(AppState {
            query: QueryService::new(dir.path(), TreeOptions::default()),
            broadcaster,
            snapshot: Some(Arc::new(SnapshotStore::new())),
        }));

        let (status, health): (_, HealthResponse) = get(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.status, "ok");
        assert_eq!(health.subscribers, 1);
        assert!(health.stale);
    }
}
