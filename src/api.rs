//! # HTTP surface.
//!
//! | Route                | Meaning                                                  |
//! |----------------------|----------------------------------------------------------|
//! | `POST /sync`         | run a resync, `200 {"status","message"}` either way      |
//! | `GET /status`        | generation, assignments, loop status, latest failures    |
//! | `GET /{slot}`        | slot artifact bytes (`3` or `slot3.gif`), `404` if empty |
//! | `GET /gifs/{file}`   | same as above, path used by existing playback clients    |

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use crate::core::{StatusSnapshot, Supervisor};

/// Body of `POST /sync`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SyncResponse {
    pub status: &'static str,
    pub message: String,
}

/// Builds the router serving `sup`.
pub fn router(sup: Arc<Supervisor>) -> Router {
    Router::new()
        .route("/sync", post(sync))
        .route("/status", get(status))
        .route("/gifs/{file}", get(slot))
        .route("/{slot}", get(slot))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(sup)
}

async fn sync(State(sup): State<Arc<Supervisor>>) -> Json<SyncResponse> {
    let body = match sup.resync_for("http").await {
        Ok(report) => SyncResponse {
            status: "success",
            message: format!(
                "resync complete: generation {}, {} program(s) running, {} skipped",
                report.generation,
                report.assignments.len(),
                report.skipped.len()
            ),
        },
        Err(e) => SyncResponse {
            status: "error",
            message: e.to_string(),
        },
    };
    Json(body)
}

async fn status(State(sup): State<Arc<Supervisor>>) -> Json<StatusSnapshot> {
    Json(sup.status().await)
}

async fn slot(State(sup): State<Arc<Supervisor>>, Path(raw): Path<String>) -> Response {
    let ext = sup.config().artifact_extension.trim_start_matches('.').to_string();
    let Some(slot) = parse_slot(&raw, &ext) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match sup.read_slot(slot).await {
        Ok(Some(bytes)) => (
            [
                (header::CONTENT_TYPE, sup.artifact_content_type()),
                (header::CACHE_CONTROL, "no-store"),
            ],
            bytes,
        )
            .into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(slot, err = %e, "failed to read slot artifact");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Accepts `"3"` or `"slot3.<ext>"`.
fn parse_slot(raw: &str, ext: &str) -> Option<u32> {
    let digits = match raw.strip_prefix("slot") {
        Some(rest) => rest.strip_suffix(ext)?.strip_suffix('.')?,
        None => raw,
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::to_bytes;
    use std::path::Path as FsPath;

    fn supervisor(base: &FsPath) -> Arc<Supervisor> {
        Supervisor::builder(Config::default().rooted_at(base)).build()
    }

    #[test]
    fn slot_paths() {
        assert_eq!(parse_slot("3", "gif"), Some(3));
        assert_eq!(parse_slot("slot12.gif", "gif"), Some(12));
        assert_eq!(parse_slot("slot12.png", "gif"), None);
        assert_eq!(parse_slot("slot.gif", "gif"), None);
        assert_eq!(parse_slot("-1", "gif"), None);
        assert_eq!(parse_slot("status", "gif"), None);
    }

    #[tokio::test]
    async fn serves_slot_bytes_or_404() {
        let work = tempfile::tempdir().unwrap();
        let sup = supervisor(work.path());
        std::fs::create_dir_all(work.path().join("gifs")).unwrap();
        std::fs::write(work.path().join("gifs/slot0.gif"), b"GIF89a").unwrap();

        let resp = slot(State(sup.clone()), Path("0".into())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/gif");
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"GIF89a");

        let resp = slot(State(sup.clone()), Path("slot1.gif".into())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        sup.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn sync_reports_success_and_error() {
        let work = tempfile::tempdir().unwrap();
        let sup = supervisor(work.path());

        // No document: empty but successful.
        let Json(ok) = sync(State(sup.clone())).await;
        assert_eq!(ok.status, "success");
        assert!(ok.message.contains("0 program(s)"));

        let src = work.path().join("star_programs_cache");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("program_metadata.json"), "{ broken").unwrap();
        let Json(err) = sync(State(sup.clone())).await;
        assert_eq!(err.status, "error");

        let Json(snapshot) = status(State(sup.clone())).await;
        assert_eq!(snapshot.generation, 2);
        assert!(snapshot.assignments.is_empty());

        sup.shutdown().await.unwrap();
        let Json(closed) = sync(State(sup)).await;
        assert_eq!(closed.status, "error");
    }
}
