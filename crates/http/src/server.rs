//! JSON view over a local notification log.

use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use chronicle_application::{ApplicationError, LocalNotificationLog, NotificationLog};

use crate::wire::{NotificationDto, SectionDto};

/// Build the notification-log router:
///
/// - `GET /notifications/{section_id}`: one JSON section
/// - `GET /notifications?start=S&limit=L`: a bare item array
pub fn router(log: Arc<LocalNotificationLog>) -> Router {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/:section_id", get(get_section))
        .layer(Extension(log))
}

/// Serve the router until the task is cancelled.
pub async fn serve(log: Arc<LocalNotificationLog>, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "serving notification log");
    axum::serve(listener, router(log)).await?;
    Ok(())
}

async fn get_section(
    Extension(log): Extension<Arc<LocalNotificationLog>>,
    Path(section_id): Path<String>,
) -> Response {
    match log.section(&section_id) {
        Ok(section) => (StatusCode::OK, Json(SectionDto::from(&section))).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct SelectQuery {
    start: u64,
    limit: usize,
}

async fn list_notifications(
    Extension(log): Extension<Arc<LocalNotificationLog>>,
    Query(query): Query<SelectQuery>,
) -> Response {
    match log.select(query.start, query.limit) {
        Ok(notifications) => {
            let items: Vec<NotificationDto> =
                notifications.iter().map(NotificationDto::from).collect();
            (StatusCode::OK, Json(items)).into_response()
        }
        Err(e) => error_response(e),
    }
}

fn error_response(error: ApplicationError) -> Response {
    let (status, code) = match &error {
        ApplicationError::Programming(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "datastore_failure"),
    };
    (
        status,
        Json(serde_json::json!({
            "error": code,
            "message": error.to_string(),
        })),
    )
        .into_response()
}
