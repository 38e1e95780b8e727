use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use axum_login::permission_required;
use serde::Deserialize;
use tracing::instrument;

use crate::{
    auth::AuthBackend,
    domain::{Notification, NotificationStatus, Role},
    repositories::NotificationRepository,
    routes::ApiError,
    AppState,
};

const DEFAULT_LIMIT: i64 = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_notifications))
        .route_layer(permission_required!(AuthBackend, Role::Admin))
}

#[derive(Debug, Deserialize)]
struct ListNotificationsQuery {
    status: Option<NotificationStatus>,
    limit: Option<i64>,
}

#[instrument(name = "GET /notifications", skip(app_state))]
async fn get_notifications(
    State(app_state): State<AppState>,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 500);
    let notifications = app_state
        .notification_repo
        .list_notifications(query.status, limit)
        .await?;

    Ok(Json(notifications))
}
