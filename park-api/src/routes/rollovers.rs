use axum::{extract::State, routing::get, Json, Router};
use axum_login::permission_required;
use tracing::instrument;

use crate::{
    auth::AuthBackend,
    domain::{Role, Rollover},
    repositories::MachineRepository,
    routes::ApiError,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_rollovers))
        .route_layer(permission_required!(AuthBackend, Role::Admin))
}

#[instrument(name = "GET /rollovers", skip(app_state))]
async fn get_rollovers(
    State(app_state): State<AppState>,
) -> Result<Json<Vec<Rollover>>, ApiError> {
    let rollovers = app_state.machine_repo.list_rollovers().await?;

    Ok(Json(rollovers))
}
