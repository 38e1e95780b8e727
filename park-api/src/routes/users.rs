use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use axum_login::permission_required;
use serde::Deserialize;
use tracing::instrument;

use crate::{
    auth::{hash_password, AuthBackend},
    domain::{Role, User},
    repositories::{NewUser, UserRepository},
    routes::ApiError,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_users))
        .route("/", post(add_user))
        .route_layer(permission_required!(AuthBackend, Role::Admin))
}

#[instrument(name = "GET /users", skip(app_state))]
async fn get_users(State(app_state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    let users = app_state.user_repo.list_users().await?;

    Ok(Json(users))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddUserBody {
    username: String,
    password: String,
    role: Role,
}

#[instrument(name = "POST /users", skip(app_state, body), fields(username = %body.username))]
async fn add_user(
    State(app_state): State<AppState>,
    Json(body): Json<AddUserBody>,
) -> Result<Json<User>, ApiError> {
    let username = body.username.trim();
    if username.is_empty() || body.password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }

    let password_hash = hash_password(&body.password).map_err(|err| {
        tracing::error!("Failed to hash password: {}", err);
        ApiError::internal("Failed to hash password")
    })?;

    let new_user = NewUser::new(username.to_string(), password_hash, body.role);
    let user = app_state.user_repo.insert_user(&new_user).await?;

    tracing::info!("Added user {}", user.username);

    Ok(Json(user))
}
