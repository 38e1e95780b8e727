mod app_state;
mod auth;
mod config;
mod domain;
mod repositories;
mod router;
mod routes;
#[cfg(test)]
mod test_util;

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    auth::hash_password,
    repositories::{UserRepository, UserRepositoryImpl},
};

pub(crate) use app_state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "park_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::read_config().expect("Failed to read configuration");

    let connection_pool = SqlitePoolOptions::new()
        .connect_with(config.database.connect_options())
        .await
        .expect("Failed to connect to the database");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to run database migrations");

    seed_admin(&connection_pool, &config).await;

    let address = format!("{}:{}", config.application.host, config.application.port);
    let app = router::create(connection_pool, config).await;

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .expect("Failed to bind to address");
    tracing::info!("Listening on {}", address);

    axum::serve(listener, app).await.expect("Server error");
}

/// Seeds the configured admin account on first start. An existing account
/// with that username is left untouched.
async fn seed_admin(pool: &SqlitePool, config: &config::Settings) {
    let password_hash =
        hash_password(&config.auth.admin_password).expect("Failed to hash the admin password");

    let user_repo = UserRepositoryImpl::new(pool.clone());
    user_repo
        .ensure_admin(&config.auth.admin_username, &password_hash)
        .await
        .expect("Failed to seed the admin account");
}
