use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use axum_extra::extract::cookie::SameSite;
use axum_login::{
    login_required,
    tower_sessions::{CachingSessionStore, ExpiredDeletion, Expiry, SessionManagerLayer},
    AuthManagerLayer, AuthManagerLayerBuilder,
};
use sqlx::SqlitePool;
use time::Duration;
use tokio::sync::mpsc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tower_sessions_moka_store::MokaStore;
use tower_sessions_sqlx_store::SqliteStore;

type SessionStore = CachingSessionStore<MokaStore, SqliteStore>;

use crate::{
    app_state::AppState,
    auth::{self, AuthBackend},
    config::Settings,
    domain::{GmailNotifier, LogNotifier, NotificationDispatcher, NotificationMessage, Notifier},
    routes,
};

pub async fn create(connection_pool: SqlitePool, config: Settings) -> Router<()> {
    let base_app = Router::new()
        .route("/", get(|| async { "Machine park API" }))
        .nest("/machines", routes::machines::router())
        .nest("/rollovers", routes::rollovers::router())
        .nest("/notifications", routes::notifications::router())
        .nest("/users", routes::users::router());

    // Everything except the auth routes requires a session.
    let auth_layer = new_auth_layer(connection_pool.clone()).await;
    let app_with_auth = base_app
        .route_layer(login_required!(AuthBackend))
        .nest("/auth", auth::router())
        .layer(auth_layer);

    // Create app state and hand the notification queue to the dispatcher.
    let (notification_tx, notification_rx) = mpsc::channel::<NotificationMessage>(256);
    let app_state = AppState::new(connection_pool, &config, notification_tx);

    let notifier: Arc<dyn Notifier> = if config.mail.enabled {
        let credentials = gmail::Credentials::from_authorized_user_file(
            &config.mail.credentials_file,
        )
        .expect("Failed to load Gmail credentials");
        Arc::new(GmailNotifier::new(gmail::GmailClient::new(credentials)))
    } else {
        Arc::new(LogNotifier)
    };
    let dispatcher =
        NotificationDispatcher::new(app_state.notification_repo.clone(), notifier);
    tokio::spawn(async move { dispatcher.run(notification_rx).await });

    // Finally, wrap the app with tracing layer, state and CORS
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(["content-type".parse().unwrap()])
        .allow_credentials(true)
        .allow_origin(
            config
                .application
                .app_url
                .parse::<HeaderValue>()
                .expect("Invalid app URL"),
        );
    app_with_auth
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
}

async fn new_auth_layer(connection_pool: SqlitePool) -> AuthManagerLayer<AuthBackend, SessionStore> {
    // Use SqliteStore for DB-backed sessions that persist across restarts
    let db_store = SqliteStore::new(connection_pool.clone());
    db_store
        .migrate()
        .await
        .expect("Failed to run session store migration");

    // Spawn background task to clean up expired sessions from DB
    let deletion_task = tokio::task::spawn(
        db_store
            .clone()
            .continuously_delete_expired(tokio::time::Duration::from_secs(60)),
    );
    // Detach the task so it runs independently
    drop(deletion_task);

    // Wrap with in-memory Moka cache to reduce DB reads for hot sessions
    let cache_store = MokaStore::new(Some(2_000));
    let session_store = CachingSessionStore::new(cache_store, db_store);

    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false) // todo: explore production values
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(Duration::days(7)));

    let backend = AuthBackend::new(connection_pool);
    AuthManagerLayerBuilder::new(backend, session_layer).build()
}
