use std::sync::Arc;

use axum::http::Method;
use axum::{middleware, Router};
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{guard, PolicyRegistry};
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{analytics, auth, health, organizations, projects, search, tasks, workspaces};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub policies: Arc<PolicyRegistry>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, event_bus: EventBus) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            policies: Arc::new(PolicyRegistry::standard()),
            event_bus,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;

    let (event_bus, event_rx) = init_event_bus();
    tokio::spawn(start_activity_listener(event_rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    // The authorization guard wraps every route; operations without a
    // policy registry entry pass through it untouched.
    let router = Router::new()
        .merge(health::routes())
        .merge(auth::routes())
        .merge(organizations::routes())
        .merge(workspaces::routes())
        .merge(projects::routes())
        .merge(tasks::routes())
        .merge(analytics::routes())
        .merge(search::routes())
        .layer(middleware::from_fn_with_state(state.clone(), guard::enforce))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(router)
}
