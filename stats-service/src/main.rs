// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::{collections::HashMap, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use cardgame_common::{DEFAULT_USER_ID, StatsRecord, UserId, default_record, env_or, merge_update};
use chrono::Utc;
use lambda_http::run as lambda_run;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{debug, info, warn};

#[derive(Clone)]
struct AppState {
    stats: Arc<dyn StatsRepository>,
    asset_root: PathBuf,
}

#[async_trait]
trait StatsRepository: Send + Sync {
    /// Return the record for `user_id`, storing a zeroed one first if absent.
    async fn get_or_create(&self, user_id: &str) -> anyhow::Result<StatsRecord>;
    /// Merge `update` into the record key by key and stamp `lastPlayed`.
    async fn save(&self, user_id: &str, update: StatsRecord) -> anyhow::Result<StatsRecord>;
    async fn len(&self) -> anyhow::Result<usize>;
}

#[derive(Default)]
struct InMemoryStore {
    users: HashMap<UserId, StatsRecord>,
}

#[derive(Clone, Default)]
struct InMemoryStatsRepository {
    store: Arc<RwLock<InMemoryStore>>,
}

#[async_trait]
impl StatsRepository for InMemoryStatsRepository {
    async fn get_or_create(&self, user_id: &str) -> anyhow::Result<StatsRecord> {
        let mut store = self.store.write().await;
        let stats = store
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| {
                info!(user_id = %user_id, "created default stats record");
                default_record(Utc::now())
            });
        Ok(stats.clone())
    }

    async fn save(&self, user_id: &str, update: StatsRecord) -> anyhow::Result<StatsRecord> {
        let mut store = self.store.write().await;
        let now = Utc::now();
        let stats = store
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| default_record(now));
        merge_update(stats, update, now);
        Ok(stats.clone())
    }

    async fn len(&self) -> anyhow::Result<usize> {
        Ok(self.store.read().await.users.len())
    }
}

#[derive(Debug, Default, Deserialize)]
struct UserQuery {
    #[serde(default)]
    user_id: Option<String>,
}

impl UserQuery {
    fn into_user_id(self) -> UserId {
        self.user_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| DEFAULT_USER_ID.to_string())
    }
}

#[derive(Debug, Serialize)]
struct SaveStatsResponse {
    success: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "stats_service=debug,tower_http=info".to_string()),
        )
        .init();

    let asset_root = PathBuf::from(env_or("STATIC_ASSET_ROOT", "card-battle-game/dist"));
    if !asset_root.join("index.html").is_file() {
        warn!(asset_root = %asset_root.display(), "asset root has no index.html");
    }

    let state = AppState {
        stats: Arc::new(InMemoryStatsRepository::default()),
        asset_root,
    };

    let app = build_router(state);

    if std::env::var("AWS_LAMBDA_RUNTIME_API").is_ok() {
        info!("AWS Lambda runtime detected; running stats-service in lambda mode");
        lambda_run(app)
            .await
            .map_err(|e| anyhow::Error::msg(format!("lambda runtime error: {e}")))?;
        return Ok(());
    }

    let bind_addr = parse_bind_addr("STATS_SERVICE_BIND", "0.0.0.0:5000")?;
    info!(%bind_addr, "stats-service listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: AppState) -> Router {
    let assets = ServeDir::new(&state.asset_root);
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health))
        .route("/api/save-stats", post(save_stats_handler))
        .route("/api/get-stats", get(get_stats_handler))
        .fallback_service(assets)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn parse_bind_addr(var_name: &str, default: &str) -> anyhow::Result<SocketAddr> {
    env_or(var_name, default)
        .parse()
        .context(format!("invalid {var_name}"))
}

async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let users = state
        .stats
        .len()
        .await
        .map_err(|e| ApiError::internal(format!("failed to count stats records: {e:#}")))?;
    Ok(Json(
        serde_json::json!({"ok": true, "service": "stats-service", "users": users}),
    ))
}

async fn index_handler(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Html<String>, ApiError> {
    let user_id = query.into_user_id();
    state
        .stats
        .get_or_create(&user_id)
        .await
        .map_err(|e| ApiError::internal(format!("failed to load stats for {user_id}: {e:#}")))?;

    let index_path = state.asset_root.join("index.html");
    match tokio::fs::read_to_string(&index_path).await {
        Ok(body) => Ok(Html(body)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Err(ApiError::not_found(
            format!("{} not found", index_path.display()),
        )),
        Err(error) => Err(ApiError::internal(format!(
            "failed to read {}: {error}",
            index_path.display()
        ))),
    }
}

async fn get_stats_handler(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<StatsRecord>, ApiError> {
    let user_id = query.into_user_id();
    let stats = state
        .stats
        .get_or_create(&user_id)
        .await
        .map_err(|e| ApiError::internal(format!("failed to load stats for {user_id}: {e:#}")))?;
    Ok(Json(stats))
}

async fn save_stats_handler(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
    payload: Result<Json<StatsRecord>, JsonRejection>,
) -> Result<Json<SaveStatsResponse>, ApiError> {
    let user_id = query.into_user_id();
    // Any JSON object is accepted and stored as sent.
    let Json(update) = payload
        .map_err(|rejection| ApiError::bad_request(format!("invalid stats payload: {rejection}")))?;
    let keys = update.len();

    let stats = state
        .stats
        .save(&user_id, update)
        .await
        .map_err(|e| ApiError::internal(format!("failed to save stats for {user_id}: {e:#}")))?;

    debug!(
        user_id = %user_id,
        keys,
        record_keys = stats.len(),
        "stats saved"
    );
    Ok(Json(SaveStatsResponse { success: true }))
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = %self.status, message = %self.message, "request failed");
        (
            self.status,
            Json(serde_json::json!({"error": self.message})),
        )
            .into_response()
    }
}
