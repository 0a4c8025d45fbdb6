use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sheetsync_core::services::DatabaseService;
use sheetsync_core::sheets::SpreadsheetClient;
use sheetsync_core::sync::{DrainOutcome, SyncDispatcher};
use sheetsync_core::{ChangeLogEntry, User, UserPayload, UserSnapshot};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::AppError;

const DEFAULT_CHANGES_LIMIT: usize = 50;
const MAX_CHANGES_LIMIT: usize = 500;

pub struct AppState<S> {
    pub db: DatabaseService,
    pub dispatcher: SyncDispatcher<S>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<S: SpreadsheetClient> AppState<S> {
    pub const fn new(db: DatabaseService, dispatcher: SyncDispatcher<S>) -> Self {
        Self { db, dispatcher }
    }
}

pub fn app_router<S: SpreadsheetClient + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook/sheet", post(sheet_webhook::<S>))
        .route(
            "/sync/table-to-sheet",
            get(drain_to_sheet::<S>).post(drain_to_sheet::<S>),
        )
        .route("/api/users", get(list_users::<S>))
        .route("/api/users/{id}", put(update_user::<S>))
        .route("/api/changes", get(list_changes::<S>))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

/// Webhook body: either the `{"data": {...}}` envelope sent by the sheet
/// script or the bare record.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WebhookBody {
    Envelope { data: UserPayload },
    Bare(UserPayload),
}

impl WebhookBody {
    fn into_payload(self) -> UserPayload {
        match self {
            Self::Envelope { data } | Self::Bare(data) => data,
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

async fn sheet_webhook<S: SpreadsheetClient + 'static>(
    State(state): State<AppState<S>>,
    Json(body): Json<WebhookBody>,
) -> Result<Json<StatusResponse>, AppError> {
    let user = state.db.ingest(body.into_payload()).await?;
    tracing::info!(endpoint = "webhook_sheet", user_id = user.id, "Ingested sheet edit");
    Ok(Json(StatusResponse { status: "ok" }))
}

/// Body of `/sync/table-to-sheet`.
///
/// `status` is `"no changes"` or `"synced"`. A synced body also carries the
/// `written` and `not_found` counts; clients should read `status` rather than
/// compare the whole body.
#[derive(Debug, Serialize)]
struct DrainResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    written: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    not_found: Option<usize>,
}

async fn drain_to_sheet<S: SpreadsheetClient + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<DrainResponse>, AppError> {
    let response = match state.dispatcher.drain().await? {
        DrainOutcome::NoChanges => DrainResponse {
            status: "no changes",
            written: None,
            not_found: None,
        },
        DrainOutcome::Synced(report) => DrainResponse {
            status: "synced",
            written: Some(report.written),
            not_found: Some(report.not_found),
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct UsersResponse {
    users: Vec<UserSnapshot>,
}

async fn list_users<S: SpreadsheetClient + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<UsersResponse>, AppError> {
    let users = state.db.list_users().await?;
    Ok(Json(UsersResponse {
        users: users.iter().map(User::snapshot).collect(),
    }))
}

#[derive(Debug, Deserialize)]
struct UserEditRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Serialize)]
struct UserEditResponse {
    user: User,
    log_id: i64,
}

async fn update_user<S: SpreadsheetClient + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<i64>,
    Json(request): Json<UserEditRequest>,
) -> Result<Json<UserEditResponse>, AppError> {
    let snapshot = UserSnapshot {
        id,
        name: request.name,
        email: request.email,
    };
    let (user, entry) = state.db.save_user(&snapshot).await?;
    Ok(Json(UserEditResponse {
        user,
        log_id: entry.log_id,
    }))
}

#[derive(Debug, Deserialize)]
struct ChangesQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ChangesResponse {
    changes: Vec<ChangeLogEntry>,
}

async fn list_changes<S: SpreadsheetClient + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<ChangesQuery>,
) -> Result<Json<ChangesResponse>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_CHANGES_LIMIT);
    if limit == 0 || limit > MAX_CHANGES_LIMIT {
        return Err(AppError::bad_request(format!(
            "limit must be between 1 and {MAX_CHANGES_LIMIT}"
        )));
    }
    let changes = state.db.recent_changes(limit).await?;
    Ok(Json(ChangesResponse { changes }))
}
