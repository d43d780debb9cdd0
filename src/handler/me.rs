use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{error_response, middleware::AuthenticatedAccount, ErrorResponse};
use crate::{entities::accounts, state::AppState};

#[derive(Serialize, ToSchema)]
pub struct AccountResponse {
    pub id: Uuid,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub source: String,
    pub onboarded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_active_at: Option<DateTime<Utc>>,
}

impl From<accounts::Model> for AccountResponse {
    fn from(model: accounts::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            phone: model.phone,
            avatar_url: model.avatar_url,
            source: model.source,
            onboarded_at: model.onboarded_at.map(|dt| dt.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
            last_active_at: model.last_active_at.map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/me", get(me).delete(delete_me))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            super::middleware::require_bearer,
        ))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses(
        (status = 200, description = "Authenticated account", body = AccountResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "Account no longer exists", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "accounts"
)]
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(AuthenticatedAccount(account_id)): Extension<AuthenticatedAccount>,
) -> Response {
    match state.accounts().get(account_id).await {
        Ok(Some(account)) => Json(AccountResponse::from(account)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "not_found", "account not found"),
        Err(err) => {
            error!(%account_id, error = %err, "account lookup failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal error",
            )
        }
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/me",
    responses(
        (status = 204, description = "Account deleted"),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "Account no longer exists", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "accounts"
)]
pub async fn delete_me(
    State(state): State<Arc<AppState>>,
    Extension(AuthenticatedAccount(account_id)): Extension<AuthenticatedAccount>,
) -> Response {
    match state.accounts().soft_delete(account_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "not_found", "account not found"),
        Err(err) => {
            error!(%account_id, error = %err, "account delete failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal error",
            )
        }
    }
}
