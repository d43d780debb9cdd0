use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::ToSchema;

use super::{error_response, me::AccountResponse, ErrorResponse};
use crate::{
    domain::{Provider, Source},
    service::auth::{AuthError, AuthOutput, LoginCredentials},
    state::AppState,
};

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub source: Option<Source>,
}

/// Provider-specific fields; which ones are required depends on `provider`.
#[derive(Default, Deserialize, ToSchema)]
pub struct CredentialsBody {
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone: Option<String>,
    pub code: Option<String>,
    pub id_token: Option<String>,
    pub source: Option<Source>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub provider: Provider,
    #[serde(default)]
    pub credentials: CredentialsBody,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub account: AccountResponse,
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
}

impl From<AuthOutput> for AuthResponse {
    fn from(output: AuthOutput) -> Self {
        Self {
            account: output.account.into(),
            token: output.token.token,
            token_type: "Bearer",
            expires_at: output.token.expires_at,
        }
    }
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/auth/login", post(login))
        .with_state(state)
}

fn required(value: Option<String>, field: &'static str) -> Result<String, Response> {
    value.ok_or_else(|| {
        error_response(
            StatusCode::BAD_REQUEST,
            "invalid_input",
            format!("{field} is required"),
        )
    })
}

impl CredentialsBody {
    fn into_credentials(self, provider: Provider) -> Result<LoginCredentials, Response> {
        let source = self.source.unwrap_or_default();
        Ok(match provider {
            Provider::Email => LoginCredentials::Email {
                email: required(self.email, "email")?,
                password: required(self.password, "password")?,
            },
            Provider::Phone => LoginCredentials::Phone {
                phone: required(self.phone, "phone")?,
                code: required(self.code, "code")?,
                source,
            },
            Provider::Wechat => LoginCredentials::Wechat {
                code: required(self.code, "code")?,
                source,
            },
            Provider::Google => LoginCredentials::Google {
                id_token: self.id_token.unwrap_or_default(),
            },
        })
    }
}

pub(crate) fn auth_error_response(err: AuthError) -> Response {
    let status = match &err {
        AuthError::IdentityAlreadyExists => StatusCode::CONFLICT,
        AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AuthError::UnsupportedProvider(_) => StatusCode::NOT_IMPLEMENTED,
        AuthError::ExternalExchangeFailed(_) => StatusCode::BAD_GATEWAY,
        AuthError::VerificationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::ConsistencyFault { .. }
        | AuthError::Password(_)
        | AuthError::Token(_)
        | AuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    // Server-side detail stays in the log; callers get a fixed message.
    let message = match status {
        StatusCode::INTERNAL_SERVER_ERROR => {
            error!(error = %err, "authentication failed");
            "internal error".to_string()
        }
        StatusCode::BAD_GATEWAY => {
            warn!(error = %err, "upstream failure during authentication");
            "upstream provider unavailable".to_string()
        }
        StatusCode::SERVICE_UNAVAILABLE => {
            warn!(error = %err, "verification store unavailable");
            "verification service unavailable".to_string()
        }
        _ => err.to_string(),
    };

    error_response(status, err.code(), message)
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid payload", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Response {
    match state
        .auth()
        .register_with_email(
            &payload.email,
            &payload.password,
            payload.source.unwrap_or_default(),
        )
        .await
    {
        Ok(output) => (StatusCode::CREATED, Json(AuthResponse::from(output))).into_response(),
        Err(err) => auth_error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in or registered", body = AuthResponse),
        (status = 400, description = "Invalid payload", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 501, description = "Provider not supported", body = ErrorResponse),
        (status = 502, description = "Provider exchange failed", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Response {
    let credentials = match payload.credentials.into_credentials(payload.provider) {
        Ok(credentials) => credentials,
        Err(response) => return response,
    };

    match state.auth().resolve(credentials).await {
        Ok(output) => Json(AuthResponse::from(output)).into_response(),
        Err(err) => auth_error_response(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::oauth::{OAuthError, OAuthExchange, WechatClient};
    use httpmock::prelude::*;

    #[test]
    fn error_kinds_map_to_status_codes() {
        let cases = [
            (AuthError::IdentityAlreadyExists, StatusCode::CONFLICT),
            (AuthError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (AuthError::InvalidInput("email"), StatusCode::BAD_REQUEST),
            (
                AuthError::UnsupportedProvider(Provider::Google),
                StatusCode::NOT_IMPLEMENTED,
            ),
            (
                AuthError::ExternalExchangeFailed(OAuthError::MissingSubject),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AuthError::ConsistencyFault {
                    credential_id: uuid::Uuid::new_v4(),
                    account_id: uuid::Uuid::new_v4(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(auth_error_response(err).status(), status);
        }
    }

    #[tokio::test]
    async fn failed_wechat_exchange_answers_without_the_app_secret() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/sns/oauth2/access_token");
                then.status(500);
            })
            .await;
        let client = WechatClient::new(
            "wx-app".to_string(),
            "TOP-SECRET".to_string(),
            server.base_url(),
        );

        let err = client.exchange_code_for_subject("abc").await.unwrap_err();
        let response = auth_error_response(AuthError::from(err));
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["code"], "external_exchange_failed");
        assert_eq!(body["message"], "upstream provider unavailable");
        assert!(!body.to_string().contains("TOP-SECRET"));
    }

    #[test]
    fn missing_provider_fields_are_rejected() {
        let body = CredentialsBody {
            email: Some("a@example.com".to_string()),
            ..Default::default()
        };
        let response = body.into_credentials(Provider::Email).err().unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = CredentialsBody {
            code: Some("abc".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            body.into_credentials(Provider::Wechat),
            Ok(LoginCredentials::Wechat {
                source: Source::Web,
                ..
            })
        ));
    }
}
