use axum::{middleware, Router};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod config;
pub mod db;
pub mod domain;
pub mod entities;
pub mod handler;
pub mod logging;
pub mod openapi;
pub mod repo;
pub mod schema;
pub mod service;
pub mod state;

#[cfg(test)]
mod test_support;

use state::AppState;

/// The full HTTP surface: API routes, swagger UI and request tracing.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(handler::health::routes())
        .merge(handler::auth::routes(state.clone()))
        .merge(handler::me::routes(state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .layer(middleware::from_fn(handler::middleware::trace_requests))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::config::ConfigServiceImpl;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn spawn_app() -> (String, state::Background) {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("JWT_SECRET", "http-test-secret"),
            ("AUTH_WECHAT_MOCK_ENABLED", "true"),
        ]);
        let config = ConfigServiceImpl::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
            .expect("config");
        let db = test_support::memory_db().await;
        let (state, background) = AppState::build(Arc::new(config), db)
            .await
            .expect("state");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app(state)).await.expect("serve");
        });
        (format!("http://{addr}"), background)
    }

    #[tokio::test]
    async fn register_login_and_me_over_http() {
        let (base, background) = spawn_app().await;
        let client = reqwest::Client::new();

        let health = client
            .get(format!("{base}/api/v1/health"))
            .send()
            .await
            .unwrap();
        assert_eq!(health.status(), 200);
        assert!(health.headers().contains_key("x-request-id"));

        let registered = client
            .post(format!("{base}/api/v1/auth/register"))
            .json(&json!({"email": "ivy@example.com", "password": "password-1", "source": "ios"}))
            .send()
            .await
            .unwrap();
        assert_eq!(registered.status(), 201);

        let duplicate = client
            .post(format!("{base}/api/v1/auth/register"))
            .json(&json!({"email": "ivy@example.com", "password": "password-1"}))
            .send()
            .await
            .unwrap();
        assert_eq!(duplicate.status(), 409);

        let wrong = client
            .post(format!("{base}/api/v1/auth/login"))
            .json(&json!({"provider": "email", "credentials": {"email": "ivy@example.com", "password": "nope-nope"}}))
            .send()
            .await
            .unwrap();
        assert_eq!(wrong.status(), 401);
        let body: Value = wrong.json().await.unwrap();
        assert_eq!(body["code"], "invalid_credentials");

        let login: Value = client
            .post(format!("{base}/api/v1/auth/login"))
            .json(&json!({"provider": "email", "credentials": {"email": "ivy@example.com", "password": "password-1"}}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let token = login["token"].as_str().unwrap().to_string();

        let me: Value = client
            .get(format!("{base}/api/v1/me"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(me["email"], "ivy@example.com");
        assert_eq!(me["source"], "ios");
        assert_eq!(me["id"], login["account"]["id"]);

        let anonymous = client
            .get(format!("{base}/api/v1/me"))
            .send()
            .await
            .unwrap();
        assert_eq!(anonymous.status(), 401);

        background.shutdown().await;
    }

    #[tokio::test]
    async fn provider_dispatch_over_http() {
        let (base, background) = spawn_app().await;
        let client = reqwest::Client::new();

        let mut ids = Vec::new();
        for _ in 0..2 {
            let response: Value = client
                .post(format!("{base}/api/v1/auth/login"))
                .json(&json!({"provider": "wechat", "credentials": {"code": "wx-code", "source": "wechat_ios"}}))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            ids.push(response["account"]["id"].clone());
        }
        assert_eq!(ids[0], ids[1]);

        let google = client
            .post(format!("{base}/api/v1/auth/login"))
            .json(&json!({"provider": "google", "credentials": {"id_token": "t"}}))
            .send()
            .await
            .unwrap();
        assert_eq!(google.status(), 501);

        // No Redis, so no OTP verifier.
        let phone = client
            .post(format!("{base}/api/v1/auth/login"))
            .json(&json!({"provider": "phone", "credentials": {"phone": "+8613800000000", "code": "1234"}}))
            .send()
            .await
            .unwrap();
        assert_eq!(phone.status(), 501);

        let missing = client
            .post(format!("{base}/api/v1/auth/login"))
            .json(&json!({"provider": "wechat", "credentials": {}}))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 400);

        background.shutdown().await;
    }
}
