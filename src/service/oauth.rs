use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("authorization code is empty")]
    EmptyCode,
    /// The request URL carries the app secret, so it is stripped before wrapping.
    #[error("oauth request failed: {0}")]
    Request(reqwest::Error),
    #[error("oauth provider rejected the code: {code} {message}")]
    Rejected { code: i64, message: String },
    #[error("oauth response carried no subject")]
    MissingSubject,
}

/// Turns a one-time OAuth code into the provider-scoped subject identifier.
#[async_trait]
pub trait OAuthExchange: Send + Sync {
    async fn exchange_code_for_subject(&self, code: &str) -> Result<String, OAuthError>;
}

#[derive(Deserialize)]
struct WechatTokenResponse {
    openid: Option<String>,
    errcode: Option<i64>,
    errmsg: Option<String>,
}

fn request_failed(err: reqwest::Error) -> OAuthError {
    OAuthError::Request(err.without_url())
}

pub struct WechatClient {
    http: reqwest::Client,
    app_id: String,
    app_secret: String,
    api_base: String,
}

impl WechatClient {
    pub fn new(app_id: String, app_secret: String, api_base: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            app_id,
            app_secret,
            api_base,
        }
    }
}

#[async_trait]
impl OAuthExchange for WechatClient {
    async fn exchange_code_for_subject(&self, code: &str) -> Result<String, OAuthError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(OAuthError::EmptyCode);
        }

        let response = self
            .http
            .get(format!(
                "{}/sns/oauth2/access_token",
                self.api_base.trim_end_matches('/')
            ))
            .query(&[
                ("appid", self.app_id.as_str()),
                ("secret", self.app_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(request_failed)?
            .json::<WechatTokenResponse>()
            .await
            .map_err(request_failed)?;

        // WeChat reports failures with HTTP 200 and an errcode body.
        if let Some(errcode) = response.errcode.filter(|code| *code != 0) {
            return Err(OAuthError::Rejected {
                code: errcode,
                message: response.errmsg.unwrap_or_default(),
            });
        }

        response
            .openid
            .filter(|openid| !openid.is_empty())
            .ok_or(OAuthError::MissingSubject)
    }
}

/// Offline stand-in for local stacks: the subject is derived from the code.
pub struct MockWechatClient;

#[async_trait]
impl OAuthExchange for MockWechatClient {
    async fn exchange_code_for_subject(&self, code: &str) -> Result<String, OAuthError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(OAuthError::EmptyCode);
        }
        Ok(format!("mock_openid_for_{}", code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> WechatClient {
        WechatClient::new("wx-app".to_string(), "wx-secret".to_string(), server.base_url())
    }

    #[tokio::test]
    async fn exchanges_code_for_openid() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/sns/oauth2/access_token")
                    .query_param("appid", "wx-app")
                    .query_param("secret", "wx-secret")
                    .query_param("code", "abc")
                    .query_param("grant_type", "authorization_code");
                then.status(200).json_body(json!({
                    "access_token": "at",
                    "expires_in": 7200,
                    "openid": "o-123",
                    "scope": "snsapi_login"
                }));
            })
            .await;

        let subject = client(&server).exchange_code_for_subject("abc").await.unwrap();
        assert_eq!(subject, "o-123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn errcode_body_is_a_rejection() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/sns/oauth2/access_token");
                then.status(200)
                    .json_body(json!({ "errcode": 40029, "errmsg": "invalid code" }));
            })
            .await;

        let err = client(&server)
            .exchange_code_for_subject("stale")
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::Rejected { code: 40029, .. }));
    }

    #[tokio::test]
    async fn upstream_failure_does_not_expose_the_secret() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/sns/oauth2/access_token");
                then.status(500);
            })
            .await;

        let err = client(&server)
            .exchange_code_for_subject("abc")
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::Request(_)));
        assert!(!err.to_string().contains("wx-secret"));
        assert!(!format!("{err:?}").contains("wx-secret"));
    }

    #[tokio::test]
    async fn empty_code_never_reaches_the_network() {
        let server = MockServer::start_async().await;
        let err = client(&server)
            .exchange_code_for_subject("  ")
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::EmptyCode));
    }

    #[tokio::test]
    async fn mock_client_is_deterministic() {
        let mock = MockWechatClient;
        assert_eq!(
            mock.exchange_code_for_subject("x1").await.unwrap(),
            "mock_openid_for_x1"
        );
        assert!(matches!(
            mock.exchange_code_for_subject("").await,
            Err(OAuthError::EmptyCode)
        ));
    }
}
