//! REST client for the bootstrap endpoints

use crate::error::{HttpError, HttpResult};
use crate::models::{CurrentUser, GatewayResponse, LoginRequest, LoginResponse};
use chord_common::{Credential, HttpConfig};
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;

/// HTTP client bound to one API base URL
#[derive(Debug, Clone)]
pub struct RestClient {
    base_url: String,
    client: Client,
}

impl RestClient {
    /// Build a client from configuration
    pub fn new(config: &HttpConfig) -> HttpResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Base URL every path is joined onto
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Exchange an email/password pair for an auth token
    pub async fn login(&self, email: &str, password: &str) -> HttpResult<Credential> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        let response = self.client.post(self.url("/auth/login")).json(&body).send().await?;
        let status = response.status();

        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            tracing::warn!(status = status.as_u16(), "Login rejected");
            return Err(HttpError::InvalidCredentials {
                status: status.as_u16(),
            });
        }
        if status != StatusCode::OK {
            return Err(HttpError::UnexpectedResponse {
                status: status.as_u16(),
            });
        }

        let login: LoginResponse = response.json().await?;
        let token = login.token.ok_or(HttpError::MissingToken)?;

        tracing::info!("Login succeeded");
        Ok(Credential::new(token))
    }

    /// Resolve the gateway WebSocket URL
    pub async fn gateway_url(&self, credential: &Credential, version: u8) -> HttpResult<String> {
        let response = self
            .client
            .get(self.url("/gateway"))
            .query(&[("encoding", "json".to_string()), ("v", version.to_string())])
            .header(AUTHORIZATION, credential.expose())
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(HttpError::Bootstrap {
                endpoint: "/gateway",
                status: response.status().as_u16(),
            });
        }

        let gateway: GatewayResponse = response.json().await?;
        tracing::debug!(url = %gateway.url, "Resolved gateway endpoint");
        Ok(gateway.url)
    }

    /// Fetch the profile of the user owning the token
    pub async fn current_user(&self, credential: &Credential) -> HttpResult<CurrentUser> {
        let response = self.me(credential).await?;
        let status = response.status();

        match status {
            StatusCode::OK => Ok(response.json().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(HttpError::InvalidCredentials {
                status: status.as_u16(),
            }),
            _ => Err(HttpError::Bootstrap {
                endpoint: "/users/@me",
                status: status.as_u16(),
            }),
        }
    }

    /// Probe whether the token is still accepted
    ///
    /// `Ok(false)` means the peer rejected the token; other failures are errors.
    pub async fn check_token(&self, credential: &Credential) -> HttpResult<bool> {
        let status = self.me(credential).await?.status();

        match status {
            StatusCode::OK => Ok(true),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(false),
            _ => Err(HttpError::Bootstrap {
                endpoint: "/users/@me",
                status: status.as_u16(),
            }),
        }
    }

    async fn me(&self, credential: &Credential) -> HttpResult<Response> {
        Ok(self
            .client
            .get(self.url("/users/@me"))
            .header(AUTHORIZATION, credential.expose())
            .send()
            .await?)
    }

    /// Invalidate the token (log out)
    pub async fn invalidate_token(&self, credential: &Credential) -> HttpResult<()> {
        let response = self
            .client
            .get(self.url("/auth/logout"))
            .header(AUTHORIZATION, credential.expose())
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(HttpError::Bootstrap {
                endpoint: "/auth/logout",
                status: response.status().as_u16(),
            });
        }

        tracing::info!("Token invalidated");
        Ok(())
    }

    /// Authenticated `POST` with a JSON body
    pub async fn post<T: Serialize + ?Sized>(
        &self,
        credential: &Credential,
        path: &str,
        body: &T,
    ) -> HttpResult<Value> {
        self.send_json(Method::POST, credential, path, body).await
    }

    /// Authenticated `PATCH` with a JSON body
    pub async fn patch<T: Serialize + ?Sized>(
        &self,
        credential: &Credential,
        path: &str,
        body: &T,
    ) -> HttpResult<Value> {
        self.send_json(Method::PATCH, credential, path, body).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        credential: &Credential,
        path: &str,
        body: &T,
    ) -> HttpResult<Value> {
        let response = self
            .client
            .request(method.clone(), self.url(path))
            .header(AUTHORIZATION, credential.expose())
            .json(body)
            .send()
            .await?;

        tracing::debug!(method = %method, path = %path, status = response.status().as_u16(), "HTTP request");

        classify(response).await
    }
}

/// Map an authenticated response onto the result taxonomy
async fn classify(response: Response) -> HttpResult<Value> {
    let status = response.status();

    if status.is_success() {
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        return Ok(serde_json::from_slice(&bytes).unwrap_or(Value::Null));
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let header_hint = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok());
        let body_hint = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|v| v.get("retry_after").and_then(Value::as_f64));

        tracing::warn!(retry_after = ?header_hint.or(body_hint), "Rate limited");
        return Err(HttpError::RateLimited {
            retry_after: header_hint.or(body_hint),
        });
    }

    if status.is_client_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(HttpError::RequestRejected {
            status: status.as_u16(),
            body,
        });
    }

    Err(HttpError::UnexpectedResponse {
        status: status.as_u16(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> RestClient {
        let config = HttpConfig {
            api_base_url: server.uri(),
            ..HttpConfig::default()
        };
        RestClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_login_returns_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(serde_json::json!({"email": "a@b.c", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "tok"})))
            .mount(&server)
            .await;

        let cred = client_for(&server).login("a@b.c", "pw").await.unwrap();
        assert_eq!(cred.expose(), "tok");
    }

    #[tokio::test]
    async fn test_login_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client_for(&server).login("a@b.c", "bad").await.unwrap_err();
        assert!(matches!(err, HttpError::InvalidCredentials { status: 401 }));
    }

    #[tokio::test]
    async fn test_login_bad_request_is_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let err = client_for(&server).login("a@b.c", "bad").await.unwrap_err();
        assert!(matches!(err, HttpError::InvalidCredentials { status: 400 }));
    }

    #[tokio::test]
    async fn test_login_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).login("a@b.c", "pw").await.unwrap_err();
        assert!(matches!(err, HttpError::UnexpectedResponse { status: 503 }));
    }

    #[tokio::test]
    async fn test_login_without_token_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let err = client_for(&server).login("a@b.c", "pw").await.unwrap_err();
        assert!(matches!(err, HttpError::MissingToken));
    }

    #[tokio::test]
    async fn test_gateway_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gateway"))
            .and(query_param("encoding", "json"))
            .and(query_param("v", "4"))
            .and(header("authorization", "tok"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"url": "wss://gateway.example"})),
            )
            .mount(&server)
            .await;

        let url = client_for(&server)
            .gateway_url(&Credential::new("tok"), 4)
            .await
            .unwrap();
        assert_eq!(url, "wss://gateway.example");
    }

    #[tokio::test]
    async fn test_gateway_url_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gateway"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .gateway_url(&Credential::new("tok"), 4)
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Bootstrap { endpoint: "/gateway", status: 500 }));
    }

    #[tokio::test]
    async fn test_check_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/@me"))
            .and(header("authorization", "good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "1", "username": "someone"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/@me"))
            .and(header("authorization", "stale"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.check_token(&Credential::new("good")).await.unwrap());
        assert!(!client.check_token(&Credential::new("stale")).await.unwrap());

        let user = client.current_user(&Credential::new("good")).await.unwrap();
        assert_eq!(user.username, "someone");
    }

    #[tokio::test]
    async fn test_invalidate_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/logout"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .invalidate_token(&Credential::new("tok"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_post_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "9"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/limited"))
            .respond_with(
                ResponseTemplate::new(429).set_body_json(serde_json::json!({"retry_after": 1.5})),
            )
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/users/@me"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let cred = Credential::new("tok");
        let body = serde_json::json!({"content": "hi"});

        let created = client.post(&cred, "/channels/1/messages", &body).await.unwrap();
        assert_eq!(created["id"], "9");

        let limited = client.post(&cred, "limited", &body).await.unwrap_err();
        assert!(matches!(limited, HttpError::RateLimited { retry_after: Some(r) } if (r - 1.5).abs() < f64::EPSILON));

        let rejected = client.patch(&cred, "/users/@me", &body).await.unwrap_err();
        assert!(matches!(rejected, HttpError::RequestRejected { status: 403, ref body } if body == "forbidden"));

        let broken = client.post(&cred, "/broken", &body).await.unwrap_err();
        assert!(matches!(broken, HttpError::UnexpectedResponse { status: 502 }));
    }
}
