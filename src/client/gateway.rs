//! HTTP gateway for JSON calls against the backend with consistent timeouts,
//! bearer propagation and error handling. Feature clients go through
//! [`ApiClient`] so no call site builds requests or inspects raw error bodies
//! on its own.

use super::{
    config::ClientConfig,
    errors::{ApiError, FieldErrors},
    interceptor::ResponseInterceptor,
};
use crate::{APP_USER_AGENT, features::auth::store::TokenStore};
use reqwest::{Client, Method, Response, header::CONTENT_TYPE};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Maximum number of error body characters surfaced to the UI.
const MAX_ERROR_CHARS: usize = 200;

/// Backend client that attaches the stored bearer token to every call.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    config: ClientConfig,
    store: Arc<dyn TokenStore>,
    interceptors: Vec<Arc<dyn ResponseInterceptor>>,
}

impl ApiClient {
    /// Builds a client with its own connection pool.
    ///
    /// # Errors
    /// Returns `ApiError::Config` if the HTTP client cannot be initialized.
    pub fn new(config: ClientConfig, store: Arc<dyn TokenStore>) -> Result<Self, ApiError> {
        let http = build_http_client(&config)?;
        Ok(Self::from_parts(http, config, store))
    }

    /// Builds a client around an existing connection pool.
    #[must_use]
    pub fn from_parts(http: Client, config: ClientConfig, store: Arc<dyn TokenStore>) -> Self {
        Self {
            http,
            config,
            store,
            interceptors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_interceptor(mut self, interceptor: Arc<dyn ResponseInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    #[must_use]
    pub fn store(&self) -> &dyn TokenStore {
        self.store.as_ref()
    }

    /// # Errors
    /// See [`ApiClient::request`].
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request::<(), T>(Method::GET, path, None).await
    }

    /// # Errors
    /// See [`ApiClient::request`].
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(Method::POST, path, Some(body)).await
    }

    /// # Errors
    /// See [`ApiClient::request`].
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(Method::PUT, path, Some(body)).await
    }

    /// # Errors
    /// See [`ApiClient::request`].
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request::<(), T>(Method::DELETE, path, None).await
    }

    /// Sends a JSON request and decodes the JSON answer.
    ///
    /// Successful answers are trusted as-is; an empty body decodes as `null`,
    /// so `()` and `Option<T>` work for `204` responses.
    ///
    /// # Errors
    /// - `ApiError::Unauthorized` on `401`, after the interceptors have run.
    /// - `ApiError::Http` for any other non-2xx status.
    /// - `ApiError::Network`/`ApiError::Timeout` when no answer arrived.
    /// - `ApiError::Parse`/`ApiError::Serialization` for body coding failures.
    #[instrument(skip(self, body))]
    pub async fn request<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.config.url(path);
        let mut builder = self
            .http
            .request(method, &url)
            .header(CONTENT_TYPE, "application/json");

        if let Some(token) = self.store.get() {
            builder = builder.bearer_auth(token.expose());
        }

        if let Some(body) = body {
            let payload = serde_json::to_vec(body).map_err(|err| {
                ApiError::Serialization(format!("Failed to encode request: {err}"))
            })?;
            builder = builder.body(payload);
        }

        let response = builder.send().await.map_err(map_request_error)?;
        let status = response.status().as_u16();
        debug!(status, "backend answered");

        for interceptor in &self.interceptors {
            if let Some(err) = interceptor.intercept(status, self.store.as_ref()) {
                return Err(err);
            }
        }

        handle_json_response(response).await
    }
}

/// Builds the pooled HTTP client with the configured timeout.
///
/// # Errors
/// Returns `ApiError::Config` if the TLS backend cannot be initialized.
pub fn build_http_client(config: &ClientConfig) -> Result<Client, ApiError> {
    Client::builder()
        .user_agent(APP_USER_AGENT)
        .timeout(config.timeout())
        .build()
        .map_err(|err| ApiError::Config(format!("Failed to build HTTP client: {err}")))
}

/// Maps transport errors into `ApiError` variants with timeout detection.
pub(crate) fn map_request_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout("Request timed out. Please try again.".to_string())
    } else if err.is_decode() {
        ApiError::Parse(format!("Failed to decode response: {err}"))
    } else {
        ApiError::Network(format!("Unable to reach the server: {err}"))
    }
}

async fn handle_json_response<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(map_request_error)?;

    if status.is_success() {
        decode_body(&bytes)
    } else if status.as_u16() == 401 {
        Err(ApiError::Unauthorized)
    } else {
        Err(http_error(status.as_u16(), &bytes))
    }
}

fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    let body: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        bytes
    };
    serde_json::from_slice(body)
        .map_err(|err| ApiError::Parse(format!("Failed to decode response: {err}")))
}

/// Builds an HTTP failure from the backend error body, if it has one.
pub(crate) fn http_error(status: u16, bytes: &[u8]) -> ApiError {
    let parsed: Option<Value> = serde_json::from_slice(bytes).ok();
    let message = parsed
        .as_ref()
        .and_then(error_message)
        .map_or_else(|| format!("HTTP {status}"), |message| truncate(&message));
    let details = parsed.as_ref().map(error_details).unwrap_or_default();

    ApiError::Http {
        status,
        message,
        details,
    }
}

fn error_message(body: &Value) -> Option<String> {
    ["detail", "message", "error"]
        .iter()
        .find_map(|key| match body.get(key)? {
            Value::String(text) => {
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            Value::Null => None,
            // FastAPI reports validation failures as a list under `detail`.
            other => Some(other.to_string()),
        })
}

fn error_details(body: &Value) -> FieldErrors {
    let Some(details) = body.get("details") else {
        return FieldErrors::new();
    };
    let fields = details.get("fieldErrors").unwrap_or(details);
    let Some(map) = fields.as_object() else {
        return FieldErrors::new();
    };

    map.iter()
        .filter_map(|(field, value)| field_message(value).map(|message| (field.clone(), message)))
        .collect()
}

fn field_message(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(items) => {
            let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        _ => None,
    }
}

fn truncate(message: &str) -> String {
    message.chars().take(MAX_ERROR_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::interceptor::{PendingNavigation, SIGN_IN_PATH, UnauthorizedInterceptor};
    use crate::features::auth::{store::MemoryTokenStore, types::SessionToken};
    use anyhow::Result;
    use serde_json::json;
    use std::{net::TcpListener, time::Duration};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn client_for(server: &MockServer, store: Arc<MemoryTokenStore>) -> Result<ApiClient> {
        let config = ClientConfig::new(server.uri());
        Ok(ApiClient::new(config, store)?)
    }

    #[tokio::test]
    async fn attaches_bearer_token_and_json_content_type() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tests"))
            .and(query_param("skip", "0"))
            .and(header("Authorization", "Bearer tok-123"))
            .and(header("Content-Type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::default());
        store.set(SessionToken::new("tok-123"), 7)?;
        let client = client_for(&server, store)?;

        let tests: Vec<Value> = client.get("/tests?skip=0").await?;
        assert!(tests.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn omits_authorization_without_token() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/register"))
            .and(body_json(json!({"name": "Ann"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "1"})))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemoryTokenStore::default()))?;
        let created: Value = client
            .post("/auth/register", &json!({"name": "Ann"}))
            .await?;
        assert_eq!(created["id"], "1");

        let requests = server.received_requests().await.unwrap_or_default();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("authorization").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn unauthorized_clears_store_and_navigates_once() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tests"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"detail": "Token expired"})),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::default());
        store.set(SessionToken::new("revoked"), 7)?;
        let navigation = Arc::new(PendingNavigation::default());
        let client = client_for(&server, store.clone())?
            .with_interceptor(Arc::new(UnauthorizedInterceptor::new(navigation.clone())));

        let result: Result<Value, ApiError> = client.get("/tests").await;

        assert_eq!(result, Err(ApiError::Unauthorized));
        assert!(store.get().is_none());
        assert_eq!(navigation.count(), 1);
        assert_eq!(navigation.target().as_deref(), Some(SIGN_IN_PATH));
        Ok(())
    }

    #[tokio::test]
    async fn http_errors_carry_backend_detail_or_status() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tests/404"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"detail": "Test not found"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tests/500"))
            .respond_with(ResponseTemplate::new(500).set_body_string("<html>boom</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemoryTokenStore::default()))?;

        let missing: Result<Value, ApiError> = client.get("/tests/404").await;
        assert_eq!(
            missing,
            Err(ApiError::Http {
                status: 404,
                message: "Test not found".to_string(),
                details: FieldErrors::new(),
            })
        );

        let broken: Result<Value, ApiError> = client.get("/tests/500").await;
        assert_eq!(
            broken,
            Err(ApiError::Http {
                status: 500,
                message: "HTTP 500".to_string(),
                details: FieldErrors::new(),
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn empty_success_body_decodes_as_unit() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/tests/7"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(MemoryTokenStore::default()))?;
        client.delete::<()>("/tests/7").await?;
        Ok(())
    }

    #[tokio::test]
    async fn slow_backend_is_reported_as_timeout() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let config = ClientConfig::new(server.uri()).with_timeout(Duration::from_millis(100));
        let client = ApiClient::new(config, Arc::new(MemoryTokenStore::default()))?;
        let result: Result<Value, ApiError> = client.get("/auth/me").await;
        assert!(matches!(result, Err(ApiError::Timeout(_))));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_network_error() -> Result<()> {
        let config = ClientConfig::new("http://127.0.0.1:9".to_string())
            .with_timeout(Duration::from_secs(2));
        let client = ApiClient::new(config, Arc::new(MemoryTokenStore::default()))?;
        let result: Result<Value, ApiError> = client.get("/tests").await;
        assert!(matches!(
            result,
            Err(ApiError::Network(_) | ApiError::Timeout(_))
        ));
        Ok(())
    }

    #[test]
    fn http_error_extracts_field_details() {
        let body = json!({
            "error": "Validation error",
            "details": {"fieldErrors": {"password": ["Too short", "Needs a digit"]}}
        });
        let error = http_error(400, body.to_string().as_bytes());
        let ApiError::Http {
            status,
            message,
            details,
        } = error
        else {
            panic!("expected an HTTP error");
        };
        assert_eq!(status, 400);
        assert_eq!(message, "Validation error");
        assert_eq!(
            details.get("password").map(String::as_str),
            Some("Too short; Needs a digit")
        );
    }

    #[test]
    fn http_error_truncates_long_messages() {
        let body = json!({"message": "x".repeat(500)});
        let error = http_error(502, body.to_string().as_bytes());
        let ApiError::Http { message, .. } = error else {
            panic!("expected an HTTP error");
        };
        assert_eq!(message.len(), MAX_ERROR_CHARS);
    }
}
