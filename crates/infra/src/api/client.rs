//! API client with session-aware retry
//!
//! Every request is sent with the access token from the credential store.
//! A `401` triggers at most one token refresh, shared with every other
//! request that was rejected at the same time, followed by exactly one
//! replay of the original request.

use std::sync::Arc;

use clinicflow_common::auth::{bearer, RefreshCoordinator};
use clinicflow_domain::ApiConfig;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use super::errors::ApiError;
use super::request::{failure_message, ApiRequest, ApiResponse, RequestAttempt};
use crate::http::HttpClient;

/// API client that owns the refresh-and-replay pipeline
pub struct ApiClient {
    http_client: Arc<HttpClient>,
    coordinator: Arc<RefreshCoordinator>,
    config: ApiConfig,
}

impl ApiClient {
    /// Create a new API client
    ///
    /// The underlying `HttpClient` carries the coordinator's default
    /// credential, so requests sent without a stored token still pick up the
    /// ambient one.
    ///
    /// # Errors
    ///
    /// Returns error if the HttpClient cannot be created
    pub fn new(config: ApiConfig, coordinator: Arc<RefreshCoordinator>) -> Result<Self, ApiError> {
        let http_client = HttpClient::builder()
            .timeout(config.timeout())
            .max_attempts(config.max_attempts)
            .user_agent(config.user_agent.clone())
            .default_credential(coordinator.default_credential().clone())
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to build HttpClient: {}", e)))?;

        Ok(Self::with_http_client(config, Arc::new(http_client), coordinator))
    }

    /// Create a client over an existing transport.
    pub fn with_http_client(
        config: ApiConfig,
        http_client: Arc<HttpClient>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self { http_client, coordinator, config }
    }

    /// Create a builder for fluent configuration
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Send a request through the pipeline
    ///
    /// # Errors
    ///
    /// - `ApiError::Refresh` if the request was rejected and the token
    ///   refresh failed; the session has been cleared
    /// - `ApiError::AuthExhausted` if the replay was rejected as well
    /// - `ApiError::Status`, `ApiError::Transport` or `ApiError::Timeout` for
    ///   every other failure, unchanged
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut attempt =
            RequestAttempt::first(Arc::new(request), self.coordinator.store().access_token());

        loop {
            let response = self.dispatch(&attempt).await?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return self.finish(&attempt, response);
            }

            let request = attempt.request();
            if attempt.is_retry() {
                let err = ApiError::AuthExhausted {
                    method: request.method.to_string(),
                    path: request.path.clone(),
                };
                log_failure(request, Some(StatusCode::UNAUTHORIZED), &err);
                return Err(err);
            }

            debug!("Access token rejected; awaiting refresh");
            let token = match self.coordinator.ensure_fresh_token().await {
                Ok(token) => token,
                Err(refresh_err) => {
                    let err = ApiError::Refresh(refresh_err);
                    log_failure(request, Some(StatusCode::UNAUTHORIZED), &err);
                    return Err(err);
                }
            };

            attempt = attempt.replay(token);
        }
    }

    /// Execute a GET request
    ///
    /// # Errors
    ///
    /// Returns error if request fails or response cannot be deserialized
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    /// Execute a POST request with a JSON body
    ///
    /// # Errors
    ///
    /// Returns error if request fails or response cannot be deserialized
    pub async fn post<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<R, ApiError> {
        self.send(ApiRequest::post(path).json(body)?).await?.json()
    }

    /// Execute a PUT request with a JSON body
    ///
    /// # Errors
    ///
    /// Returns error if request fails or response cannot be deserialized
    pub async fn put<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<R, ApiError> {
        self.send(ApiRequest::put(path).json(body)?).await?.json()
    }

    /// Execute a PATCH request with a JSON body
    ///
    /// # Errors
    ///
    /// Returns error if request fails or response cannot be deserialized
    pub async fn patch<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<R, ApiError> {
        self.send(ApiRequest::patch(path).json(body)?).await?.json()
    }

    /// Execute a DELETE request
    ///
    /// # Errors
    ///
    /// Returns error if request fails or response cannot be deserialized
    pub async fn delete<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
        self.send(ApiRequest::delete(path)).await?.json()
    }

    async fn dispatch(&self, attempt: &RequestAttempt) -> Result<ApiResponse, ApiError> {
        let request = attempt.request();
        let url = self.config.url_for(&request.path);
        debug!(url = %url, retry = attempt.is_retry(), "Dispatching request");

        let mut builder = self
            .http_client
            .request(request.method.clone(), &url)
            .header(ACCEPT, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        // The session bearer replaces a caller-supplied `Authorization`.
        let bearer_attached = attempt.bearer().is_some();
        for (name, value) in &request.headers {
            if bearer_attached && name.eq_ignore_ascii_case(AUTHORIZATION.as_str()) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = attempt.bearer() {
            builder = builder.header(AUTHORIZATION, bearer(token));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let timeout = self.config.timeout();
        let result = match tokio::time::timeout(timeout, self.http_client.send(builder)).await {
            Ok(Ok(response)) => {
                let status = response.status();
                let headers = response.headers().clone();
                response
                    .bytes()
                    .await
                    .map(|body| ApiResponse::new(status, headers, body.to_vec()))
                    .map_err(|e| transport_error(request, e.to_string()))
            }
            Ok(Err(err)) => Err(transport_error(request, err.to_string())),
            Err(_) => Err(ApiError::Timeout(timeout)),
        };

        result.inspect_err(|err| log_failure(request, None, err))
    }

    fn finish(
        &self,
        attempt: &RequestAttempt,
        response: ApiResponse,
    ) -> Result<ApiResponse, ApiError> {
        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "Request succeeded");
            return Ok(response);
        }

        let request = attempt.request();
        let body = response.text();
        let err = ApiError::Status {
            method: request.method.to_string(),
            path: request.path.clone(),
            status: status.as_u16(),
            message: failure_message(status, &body),
            body,
        };
        log_failure(request, Some(status), &err);
        Err(err)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient").field("base_url", &self.config.base_url).finish_non_exhaustive()
    }
}

fn transport_error(request: &ApiRequest, message: String) -> ApiError {
    ApiError::Transport { method: request.method.to_string(), path: request.path.clone(), message }
}

fn log_failure(request: &ApiRequest, status: Option<StatusCode>, err: &ApiError) {
    let message = match err {
        ApiError::Status { message, .. } | ApiError::Transport { message, .. } => message.clone(),
        other => other.to_string(),
    };
    warn!(
        method = %request.method,
        path = %request.path,
        status = status.map(|s| s.as_u16()),
        category = ?err.category(),
        %message,
        "API request failed"
    );
}

/// Builder for API client
#[derive(Default)]
pub struct ApiClientBuilder {
    config: Option<ApiConfig>,
    coordinator: Option<Arc<RefreshCoordinator>>,
}

impl ApiClientBuilder {
    /// Set the API configuration
    pub fn config(mut self, config: ApiConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the refresh coordinator shared by every pipeline of this session
    pub fn coordinator(mut self, coordinator: Arc<RefreshCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Build the API client
    ///
    /// # Errors
    ///
    /// Returns error if required fields are missing or client creation fails
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let config = self.config.unwrap_or_default();
        let coordinator = self
            .coordinator
            .ok_or_else(|| ApiError::Config("Refresh coordinator not set".to_string()))?;

        ApiClient::new(config, coordinator)
    }
}

#[cfg(test)]
mod tests {
    use clinicflow_common::auth::{
        CredentialStore, DefaultCredential, MemorySlotStorage, RefreshError,
    };
    use clinicflow_common::testing::MockRefreshTransport;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const KEY: &str = "auth-storage";

    struct Harness {
        client: ApiClient,
        storage: MemorySlotStorage,
        transport: Arc<MockRefreshTransport>,
    }

    fn harness(server: &MockServer, transport: MockRefreshTransport) -> Harness {
        let storage = MemorySlotStorage::with_slot(
            KEY,
            json!({ "state": { "token": "t0", "refresh_token": "r0" } }).to_string(),
        );
        let store = Arc::new(CredentialStore::new(Arc::new(storage.clone()), KEY));
        let transport = Arc::new(transport);
        let coordinator =
            Arc::new(RefreshCoordinator::new(store, transport.clone(), DefaultCredential::new()));
        let config = ApiConfig { base_url: server.uri(), ..Default::default() };
        let client = ApiClient::new(config, coordinator).unwrap();
        Harness { client, storage, transport }
    }

    #[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq)]
    struct Patient {
        id: u32,
        name: String,
    }

    #[tokio::test]
    async fn test_get_attaches_stored_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/patients/1"))
            .and(header("Authorization", "Bearer t0"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": 1, "name": "Ada" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server, MockRefreshTransport::succeeding("unused"));

        let patient: Patient = h.client.get("/patients/1").await.unwrap();
        assert_eq!(patient, Patient { id: 1, name: "Ada".into() });
        assert_eq!(h.transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_unauthenticated_request_has_no_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .mount(&server)
            .await;

        let store = Arc::new(CredentialStore::new(Arc::new(MemorySlotStorage::new()), KEY));
        let coordinator = Arc::new(RefreshCoordinator::new(
            store,
            Arc::new(MockRefreshTransport::succeeding("unused")),
            DefaultCredential::new(),
        ));
        let config = ApiConfig { base_url: server.uri(), ..Default::default() };
        let client = ApiClient::new(config, coordinator).unwrap();

        let _: serde_json::Value = client.get("/health").await.unwrap();

        let received = server.received_requests().await.unwrap();
        assert!(received[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_401_refreshes_and_replays_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/appointments"))
            .and(header("Authorization", "Bearer t0"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/appointments"))
            .and(header("Authorization", "Bearer t1"))
            .and(body_json(json!({ "slot": 3 })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 9 })))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server, MockRefreshTransport::succeeding("t1"));

        let created: serde_json::Value =
            h.client.post("/appointments", &json!({ "slot": 3 })).await.unwrap();

        assert_eq!(created, json!({ "id": 9 }));
        assert_eq!(h.transport.calls(), 1);
        let slot: serde_json::Value = serde_json::from_str(&h.storage.raw(KEY).unwrap()).unwrap();
        assert_eq!(slot["state"]["token"], "t1");
    }

    #[tokio::test]
    async fn test_second_401_is_auth_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/records"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let h = harness(&server, MockRefreshTransport::succeeding("t1"));

        let err = h.client.send(ApiRequest::get("/records")).await.unwrap_err();

        assert!(matches!(err, ApiError::AuthExhausted { ref path, .. } if path == "/records"));
        assert_eq!(h.transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_surfaces_without_replay() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/records"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let rejected = RefreshError::Rejected { status: 401, message: "expired".into() };
        let h = harness(&server, MockRefreshTransport::failing(rejected.clone()));

        let err = h.client.send(ApiRequest::get("/records")).await.unwrap_err();

        assert!(matches!(err, ApiError::Refresh(ref inner) if *inner == rejected));
        assert!(err.requires_login());
        assert_eq!(h.storage.raw(KEY), None);
    }

    #[tokio::test]
    async fn test_non_401_failure_passes_through() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/patients/1"))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(json!({ "message": "Invalid phone" })),
            )
            .mount(&server)
            .await;

        let h = harness(&server, MockRefreshTransport::succeeding("unused"));

        let err = h
            .client
            .put::<_, serde_json::Value>("/patients/1", &json!({ "phone": "x" }))
            .await
            .unwrap_err();

        match err {
            ApiError::Status { status, message, method, .. } => {
                assert_eq!(status, 422);
                assert_eq!(message, "Invalid phone");
                assert_eq!(method, "PUT");
            }
            other => panic!("expected status error, got {:?}", other),
        }
        assert_eq!(h.transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_delete_with_204_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/appointments/4"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let h = harness(&server, MockRefreshTransport::succeeding("unused"));

        let result: Result<(), ApiError> = h.client.delete("/appointments/4").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_query_and_custom_headers_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/appointments"))
            .and(query_param("date", "2026-10-18"))
            .and(header("X-Clinic", "north"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server, MockRefreshTransport::succeeding("unused"));

        let response = h
            .client
            .send(
                ApiRequest::get("/appointments")
                    .query("date", "2026-10-18")
                    .header("X-Clinic", "north"),
            )
            .await
            .unwrap();
        assert_eq!(response.json::<Vec<u32>>().unwrap(), Vec::<u32>::new());
    }

    #[tokio::test]
    async fn test_stored_token_replaces_caller_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/patients"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server, MockRefreshTransport::succeeding("unused"));

        h.client
            .send(ApiRequest::get("/patients").header("authorization", "Bearer caller"))
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        let values: Vec<&str> = received[0]
            .headers
            .get_all(AUTHORIZATION)
            .iter()
            .map(|value| value.to_str().unwrap())
            .collect();
        assert_eq!(values, vec!["Bearer t0"]);
    }

    #[tokio::test]
    async fn test_caller_authorization_kept_without_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/public/ping"))
            .and(header("Authorization", "Bearer caller"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server, MockRefreshTransport::succeeding("unused"));
        h.client.coordinator().store().clear().unwrap();

        h.client
            .send(ApiRequest::get("/public/ping").header("Authorization", "Bearer caller"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_builder_missing_coordinator() {
        let result = ApiClient::builder().build();
        assert!(matches!(result, Err(ApiError::Config(_))));
    }
}
