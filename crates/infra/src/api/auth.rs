//! Session authentication against the ClinicFlow API
//!
//! - [`HttpRefreshTransport`]: the refresh round trip used by the
//!   coordinator. It talks to the endpoint with a bare `HttpClient`, so it
//!   never re-enters the request pipeline.
//! - [`AuthSession`]: login, logout and start-up restore.

use std::sync::Arc;

use async_trait::async_trait;
use clinicflow_common::auth::{
    bearer, CredentialRecord, CredentialStore, DefaultCredential, RefreshCoordinator,
    RefreshError, RefreshTransport, SessionEvent,
};
use clinicflow_domain::constants::{AUTH_LOGIN_PATH, AUTH_LOGOUT_PATH, AUTH_REFRESH_PATH};
use clinicflow_domain::{ApiConfig, ClientConfig};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::client::ApiClient;
use super::errors::ApiError;
use super::request::{failure_message, ApiRequest};
use crate::http::HttpClient;
use crate::storage::build_slot_storage;

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Refresh round trip over HTTP
///
/// `POST {base_url}/auth/refresh` with no body and the refresh token as the
/// bearer credential. A 2xx answer must carry `{ "access_token": "..." }`.
pub struct HttpRefreshTransport {
    http_client: HttpClient,
    url: String,
}

impl HttpRefreshTransport {
    /// Create a transport with its own HTTP client (no ambient credential)
    ///
    /// # Errors
    ///
    /// Returns error if the HttpClient cannot be created
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let http_client = HttpClient::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to build HttpClient: {}", e)))?;

        Ok(Self::with_http_client(http_client, config.url_for(AUTH_REFRESH_PATH)))
    }

    pub fn with_http_client(http_client: HttpClient, url: impl Into<String>) -> Self {
        Self { http_client, url: url.into() }
    }
}

#[async_trait]
impl RefreshTransport for HttpRefreshTransport {
    async fn refresh(&self, refresh_token: &str) -> Result<String, RefreshError> {
        debug!(url = %self.url, "Requesting new access token");

        let request = self
            .http_client
            .request(Method::POST, &self.url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, bearer(refresh_token));

        let response = self
            .http_client
            .send(request)
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| RefreshError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                message: failure_message(status, &body),
            });
        }

        let parsed: RefreshResponse =
            serde_json::from_str(&body).map_err(|e| RefreshError::Malformed(e.to_string()))?;
        parsed
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| RefreshError::Malformed("missing access_token".to_string()))
    }
}

/// Successful `/auth/login` answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Opaque user profile; `role`, when present, is lowercased
    #[serde(default)]
    pub user: Value,
}

/// Login, logout and restore for one API session
pub struct AuthSession {
    api: Arc<ApiClient>,
    http_client: HttpClient,
}

impl AuthSession {
    /// Create a session over `api`
    ///
    /// Login requests use a separate bare client so a rejected login never
    /// enters the refresh path.
    ///
    /// # Errors
    ///
    /// Returns error if the HttpClient cannot be created
    pub fn new(api: Arc<ApiClient>) -> Result<Self, ApiError> {
        let config = api.config();
        let http_client = HttpClient::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to build HttpClient: {}", e)))?;

        Ok(Self { api, http_client })
    }

    /// Wire a complete session from configuration
    ///
    /// Builds the configured slot backend, the credential store, the HTTP
    /// refresh transport, one shared coordinator and the API client.
    ///
    /// # Errors
    ///
    /// Returns error if an HttpClient cannot be created
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        let storage = build_slot_storage(&config.storage);
        let store = Arc::new(CredentialStore::new(storage, config.storage.key.clone()));
        let transport = Arc::new(HttpRefreshTransport::new(&config.api)?);
        let coordinator =
            Arc::new(RefreshCoordinator::new(store, transport, DefaultCredential::new()));
        let api = Arc::new(ApiClient::new(config.api.clone(), coordinator)?);

        Self::new(api)
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        self.api.coordinator()
    }

    /// Exchange credentials for a token pair
    ///
    /// On success both tokens and the user profile are persisted, the default
    /// credential is set and [`SessionEvent::LoggedIn`] is published. On
    /// failure any stored session is cleared.
    ///
    /// # Errors
    ///
    /// - `ApiError::Status` with the server's message (or `Login failed`)
    /// - `ApiError::Transport` / `ApiError::Timeout` if the server is
    ///   unreachable
    /// - `ApiError::Client` if the answer cannot be parsed or persisted
    #[instrument(skip(self, credentials))]
    pub async fn login<C: Serialize + ?Sized>(
        &self,
        credentials: &C,
    ) -> Result<LoginResponse, ApiError> {
        let outcome = self.request_login(credentials).await.and_then(|response| {
            let store = self.coordinator().store();
            store
                .write(&CredentialRecord::new(
                    response.access_token.clone(),
                    response.refresh_token.clone(),
                ))
                .and_then(|()| store.write_user(&response.user))
                .map_err(|e| ApiError::Client(format!("Failed to persist session: {}", e)))?;
            Ok(response)
        });

        match outcome {
            Ok(response) => {
                self.coordinator().default_credential().set(response.access_token.clone());
                self.coordinator().notify(SessionEvent::LoggedIn);
                info!("Logged in");
                Ok(response)
            }
            Err(err) => {
                warn!(error = %err, "Login failed; clearing session");
                self.clear_session();
                Err(err)
            }
        }
    }

    /// End the session
    ///
    /// The server is told to revoke the token through the regular pipeline;
    /// its failure is logged and ignored. Local state is always cleared.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        if let Err(err) = self.api.send(ApiRequest::post(AUTH_LOGOUT_PATH)).await {
            warn!(error = %err, "Logout request failed; clearing local session anyway");
        }

        self.clear_session();
        self.coordinator().notify(SessionEvent::LoggedOut);
        info!("Logged out");
    }

    /// Re-arm the default credential from a persisted session
    ///
    /// Returns `None` when no access token is stored. Otherwise returns the
    /// persisted user profile with its role lowercased (`Value::Null` when no
    /// profile was saved).
    pub fn restore(&self) -> Option<Value> {
        let store = self.coordinator().store();
        let token = store.access_token()?;
        self.coordinator().default_credential().set(token);

        let mut user = store.user().unwrap_or(Value::Null);
        if normalize_role(&mut user) {
            if let Err(err) = store.write_user(&user) {
                warn!(error = %err, "Failed to persist normalized user profile");
            }
        }

        debug!(has_user = !user.is_null(), "Restored persisted session");
        Some(user)
    }

    pub fn is_authenticated(&self) -> bool {
        self.coordinator().store().access_token().is_some()
    }

    async fn request_login<C: Serialize + ?Sized>(
        &self,
        credentials: &C,
    ) -> Result<LoginResponse, ApiError> {
        let path = AUTH_LOGIN_PATH;
        let request = self
            .http_client
            .request(Method::POST, self.api.config().url_for(path))
            .header(ACCEPT, "application/json")
            .json(credentials);

        let timeout = self.api.config().timeout();
        let response = match tokio::time::timeout(timeout, self.http_client.send(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                return Err(ApiError::Transport {
                    method: Method::POST.to_string(),
                    path: path.to_string(),
                    message: err.to_string(),
                })
            }
            Err(_) => return Err(ApiError::Timeout(timeout)),
        };

        let status = response.status();
        let body = response.text().await.map_err(|e| ApiError::Transport {
            method: Method::POST.to_string(),
            path: path.to_string(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(ApiError::Status {
                method: Method::POST.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                message: login_failure_message(status, &body),
                body,
            });
        }

        let mut parsed: LoginResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::Client(format!("Failed to parse login response: {}", e)))?;
        normalize_role(&mut parsed.user);
        Ok(parsed)
    }

    fn clear_session(&self) {
        if let Err(err) = self.coordinator().end_session() {
            warn!(error = %err, "Failed to clear credential slot");
        }
    }
}

fn login_failure_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(fields)) => fields
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| failure_message(status, body), str::to_string),
        _ => "Login failed".to_string(),
    }
}

// Role checks elsewhere compare against lowercase names. Returns whether the
// role changed.
fn normalize_role(user: &mut Value) -> bool {
    match user.get_mut("role") {
        Some(Value::String(role)) if role.chars().any(char::is_uppercase) => {
            *role = role.to_lowercase();
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use clinicflow_common::auth::MemorySlotStorage;
    use clinicflow_domain::{StorageBackend, StorageConfig};
    use clinicflow_common::testing::MockRefreshTransport;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const KEY: &str = "auth-storage";

    fn config_for(server: &MockServer) -> ApiConfig {
        ApiConfig { base_url: server.uri(), ..Default::default() }
    }

    fn session(server: &MockServer, storage: &MemorySlotStorage) -> AuthSession {
        let store = Arc::new(CredentialStore::new(Arc::new(storage.clone()), KEY));
        let coordinator = Arc::new(RefreshCoordinator::new(
            store,
            Arc::new(MockRefreshTransport::succeeding("unused")),
            DefaultCredential::new(),
        ));
        let api = Arc::new(ApiClient::new(config_for(server), coordinator).unwrap());
        AuthSession::new(api).unwrap()
    }

    #[tokio::test]
    async fn refresh_transport_presents_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(header("Authorization", "Bearer r0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "t1" })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpRefreshTransport::new(&config_for(&server)).unwrap();

        assert_eq!(transport.refresh("r0").await, Ok("t1".to_string()));
    }

    #[tokio::test]
    async fn refresh_transport_maps_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "message": "Token revoked" })),
            )
            .mount(&server)
            .await;

        let transport = HttpRefreshTransport::new(&config_for(&server)).unwrap();

        assert_eq!(
            transport.refresh("r0").await,
            Err(RefreshError::Rejected { status: 401, message: "Token revoked".into() })
        );
    }

    #[tokio::test]
    async fn refresh_transport_requires_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "t1" })))
            .mount(&server)
            .await;

        let transport = HttpRefreshTransport::new(&config_for(&server)).unwrap();

        assert!(matches!(transport.refresh("r0").await, Err(RefreshError::Malformed(_))));
    }

    #[tokio::test]
    async fn login_persists_tokens_and_normalizes_role() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({ "email": "dr@clinic.test", "password": "pw" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "t0",
                "refresh_token": "r0",
                "user": { "id": 3, "role": "DOCTOR" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let storage = MemorySlotStorage::new();
        let session = session(&server, &storage);
        let mut events = session.api().coordinator().subscribe();

        let response = session
            .login(&json!({ "email": "dr@clinic.test", "password": "pw" }))
            .await
            .unwrap();

        assert_eq!(response.user["role"], "doctor");
        assert!(session.is_authenticated());
        assert_eq!(
            session.api().coordinator().default_credential().token().as_deref(),
            Some("t0")
        );
        let record = session.api().coordinator().store().read();
        assert_eq!(record, CredentialRecord::new("t0", "r0"));
        assert_eq!(
            session.api().coordinator().store().user(),
            Some(json!({ "id": 3, "role": "doctor" }))
        );
        assert_eq!(events.try_recv().unwrap(), SessionEvent::LoggedIn);
    }

    #[test]
    fn restore_returns_profile_with_normalized_role() {
        let storage = MemorySlotStorage::with_slot(
            KEY,
            json!({
                "state": { "token": "t0", "refresh_token": "r0", "user": { "id": 3, "role": "Admin" } }
            })
            .to_string(),
        );
        let store = Arc::new(CredentialStore::new(Arc::new(storage.clone()), KEY));
        let coordinator = Arc::new(RefreshCoordinator::new(
            store,
            Arc::new(MockRefreshTransport::succeeding("unused")),
            DefaultCredential::new(),
        ));
        let api = Arc::new(ApiClient::new(ApiConfig::default(), coordinator).unwrap());
        let session = AuthSession::new(api).unwrap();

        assert_eq!(session.restore(), Some(json!({ "id": 3, "role": "admin" })));
        assert_eq!(
            session.api().coordinator().default_credential().token().as_deref(),
            Some("t0")
        );
        let slot: Value = serde_json::from_str(&storage.raw(KEY).unwrap()).unwrap();
        assert_eq!(slot["state"]["user"]["role"], "admin");
    }

    #[tokio::test]
    async fn logout_during_refresh_does_not_resurrect_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let storage = MemorySlotStorage::with_slot(
            KEY,
            json!({ "state": { "token": "t0", "refresh_token": "r0" } }).to_string(),
        );
        let (transport, gate) = MockRefreshTransport::succeeding("t1").with_gate();
        let store = Arc::new(CredentialStore::new(Arc::new(storage.clone()), KEY));
        let coordinator =
            Arc::new(RefreshCoordinator::new(store, Arc::new(transport), DefaultCredential::new()));
        let api = Arc::new(ApiClient::new(config_for(&server), coordinator.clone()).unwrap());
        let session = AuthSession::new(api).unwrap();
        assert!(session.restore().is_some());

        let refresh = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.ensure_fresh_token().await })
        };
        gate.wait_started().await;

        session.logout().await;
        gate.release();

        assert_eq!(refresh.await.unwrap(), Err(RefreshError::Interrupted));
        assert_eq!(storage.raw(KEY), None);
        assert!(!session.is_authenticated());
        assert!(!coordinator.default_credential().is_set());
    }

    #[tokio::test]
    async fn failed_login_clears_session_and_reports_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({ "message": "Invalid email or password" })),
            )
            .mount(&server)
            .await;

        let storage = MemorySlotStorage::with_slot(
            KEY,
            json!({ "state": { "token": "old", "refresh_token": "old" } }).to_string(),
        );
        let session = session(&server, &storage);

        let err = session.login(&json!({ "email": "x", "password": "y" })).await.unwrap_err();

        match err {
            ApiError::Status { status, message, .. } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid email or password");
            }
            other => panic!("expected status error, got {:?}", other),
        }
        assert_eq!(storage.raw(KEY), None);
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn logout_clears_local_state_even_if_server_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .and(header("Authorization", "Bearer t0"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let storage = MemorySlotStorage::with_slot(
            KEY,
            json!({ "state": { "token": "t0", "refresh_token": "r0" } }).to_string(),
        );
        let session = session(&server, &storage);
        assert_eq!(session.restore(), Some(Value::Null));
        let mut events = session.api().coordinator().subscribe();

        session.logout().await;

        assert_eq!(storage.raw(KEY), None);
        assert!(!session.api().coordinator().default_credential().is_set());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::LoggedOut);
    }

    #[test]
    fn restore_without_session_is_none() {
        let storage = MemorySlotStorage::new();
        let store = Arc::new(CredentialStore::new(Arc::new(storage), KEY));
        let coordinator = Arc::new(RefreshCoordinator::new(
            store,
            Arc::new(MockRefreshTransport::succeeding("unused")),
            DefaultCredential::new(),
        ));
        let api = Arc::new(ApiClient::new(ApiConfig::default(), coordinator).unwrap());
        let session = AuthSession::new(api).unwrap();

        assert_eq!(session.restore(), None);
        assert!(!session.api().coordinator().default_credential().is_set());
    }

    #[tokio::test]
    async fn session_from_config_refreshes_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "t0",
                "refresh_token": "r0",
                "user": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("Authorization", "Bearer t0"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(header("Authorization", "Bearer r0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "t1" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("Authorization", "Bearer t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 3 })))
            .mount(&server)
            .await;

        let config = ClientConfig {
            api: config_for(&server),
            storage: StorageConfig { backend: StorageBackend::Memory, ..Default::default() },
        };
        let session = AuthSession::from_config(&config).unwrap();

        session.login(&json!({ "email": "a", "password": "b" })).await.unwrap();
        let me: Value = session.api().get("/me").await.unwrap();

        assert_eq!(me, json!({ "id": 3 }));
        assert_eq!(session.api().coordinator().store().access_token().as_deref(), Some("t1"));
    }

    #[test]
    fn login_failure_message_falls_back() {
        assert_eq!(login_failure_message(StatusCode::BAD_GATEWAY, "<html>"), "Login failed");
        assert_eq!(
            login_failure_message(StatusCode::BAD_REQUEST, r#"{"message":"Locked"}"#),
            "Locked"
        );
    }
}
