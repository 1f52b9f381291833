//! Media provider session gateway.
//!
//! The provider owns room sessions and per-participant connections. Its
//! REST API is not idempotent: creating a session twice with the same custom
//! id fails with HTTP 409. This module translates that into
//! [`ProviderError::AlreadyExists`] so no raw status code reaches the
//! orchestrator.
//!
//! # Security
//!
//! - The provider secret is sent only as HTTP Basic credentials
//! - Issued connection tokens are wrapped in `SecretString`
//! - Request timeouts prevent hanging connections

use crate::errors::EntryError;
use crate::observability::metrics;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use common::types::{ParticipantId, RoomId};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, instrument, warn};

/// Basic-auth user name the provider expects.
const PROVIDER_BASIC_AUTH_USER: &str = "OPENVIDUAPP";

/// Provider-side failure as seen by the orchestrator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// A session with this id already exists.
    #[error("Session already exists")]
    AlreadyExists,

    /// Any other provider failure, including timeouts.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl From<ProviderError> for EntryError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::AlreadyExists => EntryError::RoomAlreadyActive,
            ProviderError::Unavailable(reason) => EntryError::ProviderUnavailable(reason),
        }
    }
}

/// Handle to a live provider session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: RoomId,
}

/// Options attached to an issued connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Opaque data the provider hands to other participants.
    pub data: String,
}

impl ConnectionOptions {
    pub fn for_participant(participant_id: ParticipantId) -> Self {
        Self {
            data: participant_id.to_string(),
        }
    }
}

/// Connection credential issued for one (re)entry.
#[derive(Debug)]
pub struct IssuedConnection {
    pub connection_id: String,
    pub token: SecretString,
}

/// Session and connection lifecycle operations.
///
/// Implementations never retry.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Create a session whose id is `room_id`.
    async fn create_session(&self, room_id: &RoomId) -> Result<SessionHandle, ProviderError>;

    /// Fetch the live session for `room_id`; `None` when it is not live.
    async fn get_active_session(
        &self,
        room_id: &RoomId,
    ) -> Result<Option<SessionHandle>, ProviderError>;

    /// Issue a fresh connection token against a live session.
    async fn issue_connection(
        &self,
        session: &SessionHandle,
        options: &ConnectionOptions,
    ) -> Result<IssuedConnection, ProviderError>;
}

/// Run a gateway call bounded by `limit`, recording its outcome.
///
/// Elapsed time is reported as `ProviderError::Unavailable`.
pub async fn call_with_timeout<T, F>(
    operation: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    let start = Instant::now();
    let (status, result) = match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => ("success", Ok(value)),
        Ok(Err(ProviderError::AlreadyExists)) => {
            ("already_exists", Err(ProviderError::AlreadyExists))
        }
        Ok(Err(err)) => ("error", Err(err)),
        Err(_) => {
            warn!(
                target: "fm.services.provider",
                operation = operation,
                timeout_ms = metrics::duration_millis(limit),
                "Provider call timed out"
            );
            (
                "timeout",
                Err(ProviderError::Unavailable(format!("{operation} timed out"))),
            )
        }
    };
    metrics::record_provider_call(operation, status, start.elapsed());
    result
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest<'a> {
    custom_session_id: &'a str,
}

#[derive(Serialize)]
struct CreateConnectionRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a str,
    role: &'static str,
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
}

#[derive(Deserialize)]
struct ConnectionResponse {
    id: String,
    token: String,
}

/// REST client for an OpenVidu-compatible media server.
#[derive(Clone)]
pub struct OpenViduClient {
    client: Client,
    base_url: String,
    secret: SecretString,
}

impl OpenViduClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Unavailable` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        secret: SecretString,
        request_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                error!(target: "fm.services.provider", error = %e, "Failed to build HTTP client");
                ProviderError::Unavailable("HTTP client unavailable".to_string())
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret,
        })
    }

    fn sessions_url(&self) -> String {
        format!("{}/openvidu/api/sessions", self.base_url)
    }

    fn transport_error(e: &reqwest::Error) -> ProviderError {
        warn!(target: "fm.services.provider", error = %e, "Provider request failed");
        ProviderError::Unavailable("provider unreachable".to_string())
    }

    fn unexpected_status(status: StatusCode) -> ProviderError {
        warn!(target: "fm.services.provider", status = %status, "Unexpected provider response");
        ProviderError::Unavailable(format!("provider returned {status}"))
    }
}

#[async_trait]
impl ProviderGateway for OpenViduClient {
    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn create_session(&self, room_id: &RoomId) -> Result<SessionHandle, ProviderError> {
        let response = self
            .client
            .post(self.sessions_url())
            .basic_auth(PROVIDER_BASIC_AUTH_USER, Some(self.secret.expose_secret()))
            .json(&CreateSessionRequest {
                custom_session_id: room_id.as_str(),
            })
            .send()
            .await
            .map_err(|e| Self::transport_error(&e))?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Err(ProviderError::AlreadyExists);
        }
        if !status.is_success() {
            return Err(Self::unexpected_status(status));
        }

        let body: SessionResponse = response.json().await.map_err(|e| {
            error!(target: "fm.services.provider", error = %e, "Failed to parse session response");
            ProviderError::Unavailable("invalid provider response".to_string())
        })?;

        Ok(SessionHandle {
            session_id: RoomId::new(body.id),
        })
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn get_active_session(
        &self,
        room_id: &RoomId,
    ) -> Result<Option<SessionHandle>, ProviderError> {
        let response = self
            .client
            .get(format!("{}/{}", self.sessions_url(), room_id.as_str()))
            .basic_auth(PROVIDER_BASIC_AUTH_USER, Some(self.secret.expose_secret()))
            .send()
            .await
            .map_err(|e| Self::transport_error(&e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::unexpected_status(status));
        }

        let body: SessionResponse = response.json().await.map_err(|e| {
            error!(target: "fm.services.provider", error = %e, "Failed to parse session response");
            ProviderError::Unavailable("invalid provider response".to_string())
        })?;

        Ok(Some(SessionHandle {
            session_id: RoomId::new(body.id),
        }))
    }

    #[instrument(skip_all, fields(room_id = %session.session_id))]
    async fn issue_connection(
        &self,
        session: &SessionHandle,
        options: &ConnectionOptions,
    ) -> Result<IssuedConnection, ProviderError> {
        let response = self
            .client
            .post(format!(
                "{}/{}/connection",
                self.sessions_url(),
                session.session_id.as_str()
            ))
            .basic_auth(PROVIDER_BASIC_AUTH_USER, Some(self.secret.expose_secret()))
            .json(&CreateConnectionRequest {
                kind: "WEBRTC",
                data: &options.data,
                role: "PUBLISHER",
            })
            .send()
            .await
            .map_err(|e| Self::transport_error(&e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            warn!(target: "fm.services.provider", "Session closed before connection was issued");
            return Err(ProviderError::Unavailable("session closed".to_string()));
        }
        if !status.is_success() {
            return Err(Self::unexpected_status(status));
        }

        let body: ConnectionResponse = response.json().await.map_err(|e| {
            error!(target: "fm.services.provider", error = %e, "Failed to parse connection response");
            ProviderError::Unavailable("invalid provider response".to_string())
        })?;

        Ok(IssuedConnection {
            connection_id: body.id,
            token: SecretString::from(body.token),
        })
    }
}

/// Mock provider for tests.
///
/// Keeps sessions in memory, issues unique tokens and supports failure and
/// latency injection.
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    /// In-memory provider.
    #[derive(Default)]
    pub struct MockProvider {
        sessions: Mutex<HashMap<RoomId, usize>>,
        create_attempts: Mutex<HashMap<RoomId, usize>>,
        create_calls: AtomicUsize,
        get_calls: AtomicUsize,
        issue_calls: AtomicUsize,
        next_connection: AtomicUsize,
        failing: AtomicBool,
        failing_issue: AtomicBool,
        fail_next_create: Mutex<HashSet<RoomId>>,
        latency: Mutex<Option<Duration>>,
    }

    impl MockProvider {
        /// A healthy provider with no sessions.
        pub fn new() -> Self {
            Self::default()
        }

        /// A provider whose every call fails with `Unavailable`.
        pub fn failing() -> Self {
            let provider = Self::default();
            provider.set_failing(true);
            provider
        }

        /// A provider that sleeps `latency` before answering each call.
        pub fn with_latency(latency: Duration) -> Self {
            let provider = Self::default();
            provider.set_latency(Some(latency));
            provider
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        /// Fail only `issue_connection`.
        pub fn set_failing_issue(&self, failing: bool) {
            self.failing_issue.store(failing, Ordering::SeqCst);
        }

        /// Fail the next `create_session` for `room_id` once.
        pub fn fail_next_create(&self, room_id: &RoomId) {
            self.fail_next_create
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(room_id.clone());
        }

        pub fn set_latency(&self, latency: Option<Duration>) {
            *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
        }

        /// Make a session live without going through `create_session`.
        pub fn start_session(&self, room_id: &RoomId) {
            self.sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(room_id.clone())
                .or_insert(0);
        }

        /// Drop a session, as if its media server stopped.
        pub fn close_session(&self, room_id: &RoomId) {
            self.sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(room_id);
        }

        pub fn is_live(&self, room_id: &RoomId) -> bool {
            self.sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(room_id)
        }

        /// Number of connections issued against a session.
        pub fn connections_for(&self, room_id: &RoomId) -> usize {
            self.sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(room_id)
                .copied()
                .unwrap_or(0)
        }

        /// Number of `create_session` attempts for a room, successful or not.
        pub fn create_attempts_for(&self, room_id: &RoomId) -> usize {
            self.create_attempts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(room_id)
                .copied()
                .unwrap_or(0)
        }

        pub fn create_calls(&self) -> usize {
            self.create_calls.load(Ordering::SeqCst)
        }

        pub fn get_calls(&self) -> usize {
            self.get_calls.load(Ordering::SeqCst)
        }

        pub fn issue_calls(&self) -> usize {
            self.issue_calls.load(Ordering::SeqCst)
        }

        async fn simulate(&self) -> Result<(), ProviderError> {
            let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(ProviderError::Unavailable("mock provider failure".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ProviderGateway for MockProvider {
        async fn create_session(&self, room_id: &RoomId) -> Result<SessionHandle, ProviderError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            *self
                .create_attempts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(room_id.clone())
                .or_insert(0) += 1;
            self.simulate().await?;

            let fail_once = self
                .fail_next_create
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(room_id);
            if fail_once {
                return Err(ProviderError::Unavailable("mock create failure".to_string()));
            }

            let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            if sessions.contains_key(room_id) {
                return Err(ProviderError::AlreadyExists);
            }
            sessions.insert(room_id.clone(), 0);
            Ok(SessionHandle {
                session_id: room_id.clone(),
            })
        }

        async fn get_active_session(
            &self,
            room_id: &RoomId,
        ) -> Result<Option<SessionHandle>, ProviderError> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            self.simulate().await?;

            Ok(self.is_live(room_id).then(|| SessionHandle {
                session_id: room_id.clone(),
            }))
        }

        async fn issue_connection(
            &self,
            session: &SessionHandle,
            _options: &ConnectionOptions,
        ) -> Result<IssuedConnection, ProviderError> {
            self.issue_calls.fetch_add(1, Ordering::SeqCst);
            self.simulate().await?;
            if self.failing_issue.load(Ordering::SeqCst) {
                return Err(ProviderError::Unavailable("mock issue failure".to_string()));
            }

            let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(connections) = sessions.get_mut(&session.session_id) else {
                return Err(ProviderError::Unavailable("session closed".to_string()));
            };
            *connections += 1;

            let n = self.next_connection.fetch_add(1, Ordering::SeqCst);
            Ok(IssuedConnection {
                connection_id: format!("con_{n}"),
                token: SecretString::from(format!(
                    "wss://mock-provider?sessionId={}&token=tok_{n}",
                    session.session_id
                )),
            })
        }
    }
}
