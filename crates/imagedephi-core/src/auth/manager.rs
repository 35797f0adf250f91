//! Login, logout and revalidation state machine.
//!
//! `AuthSessionManager` is the only writer of the [`TokenStore`] and of the
//! cookie jar. Each state-changing operation takes a number from a
//! monotonically increasing sequence; a result only commits if no newer
//! operation has been issued since, so a slow response can never overwrite
//! the outcome of a later one.

use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::codec::encode_basic_auth;
use super::error::AuthError;
use super::jar::CookieJar;
use super::session::{PersistedIdentity, Session, SessionStatus, User};
use super::store::TokenStore;
use super::{TOKEN_COOKIE, USER_COOKIE};
use crate::api::client::{RequestOptions, SessionClient};

const AUTHENTICATION_PATH: &str = "/api/v1/user/authentication";
const IDENTITY_PATH: &str = "/api/v1/user/me";

/// Buffer size for session event broadcasts
const EVENT_BUFFER_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn(User),
    LoggedOut,
    /// The server rejected the session; the UI should send the user back to
    /// the login screen.
    Expired,
}

#[derive(Debug, Deserialize)]
struct AuthToken {
    token: String,
    #[serde(default)]
    expires: Option<String>,
}

struct Inner {
    client: SessionClient,
    store: Arc<TokenStore>,
    jar: Arc<dyn CookieJar>,
    /// Sequence number of the most recently issued operation. Also the
    /// commit lock: store and jar writes happen while it is held, store
    /// listeners run after it is released.
    latest: Mutex<u64>,
    events: broadcast::Sender<SessionEvent>,
}

#[derive(Clone)]
pub struct AuthSessionManager {
    inner: Arc<Inner>,
}

impl AuthSessionManager {
    pub fn new(client: SessionClient, jar: Arc<dyn CookieJar>) -> Self {
        let store = Arc::clone(client.store());
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self {
            inner: Arc::new(Inner {
                client,
                store,
                jar,
                latest: Mutex::new(0),
                events,
            }),
        }
    }

    pub fn session(&self) -> Session {
        self.inner.store.get()
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.inner.store
    }

    pub fn client(&self) -> &SessionClient {
        &self.inner.client
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Handle for request wrappers to report a 401.
    pub fn expiry_notifier(&self) -> ExpiryNotifier {
        ExpiryNotifier {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Authenticate with Basic-Auth credentials and commit the new session.
    ///
    /// Calling this while another login is in flight supersedes it: the
    /// earlier call returns `AuthError::Superseded` whatever its response.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let inner = &self.inner;
        let seq = inner.begin(|| {
            if inner.store.status() == SessionStatus::Authenticated {
                inner.clear_cookies();
            }
            inner.store.clear_pending();
            inner.store.publish(Session::authenticating());
        });
        debug!(seq, username, "Login started");

        let attempt = self.request_token(username, password).await;
        match attempt {
            Ok((token, user, expires)) => {
                let session = inner.commit(seq, || {
                    let session = Session::authenticated(token, user.clone(), expires);
                    inner.store.publish(session.clone());
                    inner.persist(&session);
                    session
                })?;
                info!(username = %user.login, "Login successful");
                let _ = inner.events.send(SessionEvent::LoggedIn(user));
                Ok(session)
            }
            Err(e) => {
                inner.commit(seq, || inner.store.publish(Session::unauthenticated()))?;
                warn!(error = %e, "Login failed");
                Err(e)
            }
        }
    }

    async fn request_token(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(String, User, Option<DateTime<Utc>>), AuthError> {
        let credentials = HeaderValue::from_str(&encode_basic_auth(username, password))
            .map_err(|_| AuthError::InvalidCredentials)?;

        // A stale session header would make the server answer for the old user.
        let options = RequestOptions::new()
            .header(AUTHORIZATION, credentials)
            .anonymous();
        let response = self
            .inner
            .client
            .request(Method::GET, AUTHENTICATION_PATH, options)
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::from_login_status(status));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AuthError::MalformedResponse(format!("login body: {}", e)))?;
        parse_login_body(body)
    }

    /// Confirm the current token with the server.
    ///
    /// A matching identity leaves everything untouched. A mismatch, an
    /// empty identity or any failure clears the session; nothing is retried.
    /// A pending cookie token adopts the identity the server reports. With
    /// no session, cookies left over from an expired one are removed.
    pub async fn revalidate(&self) -> Result<Session, AuthError> {
        let inner = &self.inner;
        let snapshot = inner.store.get();
        let candidate = match (snapshot.token(), snapshot.user()) {
            (Some(token), Some(user)) => Some((token.to_string(), Some(user.clone()))),
            _ => inner.store.pending_token().map(|token| (token, None)),
        };
        let Some((token, cached)) = candidate else {
            debug!("Nothing to revalidate");
            inner.discard_stale_cookies();
            return Ok(snapshot);
        };

        let seq = inner.begin(|| ());
        debug!(seq, pending = cached.is_none(), "Revalidating session");

        let identity = match self.fetch_identity(&token).await {
            Ok(identity) => identity,
            Err(e) => {
                inner.commit(seq, || inner.invalidate())?;
                warn!(error = %e, "Session revalidation failed");
                return Err(e);
            }
        };

        match cached {
            Some(user) if user.login == identity.login => {
                inner.commit(seq, || ())?;
                debug!(login = %user.login, "Session still valid");
                Ok(snapshot)
            }
            Some(user) => {
                inner.commit(seq, || inner.invalidate())?;
                warn!(cached = %user.login, server = %identity.login, "Session identity mismatch");
                Err(AuthError::SessionExpired)
            }
            None => {
                let session = inner.commit(seq, || {
                    let session = Session::authenticated(token, identity.clone(), None);
                    inner.store.clear_pending();
                    inner.store.publish(session.clone());
                    inner.persist(&session);
                    session
                })?;
                info!(login = %identity.login, "Restored session confirmed");
                let _ = inner.events.send(SessionEvent::LoggedIn(identity));
                Ok(session)
            }
        }
    }

    async fn fetch_identity(&self, token: &str) -> Result<User, AuthError> {
        let response = self
            .inner
            .client
            .request_with(Some(token), Method::GET, IDENTITY_PATH, RequestOptions::new())
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AuthError::Server(status));
        }
        if !status.is_success() {
            return Err(AuthError::SessionExpired);
        }

        let text = response.text().await?;
        let body: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)
                .map_err(|e| AuthError::MalformedResponse(format!("identity body: {}", e)))?
        };
        if body.is_null() {
            return Err(AuthError::SessionExpired);
        }
        serde_json::from_value(body)
            .map_err(|e| AuthError::MalformedResponse(format!("identity body: {}", e)))
    }

    /// Run the startup revalidation in the background.
    pub fn spawn_revalidate(&self) -> JoinHandle<Result<Session, AuthError>> {
        let manager = self.clone();
        tokio::spawn(async move { manager.revalidate().await })
    }

    /// Forget the session locally, then ask the server to revoke the token.
    ///
    /// Revocation is best-effort; its failure is only logged.
    pub async fn logout(&self) {
        let inner = &self.inner;
        let token = inner.store.token();
        let mut had_session = false;
        let seq = inner.begin(|| {
            had_session = matches!(
                inner.store.status(),
                SessionStatus::Authenticated | SessionStatus::Authenticating
            );
            inner.store.clear_pending();
            inner.store.publish(Session::unauthenticated());
            inner.clear_cookies();
        });
        debug!(seq, had_session, "Logged out locally");
        if had_session {
            let _ = inner.events.send(SessionEvent::LoggedOut);
        }

        let Some(token) = token else {
            return;
        };
        let result = inner
            .client
            .request_with(Some(&token), Method::DELETE, AUTHENTICATION_PATH, RequestOptions::new())
            .await;
        match result {
            Ok(response) if response.status().is_success() => info!("Token revoked"),
            Ok(response) => warn!(status = %response.status(), "Server refused token revocation"),
            Err(e) => warn!(error = %e, "Failed to revoke token"),
        }
    }

    /// Reset the session if `token` is still the current one.
    ///
    /// Returns whether the session was cleared. A rejection for a token that
    /// has since been replaced is ignored.
    pub fn session_expired(&self, token: &str) -> bool {
        self.inner.expire(token)
    }
}

impl Inner {
    fn lock_latest(&self) -> std::sync::MutexGuard<'_, u64> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Issue a new sequence number, running `f` under the commit lock.
    fn begin(&self, f: impl FnOnce()) -> u64 {
        let seq = {
            let mut latest = self.lock_latest();
            *latest += 1;
            f();
            *latest
        };
        self.store.deliver();
        seq
    }

    /// Run `f` only if `seq` is still the newest operation.
    fn commit<T>(&self, seq: u64, f: impl FnOnce() -> T) -> Result<T, AuthError> {
        let result = {
            let latest = self.lock_latest();
            if *latest != seq {
                debug!(seq, latest = *latest, "Discarding superseded result");
                return Err(AuthError::Superseded);
            }
            f()
        };
        self.store.deliver();
        Ok(result)
    }

    /// Drop the session: Invalid, then Unauthenticated, cookies cleared.
    /// Caller holds the commit lock.
    fn invalidate(&self) {
        self.store.clear_pending();
        self.store.publish(Session::invalid());
        self.clear_cookies();
        self.store.publish(Session::unauthenticated());
        let _ = self.events.send(SessionEvent::Expired);
    }

    fn expire(&self, token: &str) -> bool {
        {
            let mut latest = self.lock_latest();
            if self.store.token().as_deref() != Some(token) {
                debug!("Ignoring rejection for a token that is no longer current");
                return false;
            }
            *latest += 1;
            self.invalidate();
        }
        self.store.deliver();
        info!("Session expired");
        true
    }

    /// Remove a token cookie that `TokenStore::restore` did not accept,
    /// such as one whose cached identity has expired.
    fn discard_stale_cookies(&self) {
        let _latest = self.lock_latest();
        if self.store.token().is_some() || self.store.pending_token().is_some() {
            return;
        }
        match self.jar.get(TOKEN_COOKIE) {
            Ok(Some(_)) => {
                debug!("Removing stale session cookie");
                self.clear_cookies();
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to read session cookie"),
        }
    }

    fn persist(&self, session: &Session) {
        let (Some(token), Some(user)) = (session.token(), session.user()) else {
            return;
        };
        let identity = PersistedIdentity {
            user: user.clone(),
            expires: session.expires(),
        };
        let result = serde_json::to_string(&identity)
            .map_err(anyhow::Error::from)
            .and_then(|json| {
                self.jar.set(TOKEN_COOKIE, token)?;
                self.jar.set(USER_COOKIE, &json)
            });
        if let Err(e) = result {
            warn!(error = %e, "Failed to save session cookie");
        }
    }

    fn clear_cookies(&self) {
        let result = self
            .jar
            .remove(TOKEN_COOKIE)
            .and_then(|_| self.jar.remove(USER_COOKIE));
        if let Err(e) = result {
            warn!(error = %e, "Failed to clear session cookie");
        }
    }
}

/// Cloneable handle that lets request wrappers report a 401 without owning
/// the manager.
#[derive(Clone)]
pub struct ExpiryNotifier {
    inner: Weak<Inner>,
}

impl ExpiryNotifier {
    /// Report that the server rejected `token`. Returns whether the session
    /// was cleared.
    pub fn notify(&self, token: &str) -> bool {
        match self.inner.upgrade() {
            Some(inner) => inner.expire(token),
            None => false,
        }
    }
}

/// Accepts both `{authToken, user: {...}}` and the flat
/// `{authToken, _id, login, admin}` shape.
fn parse_login_body(body: Value) -> Result<(String, User, Option<DateTime<Utc>>), AuthError> {
    let auth_token: AuthToken = body
        .get("authToken")
        .cloned()
        .ok_or_else(|| AuthError::MalformedResponse("missing authToken".to_string()))
        .and_then(|v| {
            serde_json::from_value(v)
                .map_err(|e| AuthError::MalformedResponse(format!("authToken: {}", e)))
        })?;
    if auth_token.token.is_empty() {
        return Err(AuthError::MalformedResponse("empty token".to_string()));
    }

    let user_value = if body.get("user").is_some_and(Value::is_object) {
        body["user"].clone()
    } else {
        body
    };
    let user: User = serde_json::from_value(user_value)
        .map_err(|e| AuthError::MalformedResponse(format!("user: {}", e)))?;

    let expires = auth_token
        .expires
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok((auth_token.token, user, expires))
}
