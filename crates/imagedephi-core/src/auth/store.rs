//! Process-wide holder of the current session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::watch;
use tracing::{debug, warn};

use super::jar::CookieJar;
use super::session::{PersistedIdentity, Session, SessionStatus, User};
use super::{TOKEN_COOKIE, USER_COOKIE};

type Listener = Arc<dyn Fn(&Session) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Observable session state.
///
/// Every `set` replaces the whole session, so observers never see a token
/// without its user.
pub struct TokenStore {
    tx: watch::Sender<Session>,
    listeners: Arc<Mutex<Listeners>>,
    /// Restored cookie token with no cached identity yet. Never exposed
    /// through `Session`.
    pending: Mutex<Option<String>>,
    /// Sessions published but not yet handed to listeners, oldest first.
    undelivered: Mutex<Vec<Session>>,
    delivering: AtomicBool,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore {
    pub fn new() -> Self {
        Self::with_session(Session::unauthenticated())
    }

    fn with_session(session: Session) -> Self {
        let (tx, _rx) = watch::channel(session);
        Self {
            tx,
            listeners: Arc::new(Mutex::new(Listeners::default())),
            pending: Mutex::new(None),
            undelivered: Mutex::new(Vec::new()),
            delivering: AtomicBool::new(false),
        }
    }

    /// Build the store from whatever the cookie jar persisted last run.
    ///
    /// A token with a cached, unexpired identity is restored as
    /// `Authenticated` and should be revalidated right away. A token with
    /// no identity is kept pending and the status is `Authenticating`.
    pub fn restore(jar: &dyn CookieJar) -> Self {
        let token = match jar.get(TOKEN_COOKIE) {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!("No session cookie found");
                return Self::new();
            }
            Err(e) => {
                warn!(error = %e, "Failed to read session cookie");
                return Self::new();
            }
        };

        let identity = match jar.get(USER_COOKIE) {
            Ok(Some(raw)) => match serde_json::from_str::<PersistedIdentity>(&raw) {
                Ok(identity) => Some(identity),
                Err(e) => {
                    warn!(error = %e, "Failed to parse cached identity cookie");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read cached identity cookie");
                None
            }
        };

        match identity {
            Some(identity) if identity.is_expired() => {
                debug!(login = %identity.user.login, "Persisted session has expired");
                Self::new()
            }
            Some(identity) => {
                debug!(login = %identity.user.login, "Session restored from cookie");
                Self::with_session(Session::authenticated(token, identity.user, identity.expires))
            }
            None => {
                debug!("Session cookie has no cached identity, awaiting revalidation");
                let store = Self::with_session(Session::authenticating());
                *store.pending.lock().unwrap_or_else(|e| e.into_inner()) = Some(token);
                store
            }
        }
    }

    pub fn get(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.tx.borrow().token().map(str::to_string)
    }

    pub fn user(&self) -> Option<User> {
        self.tx.borrow().user().cloned()
    }

    pub fn status(&self) -> SessionStatus {
        self.tx.borrow().status()
    }

    /// Replace the session and notify every observer.
    #[cfg(test)]
    pub(crate) fn set(&self, session: Session) {
        self.publish(session);
        self.deliver();
    }

    /// Replace the session without running listeners yet. `watch` receivers
    /// see the change at once; listeners get it on the next `deliver`.
    pub(crate) fn publish(&self, session: Session) {
        self.tx.send_replace(session.clone());
        self.undelivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(session);
    }

    /// Hand every published session to the listeners, in order.
    ///
    /// Only one caller delivers at a time; a nested or concurrent call leaves
    /// its sessions to the active one.
    pub(crate) fn deliver(&self) {
        loop {
            if self.delivering.swap(true, Ordering::AcqRel) {
                return;
            }
            loop {
                let batch = {
                    let mut queue = self.undelivered.lock().unwrap_or_else(|e| e.into_inner());
                    std::mem::take(&mut *queue)
                };
                if batch.is_empty() {
                    break;
                }
                // Clone the list so listeners can subscribe or unsubscribe re-entrantly.
                let listeners: Vec<Listener> = {
                    let guard = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
                    guard.entries.iter().map(|(_, f)| Arc::clone(f)).collect()
                };
                for session in &batch {
                    for listener in &listeners {
                        listener(session);
                    }
                }
            }
            self.delivering.store(false, Ordering::Release);
            if self.undelivered.lock().unwrap_or_else(|e| e.into_inner()).is_empty() {
                return;
            }
        }
    }

    pub(crate) fn pending_token(&self) -> Option<String> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn clear_pending(&self) {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    /// Call `f` with the new session after every change.
    ///
    /// Listeners run after the manager has released its commit lock, so a
    /// listener may call back into the manager (for example to report an
    /// expired token).
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        let mut guard = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let id = guard.next_id;
        guard.next_id += 1;
        guard.entries.push((id, Arc::new(f)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Receiver that yields on every change, for async observers.
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }
}

/// Handle returned by [`TokenStore::subscribe`]. The listener is removed
/// when this is dropped.
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            let mut guard = listeners.lock().unwrap_or_else(|e| e.into_inner());
            guard.entries.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::codec::write_cookie;
    use crate::auth::jar::MemoryCookieJar;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn alice() -> User {
        User {
            id: "u1".to_string(),
            login: "alice".to_string(),
            admin: false,
        }
    }

    fn alice_cookie() -> String {
        write_cookie(USER_COOKIE, r#"{"_id":"u1","login":"alice","admin":false}"#)
    }

    #[test]
    fn test_subscribe_sees_every_change_and_unsubscribes() {
        let store = TokenStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let sub = store.subscribe(move |s| {
            // token and user must always agree
            assert_eq!(s.token().is_some(), s.user().is_some());
            sink.lock().unwrap().push(s.status());
        });

        store.set(Session::authenticating());
        store.set(Session::authenticated("abc".to_string(), alice(), None));
        sub.unsubscribe();
        store.set(Session::unauthenticated());

        assert_eq!(
            *seen.lock().unwrap(),
            vec![SessionStatus::Authenticating, SessionStatus::Authenticated]
        );
    }

    #[test]
    fn test_dropping_subscription_removes_listener() {
        let store = TokenStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = Arc::clone(&calls);
            let _sub = store.subscribe(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
            store.set(Session::unauthenticated());
        }
        store.set(Session::unauthenticated());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_watch_receives_latest_session() {
        let store = TokenStore::new();
        let mut rx = store.watch();
        store.set(Session::authenticated("abc".to_string(), alice(), None));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().token(), Some("abc"));
    }

    #[test]
    fn test_restore_without_cookie() {
        let jar = MemoryCookieJar::new();
        let store = TokenStore::restore(&jar);
        assert_eq!(store.status(), SessionStatus::Unauthenticated);
        assert!(store.pending_token().is_none());
    }

    #[test]
    fn test_restore_with_token_and_identity() {
        let jar = MemoryCookieJar::from_header(&format!("girderToken=abc123; {}", alice_cookie()));
        let store = TokenStore::restore(&jar);
        assert_eq!(store.status(), SessionStatus::Authenticated);
        assert_eq!(store.token().as_deref(), Some("abc123"));
        assert_eq!(store.user(), Some(alice()));
    }

    #[test]
    fn test_restore_token_without_identity_is_pending() {
        let jar = MemoryCookieJar::from_header("girderToken=abc123");
        let store = TokenStore::restore(&jar);
        assert_eq!(store.status(), SessionStatus::Authenticating);
        assert!(store.token().is_none());
        assert_eq!(store.pending_token().as_deref(), Some("abc123"));
    }

    #[test]
    fn test_restore_expired_identity() {
        let identity = write_cookie(
            USER_COOKIE,
            r#"{"_id":"u1","login":"alice","admin":false,"expires":"2001-01-01T00:00:00Z"}"#,
        );
        let jar = MemoryCookieJar::from_header(&format!("girderToken=abc123; {}", identity));
        let store = TokenStore::restore(&jar);
        assert_eq!(store.status(), SessionStatus::Unauthenticated);
        assert!(store.pending_token().is_none());
    }
}
