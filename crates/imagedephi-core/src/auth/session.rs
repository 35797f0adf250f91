use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of the logged-in user as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub login: String,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unauthenticated,
    Authenticating,
    Authenticated,
    /// Transient: the session was rejected and is about to be cleared.
    Invalid,
}

/// Snapshot of the client's authentication state.
///
/// A token is only ever held alongside a user, and only while
/// `Authenticated`. The constructors below are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    token: Option<String>,
    user: Option<User>,
    expires: Option<DateTime<Utc>>,
    status: SessionStatus,
}

impl Default for Session {
    fn default() -> Self {
        Self::unauthenticated()
    }
}

impl Session {
    pub fn unauthenticated() -> Self {
        Self::without_credentials(SessionStatus::Unauthenticated)
    }

    pub(crate) fn authenticating() -> Self {
        Self::without_credentials(SessionStatus::Authenticating)
    }

    pub(crate) fn invalid() -> Self {
        Self::without_credentials(SessionStatus::Invalid)
    }

    pub(crate) fn authenticated(token: String, user: User, expires: Option<DateTime<Utc>>) -> Self {
        Self {
            token: Some(token),
            user: Some(user),
            expires,
            status: SessionStatus::Authenticated,
        }
    }

    fn without_credentials(status: SessionStatus) -> Self {
        Self {
            token: None,
            user: None,
            expires: None,
            status,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.expires
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }
}

/// Cached identity written next to the token cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PersistedIdentity {
    #[serde(flatten)]
    pub user: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

impl PersistedIdentity {
    pub fn is_expired(&self) -> bool {
        self.expires.map(|e| Utc::now() > e).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn alice() -> User {
        User {
            id: "u1".to_string(),
            login: "alice".to_string(),
            admin: false,
        }
    }

    #[test]
    fn test_token_and_user_travel_together() {
        let s = Session::unauthenticated();
        assert!(s.token().is_none() && s.user().is_none());

        let s = Session::authenticated("abc123".to_string(), alice(), None);
        assert_eq!(s.token(), Some("abc123"));
        assert_eq!(s.user().map(|u| u.login.as_str()), Some("alice"));
        assert!(s.is_authenticated());

        for s in [Session::authenticating(), Session::invalid()] {
            assert!(s.token().is_none() && s.user().is_none());
            assert!(!s.is_authenticated());
        }
    }

    #[test]
    fn test_user_wire_format() {
        let user: User = serde_json::from_str(r#"{"_id":"u1","login":"alice","admin":true,"email":"a@b.c"}"#)
            .expect("Failed to parse user JSON");
        assert_eq!(user.id, "u1");
        assert!(user.admin);

        let user: User = serde_json::from_str(r#"{"_id":"u2","login":"bob"}"#).unwrap();
        assert!(!user.admin);
    }

    #[test]
    fn test_persisted_identity_expiry() {
        let mut identity = PersistedIdentity { user: alice(), expires: None };
        assert!(!identity.is_expired());

        identity.expires = Some(Utc::now() - Duration::minutes(1));
        assert!(identity.is_expired());

        identity.expires = Some(Utc::now() + Duration::days(30));
        assert!(!identity.is_expired());
    }

    #[test]
    fn test_persisted_identity_json() {
        let identity = PersistedIdentity { user: alice(), expires: None };
        let json = serde_json::to_string(&identity).unwrap();
        assert_eq!(json, r#"{"_id":"u1","login":"alice","admin":false}"#);
        let parsed: PersistedIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, identity);
    }
}
