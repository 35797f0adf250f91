//! Session and authentication management.
//!
//! This module provides:
//! - `AuthSessionManager`: login, logout and revalidation state machine
//! - `TokenStore`: the observable current `Session`
//! - `CookieJar`: persistence of the token across runs
//! - `codec`: Basic-Auth and cookie encoding
//!
//! Sessions are restored from the cookie jar at startup and should be
//! revalidated once before use.

pub mod codec;
pub mod error;
pub mod jar;
pub mod manager;
pub mod session;
pub mod store;

pub use error::AuthError;
pub use jar::{CookieJar, FileCookieJar, MemoryCookieJar};
pub use manager::{AuthSessionManager, ExpiryNotifier, SessionEvent};
pub use session::{Session, SessionStatus, User};
pub use store::{Subscription, TokenStore};

/// Cookie holding the raw session token.
pub const TOKEN_COOKIE: &str = "girderToken";

/// Cookie holding the cached identity as JSON.
pub const USER_COOKIE: &str = "girderUser";
