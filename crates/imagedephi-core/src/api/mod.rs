//! REST API client module for the annotation server.
//!
//! This module provides the `SessionClient`, which attaches the current
//! session token to every request, and typed endpoints for items, tile
//! metadata and annotations built on top of it.

pub mod client;
pub mod endpoint;
pub mod error;

pub use client::{RequestOptions, SessionClient, SESSION_HEADER};
pub use endpoint::{Endpoint, ItemApi};
pub use error::ApiError;
