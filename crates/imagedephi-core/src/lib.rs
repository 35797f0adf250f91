//! Client library for the imagedephi annotation service.
//!
//! - `auth`: session management (login, logout, revalidation)
//! - `api`: the token-carrying HTTP client and typed item endpoints
//! - `models`: tile metadata and GeoJSON annotation types
//! - `config`: persisted client configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
