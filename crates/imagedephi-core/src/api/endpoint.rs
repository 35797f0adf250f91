//! Typed REST endpoints for items and their annotations.
//!
//! Every call goes through the [`SessionClient`]. A 401 is reported to the
//! session manager with the token the request carried before the error is
//! returned.

use std::marker::PhantomData;

use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::client::{RequestOptions, SessionClient};
use super::ApiError;
use crate::auth::{AuthSessionManager, ExpiryNotifier};
use crate::models::{GirderKeyspace, Item, TileMetadata};

const API_PREFIX: &str = "/api/v1";

pub struct Endpoint<T> {
    client: SessionClient,
    notifier: ExpiryNotifier,
    route: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Endpoint<T> {
    pub fn new(client: SessionClient, notifier: ExpiryNotifier, route: &str) -> Self {
        Self {
            client,
            notifier,
            route: format!("{}/{}", API_PREFIX, route.trim_start_matches('/')),
            _marker: PhantomData,
        }
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    async fn send(&self, method: Method, options: RequestOptions) -> Result<Response, ApiError> {
        let token = self.client.store().token();
        let response = self
            .client
            .request_with(token.as_deref(), method, &self.route, options)
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            match token {
                Some(ref token) if self.notifier.notify(token) => {
                    warn!(route = %self.route, "Session rejected by server");
                }
                _ => debug!(route = %self.route, "Unauthorized without a current session"),
            }
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }
}

impl<T: DeserializeOwned> Endpoint<T> {
    pub async fn fetch(&self) -> Result<T, ApiError> {
        let response = self.send(Method::GET, RequestOptions::new()).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse {
                route: self.route.clone(),
                message: e.to_string(),
            })
    }
}

impl<T: Serialize> Endpoint<T> {
    pub async fn put(&self, body: &T) -> Result<(), ApiError> {
        let options = RequestOptions::new()
            .json(body)
            .map_err(|e| ApiError::InvalidRequest {
                route: self.route.clone(),
                message: format!("{:#}", e),
            })?;
        self.send(Method::PUT, options).await?;
        Ok(())
    }
}

/// Endpoints for a single image item.
#[derive(Clone)]
pub struct ItemApi {
    client: SessionClient,
    notifier: ExpiryNotifier,
}

impl ItemApi {
    pub fn new(manager: &AuthSessionManager) -> Self {
        Self {
            client: manager.client().clone(),
            notifier: manager.expiry_notifier(),
        }
    }

    fn endpoint<T>(&self, route: String) -> Endpoint<T> {
        Endpoint::new(self.client.clone(), self.notifier.clone(), &route)
    }

    /// The item document; annotations are under `meta.imagedephi.geojson`.
    pub fn geojson(&self, id: &str) -> Endpoint<Item> {
        self.endpoint(format!("item/{}", id))
    }

    pub fn tile_metadata(&self, id: &str) -> Endpoint<TileMetadata> {
        self.endpoint(format!("item/{}/tiles", id))
    }

    /// URLs of the associated images (label, macro, thumbnail).
    pub fn related_image_urls(&self, id: &str) -> Endpoint<Vec<String>> {
        self.endpoint(format!("item/{}/tiles/images", id))
    }

    pub fn put_geojson(&self, id: &str) -> Endpoint<GirderKeyspace> {
        self.endpoint(format!("item/{}/metadata", id))
    }
}
