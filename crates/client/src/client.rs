// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The authenticated API client.

use std::sync::Arc;

use reqwest::{Method, Response, StatusCode, Url};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::auth::gate::RefreshGate;
use crate::auth::token::TokenStore;
use crate::auth::{AuthEvent, AuthStatus};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::request::RequestDescriptor;

/// HTTP client that attaches the current access token to every request and
/// resolves expired-token failures through the [`RefreshGate`] before the
/// caller ever sees them.
///
/// Application code uses it like any HTTP client: statuses come back as
/// responses (a 500 is the caller's problem, untouched), and a 401/403 is
/// only surfaced once the refresh protocol has given up on it.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    store: Arc<dyn TokenStore>,
    gate: Arc<RefreshGate>,
    event_tx: broadcast::Sender<AuthEvent>,
}

impl ApiClient {
    /// Build a client from config and a token store.
    ///
    /// Returns the client and the initial [`AuthEvent`] receiver. The main
    /// client and the refresh transport share a cookie jar, so a refresh
    /// cookie set by the backend rides along on refresh calls.
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn TokenStore>,
    ) -> anyhow::Result<(Arc<Self>, broadcast::Receiver<AuthEvent>)> {
        let base_url = Url::parse(&config.base_url)?;
        let refresh_url = base_url.join(&config.refresh_path)?;

        let jar = Arc::new(reqwest::cookie::Jar::default());
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .cookie_provider(Arc::clone(&jar))
            .build()?;
        let transport = reqwest::Client::builder()
            .timeout(config.timeout())
            .cookie_provider(jar)
            .build()?;

        let (event_tx, event_rx) = broadcast::channel(16);
        let gate = Arc::new(RefreshGate::new(
            transport,
            refresh_url,
            Arc::clone(&store),
            event_tx.clone(),
            config.timeout(),
        ));

        Ok((Arc::new(Self { http, base_url, store, gate, event_tx }), event_rx))
    }

    /// Subscribe to auth events (additional receivers).
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.event_tx.subscribe()
    }

    /// Inject an access token obtained out-of-band (e.g. from login).
    pub fn seed(&self, token: impl Into<String>) {
        self.store.set(token.into());
        let _ = self.event_tx.send(AuthEvent::Refreshed);
    }

    /// Observable authentication state.
    pub async fn status(&self) -> AuthStatus {
        if self.gate.is_refreshing().await {
            return AuthStatus::Refreshing;
        }
        if self.store.get().is_some() {
            AuthStatus::Authenticated
        } else {
            AuthStatus::Anonymous
        }
    }

    /// Send a request, transparently refreshing the access token if the
    /// backend rejects it.
    pub async fn send(
        self: &Arc<Self>,
        descriptor: RequestDescriptor,
    ) -> Result<Response, ClientError> {
        let response = self.execute(&descriptor).await?;
        if !is_auth_error(response.status()) {
            return Ok(response);
        }
        // Terminal auth errors never re-enter the protocol: a descriptor
        // that was already replayed once, and the refresh endpoint's own
        // rejections.
        if descriptor.retried() || descriptor.url() == self.gate.refresh_url() {
            return Ok(response);
        }
        self.gate.resolve(Arc::clone(self), descriptor).await
    }

    pub async fn get(self: &Arc<Self>, path: &str) -> Result<Response, ClientError> {
        self.send(RequestDescriptor::new(Method::GET, self.join(path)?)).await
    }

    pub async fn delete(self: &Arc<Self>, path: &str) -> Result<Response, ClientError> {
        self.send(RequestDescriptor::new(Method::DELETE, self.join(path)?)).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        self: &Arc<Self>,
        path: &str,
        body: &T,
    ) -> Result<Response, ClientError> {
        let descriptor =
            RequestDescriptor::new(Method::POST, self.join(path)?).json_body(to_json(path, body)?);
        self.send(descriptor).await
    }

    pub async fn put_json<T: Serialize + ?Sized>(
        self: &Arc<Self>,
        path: &str,
        body: &T,
    ) -> Result<Response, ClientError> {
        let descriptor =
            RequestDescriptor::new(Method::PUT, self.join(path)?).json_body(to_json(path, body)?);
        self.send(descriptor).await
    }

    /// Issue a descriptor once: attach the current token if present (absence
    /// is fine, some endpoints are public) and send. No refresh handling.
    pub(crate) async fn execute(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<Response, ClientError> {
        let mut req = self
            .http
            .request(descriptor.method().clone(), descriptor.url().clone())
            .headers(descriptor.headers().clone());
        if let Some(token) = self.store.get() {
            req = req.bearer_auth(token);
        }
        if let Some(body) = descriptor.body_bytes() {
            req = req.body(body.clone());
        }
        req.send().await.map_err(ClientError::from)
    }

    fn join(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidRequest(format!("{path}: {e}")))
    }
}

fn is_auth_error(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

fn to_json<T: Serialize + ?Sized>(path: &str, body: &T) -> Result<bytes::Bytes, ClientError> {
    serde_json::to_vec(body)
        .map(bytes::Bytes::from)
        .map_err(|e| ClientError::InvalidRequest(format!("serializing body for {path}: {e}")))
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
