// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end client tests.
//!
//! Serves a minimal rendition of the backend over real TCP: a handful of
//! list endpoints guarded by a bearer token, plus `POST /auth/refresh`
//! rotating that token.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;

static INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times; only the first call has effect.
pub fn ensure_crypto() {
    INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

struct ApiState {
    /// Token the API currently accepts. Rotated by the refresh endpoint.
    current_token: parking_lot::Mutex<String>,
    refresh_calls: AtomicU32,
}

/// An in-process backend: expired tokens get 401, `POST /auth/refresh`
/// issues the currently valid token.
pub struct ApiServer {
    base_url: String,
    state: Arc<ApiState>,
}

impl ApiServer {
    /// Start a backend that accepts `valid_token` and hands it out on
    /// refresh.
    pub async fn start(valid_token: &str) -> anyhow::Result<Self> {
        let state = Arc::new(ApiState {
            current_token: parking_lot::Mutex::new(valid_token.to_owned()),
            refresh_calls: AtomicU32::new(0),
        });
        let app = Router::new()
            .route("/auth/refresh", post(refresh))
            .route("/accounts", get(list))
            .route("/branches", get(list))
            .route("/employees", get(list))
            .with_state(Arc::clone(&state));
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        Ok(Self { base_url: format!("http://{addr}"), state })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn refresh_calls(&self) -> u32 {
        self.state.refresh_calls.load(Ordering::Relaxed)
    }
}

async fn refresh(State(st): State<Arc<ApiState>>) -> Response {
    st.refresh_calls.fetch_add(1, Ordering::Relaxed);
    // Small delay so concurrent failures pile up behind one refresh.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let token = st.current_token.lock().clone();
    Json(serde_json::json!({ "accessToken": token })).into_response()
}

async fn list(State(st): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    if bearer == st.current_token.lock().as_str() {
        Json(serde_json::json!({ "items": [] })).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, "expired").into_response()
    }
}
