// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests: a client against the in-process backend, driven
//! only through the public surface.

use std::sync::Arc;

use futures_util::future::join_all;

use till_client::{ApiClient, AuthEvent, AuthStatus, ClientConfig, MemoryTokenStore};
use till_specs::{ensure_crypto, ApiServer};

fn client_for(
    server: &ApiServer,
    initial_token: &str,
) -> anyhow::Result<(Arc<ApiClient>, tokio::sync::broadcast::Receiver<AuthEvent>)> {
    ensure_crypto();
    let store = Arc::new(MemoryTokenStore::with_token(initial_token));
    ApiClient::new(ClientConfig::new(server.base_url()), store)
}

// -- Transparent refresh ------------------------------------------------------

#[tokio::test]
async fn expired_token_is_refreshed_once_for_concurrent_requests() -> anyhow::Result<()> {
    let server = ApiServer::start("T2").await?;
    let (client, mut rx) = client_for(&server, "T1")?;

    // Three list screens load at once with a stale token.
    let results = join_all([
        client.get("/accounts"),
        client.get("/branches"),
        client.get("/employees"),
    ])
    .await;

    for result in results {
        let resp = result?;
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = resp.json().await?;
        assert!(body["items"].is_array());
    }

    assert_eq!(server.refresh_calls(), 1);
    assert!(matches!(rx.try_recv(), Ok(AuthEvent::Refreshed)));
    Ok(())
}

#[tokio::test]
async fn valid_token_never_touches_refresh() -> anyhow::Result<()> {
    let server = ApiServer::start("T2").await?;
    let (client, _rx) = client_for(&server, "T2")?;

    let resp = client.get("/accounts").await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(server.refresh_calls(), 0);
    Ok(())
}

// -- Session lifecycle --------------------------------------------------------

#[tokio::test]
async fn seed_and_status_reflect_session_state() -> anyhow::Result<()> {
    ensure_crypto();
    let server = ApiServer::start("T2").await?;
    let store = Arc::new(MemoryTokenStore::new());
    let (client, mut rx) = ApiClient::new(
        ClientConfig::new(server.base_url()),
        Arc::clone(&store) as Arc<dyn till_client::TokenStore>,
    )?;

    assert_eq!(client.status().await, AuthStatus::Anonymous);

    client.seed("T2");
    assert_eq!(client.status().await, AuthStatus::Authenticated);
    assert!(matches!(rx.try_recv(), Ok(AuthEvent::Refreshed)));

    let resp = client.get("/employees").await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    Ok(())
}
