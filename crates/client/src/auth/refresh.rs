// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The refresh call itself.

use reqwest::Url;
use serde::Deserialize;

/// Success payload of the refresh endpoint.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
}

/// Perform a single refresh request and return the new access token.
///
/// The transport client is separate from the main API client: it attaches no
/// bearer header (the expired token is useless here) and authenticates with
/// the HTTP-only refresh cookie in the shared jar. One attempt only; a
/// failed refresh fails the whole batch and is never retried here.
pub async fn do_refresh(transport: &reqwest::Client, refresh_url: Url) -> anyhow::Result<String> {
    let resp = transport.post(refresh_url).send().await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!("refresh failed ({status}): {text}");
    }

    let token: RefreshResponse = resp.json().await?;
    if token.access_token.is_empty() {
        anyhow::bail!("refresh response carried an empty access token");
    }
    Ok(token.access_token)
}
