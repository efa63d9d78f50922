// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Configuration for an [`crate::ApiClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the API server (e.g. `https://api.example.com`).
    pub base_url: String,

    /// Path of the token refresh endpoint, resolved against `base_url`.
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,

    /// Per-request timeout in milliseconds. Also bounds how long a request
    /// that failed during an in-flight refresh waits for that refresh.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_refresh_path() -> String {
    "/auth/refresh".to_owned()
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl ClientConfig {
    /// Config with defaults for everything but the base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_path: default_refresh_path(),
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
