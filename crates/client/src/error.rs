// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;
use std::sync::Arc;

/// Terminal errors surfaced by [`crate::ApiClient::send`].
///
/// HTTP error statuses are not errors at this level: a 404 or 500 response
/// comes back as `Ok(response)` untouched, and so does an auth error the
/// refresh protocol refuses to handle (already retried, or from the refresh
/// endpoint itself). `Err` means the request produced no usable response.
///
/// Clonable so one failed refresh can be delivered to every request that
/// was waiting on it.
#[derive(Debug, Clone)]
pub enum ClientError {
    /// The path could not be resolved against the base URL, or the body
    /// could not be serialized.
    InvalidRequest(String),
    /// The request could not be sent or its response could not be read.
    Transport(Arc<reqwest::Error>),
    /// The shared refresh attempt failed; the session cannot be restored.
    Refresh(Arc<anyhow::Error>),
    /// The queued wait outlived the configured request timeout while a
    /// refresh was still in flight.
    Timeout,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            Self::Transport(err) => write!(f, "transport error: {err}"),
            Self::Refresh(err) => write!(f, "token refresh failed: {err}"),
            Self::Timeout => f.write_str("timed out waiting for token refresh"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err.as_ref()),
            Self::InvalidRequest(_) | Self::Refresh(_) | Self::Timeout => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(Arc::new(err))
    }
}
