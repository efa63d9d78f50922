// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight refresh gate.
//!
//! The first request rejected with an auth error leads a refresh; every
//! other request failing while that refresh is in flight queues behind it.
//! When the refresh settles, the gate replays the leader and then the queue
//! in arrival order (success), or rejects the whole batch with the refresh
//! error (failure). At most one refresh call is ever outstanding.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Response, Url};
use tokio::sync::{broadcast, oneshot, Mutex};

use crate::auth::token::TokenStore;
use crate::auth::{refresh, AuthEvent};
use crate::client::ApiClient;
use crate::error::ClientError;
use crate::request::RequestDescriptor;

/// A request suspended while a refresh is in flight, plus the handle that
/// completes its caller. Consumed exactly once at settlement.
struct PendingReplay {
    descriptor: RequestDescriptor,
    done: oneshot::Sender<Result<Response, ClientError>>,
}

/// Gate state: one per client instance, never global.
struct RefreshState {
    refreshing: bool,
    queue: Vec<PendingReplay>,
}

/// Outcome of the admission check, decided atomically under the state lock.
enum Admission {
    /// First auth failure while idle: run the refresh.
    Lead(RequestDescriptor),
    /// A refresh is already in flight: wait for its settlement.
    Wait(oneshot::Receiver<Result<Response, ClientError>>),
}

pub struct RefreshGate {
    state: Mutex<RefreshState>,
    /// Bare transport for the refresh endpoint only. No bearer header, no
    /// interception; authenticates via the refresh cookie in the shared jar.
    transport: reqwest::Client,
    refresh_url: Url,
    store: Arc<dyn TokenStore>,
    event_tx: broadcast::Sender<AuthEvent>,
    /// Bound on a queued caller's wait, from the configured request timeout.
    queue_timeout: Duration,
}

impl RefreshGate {
    pub(crate) fn new(
        transport: reqwest::Client,
        refresh_url: Url,
        store: Arc<dyn TokenStore>,
        event_tx: broadcast::Sender<AuthEvent>,
        queue_timeout: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(RefreshState { refreshing: false, queue: Vec::new() }),
            transport,
            refresh_url,
            store,
            event_tx,
            queue_timeout,
        }
    }

    pub(crate) fn refresh_url(&self) -> &Url {
        &self.refresh_url
    }

    /// Whether a refresh is currently in flight.
    pub async fn is_refreshing(&self) -> bool {
        self.state.lock().await.refreshing
    }

    /// Entry point for a request that was rejected with an auth error and is
    /// eligible for the protocol (not yet retried, not the refresh endpoint).
    ///
    /// Returns the replay's response after a successful refresh, or the
    /// refresh error shared by the whole batch.
    pub(crate) async fn resolve(
        self: &Arc<Self>,
        client: Arc<ApiClient>,
        mut descriptor: RequestDescriptor,
    ) -> Result<Response, ClientError> {
        descriptor.mark_retried();

        let admission = {
            let mut st = self.state.lock().await;
            if st.refreshing {
                tracing::debug!(
                    url = %descriptor.url(),
                    depth = st.queue.len() + 1,
                    "auth error while refresh in flight, queueing"
                );
                let (tx, rx) = oneshot::channel();
                st.queue.push(PendingReplay { descriptor, done: tx });
                Admission::Wait(rx)
            } else {
                st.refreshing = true;
                Admission::Lead(descriptor)
            }
        };

        match admission {
            Admission::Lead(descriptor) => {
                tracing::debug!(url = %descriptor.url(), "auth error, refreshing access token");
                let (tx, rx) = oneshot::channel();
                // Settlement runs in its own task so an impatient caller
                // cannot abort the refresh out from under the queue.
                tokio::spawn(Arc::clone(self).run_settlement(client, descriptor, tx));
                match rx.await {
                    Ok(result) => result,
                    Err(_) => Err(ClientError::Refresh(Arc::new(anyhow::anyhow!(
                        "refresh settled without a result"
                    )))),
                }
            }
            Admission::Wait(rx) => {
                match tokio::time::timeout(self.queue_timeout, rx).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(ClientError::Refresh(Arc::new(anyhow::anyhow!(
                        "refresh settled without a result"
                    )))),
                    // The caller stops waiting; the refresh itself carries on
                    // and will skip this request's replay.
                    Err(_) => Err(ClientError::Timeout),
                }
            }
        }
    }

    /// Perform the single refresh call, then settle the batch.
    async fn run_settlement(
        self: Arc<Self>,
        client: Arc<ApiClient>,
        descriptor: RequestDescriptor,
        done: oneshot::Sender<Result<Response, ClientError>>,
    ) {
        match refresh::do_refresh(&self.transport, self.refresh_url.clone()).await {
            Ok(token) => {
                self.store.set(token);
                let _ = self.event_tx.send(AuthEvent::Refreshed);
                tracing::info!("access token refreshed");

                // Replay the leader first, then drain in arrival order. Each
                // replay picks up the freshly stored token. A replay whose
                // caller already gave up is skipped, not executed.
                if done.is_closed() {
                    tracing::debug!(url = %descriptor.url(), "leader gone, skipping replay");
                } else {
                    let result = client.execute(&descriptor).await;
                    let _ = done.send(result);
                }
                let waiters = self.take_waiters().await;
                let drained = waiters.len();
                for pending in waiters {
                    if pending.done.is_closed() {
                        tracing::debug!(url = %pending.descriptor.url(), "caller gone, skipping replay");
                        continue;
                    }
                    let result = client.execute(&pending.descriptor).await;
                    let _ = pending.done.send(result);
                }
                if drained > 0 {
                    tracing::debug!(count = drained, "replayed queued requests");
                }
            }
            Err(err) => {
                // The refresh failure is authoritative: the whole batch gets
                // it, not their individual auth errors.
                let error = Arc::new(err);
                tracing::warn!(err = %error, "token refresh failed, rejecting batch");
                let _ = self
                    .event_tx
                    .send(AuthEvent::RefreshFailed { error: error.to_string() });
                let _ = done.send(Err(ClientError::Refresh(Arc::clone(&error))));
                for pending in self.take_waiters().await {
                    let _ = pending.done.send(Err(ClientError::Refresh(Arc::clone(&error))));
                }
            }
        }
    }

    /// Capture the queue and leave REFRESHING in one critical section, so a
    /// settling batch is atomic: an auth failure observed after this point
    /// starts a fresh cycle instead of joining a drained queue.
    async fn take_waiters(&self) -> Vec<PendingReplay> {
        let mut st = self.state.lock().await;
        st.refreshing = false;
        std::mem::take(&mut st.queue)
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
