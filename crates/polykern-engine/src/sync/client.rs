//! Discovery sync client.
//!
//! `Disconnected -> Connecting -> Streaming -> Disconnected`, looping on any
//! transport failure with exponential backoff. One cancellation token governs
//! the whole loop: cancelling it tears down the stream and aborts the backoff
//! wait.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use polykern_core::error::{PolykernError, Result};

use super::handlers::ResourceHandler;
use super::protocol::{
    self, DiscoveryRequest, DiscoveryResponse, Node,
};
use super::reconnect::ReconnectManager;
use super::transport::{DiscoveryStream, DiscoveryTransport};
use crate::obs::EngineMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Disconnected,
    Connecting,
    Streaming,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Disconnected => "disconnected",
            SyncState::Connecting => "connecting",
            SyncState::Streaming => "streaming",
        }
    }
}

pub struct ConfigSyncClient {
    transport: Arc<dyn DiscoveryTransport>,
    node: Node,
    handlers: Vec<Arc<dyn ResourceHandler>>,
    reconnect: ReconnectManager,
    connect_timeout: Duration,
    request_timeout: Duration,
    metrics: Arc<EngineMetrics>,
    state_tx: watch::Sender<SyncState>,
    /// Last version ACKed per type url; replayed when resubscribing.
    accepted_versions: HashMap<String, String>,
}

impl ConfigSyncClient {
    pub fn new(
        transport: Arc<dyn DiscoveryTransport>,
        node: Node,
        reconnect: ReconnectManager,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SyncState::Disconnected);
        Self {
            transport,
            node,
            handlers: Vec::new(),
            reconnect,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            metrics,
            state_tx,
            accepted_versions: HashMap::new(),
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    /// Subscribe to a resource type. Later handlers for the same type replace earlier ones.
    pub fn with_handler(mut self, handler: Arc<dyn ResourceHandler>) -> Self {
        self.handlers.retain(|h| h.type_url() != handler.type_url());
        self.handlers.push(handler);
        self
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    pub fn reconnect_manager(&self) -> &ReconnectManager {
        &self.reconnect
    }

    fn set_state(&self, state: SyncState) {
        let prev = self.state_tx.send_replace(state);
        if prev != state {
            tracing::debug!(from = prev.as_str(), to = state.as_str(), "sync state changed");
        }
    }

    /// Run until `cancel` fires. Never returns on transport errors.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let endpoint = self.transport.endpoint();
        tracing::info!(endpoint = %endpoint, node = %self.node.id, "config sync starting");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.set_state(SyncState::Connecting);
            match self.connect(&cancel).await {
                Ok(mut conn) => {
                    self.set_state(SyncState::Streaming);
                    tracing::info!(endpoint = %endpoint, "control plane connected");
                    match self.stream(conn.as_mut(), &cancel).await {
                        Ok(()) => break,
                        Err(e) => {
                            tracing::warn!(endpoint = %endpoint, error = %e, "discovery stream ended");
                        }
                    }
                }
                Err(PolykernError::Cancelled) => break,
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint, error = %e, "control plane connect failed");
                }
            }

            self.set_state(SyncState::Disconnected);
            self.metrics.sync_reconnects.inc(&[]);
            if self.reconnect.wait_with_context(&cancel).await.is_err() {
                break;
            }
        }

        self.set_state(SyncState::Disconnected);
        tracing::info!(endpoint = %endpoint, "config sync stopped");
        Ok(())
    }

    async fn connect(&self, cancel: &CancellationToken) -> Result<Box<dyn DiscoveryStream>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PolykernError::Cancelled),
            r = tokio::time::timeout(self.connect_timeout, self.transport.connect()) => match r {
                Ok(conn) => conn,
                Err(_) => Err(PolykernError::Timeout("connect".into())),
            },
        }
    }

    async fn send(
        &self,
        conn: &mut dyn DiscoveryStream,
        req: &DiscoveryRequest,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let frame = protocol::encode_request(req)?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PolykernError::Cancelled),
            r = tokio::time::timeout(self.request_timeout, conn.send(frame)) => match r {
                Ok(sent) => sent,
                Err(_) => Err(PolykernError::Timeout("send discovery request".into())),
            },
        }
    }

    /// `Ok(())` only when cancelled; any other exit is an error to reconnect on.
    async fn stream(
        &mut self,
        conn: &mut dyn DiscoveryStream,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let subscriptions: Vec<DiscoveryRequest> = self
            .handlers
            .iter()
            .map(|h| {
                let version = self
                    .accepted_versions
                    .get(h.type_url())
                    .map(String::as_str)
                    .unwrap_or("");
                DiscoveryRequest::subscribe(&self.node, h.type_url(), version)
            })
            .collect();
        for req in &subscriptions {
            match self.send(conn, req, cancel).await {
                Err(PolykernError::Cancelled) => return Ok(()),
                other => other?,
            }
        }

        let mut healthy = false;
        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                f = conn.recv() => f,
            };

            let frame = match frame {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    return Err(PolykernError::Transport("stream closed by control plane".into()))
                }
                Err(e) if e.is_transport() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "discovery frame rejected");
                    self.metrics.sync_pushes.inc(&[("type", "unknown"), ("result", "bad_frame")]);
                    continue;
                }
            };

            let resp = match protocol::decode_response(&frame) {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!(error = %e, "discovery frame undecodable, previous state kept");
                    self.metrics.sync_pushes.inc(&[("type", "unknown"), ("result", "bad_frame")]);
                    continue;
                }
            };

            let reply = self.process_response(resp);
            if !reply.is_nack() && !healthy {
                healthy = true;
                self.reconnect.reset();
            }
            match self.send(conn, &reply, cancel).await {
                Err(PolykernError::Cancelled) => return Ok(()),
                other => other?,
            }
        }
    }

    /// Apply one push and build its ACK or NACK.
    pub fn process_response(&mut self, resp: DiscoveryResponse) -> DiscoveryRequest {
        let started = Instant::now();
        let type_url = resp.type_url.as_str();
        let span = tracing::info_span!(
            "discovery_push",
            type_url = %type_url,
            version = %resp.version_info,
            nonce = %resp.nonce,
        );
        let _enter = span.enter();

        let accepted = self
            .accepted_versions
            .get(type_url)
            .cloned()
            .unwrap_or_default();

        let Some(handler) = self.handlers.iter().find(|h| h.type_url() == type_url).cloned() else {
            let err = PolykernError::NotFound(format!("no handler for type {type_url}"));
            tracing::warn!(error = %err, "push rejected");
            self.metrics.sync_pushes.inc(&[("type", type_url), ("result", "nack")]);
            return DiscoveryRequest::nack(&self.node, type_url, &accepted, &resp.nonce, &err);
        };

        let mut decoded = Vec::with_capacity(resp.resources.len());
        for (idx, raw) in resp.resources.iter().enumerate() {
            match protocol::unwrap_envelope(raw) {
                Ok(res) if res.type_url == handler.type_url() => decoded.push(res),
                Ok(res) => {
                    tracing::warn!(
                        resource_index = idx,
                        declared = %res.type_url,
                        expected = handler.type_url(),
                        "resource type mismatch, skipped"
                    );
                    self.metrics.sync_dropped.inc(&[("type", type_url), ("reason", "type_mismatch")]);
                }
                Err(e) => {
                    tracing::warn!(resource_index = idx, error = %e, "envelope unwrap failed, push rejected");
                    self.metrics.sync_pushes.inc(&[("type", type_url), ("result", "nack")]);
                    return DiscoveryRequest::nack(&self.node, type_url, &accepted, &resp.nonce, &e);
                }
            }
        }

        match handler.apply(&resp.version_info, decoded) {
            Ok(outcome) => {
                tracing::info!(
                    accepted = outcome.accepted,
                    dropped = outcome.dropped,
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "push applied"
                );
                self.metrics.sync_pushes.inc(&[("type", type_url), ("result", "ack")]);
                self.accepted_versions
                    .insert(type_url.to_string(), resp.version_info.clone());
                DiscoveryRequest::ack(&self.node, type_url, &resp.version_info, &resp.nonce)
            }
            Err(e) => {
                tracing::warn!(error = %e, "push rejected, previous state kept");
                self.metrics.sync_pushes.inc(&[("type", type_url), ("result", "nack")]);
                DiscoveryRequest::nack(&self.node, type_url, &accepted, &resp.nonce, &e)
            }
        }
    }
}
