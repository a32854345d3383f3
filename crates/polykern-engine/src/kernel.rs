//! Kernel: live route table + in-flight exchange table.
//!
//! - Route table: single writer (the sync client), many readers (executors).
//!   Every mutation builds a new `ConfigState` and swaps the pointer, so a
//!   reader holding a snapshot sees either the whole old table or the whole
//!   new one.
//! - Exchange table: correlation id -> request-phase state, written by many
//!   concurrent exchanges. Entries are removed on completion or swept on age.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use polykern_core::error::{PolykernError, Result};
use polykern_core::{ExchangeContext, RouteKey};

use crate::chain::PolicyChain;

/// One immutable generation of the route table.
#[derive(Debug, Default)]
pub struct ConfigState {
    /// Local, strictly increasing generation counter.
    pub generation: u64,
    /// Version string the control plane attached to this table.
    pub version_info: String,
    pub routes: HashMap<RouteKey, Arc<PolicyChain>>,
}

impl ConfigState {
    pub fn chain(&self, route_key: &str) -> Option<Arc<PolicyChain>> {
        self.routes.get(route_key).cloned()
    }
}

/// Request-phase state parked until the response phase.
#[derive(Debug, Clone)]
pub struct StoredExchange {
    pub context: ExchangeContext,
    pub chain: Arc<PolicyChain>,
    pub stored_at: Instant,
}

#[derive(Default)]
pub struct Kernel {
    state: ArcSwap<ConfigState>,
    writer: Mutex<()>,
    exchanges: DashMap<String, StoredExchange>,
}

impl Kernel {
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(ConfigState::default()),
            writer: Mutex::new(()),
            exchanges: DashMap::new(),
        }
    }

    // --------------------
    // Route table
    // --------------------

    /// Install or replace one route.
    pub fn register_route(&self, chain: PolicyChain) {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.state.load();
        let mut routes = current.routes.clone();
        let key = chain.route_key().to_string();
        routes.insert(key.clone(), Arc::new(chain));
        self.state.store(Arc::new(ConfigState {
            generation: current.generation + 1,
            version_info: current.version_info.clone(),
            routes,
        }));
        tracing::debug!(route_key = %key, "route registered");
    }

    /// Remove one route; returns the chain that was bound to it.
    pub fn unregister_route(&self, route_key: &str) -> Option<Arc<PolicyChain>> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.state.load();
        if !current.routes.contains_key(route_key) {
            return None;
        }
        let mut routes = current.routes.clone();
        let removed = routes.remove(route_key);
        self.state.store(Arc::new(ConfigState {
            generation: current.generation + 1,
            version_info: current.version_info.clone(),
            routes,
        }));
        tracing::debug!(route_key = %route_key, "route unregistered");
        removed
    }

    /// Replace the whole route table in one cut-over. Routes not present in
    /// `routes` are gone afterwards. Returns the new generation.
    pub fn apply_whole_routes(
        &self,
        version_info: &str,
        routes: HashMap<RouteKey, PolicyChain>,
    ) -> u64 {
        let routes: HashMap<RouteKey, Arc<PolicyChain>> =
            routes.into_iter().map(|(k, c)| (k, Arc::new(c))).collect();

        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = self.state.load().generation + 1;
        let count = routes.len();
        self.state.store(Arc::new(ConfigState {
            generation,
            version_info: version_info.to_string(),
            routes,
        }));
        tracing::info!(generation, version = %version_info, routes = count, "route table replaced");
        generation
    }

    pub fn chain(&self, route_key: &str) -> Result<Arc<PolicyChain>> {
        self.state
            .load()
            .chain(route_key)
            .ok_or_else(|| PolykernError::NotFound(format!("route {route_key}")))
    }

    /// The current table as one consistent snapshot.
    pub fn snapshot(&self) -> Arc<ConfigState> {
        self.state.load_full()
    }

    pub fn route_count(&self) -> usize {
        self.state.load().routes.len()
    }

    pub fn generation(&self) -> u64 {
        self.state.load().generation
    }

    // --------------------
    // Exchange table
    // --------------------

    pub fn store_exchange(
        &self,
        correlation_id: impl Into<String>,
        context: ExchangeContext,
        chain: Arc<PolicyChain>,
    ) {
        self.exchanges.insert(
            correlation_id.into(),
            StoredExchange {
                context,
                chain,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn exchange(&self, correlation_id: &str) -> Result<StoredExchange> {
        self.exchanges
            .get(correlation_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| PolykernError::NotFound(format!("exchange {correlation_id}")))
    }

    /// Remove and return in one step.
    pub fn take_exchange(&self, correlation_id: &str) -> Option<StoredExchange> {
        self.exchanges.remove(correlation_id).map(|(_, e)| e)
    }

    pub fn remove_exchange(&self, correlation_id: &str) -> bool {
        self.exchanges.remove(correlation_id).is_some()
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.len()
    }

    /// Drop exchanges stored longer than `max_age` ago.
    pub fn evict_stale_exchanges(&self, max_age: Duration) -> usize {
        let before = self.exchanges.len();
        self.exchanges.retain(|_, e| e.stored_at.elapsed() < max_age);
        before.saturating_sub(self.exchanges.len())
    }
}

/// Periodically evict exchanges whose response phase never arrived.
pub fn spawn_exchange_sweeper(
    kernel: Arc<Kernel>,
    ttl: Duration,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    let evicted = kernel.evict_stale_exchanges(ttl);
                    if evicted > 0 {
                        tracing::warn!(evicted, "evicted stale exchanges");
                    }
                }
            }
        }
    })
}
