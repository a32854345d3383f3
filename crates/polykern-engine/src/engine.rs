//! Engine assembly.
//!
//! Wires the registry, kernel, state stores, executor, and sync client of one
//! engine instance together. Nothing here is process-global: two engines in
//! one process share no state.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use polykern_core::error::Result;

use crate::chain::ChainBuilder;
use crate::config::EngineConfig;
use crate::executor::RequestExecutor;
use crate::kernel::{spawn_exchange_sweeper, Kernel};
use crate::obs::EngineMetrics;
use crate::registry::PolicyRegistry;
use crate::state::{ApiKeyStore, MetadataStore};
use crate::sync::{
    ApiKeyHandler, ConfigSyncClient, DiscoveryTransport, MetadataHandler, Node,
    PolicyChainHandler, ReconnectManager, TcpTransport,
};

#[derive(Clone)]
pub struct PolicyEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    cfg: EngineConfig,
    registry: Arc<PolicyRegistry>,
    kernel: Arc<Kernel>,
    api_keys: Arc<ApiKeyStore>,
    metadata: Arc<MetadataStore>,
    metrics: Arc<EngineMetrics>,
    executor: RequestExecutor,
}

/// Background tasks started by `PolicyEngine::start`.
pub struct EngineTasks {
    pub sync: JoinHandle<Result<()>>,
    pub sweeper: JoinHandle<()>,
}

impl PolicyEngine {
    /// Build an engine around an already-populated registry.
    pub fn new(cfg: EngineConfig, registry: PolicyRegistry) -> Result<Self> {
        cfg.validate()?;

        let kernel = Arc::new(Kernel::new());
        let metrics = Arc::new(EngineMetrics::default());
        let executor = RequestExecutor::new(
            Arc::clone(&kernel),
            Arc::clone(&metrics),
            cfg.routing.on_route_miss,
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                cfg,
                registry: Arc::new(registry),
                kernel,
                api_keys: Arc::new(ApiKeyStore::new()),
                metadata: Arc::new(MetadataStore::new()),
                metrics,
                executor,
            }),
        })
    }

    pub fn cfg(&self) -> &EngineConfig {
        &self.inner.cfg
    }

    pub fn registry(&self) -> Arc<PolicyRegistry> {
        Arc::clone(&self.inner.registry)
    }

    pub fn kernel(&self) -> Arc<Kernel> {
        Arc::clone(&self.inner.kernel)
    }

    pub fn api_keys(&self) -> Arc<ApiKeyStore> {
        Arc::clone(&self.inner.api_keys)
    }

    pub fn metadata(&self) -> Arc<MetadataStore> {
        Arc::clone(&self.inner.metadata)
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.inner.executor
    }

    pub fn chain_builder(&self) -> ChainBuilder {
        ChainBuilder::new(self.registry())
    }

    /// Ready once a route table from the control plane has been applied.
    pub fn is_ready(&self) -> bool {
        self.inner.metrics.is_synced()
    }

    /// Sync client subscribed to policy chains, API keys, and metadata.
    pub fn sync_client(&self, transport: Arc<dyn DiscoveryTransport>) -> ConfigSyncClient {
        let cfg = &self.inner.cfg;
        let node = Node {
            id: cfg.node.id.clone(),
            cluster: cfg.node.cluster.clone(),
        };

        ConfigSyncClient::new(
            transport,
            node,
            ReconnectManager::from_config(&cfg.reconnect),
            self.metrics(),
        )
        .with_timeouts(
            cfg.control_plane.connect_timeout(),
            cfg.control_plane.request_timeout(),
        )
        .with_handler(Arc::new(PolicyChainHandler::new(
            self.chain_builder(),
            self.kernel(),
            self.metrics(),
        )))
        .with_handler(Arc::new(ApiKeyHandler::new(self.api_keys())))
        .with_handler(Arc::new(MetadataHandler::new(self.metadata())))
    }

    /// TCP transport for the configured control-plane address.
    pub fn tcp_transport(&self) -> Arc<dyn DiscoveryTransport> {
        let cp = &self.inner.cfg.control_plane;
        Arc::new(TcpTransport::new(cp.address.clone(), cp.max_frame_bytes))
    }

    /// Spawn the sync loop and the exchange sweeper under one token.
    pub fn start(
        &self,
        transport: Arc<dyn DiscoveryTransport>,
        cancel: CancellationToken,
    ) -> EngineTasks {
        let client = self.sync_client(transport);
        let sync = tokio::spawn(client.run(cancel.clone()));

        let ex = &self.inner.cfg.exchanges;
        let sweeper = spawn_exchange_sweeper(
            self.kernel(),
            Duration::from_millis(ex.ttl_ms),
            Duration::from_millis(ex.sweep_interval_ms),
            cancel,
        );

        EngineTasks { sync, sweeper }
    }
}
