//! polykern engine library entry.
//!
//! This crate wires the policy registry, chain compiler, kernel, executor,
//! and control-plane sync client into one embeddable engine. Hosts (proxies,
//! sidecars) call the executor per exchange and run the sync loop in the
//! background.

pub mod chain;
pub mod config;
pub mod engine;
pub mod executor;
pub mod kernel;
pub mod obs;
pub mod ops;
pub mod registry;
pub mod state;
pub mod sync;
pub mod telemetry;

pub use chain::{ChainBuilder, PolicyChain, PolicySpec};
pub use engine::{EngineTasks, PolicyEngine};
pub use executor::{BodyRequirements, PhaseOutcome, RequestExecutor};
pub use kernel::{ConfigState, Kernel, StoredExchange};
pub use registry::{factory_fn, InstanceKey, PolicyDefinition, PolicyFactory, PolicyRegistry};
