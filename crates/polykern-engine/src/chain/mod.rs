//! Chain compilation.
//!
//! Turns a route's declarative policy list into an executable `PolicyChain`,
//! resolving references through the registry and aggregating body modes.

pub mod builder;
pub mod condition;

pub use builder::{ChainBuilder, ChainEntry, PolicyChain, PolicySpec};
pub use condition::Condition;
