//! Top-level facade crate for polykern.
//!
//! Re-exports the policy primitives and the engine so hosts can depend on a single crate.

pub mod core {
    pub use polykern_core::*;
}

pub mod engine {
    pub use polykern_engine::*;
}
