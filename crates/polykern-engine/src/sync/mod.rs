//! Control-plane synchronization.
//!
//! Keeps the kernel's route table and the state stores in step with the
//! control plane over a long-lived discovery stream.

pub mod client;
pub mod handlers;
pub mod protocol;
pub mod reconnect;
pub mod transport;

pub use client::{ConfigSyncClient, SyncState};
pub use handlers::{ApiKeyHandler, HandlerOutcome, MetadataHandler, PolicyChainHandler, ResourceHandler};
pub use protocol::{
    unwrap_envelope, DecodedResource, DiscoveryRequest, DiscoveryResponse, Node,
    API_KEY_STATE_TYPE_URL, METADATA_TYPE_URL, POLICY_CHAIN_TYPE_URL,
};
pub use reconnect::ReconnectManager;
pub use transport::{
    channel_transport, ChannelTransport, ControlPlaneHandle, DiscoveryStream, DiscoveryTransport,
    ServerConnection, TcpTransport,
};
