//! The BATMAN-lite mesh routing and forwarding engine.

pub mod dedup;
pub mod header;
pub mod id;
pub mod node;
pub mod routing;

pub use id::{derive_node_id, NodeId};
pub use node::{DeliveryCallback, MeshNode, SendError};
