//! Node ID derivation: an 8-byte opaque identifier carved out of an ASCII callsign.
//!
//! Take the ASCII bytes, zero-pad on the right to 8, truncate to 8.

pub type NodeId = [u8; 8];

/// Derive a node's routing identity from its callsign. Non-ASCII bytes are dropped
/// first.
pub fn derive_node_id(callsign: &str) -> NodeId {
    let mut id = [0u8; 8];
    let ascii_bytes = callsign.bytes().filter(u8::is_ascii);
    for (slot, b) in id.iter_mut().zip(ascii_bytes) {
        *slot = b;
    }
    id
}
