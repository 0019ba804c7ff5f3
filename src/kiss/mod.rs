//! KISS framing and the link-layer manager built on top of it.

pub mod codec;
pub mod link;
pub mod transport;

pub use link::{KissLink, KissLinkError, LinkHandle, RxCallback};
pub use transport::Transport;
