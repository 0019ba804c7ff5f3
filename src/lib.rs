//! # qmesh-core
//!
//! Mesh routing and link-layer transport core for a packet-radio chat node: a
//! BATMAN-lite proactive routing layer running over AX.25 UI frames carried inside
//! a KISS framing channel to a TNC (serial-attached hardware, or TCP-attached
//! software).
//!
//! This crate owns the hard-engineering parts: concurrent state management,
//! binary framing at two nested layers (AX.25 inside KISS, a mesh header inside the
//! AX.25 information field), TTL/dedup loop suppression, and reconnect-with-backoff
//! partial-failure recovery. It also ships thin, swappable ambient pieces
//! (`config`, `chat`) so a caller can assemble a full node without reaching outside
//! the crate for logging, configuration, or a chat log.
//!
//! ## Layout
//!
//! - [`ax25`]: UI frame encode/decode.
//! - [`kiss`]: KISS byte-framing codec and the [`kiss::KissLink`] manager that owns
//!   one TNC connection and its RX/TX worker threads.
//! - [`mesh`]: the 16-byte mesh header codec, originator/neighbor routing tables,
//!   the DATA dedup cache, and [`mesh::MeshNode`], which wires all of it together.
//! - [`crypto`]: the AEAD layer over DATA payloads.
//! - [`config`]: TOML-backed configuration loader.
//! - [`chat`]: an in-memory deduplicated chat log a consumer can bind a UI to.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use qmesh_core::config;
//! use qmesh_core::mesh::MeshNode;
//!
//! let cfg = config::load_from_path("qmesh.toml").expect("load config");
//! let mut node = MeshNode::new(
//!     cfg,
//!     Some(Arc::new(|origin_id, _dest_id, _seqno, payload| {
//!         println!("from {origin_id:02x?}: {}", String::from_utf8_lossy(&payload));
//!     })),
//! );
//! node.start();
//! node.send_application_data(&[0u8; 8], b"hello mesh").ok();
//! node.stop();
//! ```

pub mod ax25;
pub mod chat;
pub mod config;
pub mod crypto;
pub mod kiss;
pub mod mesh;
