//! The mesh node engine: wires the header codec, routing tables, dedup cache and
//! crypto/compression layers onto a [`LinkHandle`], and runs the OGM emitter and
//! cleanup sweeper.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{debug, info, trace, warn};
use std::io::{Read, Write};

use crate::ax25;
use crate::config::{MeshNodeConfig, RoutingConfig};
use crate::crypto::MeshEncryptor;
use crate::kiss::link::{KissLink, KissLinkError, LinkHandle, RxCallback};
use crate::mesh::dedup::DedupCache;
use crate::mesh::header::{
    MeshHeader, FLAG_COMPRESSED, FLAG_ENCRYPTED, MSG_TYPE_DATA, MSG_TYPE_OGM,
};
use crate::mesh::id::{derive_node_id, NodeId};
use crate::mesh::routing::RoutingTables;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(5);
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const SELF_ORIGINATED_LINK_METRIC: u8 = 255;
const OGM_BODY_LEN: usize = 9;
const DATA_BODY_PREFIX_LEN: usize = 12;
const NONCE_FIELD_LEN: usize = 12;

/// Delivered to the application for every DATA frame addressed to this node.
/// `(origin_id, dest_id, data_seqno, payload_bytes)`.
pub type DeliveryCallback = Arc<dyn Fn(NodeId, NodeId, u32, Vec<u8>) + Send + Sync>;

/// Errors surfaced to a caller of [`MeshNode::send_application_data`].
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("dest_node_id must be exactly 8 bytes")]
    InvalidDest,
    #[error("mesh node's link is not running")]
    NotRunning,
    #[error("mesh node's link TX queue is full")]
    QueueFull,
}

impl From<KissLinkError> for SendError {
    fn from(e: KissLinkError) -> Self {
        match e {
            KissLinkError::NotRunning => SendError::NotRunning,
            KissLinkError::QueueFull => SendError::QueueFull,
        }
    }
}

/// All node-owned mutable state, shared between the public `MeshNode` handle, the
/// RX dispatch path (invoked from the link's RX thread), and the two background
/// loops. Reference-counted so each side can hold it independently of `MeshNode`'s
/// own lifetime.
struct NodeInner {
    self_node_id: NodeId,
    src_callsign: String,
    mesh_dest_callsign: String,
    routing_config: RoutingConfig,
    routing: Mutex<RoutingTables>,
    dedup: Mutex<DedupCache>,
    seqno: AtomicU32,
    encryptor: MeshEncryptor,
    link: OnceLock<Arc<dyn LinkHandle>>,
    running: AtomicBool,
    delivery_callback: Option<DeliveryCallback>,
}

impl NodeInner {
    fn link(&self) -> &Arc<dyn LinkHandle> {
        self.link.get().expect("MeshNode link not yet attached")
    }

    fn next_seqno(&self) -> u32 {
        self.seqno.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    fn wrap_and_send(&self, info: Vec<u8>) {
        let frame = ax25::build_ui_frame(&self.mesh_dest_callsign, &self.src_callsign, &info);
        if let Err(e) = self.link().send(frame, false, None) {
            warn!("dropping outbound mesh frame: {e}");
        }
    }

    /// Entry point for every AX.25 frame handed up by the link's RX worker: extract
    /// the info field, parse the mesh header, dispatch on `msg_type`. Any
    /// malformed-input condition is a silent drop.
    fn handle_rx_frame(&self, frame: &[u8]) {
        let Some(info) = ax25::extract_info(frame) else {
            return;
        };
        let header = match MeshHeader::parse(info) {
            Ok(header) => header,
            Err(_) => return,
        };
        if header.version != crate::mesh::header::MESH_VERSION {
            trace!(
                "dropping mesh frame with unsupported version {}",
                header.version
            );
            return;
        }
        let body = &info[crate::mesh::header::HEADER_LEN..];

        match header.msg_type {
            MSG_TYPE_OGM => self.handle_ogm(header, body),
            MSG_TYPE_DATA => self.handle_data(header, body),
            other => trace!("dropping mesh frame with unknown msg_type {other}"),
        }
    }

    fn handle_ogm(&self, header: MeshHeader, body: &[u8]) {
        if body.len() < OGM_BODY_LEN {
            return;
        }
        let mut prev_hop_id = [0u8; 8];
        prev_hop_id.copy_from_slice(&body[0..8]);
        let link_metric = body[8];
        let now = Instant::now();

        {
            let mut routing = self.routing.lock().unwrap();
            routing.observe_ogm(
                header.origin_id,
                header.seqno,
                prev_hop_id,
                link_metric,
                now,
            );
        }
        trace!(
            "OGM from origin {:02x?} via {:02x?}, seqno {}, ttl {}",
            header.origin_id,
            prev_hop_id,
            header.seqno,
            header.ttl
        );

        if header.ttl > 1 {
            let fwd_header = header.with_ttl(header.ttl - 1);
            let mut fwd_body = self.self_node_id.to_vec();
            fwd_body.push(link_metric);
            let mut info = fwd_header;
            info.extend_from_slice(&fwd_body);
            self.wrap_and_send(info);
        }
    }

    fn handle_data(&self, header: MeshHeader, body: &[u8]) {
        let now = Instant::now();
        let key = (header.origin_id, header.seqno);
        {
            let mut dedup = self.dedup.lock().unwrap();
            if !dedup.insert_if_new(key, now) {
                return;
            }
        }

        if body.len() < DATA_BODY_PREFIX_LEN {
            return;
        }
        let mut dest_id = [0u8; 8];
        dest_id.copy_from_slice(&body[0..8]);
        let data_seq = u32::from_be_bytes(body[8..12].try_into().unwrap());
        let remainder = &body[DATA_BODY_PREFIX_LEN..];

        let mut aad = Vec::with_capacity(8 + 8 + 4);
        aad.extend_from_slice(&header.origin_id);
        aad.extend_from_slice(&dest_id);
        aad.extend_from_slice(&data_seq.to_be_bytes());

        let decrypted;
        let payload_bytes: &[u8] = if header.flags & FLAG_ENCRYPTED != 0 {
            if remainder.len() < NONCE_FIELD_LEN + 1 {
                return;
            }
            let (nonce, ciphertext) = remainder.split_at(NONCE_FIELD_LEN);
            decrypted = match self.encryptor.decrypt(nonce, ciphertext, &aad) {
                Ok(plaintext) => plaintext,
                Err(_) => {
                    warn!(
                        "AEAD decrypt failed for DATA from origin {:02x?}; dropping",
                        header.origin_id
                    );
                    return;
                }
            };
            &decrypted
        } else {
            remainder
        };

        let decompressed;
        let app_bytes: &[u8] = if header.flags & FLAG_COMPRESSED != 0 {
            let mut decoder = ZlibDecoder::new(payload_bytes);
            let mut out = Vec::new();
            if decoder.read_to_end(&mut out).is_err() {
                warn!(
                    "failed to decompress DATA payload from origin {:02x?}; dropping",
                    header.origin_id
                );
                return;
            }
            decompressed = out;
            &decompressed
        } else {
            payload_bytes
        };

        if dest_id == self.self_node_id {
            match &self.delivery_callback {
                Some(callback) => {
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        callback(header.origin_id, dest_id, data_seq, app_bytes.to_vec());
                    }));
                    if result.is_err() {
                        warn!("application delivery callback panicked; frame dropped");
                    }
                }
                None => info!(
                    "DATA delivered from origin {:02x?} seq {}: {:?}",
                    header.origin_id, data_seq, app_bytes
                ),
            }
            return;
        }

        if header.ttl <= 1 {
            return;
        }
        let next_hop = self.routing.lock().unwrap().best_next_hop(&dest_id);
        if next_hop.is_none() {
            return;
        }
        trace!("forwarding DATA for dest {:02x?} via next hop", dest_id);
        let fwd_header = header.with_ttl(header.ttl - 1);
        let mut info = fwd_header;
        info.extend_from_slice(body);
        self.wrap_and_send(info);
    }

    fn build_self_ogm(&self) -> Vec<u8> {
        let seqno = self.next_seqno();
        let header = MeshHeader::build(
            MSG_TYPE_OGM,
            0,
            self.routing_config.ogm_ttl,
            self.self_node_id,
            seqno,
        );
        let mut info = header;
        info.extend_from_slice(&self.self_node_id);
        info.push(SELF_ORIGINATED_LINK_METRIC);
        info
    }
}

/// A proactive mesh routing + forwarding node bound to one [`LinkHandle`].
pub struct MeshNode {
    inner: Arc<NodeInner>,
    link: Arc<dyn LinkHandle>,
    ogm_handle: Option<JoinHandle<()>>,
    cleanup_handle: Option<JoinHandle<()>>,
}

impl MeshNode {
    /// Build a node that owns a real [`KissLink`] against the configured transport.
    pub fn new(config: MeshNodeConfig, delivery_callback: Option<DeliveryCallback>) -> Self {
        let inner = Arc::new(Self::build_inner(&config, delivery_callback));
        let rx_inner = inner.clone();
        let rx_callback: RxCallback = Arc::new(move |frame: &[u8]| rx_inner.handle_rx_frame(frame));
        let kiss_link = Arc::new(KissLink::new(config.kiss, rx_callback));
        let link: Arc<dyn LinkHandle> = kiss_link;
        inner
            .link
            .set(link.clone())
            .unwrap_or_else(|_| unreachable!("link set exactly once at construction"));
        MeshNode {
            inner,
            link,
            ogm_handle: None,
            cleanup_handle: None,
        }
    }

    /// Build a node against an arbitrary [`LinkHandle`], used by integration tests
    /// to wire multiple nodes through an in-memory loopback transport instead of a
    /// real TNC connection.
    pub fn with_link(
        config: MeshNodeConfig,
        link: Arc<dyn LinkHandle>,
        delivery_callback: Option<DeliveryCallback>,
    ) -> Self {
        let inner = Arc::new(Self::build_inner(&config, delivery_callback));
        inner
            .link
            .set(link.clone())
            .unwrap_or_else(|_| unreachable!("link set exactly once at construction"));
        MeshNode {
            inner,
            link,
            ogm_handle: None,
            cleanup_handle: None,
        }
    }

    fn build_inner(
        config: &MeshNodeConfig,
        delivery_callback: Option<DeliveryCallback>,
    ) -> NodeInner {
        NodeInner {
            self_node_id: derive_node_id(&config.mesh.callsign),
            src_callsign: config.mesh.callsign.clone(),
            mesh_dest_callsign: config.mesh.mesh_dest_callsign.clone(),
            routing_config: config.routing.clone(),
            routing: Mutex::new(RoutingTables::new()),
            dedup: Mutex::new(DedupCache::new()),
            seqno: AtomicU32::new(0),
            encryptor: MeshEncryptor::new(config.security.key),
            link: OnceLock::new(),
            running: AtomicBool::new(false),
            delivery_callback,
        }
    }

    pub fn self_node_id(&self) -> NodeId {
        self.inner.self_node_id
    }

    /// Route a raw AX.25 frame through the RX dispatch path, exactly as the link's
    /// RX worker would. Exposed so integration tests (and alternate transports) can
    /// inject frames without a live TNC connection.
    pub fn handle_rx_frame(&self, frame: &[u8]) {
        self.inner.handle_rx_frame(frame);
    }

    /// Idempotent: starts the underlying link plus the OGM and cleanup loops.
    pub fn start(&mut self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("MeshNode already running");
            self.inner.running.store(true, Ordering::SeqCst);
            return;
        }

        self.link.start();

        let ogm_inner = self.inner.clone();
        let ogm_interval = Duration::from_secs_f64(self.inner.routing_config.ogm_interval_seconds);
        self.ogm_handle = Some(
            thread::Builder::new()
                .name("mesh-ogm-loop".into())
                .spawn(move || ogm_loop(ogm_inner, ogm_interval))
                .expect("spawn mesh-ogm-loop thread"),
        );

        let cleanup_inner = self.inner.clone();
        self.cleanup_handle = Some(
            thread::Builder::new()
                .name("mesh-cleanup-loop".into())
                .spawn(move || cleanup_loop(cleanup_inner))
                .expect("spawn mesh-cleanup-loop thread"),
        );

        debug!("mesh node started (id {:02x?})", self.inner.self_node_id);
    }

    /// Stop the OGM/cleanup loops and the underlying link, draining each up to
    /// 5 seconds.
    pub fn stop(&mut self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.link.stop(JOIN_TIMEOUT);

        if let Some(handle) = self.ogm_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.cleanup_handle.take() {
            let _ = handle.join();
        }
        info!("mesh node stopped");
    }

    /// Send application-level `payload` to `dest_node_id` (exactly 8 bytes).
    pub fn send_application_data(
        &self,
        dest_node_id: &[u8],
        payload: &[u8],
    ) -> Result<(), SendError> {
        if dest_node_id.len() != 8 {
            return Err(SendError::InvalidDest);
        }
        let mut dest_id = [0u8; 8];
        dest_id.copy_from_slice(dest_node_id);

        let seqno = self.inner.next_seqno();

        let mut compressed = Vec::new();
        let mut encoder = ZlibEncoder::new(&mut compressed, Compression::default());
        encoder
            .write_all(payload)
            .expect("in-memory zlib encode cannot fail");
        encoder.finish().expect("in-memory zlib encode cannot fail");

        let mut flags = 0u8;
        let payload_to_send: &[u8] = if compressed.len() < payload.len() {
            flags |= FLAG_COMPRESSED;
            &compressed
        } else {
            payload
        };

        let mut aad = Vec::with_capacity(20);
        aad.extend_from_slice(&self.inner.self_node_id);
        aad.extend_from_slice(&dest_id);
        aad.extend_from_slice(&seqno.to_be_bytes());

        let mut body = Vec::with_capacity(12 + payload_to_send.len() + NONCE_FIELD_LEN);
        body.extend_from_slice(&dest_id);
        body.extend_from_slice(&seqno.to_be_bytes());
        if self.inner.encryptor.encryption_enabled() {
            flags |= FLAG_ENCRYPTED;
            let (nonce, ciphertext) = self.inner.encryptor.encrypt(payload_to_send, &aad);
            body.extend_from_slice(&nonce);
            body.extend_from_slice(&ciphertext);
        } else {
            body.extend_from_slice(payload_to_send);
        }

        let header = MeshHeader::build(
            MSG_TYPE_DATA,
            flags,
            self.inner.routing_config.ogm_ttl,
            self.inner.self_node_id,
            seqno,
        );
        let mut info = header;
        info.extend_from_slice(&body);

        let frame = ax25::build_ui_frame(
            &self.inner.mesh_dest_callsign,
            &self.inner.src_callsign,
            &info,
        );
        self.inner
            .link()
            .send(frame, false, None)
            .map_err(SendError::from)
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }
}

impl Drop for MeshNode {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Upper bound on one `sleep_while_running` tick. Keeps the wait responsive to a
/// `stop()` issued mid-interval instead of blocking a worker join for the whole
/// (possibly very long, e.g. test-configured) period.
const SLEEP_GRANULARITY: Duration = Duration::from_millis(100);

/// Sleep for `total`, checking `running` every [`SLEEP_GRANULARITY`] so shutdown is
/// observed promptly regardless of how long `total` is.
fn sleep_while_running(running: &AtomicBool, total: Duration) {
    let mut remaining = total;
    while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
        let step = remaining.min(SLEEP_GRANULARITY);
        thread::sleep(step);
        remaining -= step;
    }
}

fn ogm_loop(inner: Arc<NodeInner>, interval: Duration) {
    while inner.running.load(Ordering::SeqCst) {
        let info = inner.build_self_ogm();
        inner.wrap_and_send(info);
        sleep_while_running(&inner.running, interval);
    }
}

fn cleanup_loop(inner: Arc<NodeInner>) {
    while inner.running.load(Ordering::SeqCst) {
        let now = Instant::now();
        let route_expiry = Duration::from_secs_f64(inner.routing_config.route_expiry_seconds);
        let neighbor_expiry = Duration::from_secs_f64(inner.routing_config.neighbor_expiry_seconds);
        let data_seen_expiry =
            Duration::from_secs_f64(inner.routing_config.data_seen_expiry_seconds);

        inner
            .routing
            .lock()
            .unwrap()
            .evict_expired(route_expiry, neighbor_expiry, now);
        inner
            .dedup
            .lock()
            .unwrap()
            .evict_expired(data_seen_expiry, now);

        sleep_while_running(&inner.running, CLEANUP_INTERVAL);
    }
}
