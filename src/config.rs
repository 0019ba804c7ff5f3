//! Configuration types and TOML loader.
//!
//! Four sections (`[mesh]`, `[kiss]`, `[routing]`, `[security]`) as `serde`-derived
//! structs, loaded via the `toml` crate.

use serde::Deserialize;

/// Errors raised while loading or validating a configuration document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("security.key_hex is not valid hex: {0}")]
    BadKeyHex(#[from] hex::FromHexError),
    #[error("security.key_hex must decode to {expected} bytes, got {actual}")]
    BadKeyLength { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Serial,
    Tcp,
}

fn default_mesh_dest_callsign() -> String {
    "QMESH-0".to_string()
}

fn default_transport() -> TransportKind {
    TransportKind::Tcp
}

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_serial_baud() -> u32 {
    1200
}

fn default_tcp_host() -> String {
    "127.0.0.1".to_string()
}

fn default_tcp_port() -> u16 {
    8001
}

fn default_reconnect_base_delay() -> f64 {
    5.0
}

fn default_reconnect_max_delay() -> f64 {
    60.0
}

fn default_tx_queue_size() -> usize {
    1000
}

fn default_ogm_interval_seconds() -> f64 {
    10.0
}

fn default_ogm_ttl() -> u8 {
    5
}

fn default_route_expiry_seconds() -> f64 {
    120.0
}

fn default_neighbor_expiry_seconds() -> f64 {
    60.0
}

fn default_data_seen_expiry_seconds() -> f64 {
    30.0
}

/// `[mesh]` section: the node's identity and its broadcast destination callsign.
#[derive(Debug, Clone, Deserialize)]
pub struct MeshConfig {
    pub callsign: String,
    #[serde(default = "default_mesh_dest_callsign")]
    pub mesh_dest_callsign: String,
}

/// `[kiss]` section: the TNC connection.
#[derive(Debug, Clone, Deserialize)]
pub struct KissConfig {
    #[serde(default = "default_transport")]
    pub transport: TransportKind,
    #[serde(default = "default_serial_port")]
    pub serial_port: String,
    #[serde(default = "default_serial_baud")]
    pub serial_baud: u32,
    #[serde(default = "default_tcp_host")]
    pub tcp_host: String,
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    #[serde(default = "default_reconnect_base_delay")]
    pub reconnect_base_delay: f64,
    #[serde(default = "default_reconnect_max_delay")]
    pub reconnect_max_delay: f64,
    #[serde(default = "default_tx_queue_size")]
    pub tx_queue_size: usize,
}

impl Default for KissConfig {
    fn default() -> Self {
        KissConfig {
            transport: default_transport(),
            serial_port: default_serial_port(),
            serial_baud: default_serial_baud(),
            tcp_host: default_tcp_host(),
            tcp_port: default_tcp_port(),
            reconnect_base_delay: default_reconnect_base_delay(),
            reconnect_max_delay: default_reconnect_max_delay(),
            tx_queue_size: default_tx_queue_size(),
        }
    }
}

/// `[routing]` section: OGM timing and table/cache lifetimes.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_ogm_interval_seconds")]
    pub ogm_interval_seconds: f64,
    #[serde(default = "default_ogm_ttl")]
    pub ogm_ttl: u8,
    #[serde(default = "default_route_expiry_seconds")]
    pub route_expiry_seconds: f64,
    #[serde(default = "default_neighbor_expiry_seconds")]
    pub neighbor_expiry_seconds: f64,
    #[serde(default = "default_data_seen_expiry_seconds")]
    pub data_seen_expiry_seconds: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        RoutingConfig {
            ogm_interval_seconds: default_ogm_interval_seconds(),
            ogm_ttl: default_ogm_ttl(),
            route_expiry_seconds: default_route_expiry_seconds(),
            neighbor_expiry_seconds: default_neighbor_expiry_seconds(),
            data_seen_expiry_seconds: default_data_seen_expiry_seconds(),
        }
    }
}

/// `[security]` section, as parsed straight from TOML (`key_hex` still a hex string).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfigRaw {
    #[serde(default)]
    pub enable_encryption: bool,
    pub key_hex: Option<String>,
}

/// Resolved security configuration: `key_hex` has been decoded and length-checked.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfig {
    pub enable_encryption: bool,
    pub key: Option<[u8; 32]>,
}

impl SecurityConfigRaw {
    fn resolve(self) -> Result<SecurityConfig, ConfigError> {
        let key = match self.key_hex {
            Some(hex_str) => {
                let bytes = hex::decode(hex_str)?;
                if bytes.len() != 32 {
                    return Err(ConfigError::BadKeyLength {
                        expected: 32,
                        actual: bytes.len(),
                    });
                }
                let mut key = [0u8; 32];
                key.copy_from_slice(&bytes);
                Some(key)
            }
            None => None,
        };
        Ok(SecurityConfig {
            enable_encryption: self.enable_encryption,
            key,
        })
    }
}

/// Top-level document: `[mesh]`, `[kiss]`, `[routing]`, `[security]`.
#[derive(Debug, Clone, Deserialize)]
struct RootDocument {
    mesh: MeshConfig,
    #[serde(default)]
    kiss: KissConfig,
    #[serde(default)]
    routing: RoutingConfig,
    #[serde(default)]
    security: SecurityConfigRaw,
}

/// Fully-resolved node configuration, ready to build a [`crate::mesh::MeshNode`] from.
#[derive(Debug, Clone)]
pub struct MeshNodeConfig {
    pub mesh: MeshConfig,
    pub kiss: KissConfig,
    pub routing: RoutingConfig,
    pub security: SecurityConfig,
}

/// Parse a TOML document (already read into memory) into a [`MeshNodeConfig`].
pub fn load_from_str(document: &str) -> Result<MeshNodeConfig, ConfigError> {
    let root: RootDocument = toml::from_str(document)?;
    Ok(MeshNodeConfig {
        mesh: root.mesh,
        kiss: root.kiss,
        routing: root.routing,
        security: root.security.resolve()?,
    })
}

/// Read and parse a config file from disk.
pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<MeshNodeConfig, ConfigError> {
    let path_ref = path.as_ref();
    let document = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
        path: path_ref.display().to_string(),
        source,
    })?;
    load_from_str(&document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_document_applies_defaults() {
        let cfg = load_from_str("[mesh]\ncallsign = \"N0CALL\"\n").unwrap();
        assert_eq!(cfg.mesh.callsign, "N0CALL");
        assert_eq!(cfg.mesh.mesh_dest_callsign, "QMESH-0");
        assert_eq!(cfg.kiss.transport, TransportKind::Tcp);
        assert_eq!(cfg.routing.ogm_ttl, 5);
        assert!(!cfg.security.enable_encryption);
        assert!(cfg.security.key.is_none());
    }

    #[test]
    fn missing_callsign_is_an_error() {
        let result = load_from_str("[kiss]\ntransport = \"serial\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn full_document_round_trips_fields() {
        let doc = r#"
            [mesh]
            callsign = "N0CALL-2"
            mesh_dest_callsign = "MESH-5"

            [kiss]
            transport = "serial"
            serial_port = "/dev/ttyS5"
            serial_baud = 9600
            reconnect_base_delay = 1.0
            reconnect_max_delay = 4.0
            tx_queue_size = 16

            [routing]
            ogm_interval_seconds = 3.0
            ogm_ttl = 4
            route_expiry_seconds = 30.0
            neighbor_expiry_seconds = 15.0
            data_seen_expiry_seconds = 8.0

            [security]
            enable_encryption = true
            key_hex = "0011223344556677889900112233445566778899001122334455667788990a0b"
        "#;
        let cfg = load_from_str(doc).unwrap();
        assert_eq!(cfg.kiss.transport, TransportKind::Serial);
        assert_eq!(cfg.kiss.serial_baud, 9600);
        assert_eq!(cfg.routing.ogm_ttl, 4);
        assert!(cfg.security.enable_encryption);
        assert_eq!(cfg.security.key.unwrap().len(), 32);
    }

    #[test]
    fn bad_key_length_is_an_error() {
        let doc = "[mesh]\ncallsign = \"N0CALL\"\n[security]\nkey_hex = \"aabb\"\n";
        assert!(matches!(
            load_from_str(doc),
            Err(ConfigError::BadKeyLength { .. })
        ));
    }
}
