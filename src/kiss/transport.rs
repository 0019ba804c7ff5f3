//! The two concrete TNC transports, behind one capability surface
//! (`start`/`stop`/`read`/`write`). Kept as a tagged enum rather than a trait object.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::config::TransportKind;

/// Read timeout applied to both transports so a blocking read can be interrupted by
/// a shutdown signal at a bounded cadence instead of blocking forever.
pub const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// A connected duplex byte channel to a TNC.
pub enum Transport {
    Serial(Box<dyn serialport::SerialPort>),
    Tcp(TcpStream),
}

impl Transport {
    /// Open the transport described by `config`. Returns an I/O error on failure;
    /// the caller retries under backoff.
    pub fn connect(config: &crate::config::KissConfig) -> io::Result<Self> {
        match config.transport {
            TransportKind::Serial => {
                let port = serialport::new(&config.serial_port, config.serial_baud)
                    .timeout(READ_TIMEOUT)
                    .open()
                    .map_err(io::Error::other)?;
                Ok(Transport::Serial(port))
            }
            TransportKind::Tcp => {
                let stream = TcpStream::connect((config.tcp_host.as_str(), config.tcp_port))?;
                stream.set_read_timeout(Some(READ_TIMEOUT))?;
                Ok(Transport::Tcp(stream))
            }
        }
    }

    /// Read available bytes into `buf`. A timeout surfaces as `Err` with
    /// `ErrorKind::WouldBlock` so the RX loop can tell "no data yet" apart from
    /// `Ok(0)`, which per [`Read`]'s contract means the peer closed the connection.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = match self {
            Transport::Serial(port) => port.read(buf),
            Transport::Tcp(stream) => stream.read(buf),
        };
        match result {
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            }
            other => other,
        }
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Transport::Serial(port) => port.write_all(bytes),
            Transport::Tcp(stream) => stream.write_all(bytes),
        }
    }
}
