//! A KISS link against a TCP TNC reconnects with backoff after the peer drops,
//! without restarting the link itself. Uses a real socket, no transport mocking.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::{Duration, Instant};

use qmesh_core::config::{KissConfig, TransportKind};
use qmesh_core::kiss::KissLink;

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[test]
fn reconnects_after_listener_restarts_within_backoff_bounds() {
    let _ = env_logger::builder().is_test(true).try_init();

    let port = free_port();
    let base_delay = 0.2;
    let max_delay = 0.6;

    let config = KissConfig {
        transport: TransportKind::Tcp,
        tcp_host: "127.0.0.1".to_string(),
        tcp_port: port,
        reconnect_base_delay: base_delay,
        reconnect_max_delay: max_delay,
        ..KissConfig::default()
    };

    let listener = TcpListener::bind(("127.0.0.1", port)).unwrap();
    let link = KissLink::new(config, Arc::new(|_frame: &[u8]| {}));
    link.start();

    // Accept once so the link observes a live connection, then drop both the
    // accepted stream and the listener to force the RX worker's next read to fail.
    let (accepted, _) = listener.accept().unwrap();
    drop(accepted);
    drop(listener);

    let became_disconnected = wait_until(Duration::from_secs(3), || !link.is_connected());
    assert!(
        became_disconnected,
        "link should notice the dropped peer and mark itself disconnected"
    );

    // Give the link at least one failed connect attempt (and its base-delay backoff
    // sleep) against the still-dead address before the listener comes back, so the
    // reconnect genuinely exercises the backoff path rather than winning a race
    // against the very first retry.
    std::thread::sleep(Duration::from_secs_f64(base_delay * 1.5));

    let restart = Instant::now();
    let listener = TcpListener::bind(("127.0.0.1", port)).unwrap();
    let reconnected = wait_until(Duration::from_secs(3), || {
        listener.set_nonblocking(true).unwrap();
        if let Ok((stream, _)) = listener.accept() {
            drop(stream);
        }
        link.is_connected()
    });
    let elapsed = restart.elapsed();

    assert!(
        reconnected,
        "link should reconnect once the listener comes back without restarting itself"
    );
    assert!(
        elapsed <= Duration::from_secs_f64(max_delay) + Duration::from_secs(2),
        "reconnect took longer than the configured max backoff delay allows: {elapsed:?}"
    );

    link.stop(Duration::from_secs(2));
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}
