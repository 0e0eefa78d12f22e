pub(crate) mod fixtures;
pub(crate) mod scu;

use std::net::TcpListener;
use std::sync::Once;
use std::thread;

use quadscp::{DicomRsSettings, ServiceHandler, service_tcp_loop};

static INIT_LOGGING: Once = Once::new();

pub(crate) fn init_logging() {
    INIT_LOGGING.call_once(|| {
        tracing::subscriber::set_global_default(
            tracing_subscriber::FmtSubscriber::builder()
                .with_max_level(tracing::Level::INFO)
                .finish(),
        )
        .unwrap();
    });
}

/// N distinct OS-assigned free ports, released again so a server under
/// test can bind them by number. All are held at once so no port repeats.
pub(crate) fn free_ports<const N: usize>() -> [u16; N] {
    let listeners: Vec<TcpListener> = (0..N)
        .map(|_| TcpListener::bind("127.0.0.1:0").unwrap())
        .collect();
    let mut ports = [0; N];
    for (port, listener) in ports.iter_mut().zip(&listeners) {
        *port = listener.local_addr().unwrap().port();
    }
    ports
}

/// Run one service on an OS-assigned port, shutting down after
/// `connections` associations. Returns the address to connect to.
pub(crate) fn spawn_service(handler: ServiceHandler, connections: usize) -> String {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    thread::spawn(move || {
        service_tcp_loop(
            listener,
            DicomRsSettings::default(),
            handler,
            Some(connections),
            2,
        )
        .unwrap()
    });
    addr
}
