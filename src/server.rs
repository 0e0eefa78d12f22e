use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};
use std::sync::Arc;
use std::thread;

use crate::find::DemoMatcher;
use crate::listener::service_tcp_loop;
use crate::mover::SimulatedMove;
use crate::service::ServiceHandler;
use crate::settings::QuadscpSettings;
use crate::store::StorageSink;

/// Run all four services, one listener thread per port, until every
/// listener ends (which, without `finite_connections`, is never).
///
/// All ports are bound before the first association is accepted, so a
/// caller which gets past startup may connect to any of them.
pub fn run_everything(
    settings: QuadscpSettings,
    finite_connections: Option<usize>,
) -> anyhow::Result<()> {
    let QuadscpSettings {
        storage_root,
        duplicates,
        scp,
        listener_threads,
        ports,
    } = settings;
    tracing::info!(
        aet = scp.aet.as_str(),
        storage = ports.storage,
        query = ports.query,
        r#move = ports.mover,
        verification = ports.verification,
        "starting DICOM endpoint"
    );
    let services = [
        (
            ports.storage,
            ServiceHandler::Storage(Arc::new(StorageSink::new(storage_root, duplicates))),
        ),
        (ports.query, ServiceHandler::Query(Arc::new(DemoMatcher))),
        (ports.mover, ServiceHandler::Move(Arc::new(SimulatedMove))),
        (ports.verification, ServiceHandler::Verification),
    ];
    let mut listeners = Vec::with_capacity(services.len());
    for (port, handler) in services {
        let listener = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::from(0), port))?;
        let scp = scp.clone();
        let n_threads = listener_threads.get();
        let thread = thread::Builder::new()
            .name(format!("{}-listener", handler.kind().pool_name()))
            .spawn(move || service_tcp_loop(listener, scp, handler, finite_connections, n_threads))?;
        listeners.push(thread);
    }
    for thread in listeners {
        thread
            .join()
            .map_err(|_| anyhow::anyhow!("listener thread panicked"))??;
    }
    Ok(())
}
