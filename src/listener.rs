use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

use dicom::ul::ServerAssociationOptions;
use dicom::ul::association::server::AcceptAny;

use crate::association::handle_association;
use crate::dicomrs_settings::DicomRsSettings;
use crate::service::ServiceHandler;
use crate::thread_pool::ThreadPool;

/// Accept associations on `listener` and serve them with `handler`.
///
/// Every TCP connection is handled by a worker thread running
/// association negotiation, message assembly, and the port's workflow.
///
/// `finite_connections` is a variable only used for testing. It tells the
/// listener to exit after a finite number of connections.
pub fn service_tcp_loop(
    listener: TcpListener,
    settings: DicomRsSettings,
    handler: ServiceHandler,
    finite_connections: Option<usize>,
    n_threads: usize,
) -> anyhow::Result<()> {
    let kind = handler.kind();
    if let Ok(address) = listener.local_addr() {
        tracing::info!(service = %kind, "listening on: tcp://{}", address);
    }
    let max_pdu_length = settings.max_pdu_length as usize;
    let mut pool = ThreadPool::new(n_threads, kind.pool_name());
    let options: Arc<ServerAssociationOptions<'static, AcceptAny>> = Arc::new(settings.into());
    let handler = Arc::new(handler);
    let incoming: Box<dyn Iterator<Item = Result<TcpStream, _>>> =
        if let Some(n) = finite_connections {
            Box::new(listener.incoming().take(n))
        } else {
            Box::new(listener.incoming())
        };
    for stream in incoming {
        match stream {
            Ok(scu_stream) => {
                let options = Arc::clone(&options);
                let handler = Arc::clone(&handler);
                pool.execute(move || {
                    let ulid = ulid::Ulid::new();
                    if let Err(e) =
                        handle_association(scu_stream, &options, &handler, max_pdu_length, ulid)
                    {
                        tracing::error!(association = ulid.to_string(), "{:?}", e);
                    }
                });
            }
            Err(e) => tracing::error!(service = %kind, "failed to accept connection: {}", e),
        }
    }
    pool.shutdown();
    Ok(())
}
