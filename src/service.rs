use std::fmt::Display;
use std::sync::Arc;

use crate::find::QueryMatcher;
use crate::mover::MoveBackend;
use crate::store::StorageSink;

/// The four service classes, one per listening port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub enum ServiceKind {
    Verification,
    Query,
    Storage,
    Move,
}

impl ServiceKind {
    pub const fn default_port(self) -> u16 {
        match self {
            ServiceKind::Storage => 11112,
            ServiceKind::Query => 11113,
            ServiceKind::Move => 11114,
            ServiceKind::Verification => 11115,
        }
    }

    /// Name used for the listener's worker threads.
    pub(crate) const fn pool_name(self) -> &'static str {
        match self {
            ServiceKind::Verification => "echoscp",
            ServiceKind::Query => "findscp",
            ServiceKind::Storage => "storescp",
            ServiceKind::Move => "movescp",
        }
    }
}

impl Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServiceKind::Verification => "C-ECHO",
            ServiceKind::Query => "C-FIND",
            ServiceKind::Storage => "C-STORE",
            ServiceKind::Move => "C-MOVE",
        };
        f.write_str(name)
    }
}

/// The workflow behind one listening port. Shared across the connections
/// of that port, so each variant's payload must be thread-safe.
#[derive(Clone)]
pub enum ServiceHandler {
    Verification,
    Query(Arc<dyn QueryMatcher>),
    Storage(Arc<StorageSink>),
    Move(Arc<dyn MoveBackend>),
}

impl ServiceHandler {
    pub(crate) fn kind(&self) -> ServiceKind {
        match self {
            ServiceHandler::Verification => ServiceKind::Verification,
            ServiceHandler::Query(_) => ServiceKind::Query,
            ServiceHandler::Storage(_) => ServiceKind::Storage,
            ServiceHandler::Move(_) => ServiceKind::Move,
        }
    }
}
