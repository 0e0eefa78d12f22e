//! A multi-service DICOM endpoint: C-ECHO, C-FIND, C-STORE, and C-MOVE
//! providers, each listening on its own TCP port under a single AE title.

mod association;
mod association_error;
mod commands;
mod config;
mod dicomrs_settings;
mod echo;
mod error;
mod find;
mod listener;
mod mover;
mod run_from_env;
mod sanitize;
mod server;
mod service;
mod settings;
mod state;
mod store;
mod thread_pool;

pub use commands::Status;
pub use config::get_config;
pub use dicomrs_settings::{ClientAETitle, DicomRsSettings, OurAETitle};
pub use error::{DicomStorageError, MissingRequiredTag};
pub use find::{DemoMatcher, InvalidLevel, QueryError, QueryMatcher, QueryRetrieveLevel};
pub use listener::service_tcp_loop;
pub use mover::{MoveBackend, MoveError, MovePlan, SimulatedMove, SubOpOutcome};
pub use run_from_env::run_everything_from_env;
pub use server::run_everything;
pub use service::{ServiceHandler, ServiceKind};
pub use settings::{QuadscpSettings, ServicePorts};
pub use store::{DuplicatePolicy, StorageSink};
