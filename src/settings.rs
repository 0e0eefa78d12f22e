//! Endpoint settings, which are configurable using environment variables.
use crate::dicomrs_settings::DicomRsSettings;
use crate::service::ServiceKind;
use crate::store::DuplicatePolicy;
use camino::Utf8PathBuf;
use serde::Deserialize;
use std::num::NonZeroUsize;

#[derive(Debug, Deserialize)]
pub struct QuadscpSettings {
    /// Directory that received instances are stored under.
    #[serde(default = "default_storage_root")]
    pub storage_root: Utf8PathBuf,
    /// What to do when an instance with the same storage path already exists.
    #[serde(default)]
    pub duplicates: DuplicatePolicy,
    #[serde(default)]
    pub scp: DicomRsSettings,
    /// Worker threads per listening port.
    #[serde(default = "default_listener_threads")]
    pub listener_threads: NonZeroUsize,
    #[serde(default)]
    pub ports: ServicePorts,
}

/// TCP port of each service.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ServicePorts {
    #[serde(default = "default_storage_port")]
    pub storage: u16,
    #[serde(default = "default_query_port")]
    pub query: u16,
    #[serde(default = "default_move_port", rename = "move")]
    pub mover: u16,
    #[serde(default = "default_verification_port")]
    pub verification: u16,
}

impl Default for QuadscpSettings {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            duplicates: DuplicatePolicy::default(),
            scp: DicomRsSettings::default(),
            listener_threads: default_listener_threads(),
            ports: ServicePorts::default(),
        }
    }
}

impl Default for ServicePorts {
    fn default() -> Self {
        Self {
            storage: default_storage_port(),
            query: default_query_port(),
            mover: default_move_port(),
            verification: default_verification_port(),
        }
    }
}

fn default_storage_root() -> Utf8PathBuf {
    Utf8PathBuf::from("DicomStorage")
}

fn default_listener_threads() -> NonZeroUsize {
    NonZeroUsize::new(8).unwrap()
}

fn default_storage_port() -> u16 {
    ServiceKind::Storage.default_port()
}

fn default_query_port() -> u16 {
    ServiceKind::Query.default_port()
}

fn default_move_port() -> u16 {
    ServiceKind::Move.default_port()
}

fn default_verification_port() -> u16 {
    ServiceKind::Verification.default_port()
}
