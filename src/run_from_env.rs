use crate::config::get_config;
use crate::server::run_everything;

/// Calls [run_everything] using configuration from environment variables.
///
/// `finite_connections`: shut down each listener after the given number of
/// DICOM associations.
pub fn run_everything_from_env(finite_connections: Option<usize>) -> anyhow::Result<()> {
    let config = get_config();
    let settings = config.extract()?;
    run_everything(settings, finite_connections)
}
