//! Architectures shipped with the crate.

use log::debug;

use crate::error::RegistryError;
use crate::hgrn2;
use crate::registry::AutoRegistry;

/// Runs every built-in architecture's binder against `registry`.
pub fn register_builtin_models(registry: &AutoRegistry) -> Result<(), RegistryError> {
    let report = hgrn2::register(registry)?;
    debug!("hgrn2 registration: {:?}", report);
    Ok(())
}
