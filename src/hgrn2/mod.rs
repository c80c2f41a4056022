//! HGRN2: gated linear RNN with state expansion.
//!
//! Publicly exports [`HGRN2Config`], [`HGRN2ForCausalLM`] and [`HGRN2Model`].

mod config;
mod model;

pub use config::HGRN2Config;
pub use model::{HGRN2ForCausalLM, HGRN2Model};

use crate::config::ConfigDescriptor;
use crate::error::RegistryError;
use crate::registry::{AutoRegistry, RegistrationPolicy, RegistrationReport};

/// Binds `"hgrn2"` to its config, base model and causal-LM types.
///
/// Safe to call any number of times on the same registry.
pub(crate) fn register(registry: &AutoRegistry) -> Result<RegistrationReport, RegistryError> {
    registry.register_architecture::<HGRN2Config, HGRN2Model, HGRN2ForCausalLM>(
        HGRN2Config::MODEL_TYPE,
        RegistrationPolicy::from_allow_redefinition(true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelHead;
    use std::any::TypeId;

    #[test]
    fn test_register_binds_all_facets() {
        let registry = AutoRegistry::new();
        let report = register(&registry).unwrap();
        assert!(report.changed());

        assert!(registry.resolve_config("hgrn2").unwrap().is::<HGRN2Config>());
        let config_type = TypeId::of::<HGRN2Config>();
        assert!(registry.resolve_model(ModelHead::Base, config_type).unwrap().is::<HGRN2Model>());
        assert!(registry
            .resolve_model(ModelHead::CausalLm, config_type)
            .unwrap()
            .is::<HGRN2ForCausalLM>());
    }

    #[test]
    fn test_register_twice_is_noop() {
        let registry = AutoRegistry::new();
        register(&registry).unwrap();
        let report = register(&registry).unwrap();
        assert!(!report.changed());
        assert_eq!(registry.len(), 1);
    }
}
