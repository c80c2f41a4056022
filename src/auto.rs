//! Generic loaders that pick concrete types through an [`AutoRegistry`].

use std::path::Path;

use log::{debug, info};
use serde_json::Value;

use crate::config::{model_type_of, read_json_file, PretrainedConfig, CONFIG_FILE_NAME};
use crate::error::RegistryError;
use crate::model::{ModelHead, PreTrainedModel};
use crate::registry::AutoRegistry;

/// Builds configurations by architecture identifier.
pub struct AutoConfig;

impl AutoConfig {
    /// Builds the configuration type bound to `model_type` from a JSON object.
    pub fn for_model(
        registry: &AutoRegistry,
        model_type: &str,
        value: Value,
    ) -> Result<Box<dyn PretrainedConfig>, RegistryError> {
        let binding = registry
            .resolve_config(model_type)
            .ok_or_else(|| RegistryError::UnknownModelType(model_type.to_string()))?;
        debug!("Resolved model_type '{}' to {}", model_type, binding.type_name());
        binding.build(value)
    }

    /// Dispatches on the object's `model_type` key.
    pub fn from_json_value(
        registry: &AutoRegistry,
        value: Value,
    ) -> Result<Box<dyn PretrainedConfig>, RegistryError> {
        let model_type = model_type_of(&value)?.to_string();
        Self::for_model(registry, &model_type, value)
    }

    pub fn from_json_str(
        registry: &AutoRegistry,
        json: &str,
    ) -> Result<Box<dyn PretrainedConfig>, RegistryError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_json_value(registry, value)
    }

    pub fn from_file(
        registry: &AutoRegistry,
        config_path: impl AsRef<Path>,
    ) -> Result<Box<dyn PretrainedConfig>, RegistryError> {
        let value = read_json_file(config_path.as_ref())?;
        Self::from_json_value(registry, value)
    }

    /// Loads `<model_dir>/config.json`.
    pub fn from_pretrained(
        registry: &AutoRegistry,
        model_dir: impl AsRef<Path>,
    ) -> Result<Box<dyn PretrainedConfig>, RegistryError> {
        Self::from_file(registry, model_dir.as_ref().join(CONFIG_FILE_NAME))
    }
}

/// Builds base models from configurations.
pub struct AutoModel;

impl AutoModel {
    pub fn from_config(
        registry: &AutoRegistry,
        config: &dyn PretrainedConfig,
    ) -> Result<Box<dyn PreTrainedModel>, RegistryError> {
        build_model(registry, ModelHead::Base, config)
    }

    /// Resolves the configuration in `model_dir`, then the model. Weights are not loaded.
    pub fn from_pretrained(
        registry: &AutoRegistry,
        model_dir: impl AsRef<Path>,
    ) -> Result<Box<dyn PreTrainedModel>, RegistryError> {
        let config = AutoConfig::from_pretrained(registry, model_dir)?;
        Self::from_config(registry, config.as_ref())
    }
}

/// Builds causal language models from configurations.
pub struct AutoModelForCausalLM;

impl AutoModelForCausalLM {
    pub fn from_config(
        registry: &AutoRegistry,
        config: &dyn PretrainedConfig,
    ) -> Result<Box<dyn PreTrainedModel>, RegistryError> {
        build_model(registry, ModelHead::CausalLm, config)
    }

    pub fn from_pretrained(
        registry: &AutoRegistry,
        model_dir: impl AsRef<Path>,
    ) -> Result<Box<dyn PreTrainedModel>, RegistryError> {
        let config = AutoConfig::from_pretrained(registry, model_dir)?;
        Self::from_config(registry, config.as_ref())
    }
}

/// Instantiates the model bound to the configuration's concrete type for `head`.
pub fn build_model(
    registry: &AutoRegistry,
    head: ModelHead,
    config: &dyn PretrainedConfig,
) -> Result<Box<dyn PreTrainedModel>, RegistryError> {
    let binding = registry
        .resolve_model(head, config.config_type_id())
        .ok_or_else(|| RegistryError::UnrecognizedConfig {
            head,
            config_type: config.type_name(),
        })?;
    info!("Instantiating {} from a '{}' config", binding.type_name(), config.model_type());
    binding.build(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::{OtherConfig, ToyConfig, ToyForCausalLM, ToyModel};
    use crate::registry::RegistrationPolicy;
    use serde_json::json;

    fn toy_registry() -> AutoRegistry {
        let registry = AutoRegistry::new();
        registry
            .register_architecture::<ToyConfig, ToyModel, ToyForCausalLM>("toy", RegistrationPolicy::Replace)
            .unwrap();
        registry
    }

    #[test]
    fn test_from_json_str_dispatches_on_model_type() {
        let registry = toy_registry();
        let config = AutoConfig::from_json_str(&registry, r#"{"model_type": "toy", "layers": 3}"#).unwrap();
        assert_eq!(config.downcast_ref::<ToyConfig>(), Some(&ToyConfig { layers: 3 }));
    }

    #[test]
    fn test_unknown_and_missing_model_type() {
        let registry = toy_registry();
        assert!(matches!(
            AutoConfig::from_json_value(&registry, json!({ "model_type": "mamba" })),
            Err(RegistryError::UnknownModelType(ref id)) if id == "mamba"
        ));
        assert!(matches!(
            AutoConfig::from_json_value(&registry, json!({ "layers": 1 })),
            Err(RegistryError::MissingModelType)
        ));
    }

    #[test]
    fn test_auto_models_pick_head() {
        let registry = toy_registry();
        let config = ToyConfig { layers: 1 };

        let base = AutoModel::from_config(&registry, &config).unwrap();
        assert!(base.is::<ToyModel>());
        let lm = AutoModelForCausalLM::from_config(&registry, &config).unwrap();
        assert!(lm.is::<ToyForCausalLM>());
    }

    #[test]
    fn test_unregistered_config_type() {
        let registry = toy_registry();
        let err = AutoModelForCausalLM::from_config(&registry, &OtherConfig {}).unwrap_err();
        assert!(matches!(err, RegistryError::UnrecognizedConfig { head: ModelHead::CausalLm, .. }));
    }

    #[test]
    fn test_from_pretrained_reads_config_json() {
        let registry = toy_registry();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{"model_type": "toy", "layers": 6, "architectures": ["ToyForCausalLM"]}"#,
        )
        .unwrap();

        let model = AutoModelForCausalLM::from_pretrained(&registry, dir.path()).unwrap();
        let lm = model.downcast_ref::<ToyForCausalLM>().unwrap();
        assert_eq!(lm.base.config.layers, 6);
    }
}
