use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::RegistryError;

/// File name a model directory keeps its configuration under.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// A typed hyperparameter bundle for one architecture.
///
/// Implementors are plain serde structs. The blanket impl below turns every
/// descriptor into a [`PretrainedConfig`] trait object so registries can hold
/// configurations of different architectures side by side.
pub trait ConfigDescriptor:
    fmt::Debug + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Architecture identifier this configuration declares, e.g. `"hgrn2"`.
    const MODEL_TYPE: &'static str;

    /// Checks cross-field constraints serde cannot express.
    fn validate(&self) -> Result<(), RegistryError> {
        Ok(())
    }

    /// Builds a validated descriptor from a JSON object.
    ///
    /// A `model_type` key, when present, must match [`Self::MODEL_TYPE`].
    fn from_json_value(value: Value) -> Result<Self, RegistryError> {
        if let Some(found) = value.get("model_type").and_then(Value::as_str) {
            if found != Self::MODEL_TYPE {
                return Err(RegistryError::ConfigTypeMismatch {
                    expected: std::any::type_name::<Self>(),
                    found: found.to_string(),
                });
            }
        }
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a `config.json` from disk.
    fn load(config_path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let value = read_json_file(config_path.as_ref())?;
        Self::from_json_value(value)
    }
}

/// Type-erased view of a configuration descriptor.
pub trait PretrainedConfig: fmt::Debug + Send + Sync + 'static {
    fn model_type(&self) -> &'static str;

    /// Rust type name of the concrete descriptor, for diagnostics.
    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    /// Serializes the descriptor, always including its `model_type`.
    fn to_json_value(&self) -> Result<Value, RegistryError>;

    fn clone_boxed(&self) -> Box<dyn PretrainedConfig>;
}

impl<C: ConfigDescriptor> PretrainedConfig for C {
    fn model_type(&self) -> &'static str {
        C::MODEL_TYPE
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<C>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn to_json_value(&self) -> Result<Value, RegistryError> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.insert(
                "model_type".to_string(),
                Value::String(C::MODEL_TYPE.to_string()),
            );
        }
        Ok(value)
    }

    fn clone_boxed(&self) -> Box<dyn PretrainedConfig> {
        Box::new(self.clone())
    }
}

impl dyn PretrainedConfig {
    pub fn downcast_ref<C: ConfigDescriptor>(&self) -> Option<&C> {
        self.as_any().downcast_ref::<C>()
    }

    pub fn is<C: ConfigDescriptor>(&self) -> bool {
        self.as_any().is::<C>()
    }

    /// `TypeId` of the concrete descriptor behind the trait object.
    pub fn config_type_id(&self) -> TypeId {
        Any::type_id(self.as_any())
    }
}

impl Clone for Box<dyn PretrainedConfig> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

/// Reads and parses a JSON file.
pub fn read_json_file(config_path: &Path) -> Result<Value, RegistryError> {
    if !config_path.exists() {
        return Err(RegistryError::ConfigNotFound(config_path.to_path_buf()));
    }

    let mut file = File::open(config_path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    Ok(serde_json::from_str(&contents)?)
}

/// Extracts the `model_type` key from a config JSON object.
pub fn model_type_of(value: &Value) -> Result<&str, RegistryError> {
    value
        .get("model_type")
        .and_then(Value::as_str)
        .ok_or(RegistryError::MissingModelType)
}
