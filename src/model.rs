use std::any::Any;
use std::fmt;

use crate::config::{ConfigDescriptor, PretrainedConfig};
use crate::error::RegistryError;

/// Which auto-model family a model type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelHead {
    /// Bare backbone producing hidden states.
    Base,
    /// Backbone plus a next-token prediction head.
    CausalLm,
}

impl ModelHead {
    /// Name of the registry namespace models with this head live in.
    pub fn namespace(self) -> &'static str {
        match self {
            ModelHead::Base => "base-model",
            ModelHead::CausalLm => "causal-lm",
        }
    }
}

impl fmt::Display for ModelHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelHead::Base => write!(f, "base"),
            ModelHead::CausalLm => write!(f, "causal-LM"),
        }
    }
}

/// Type-erased view of a model instance built by an auto loader.
pub trait PreTrainedModel: fmt::Debug + Send + Sync + 'static {
    /// Configuration the model was built from.
    fn config(&self) -> &dyn PretrainedConfig;

    fn head(&self) -> ModelHead;

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn as_any(&self) -> &dyn Any;
}

/// Construction from a typed configuration.
///
/// The associated `Config` ties a model to exactly one descriptor type, so a
/// registry can never bind a model under a configuration it does not accept.
pub trait FromConfig: PreTrainedModel + Sized {
    type Config: ConfigDescriptor;

    const HEAD: ModelHead;

    fn from_config(config: &Self::Config) -> Result<Self, RegistryError>;
}

impl dyn PreTrainedModel {
    pub fn downcast_ref<M: PreTrainedModel>(&self) -> Option<&M> {
        self.as_any().downcast_ref::<M>()
    }

    pub fn is<M: PreTrainedModel>(&self) -> bool {
        self.as_any().is::<M>()
    }
}

/// Builds `M` from an erased configuration, checking the concrete type first.
pub(crate) fn construct_erased<M: FromConfig>(
    config: &dyn PretrainedConfig,
) -> Result<Box<dyn PreTrainedModel>, RegistryError> {
    let typed = config
        .downcast_ref::<M::Config>()
        .ok_or_else(|| RegistryError::ConfigTypeMismatch {
            expected: std::any::type_name::<M::Config>(),
            found: config.model_type().to_string(),
        })?;
    let model = M::from_config(typed)?;
    Ok(Box::new(model))
}
