//! Auto-registry for linear-attention language model families.
//!
//! Each architecture module binds its configuration and model types into an
//! [`AutoRegistry`]; the generic loaders in [`auto`] then build them by
//! `model_type`:
//!
//! ```
//! use fla_models::{AutoConfig, AutoModelForCausalLM, AutoRegistry};
//! use fla_models::hgrn2::HGRN2ForCausalLM;
//!
//! let registry = AutoRegistry::with_builtin_models()?;
//! let config = AutoConfig::from_json_str(&registry, r#"{"model_type": "hgrn2", "num_hidden_layers": 2}"#)?;
//! let model = AutoModelForCausalLM::from_config(&registry, config.as_ref())?;
//! assert!(model.is::<HGRN2ForCausalLM>());
//! # Ok::<(), fla_models::RegistryError>(())
//! ```

pub mod auto;
pub mod config;
pub mod error;
pub mod hgrn2;
pub mod layers;
pub mod model;
pub mod models;
pub mod registry;

pub use auto::{AutoConfig, AutoModel, AutoModelForCausalLM};
pub use config::{ConfigDescriptor, PretrainedConfig};
pub use error::RegistryError;
pub use model::{FromConfig, ModelHead, PreTrainedModel};
pub use models::register_builtin_models;
pub use registry::{AutoRegistry, RegistrationOutcome, RegistrationPolicy, RegistrationReport};
