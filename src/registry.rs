//! Architecture registry backing the auto loaders.
//!
//! An [`AutoRegistry`] holds three namespaces:
//!
//! * `config`: architecture identifier -> configuration descriptor type
//! * `base-model`: configuration type -> base model type
//! * `causal-lm`: configuration type -> causal-LM model type
//!
//! Architecture modules contribute entries through
//! [`AutoRegistry::register_architecture`]; the loaders in [`crate::auto`]
//! read them back. Entries are never removed.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use log::{debug, info, warn};
use parking_lot::RwLock;
use serde_json::Value;

use crate::config::{ConfigDescriptor, PretrainedConfig};
use crate::error::RegistryError;
use crate::model::{construct_erased, FromConfig, ModelHead, PreTrainedModel};

/// What to do when a key is already bound to a different type.
///
/// Re-registering an identical binding is a no-op under every policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationPolicy {
    /// Reject the new binding with [`RegistryError::DuplicateRegistration`].
    Fail,
    /// Overwrite the existing binding.
    Replace,
    /// Leave the existing binding in place and report success.
    KeepExisting,
}

impl RegistrationPolicy {
    /// Maps the host-framework style `exist_ok` flag onto a policy.
    pub fn from_allow_redefinition(allow_redefinition: bool) -> Self {
        if allow_redefinition {
            RegistrationPolicy::Replace
        } else {
            RegistrationPolicy::Fail
        }
    }
}

/// Effect a single facet registration had on its namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Inserted,
    Unchanged,
    Replaced,
    KeptExisting,
}

/// Per-facet outcomes of [`AutoRegistry::register_architecture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationReport {
    pub config: RegistrationOutcome,
    pub base_model: RegistrationOutcome,
    pub causal_lm: RegistrationOutcome,
}

impl RegistrationReport {
    /// True when any namespace was written to.
    pub fn changed(&self) -> bool {
        [self.config, self.base_model, self.causal_lm].iter().any(|outcome| {
            matches!(outcome, RegistrationOutcome::Inserted | RegistrationOutcome::Replaced)
        })
    }
}

type ConfigCtor = fn(Value) -> Result<Box<dyn PretrainedConfig>, RegistryError>;
type ModelCtor = fn(&dyn PretrainedConfig) -> Result<Box<dyn PreTrainedModel>, RegistryError>;

fn config_from_json<C: ConfigDescriptor>(
    value: Value,
) -> Result<Box<dyn PretrainedConfig>, RegistryError> {
    Ok(Box::new(C::from_json_value(value)?))
}

/// A configuration type bound to an architecture identifier.
#[derive(Clone)]
pub struct ConfigBinding {
    model_type: String,
    config_type: TypeId,
    type_name: &'static str,
    construct: ConfigCtor,
}

impl ConfigBinding {
    fn of<C: ConfigDescriptor>(model_type: &str) -> Self {
        Self {
            model_type: model_type.to_string(),
            config_type: TypeId::of::<C>(),
            type_name: std::any::type_name::<C>(),
            construct: config_from_json::<C>,
        }
    }

    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    pub fn config_type(&self) -> TypeId {
        self.config_type
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<C: ConfigDescriptor>(&self) -> bool {
        self.config_type == TypeId::of::<C>()
    }

    /// Deserializes and validates a configuration of the bound type.
    pub fn build(&self, value: Value) -> Result<Box<dyn PretrainedConfig>, RegistryError> {
        (self.construct)(value)
    }
}

impl fmt::Debug for ConfigBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigBinding")
            .field("model_type", &self.model_type)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// A model type bound to the configuration type it is built from.
#[derive(Clone)]
pub struct ModelBinding {
    config_type: TypeId,
    model_type: TypeId,
    type_name: &'static str,
    head: ModelHead,
    construct: ModelCtor,
}

impl ModelBinding {
    fn of<M: FromConfig>() -> Self {
        Self {
            config_type: TypeId::of::<M::Config>(),
            model_type: TypeId::of::<M>(),
            type_name: std::any::type_name::<M>(),
            head: M::HEAD,
            construct: construct_erased::<M>,
        }
    }

    pub fn config_type(&self) -> TypeId {
        self.config_type
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn head(&self) -> ModelHead {
        self.head
    }

    pub fn is<M: PreTrainedModel>(&self) -> bool {
        self.model_type == TypeId::of::<M>()
    }

    /// Instantiates the bound model from a configuration of the bound type.
    pub fn build(
        &self,
        config: &dyn PretrainedConfig,
    ) -> Result<Box<dyn PreTrainedModel>, RegistryError> {
        (self.construct)(config)
    }
}

impl fmt::Debug for ModelBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBinding")
            .field("type_name", &self.type_name)
            .field("head", &self.head)
            .finish()
    }
}

trait Binding: Clone {
    fn same_as(&self, other: &Self) -> bool;
    fn type_name(&self) -> &'static str;
}

impl Binding for ConfigBinding {
    fn same_as(&self, other: &Self) -> bool {
        self.model_type == other.model_type && self.config_type == other.config_type
    }

    fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl Binding for ModelBinding {
    fn same_as(&self, other: &Self) -> bool {
        self.model_type == other.model_type && self.config_type == other.config_type
    }

    fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// One keyed table of bindings.
///
/// Registration is split into `plan` (read-only, may fail) and `commit`
/// (infallible) so several namespaces can be checked before any is written.
struct Namespace<K, V> {
    name: &'static str,
    entries: HashMap<K, V>,
}

impl<K: Eq + Hash, V: Binding> Namespace<K, V> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: HashMap::new(),
        }
    }

    fn plan(
        &self,
        key: &K,
        label: &str,
        binding: &V,
        policy: RegistrationPolicy,
    ) -> Result<RegistrationOutcome, RegistryError> {
        let existing = match self.entries.get(key) {
            None => return Ok(RegistrationOutcome::Inserted),
            Some(existing) => existing,
        };

        if existing.same_as(binding) {
            return Ok(RegistrationOutcome::Unchanged);
        }

        match policy {
            RegistrationPolicy::Fail => Err(RegistryError::DuplicateRegistration {
                namespace: self.name,
                key: label.to_string(),
                existing: existing.type_name(),
                attempted: binding.type_name(),
            }),
            RegistrationPolicy::Replace => Ok(RegistrationOutcome::Replaced),
            RegistrationPolicy::KeepExisting => Ok(RegistrationOutcome::KeptExisting),
        }
    }

    fn commit(&mut self, key: K, label: &str, binding: V, outcome: RegistrationOutcome) {
        match outcome {
            RegistrationOutcome::Inserted => {
                info!("[{}] registered '{}' -> {}", self.name, label, binding.type_name());
                self.entries.insert(key, binding);
            }
            RegistrationOutcome::Replaced => {
                if let Some(previous) = self.entries.insert(key, binding.clone()) {
                    warn!(
                        "[{}] rebinding '{}' from {} to {}",
                        self.name,
                        label,
                        previous.type_name(),
                        binding.type_name()
                    );
                }
            }
            RegistrationOutcome::Unchanged => {
                debug!("[{}] '{}' already bound to {}", self.name, label, binding.type_name());
            }
            RegistrationOutcome::KeptExisting => {
                debug!(
                    "[{}] keeping existing binding for '{}', ignoring {}",
                    self.name,
                    label,
                    binding.type_name()
                );
            }
        }
    }
}

struct Tables {
    configs: Namespace<String, ConfigBinding>,
    base_models: Namespace<TypeId, ModelBinding>,
    causal_lms: Namespace<TypeId, ModelBinding>,
}

impl Tables {
    fn models(&self, head: ModelHead) -> &Namespace<TypeId, ModelBinding> {
        match head {
            ModelHead::Base => &self.base_models,
            ModelHead::CausalLm => &self.causal_lms,
        }
    }

    fn models_mut(&mut self, head: ModelHead) -> &mut Namespace<TypeId, ModelBinding> {
        match head {
            ModelHead::Base => &mut self.base_models,
            ModelHead::CausalLm => &mut self.causal_lms,
        }
    }
}

/// Process-wide lookup table from architecture identifiers and configuration
/// types to constructors.
///
/// The registry is an ordinary value: create one at startup, hand it to each
/// architecture's binder, then share it (it is `Send + Sync`) with whatever
/// loads models. All writes go through one internal lock.
pub struct AutoRegistry {
    tables: RwLock<Tables>,
}

impl AutoRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables {
                configs: Namespace::new("config"),
                base_models: Namespace::new(ModelHead::Base.namespace()),
                causal_lms: Namespace::new(ModelHead::CausalLm.namespace()),
            }),
        }
    }

    /// Creates a registry with every architecture shipped in this crate.
    pub fn with_builtin_models() -> Result<Self, RegistryError> {
        let registry = Self::new();
        crate::models::register_builtin_models(&registry)?;
        Ok(registry)
    }

    /// Binds an architecture's configuration, base model and causal-LM model.
    ///
    /// The three facets are checked together before anything is written, so
    /// an error leaves the registry exactly as it was.
    pub fn register_architecture<C, M, L>(
        &self,
        id: &str,
        policy: RegistrationPolicy,
    ) -> Result<RegistrationReport, RegistryError>
    where
        C: ConfigDescriptor,
        M: FromConfig<Config = C>,
        L: FromConfig<Config = C>,
    {
        check_identifier::<C>(id)?;
        check_head::<M>(ModelHead::Base)?;
        check_head::<L>(ModelHead::CausalLm)?;

        let config_key = id.to_string();
        let config_binding = ConfigBinding::of::<C>(id);
        let model_key = TypeId::of::<C>();
        let model_label = std::any::type_name::<C>();
        let base_binding = ModelBinding::of::<M>();
        let causal_lm_binding = ModelBinding::of::<L>();

        let mut tables = self.tables.write();
        let report = RegistrationReport {
            config: tables.configs.plan(&config_key, id, &config_binding, policy)?,
            base_model: tables.base_models.plan(&model_key, model_label, &base_binding, policy)?,
            causal_lm: tables.causal_lms.plan(&model_key, model_label, &causal_lm_binding, policy)?,
        };

        tables.configs.commit(config_key, id, config_binding, report.config);
        tables.base_models.commit(model_key, model_label, base_binding, report.base_model);
        tables.causal_lms.commit(model_key, model_label, causal_lm_binding, report.causal_lm);

        Ok(report)
    }

    /// Binds `id` to configuration type `C`.
    pub fn register_config<C: ConfigDescriptor>(
        &self,
        id: &str,
        policy: RegistrationPolicy,
    ) -> Result<RegistrationOutcome, RegistryError> {
        check_identifier::<C>(id)?;

        let binding = ConfigBinding::of::<C>(id);
        let key = id.to_string();
        let mut tables = self.tables.write();
        let outcome = tables.configs.plan(&key, id, &binding, policy)?;
        tables.configs.commit(key, id, binding, outcome);
        Ok(outcome)
    }

    /// Binds `M::Config` to base model type `M`.
    pub fn register_model<M: FromConfig>(
        &self,
        policy: RegistrationPolicy,
    ) -> Result<RegistrationOutcome, RegistryError> {
        self.register_head::<M>(ModelHead::Base, policy)
    }

    /// Binds `L::Config` to causal-LM model type `L`.
    pub fn register_causal_lm<L: FromConfig>(
        &self,
        policy: RegistrationPolicy,
    ) -> Result<RegistrationOutcome, RegistryError> {
        self.register_head::<L>(ModelHead::CausalLm, policy)
    }

    fn register_head<M: FromConfig>(
        &self,
        head: ModelHead,
        policy: RegistrationPolicy,
    ) -> Result<RegistrationOutcome, RegistryError> {
        check_head::<M>(head)?;

        let binding = ModelBinding::of::<M>();
        let key = TypeId::of::<M::Config>();
        let label = std::any::type_name::<M::Config>();
        let mut tables = self.tables.write();
        let namespace = tables.models_mut(head);
        let outcome = namespace.plan(&key, label, &binding, policy)?;
        namespace.commit(key, label, binding, outcome);
        Ok(outcome)
    }

    /// Configuration binding for an architecture identifier.
    pub fn resolve_config(&self, id: &str) -> Option<ConfigBinding> {
        self.tables.read().configs.entries.get(id).cloned()
    }

    /// Model binding for a configuration type in the given namespace.
    pub fn resolve_model(&self, head: ModelHead, config_type: TypeId) -> Option<ModelBinding> {
        self.tables.read().models(head).entries.get(&config_type).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tables.read().configs.entries.contains_key(id)
    }

    /// Registered architecture identifiers, sorted.
    pub fn model_types(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tables.read().configs.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered architecture identifiers.
    pub fn len(&self) -> usize {
        self.tables.read().configs.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AutoRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AutoRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoRegistry")
            .field("model_types", &self.model_types())
            .finish()
    }
}

fn check_identifier<C: ConfigDescriptor>(id: &str) -> Result<(), RegistryError> {
    if id.is_empty() {
        return Err(RegistryError::EmptyIdentifier);
    }
    if id != C::MODEL_TYPE {
        return Err(RegistryError::ModelTypeMismatch {
            config_type: std::any::type_name::<C>(),
            declared: C::MODEL_TYPE,
            requested: id.to_string(),
        });
    }
    Ok(())
}

fn check_head<M: FromConfig>(expected: ModelHead) -> Result<(), RegistryError> {
    if M::HEAD != expected {
        return Err(RegistryError::HeadMismatch {
            model_type: std::any::type_name::<M>(),
            expected,
            actual: M::HEAD,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::{ToyConfig, ToyForCausalLM, ToyModel};
    use serde::{Deserialize, Serialize};
    use std::any::Any;

    /// Second configuration type claiming the same identifier as `ToyConfig`.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct ImpostorConfig {}

    impl ConfigDescriptor for ImpostorConfig {
        const MODEL_TYPE: &'static str = "toy";
    }

    /// Second base model type accepting `ToyConfig`.
    #[derive(Debug)]
    struct ToyModelV2 {
        config: ToyConfig,
    }

    impl PreTrainedModel for ToyModelV2 {
        fn config(&self) -> &dyn PretrainedConfig {
            &self.config
        }

        fn head(&self) -> ModelHead {
            ModelHead::Base
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    impl FromConfig for ToyModelV2 {
        type Config = ToyConfig;
        const HEAD: ModelHead = ModelHead::Base;

        fn from_config(config: &ToyConfig) -> Result<Self, RegistryError> {
            Ok(Self { config: config.clone() })
        }
    }

    fn register_toy(registry: &AutoRegistry, policy: RegistrationPolicy) -> Result<RegistrationReport, RegistryError> {
        registry.register_architecture::<ToyConfig, ToyModel, ToyForCausalLM>("toy", policy)
    }

    #[test]
    fn test_first_registration_inserts_all_facets() {
        let registry = AutoRegistry::new();
        let report = register_toy(&registry, RegistrationPolicy::Fail).unwrap();

        assert_eq!(report.config, RegistrationOutcome::Inserted);
        assert_eq!(report.base_model, RegistrationOutcome::Inserted);
        assert_eq!(report.causal_lm, RegistrationOutcome::Inserted);
        assert!(report.changed());
        assert!(registry.contains("toy"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_identical_repeat_is_noop_under_every_policy() {
        for policy in [
            RegistrationPolicy::Fail,
            RegistrationPolicy::Replace,
            RegistrationPolicy::KeepExisting,
        ] {
            let registry = AutoRegistry::new();
            register_toy(&registry, policy).unwrap();
            let report = register_toy(&registry, policy).unwrap();
            assert!(!report.changed(), "policy {:?} changed state on repeat", policy);
            assert_eq!(report.config, RegistrationOutcome::Unchanged);
        }
    }

    #[test]
    fn test_fail_policy_rejects_conflicting_config() {
        let registry = AutoRegistry::new();
        registry.register_config::<ToyConfig>("toy", RegistrationPolicy::Fail).unwrap();

        let err = registry
            .register_config::<ImpostorConfig>("toy", RegistrationPolicy::Fail)
            .unwrap_err();
        match err {
            RegistryError::DuplicateRegistration { namespace, key, existing, attempted } => {
                assert_eq!(namespace, "config");
                assert_eq!(key, "toy");
                assert!(existing.ends_with("ToyConfig"));
                assert!(attempted.ends_with("ImpostorConfig"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(registry.resolve_config("toy").unwrap().is::<ToyConfig>());
    }

    #[test]
    fn test_replace_policy_rebinds() {
        let registry = AutoRegistry::new();
        registry.register_model::<ToyModel>(RegistrationPolicy::Fail).unwrap();
        let outcome = registry.register_model::<ToyModelV2>(RegistrationPolicy::Replace).unwrap();

        assert_eq!(outcome, RegistrationOutcome::Replaced);
        let binding = registry.resolve_model(ModelHead::Base, TypeId::of::<ToyConfig>()).unwrap();
        assert!(binding.is::<ToyModelV2>());
    }

    #[test]
    fn test_keep_existing_policy_keeps_first_binding() {
        let registry = AutoRegistry::new();
        registry.register_model::<ToyModel>(RegistrationPolicy::Fail).unwrap();
        let outcome = registry
            .register_model::<ToyModelV2>(RegistrationPolicy::KeepExisting)
            .unwrap();

        assert_eq!(outcome, RegistrationOutcome::KeptExisting);
        let binding = registry.resolve_model(ModelHead::Base, TypeId::of::<ToyConfig>()).unwrap();
        assert!(binding.is::<ToyModel>());
    }

    #[test]
    fn test_conflict_in_later_facet_leaves_registry_untouched() {
        let registry = AutoRegistry::new();
        registry.register_model::<ToyModelV2>(RegistrationPolicy::Fail).unwrap();

        let err = register_toy(&registry, RegistrationPolicy::Fail).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateRegistration { namespace: "base-model", .. }));
        assert!(!registry.contains("toy"));
        assert!(registry
            .resolve_model(ModelHead::CausalLm, TypeId::of::<ToyConfig>())
            .is_none());
    }

    #[test]
    fn test_identifier_validation() {
        let registry = AutoRegistry::new();
        assert!(matches!(
            registry.register_config::<ToyConfig>("", RegistrationPolicy::Replace),
            Err(RegistryError::EmptyIdentifier)
        ));
        assert!(matches!(
            registry.register_architecture::<ToyConfig, ToyModel, ToyForCausalLM>(
                "toy-v2",
                RegistrationPolicy::Replace
            ),
            Err(RegistryError::ModelTypeMismatch { declared: "toy", .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_head_mismatch_is_rejected() {
        let registry = AutoRegistry::new();
        let err = registry
            .register_architecture::<ToyConfig, ToyForCausalLM, ToyForCausalLM>(
                "toy",
                RegistrationPolicy::Replace,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::HeadMismatch { expected: ModelHead::Base, actual: ModelHead::CausalLm, .. }
        ));
        assert!(matches!(
            registry.register_causal_lm::<ToyModel>(RegistrationPolicy::Replace),
            Err(RegistryError::HeadMismatch { .. })
        ));
    }

    #[test]
    fn test_from_allow_redefinition() {
        assert_eq!(RegistrationPolicy::from_allow_redefinition(true), RegistrationPolicy::Replace);
        assert_eq!(RegistrationPolicy::from_allow_redefinition(false), RegistrationPolicy::Fail);
    }

    #[test]
    fn test_concurrent_registration_converges() {
        let registry = AutoRegistry::new();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| register_toy(&registry, RegistrationPolicy::Fail).unwrap());
            }
        });

        assert_eq!(registry.model_types(), vec!["toy".to_string()]);
        assert!(registry
            .resolve_model(ModelHead::CausalLm, TypeId::of::<ToyConfig>())
            .unwrap()
            .is::<ToyForCausalLM>());
    }

    #[test]
    fn test_bindings_build_instances() {
        let registry = AutoRegistry::new();
        register_toy(&registry, RegistrationPolicy::Fail).unwrap();

        let config = registry
            .resolve_config("toy")
            .unwrap()
            .build(serde_json::json!({ "layers": 4 }))
            .unwrap();
        let model = registry
            .resolve_model(ModelHead::Base, config.config_type_id())
            .unwrap()
            .build(config.as_ref())
            .unwrap();
        assert_eq!(model.downcast_ref::<ToyModel>().unwrap().config.layers, 4);
    }
}
