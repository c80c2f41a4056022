use std::any::Any;

use crate::config::{ConfigDescriptor, PretrainedConfig};
use crate::error::RegistryError;
use crate::layers::LayerMixer;
use crate::model::{FromConfig, ModelHead, PreTrainedModel};

use super::config::HGRN2Config;

/// HGRN2 backbone: token embeddings, a stack of mixer + gated-MLP blocks and
/// a final norm.
///
/// Only the structure derived from the configuration is held here; the
/// layer computations are provided by the runtime that loads weights.
#[derive(Debug, Clone)]
pub struct HGRN2Model {
    config: HGRN2Config,
    embedding_shape: (usize, usize),
    layers: Vec<LayerMixer>,
    intermediate_size: usize,
}

impl HGRN2Model {
    pub fn new(config: &HGRN2Config) -> Result<Self, RegistryError> {
        config.validate()?;
        let (num_heads, expand_ratio) = config.head_layout()?;
        let forget_dim = config.forget_dim()?;
        let short_conv = config.use_short_conv.then_some(config.conv_size);

        let mut layers = Vec::with_capacity(config.num_hidden_layers);
        for layer_idx in 0..config.num_hidden_layers {
            let mixer = match &config.attn {
                Some(attn) if attn.layers.contains(&layer_idx) => LayerMixer::Attention {
                    num_heads: attn.num_heads,
                    num_kv_heads: attn.kv_heads(),
                    window_size: attn.window_size,
                },
                _ => LayerMixer::Recurrent {
                    num_heads,
                    expand_ratio,
                    forget_dim,
                    short_conv,
                },
            };
            layers.push(mixer);
        }

        Ok(Self {
            config: config.clone(),
            embedding_shape: (config.vocab_size, config.hidden_size),
            layers,
            intermediate_size: config.mlp_intermediate_size()?,
        })
    }

    pub fn hgrn2_config(&self) -> &HGRN2Config {
        &self.config
    }

    /// `(vocab_size, hidden_size)`
    pub fn embedding_shape(&self) -> (usize, usize) {
        self.embedding_shape
    }

    /// Token mixer of each layer, in order.
    pub fn layers(&self) -> &[LayerMixer] {
        &self.layers
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn intermediate_size(&self) -> usize {
        self.intermediate_size
    }
}

impl PreTrainedModel for HGRN2Model {
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

impl FromConfig for HGRN2Model {
    type Config = HGRN2Config;
    const HEAD: ModelHead = ModelHead::Base;

    fn from_config(config: &HGRN2Config) -> Result<Self, RegistryError> {
        Self::new(config)
    }
}

/// HGRN2 backbone with a language-modelling head over the vocabulary.
#[derive(Debug, Clone)]
pub struct HGRN2ForCausalLM {
    model: HGRN2Model,
    lm_head_shape: (usize, usize),
}

impl HGRN2ForCausalLM {
    pub fn new(config: &HGRN2Config) -> Result<Self, RegistryError> {
        let model = HGRN2Model::new(config)?;
        Ok(Self {
            lm_head_shape: (config.vocab_size, config.hidden_size),
            model,
        })
    }

    pub fn base_model(&self) -> &HGRN2Model {
        &self.model
    }

    /// `(vocab_size, hidden_size)`
    pub fn lm_head_shape(&self) -> (usize, usize) {
        self.lm_head_shape
    }

    /// Whether the LM head shares its matrix with the token embeddings.
    pub fn ties_word_embeddings(&self) -> bool {
        self.model.config.tie_word_embeddings
    }
}

impl PreTrainedModel for HGRN2ForCausalLM {
    fn config(&self) -> &dyn PretrainedConfig {
        &self.model.config
    }

    fn head(&self) -> ModelHead {
        ModelHead::CausalLm
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl FromConfig for HGRN2ForCausalLM {
    type Config = HGRN2Config;
    const HEAD: ModelHead = ModelHead::CausalLm;

    fn from_config(config: &HGRN2Config) -> Result<Self, RegistryError> {
        Self::new(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::AttnConfig;

    fn small_config() -> HGRN2Config {
        HGRN2Config {
            hidden_size: 256,
            num_hidden_layers: 4,
            vocab_size: 1000,
            expand_ratio: Some(64),
            ..HGRN2Config::default()
        }
    }

    #[test]
    fn test_model_layer_plan() {
        let model = HGRN2Model::new(&small_config()).unwrap();
        assert_eq!(model.num_layers(), 4);
        assert_eq!(model.embedding_shape(), (1000, 256));
        assert!(model.layers().iter().all(|layer| *layer
            == LayerMixer::Recurrent {
                num_heads: 4,
                expand_ratio: 64,
                forget_dim: 256,
                short_conv: None,
            }));
        // 256 * 4 * 2 / 3 = 682 -> 768
        assert_eq!(model.intermediate_size(), 768);
    }

    #[test]
    fn test_hybrid_layer_plan() {
        let config = HGRN2Config {
            use_short_conv: true,
            attn: Some(AttnConfig {
                layers: vec![2],
                num_heads: 8,
                num_kv_heads: Some(2),
                qkv_bias: false,
                window_size: Some(512),
                rope_theta: 10_000.0,
            }),
            ..small_config()
        };
        let model = HGRN2Model::new(&config).unwrap();

        let attention: Vec<usize> = model
            .layers()
            .iter()
            .enumerate()
            .filter(|(_, layer)| layer.is_attention())
            .map(|(idx, _)| idx)
            .collect();
        assert_eq!(attention, vec![2]);
        assert_eq!(
            model.layers()[2],
            LayerMixer::Attention { num_heads: 8, num_kv_heads: 2, window_size: Some(512) }
        );
        assert!(matches!(model.layers()[0], LayerMixer::Recurrent { short_conv: Some(4), .. }));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = HGRN2Config { vocab_size: 0, ..small_config() };
        assert!(HGRN2ForCausalLM::new(&config).is_err());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_overflowing_config_returns_error() {
        let config = HGRN2Config {
            hidden_size: 1 << 62,
            ..small_config()
        };
        assert!(matches!(HGRN2Model::new(&config), Err(RegistryError::InvalidConfig { .. })));

        let config = HGRN2Config {
            hidden_size: 1 << 32,
            num_heads: Some(1 << 32),
            expand_ratio: Some(1 << 32),
            intermediate_size: Some(1024),
            ..small_config()
        };
        assert!(matches!(HGRN2ForCausalLM::new(&config), Err(RegistryError::InvalidConfig { .. })));
    }

    #[test]
    fn test_causal_lm_head() {
        let config = HGRN2Config { tie_word_embeddings: true, ..small_config() };
        let lm = HGRN2ForCausalLM::from_config(&config).unwrap();
        assert_eq!(lm.lm_head_shape(), (1000, 256));
        assert!(lm.ties_word_embeddings());
        assert_eq!(lm.base_model().num_layers(), 4);
        assert_eq!(lm.head(), ModelHead::CausalLm);
        assert_eq!(PreTrainedModel::config(&lm).model_type(), "hgrn2");
    }
}
