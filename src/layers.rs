//! Layer-level descriptors shared by the hybrid architectures.
//!
//! Linear-recurrent models can swap selected layers for softmax attention.
//! Configs describe those layers with an [`AttnConfig`]; models record the
//! resulting per-layer [`LayerMixer`] plan.

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Softmax attention settings for the layers listed in `layers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttnConfig {
    /// Indices of the layers that use attention instead of the recurrent mixer.
    pub layers: Vec<usize>,
    pub num_heads: usize,
    /// Defaults to `num_heads` (plain multi-head attention).
    #[serde(default)]
    pub num_kv_heads: Option<usize>,
    #[serde(default)]
    pub qkv_bias: bool,
    /// Sliding window size; `None` attends over the full prefix.
    #[serde(default)]
    pub window_size: Option<usize>,
    #[serde(default = "default_rope_theta")]
    pub rope_theta: f64,
}

fn default_rope_theta() -> f64 {
    10_000.0
}

impl AttnConfig {
    pub fn kv_heads(&self) -> usize {
        self.num_kv_heads.unwrap_or(self.num_heads)
    }

    /// Checks the block against the host model's depth and width. Failures
    /// are reported as invalid configs of `model_type`.
    pub fn check(
        &self,
        model_type: &'static str,
        num_hidden_layers: usize,
        hidden_size: usize,
    ) -> Result<(), RegistryError> {
        if self.layers.is_empty() {
            return Err(RegistryError::invalid(model_type, "attn.layers must name at least one layer"));
        }
        if let Some(&layer) = self.layers.iter().find(|&&layer| layer >= num_hidden_layers) {
            return Err(RegistryError::invalid(
                model_type,
                format!(
                    "attn.layers contains layer {} but the model only has {} layers",
                    layer, num_hidden_layers
                ),
            ));
        }
        if self.num_heads == 0 {
            return Err(RegistryError::invalid(model_type, "attn.num_heads must be non-zero"));
        }
        let kv_heads = self.kv_heads();
        if kv_heads == 0 || self.num_heads % kv_heads != 0 {
            return Err(RegistryError::invalid(
                model_type,
                format!(
                    "attn.num_heads ({}) must be a multiple of attn.num_kv_heads ({})",
                    self.num_heads, kv_heads
                ),
            ));
        }
        if hidden_size % self.num_heads != 0 {
            return Err(RegistryError::invalid(
                model_type,
                format!("hidden_size ({}) must be divisible by attn.num_heads ({})", hidden_size, self.num_heads),
            ));
        }
        Ok(())
    }
}

/// Token mixer used by one layer of a hybrid model.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerMixer {
    /// Gated linear recurrence with an outer-product expanded state.
    Recurrent {
        num_heads: usize,
        expand_ratio: usize,
        /// Width of the forget gate, `num_heads * expand_ratio`.
        forget_dim: usize,
        short_conv: Option<usize>,
    },
    Attention {
        num_heads: usize,
        num_kv_heads: usize,
        window_size: Option<usize>,
    },
}

impl LayerMixer {
    pub fn is_attention(&self) -> bool {
        matches!(self, LayerMixer::Attention { .. })
    }
}
