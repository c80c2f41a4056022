use serde::{Deserialize, Serialize};

use crate::config::ConfigDescriptor;
use crate::error::RegistryError;
use crate::layers::AttnConfig;

const ATTN_MODES: [&str; 3] = ["chunk", "fused_chunk", "fused_recurrent"];

/// Upper bound on `num_hidden_layers`; deeper stacks are rejected as invalid.
const MAX_HIDDEN_LAYERS: usize = 4096;

/// Hyperparameters of an HGRN2 language model.
///
/// Field names follow the `config.json` files published with HGRN2
/// checkpoints; missing fields take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HGRN2Config {
    /// Kernel used for the recurrence.
    pub attn_mode: String,
    #[serde(alias = "n_embd")]
    pub hidden_size: usize,
    #[serde(alias = "n_layer")]
    pub num_hidden_layers: usize,
    pub num_heads: Option<usize>,
    pub expand_ratio: Option<usize>,
    pub use_short_conv: bool,
    pub conv_size: usize,
    /// Learn per-layer lower bounds for the forget gates.
    pub use_lower_bound: bool,
    pub hidden_ratio: Option<usize>,
    pub intermediate_size: Option<usize>,
    pub hidden_act: String,
    #[serde(alias = "n_positions")]
    pub max_position_embeddings: usize,
    pub elementwise_affine: bool,
    pub norm_eps: f64,
    /// Layers that use softmax attention instead of the HGRN2 mixer.
    pub attn: Option<AttnConfig>,
    pub use_cache: bool,
    pub pad_token_id: Option<u32>,
    pub bos_token_id: Option<u32>,
    pub eos_token_id: Option<u32>,
    pub tie_word_embeddings: bool,
    pub initializer_range: f64,
    pub fuse_norm: bool,
    pub fuse_swiglu: bool,
    pub fuse_cross_entropy: bool,
    pub vocab_size: usize,
}

impl Default for HGRN2Config {
    fn default() -> Self {
        Self {
            attn_mode: "chunk".to_string(),
            hidden_size: 2048,
            num_hidden_layers: 24,
            num_heads: None,
            expand_ratio: Some(128),
            use_short_conv: false,
            conv_size: 4,
            use_lower_bound: true,
            hidden_ratio: Some(4),
            intermediate_size: None,
            hidden_act: "swish".to_string(),
            max_position_embeddings: 2048,
            elementwise_affine: true,
            norm_eps: 1e-6,
            attn: None,
            use_cache: true,
            pad_token_id: None,
            bos_token_id: Some(1),
            eos_token_id: Some(2),
            tie_word_embeddings: false,
            initializer_range: 0.006,
            fuse_norm: true,
            fuse_swiglu: true,
            fuse_cross_entropy: true,
            vocab_size: 32000,
        }
    }
}

impl HGRN2Config {
    /// Resolves `(num_heads, expand_ratio)` for the recurrent layers.
    ///
    /// Either value may be omitted; the other then determines it through
    /// `hidden_size`.
    pub fn head_layout(&self) -> Result<(usize, usize), RegistryError> {
        let (num_heads, expand_ratio) = match (self.num_heads, self.expand_ratio) {
            (Some(heads), Some(ratio)) => (heads, ratio),
            (Some(heads), None) => {
                if heads == 0 {
                    return Err(RegistryError::invalid(Self::MODEL_TYPE, "num_heads must be non-zero"));
                }
                (heads, self.hidden_size / heads)
            }
            (None, Some(ratio)) => {
                if ratio == 0 || self.hidden_size % ratio != 0 {
                    return Err(RegistryError::invalid(
                        Self::MODEL_TYPE,
                        format!("hidden_size ({}) must be divisible by expand_ratio ({})", self.hidden_size, ratio),
                    ));
                }
                (self.hidden_size / ratio, ratio)
            }
            (None, None) => {
                return Err(RegistryError::invalid(
                    Self::MODEL_TYPE,
                    "one of num_heads or expand_ratio must be set",
                ))
            }
        };

        if num_heads == 0
            || expand_ratio == 0
            || self.hidden_size % num_heads != 0
            || self.hidden_size % expand_ratio != 0
        {
            return Err(RegistryError::invalid(
                Self::MODEL_TYPE,
                format!(
                    "hidden_size ({}) must be divisible by num_heads ({}) and expand_ratio ({})",
                    self.hidden_size, num_heads, expand_ratio
                ),
            ));
        }
        Ok((num_heads, expand_ratio))
    }

    /// Width of the forget gate, `num_heads * expand_ratio`.
    pub fn forget_dim(&self) -> Result<usize, RegistryError> {
        let (num_heads, expand_ratio) = self.head_layout()?;
        num_heads.checked_mul(expand_ratio).ok_or_else(|| {
            RegistryError::invalid(
                Self::MODEL_TYPE,
                format!("num_heads ({}) * expand_ratio ({}) overflows", num_heads, expand_ratio),
            )
        })
    }

    /// Width of the gated MLP.
    ///
    /// Without an explicit `intermediate_size` this is two thirds of
    /// `hidden_size * hidden_ratio`, rounded up to a multiple of 256.
    pub fn mlp_intermediate_size(&self) -> Result<usize, RegistryError> {
        if let Some(size) = self.intermediate_size {
            return Ok(size);
        }
        let ratio = self.hidden_ratio.unwrap_or(4);
        let raw = self
            .hidden_size
            .checked_mul(ratio)
            .and_then(|width| width.checked_mul(2))
            .map(|width| width / 3);
        raw.and_then(|raw| (raw / 256 + usize::from(raw % 256 != 0)).checked_mul(256))
            .ok_or_else(|| {
                RegistryError::invalid(
                    Self::MODEL_TYPE,
                    format!(
                        "MLP width for hidden_size ({}) and hidden_ratio ({}) overflows",
                        self.hidden_size, ratio
                    ),
                )
            })
    }

    pub fn is_attention_layer(&self, layer_idx: usize) -> bool {
        self.attn
            .as_ref()
            .map_or(false, |attn| attn.layers.contains(&layer_idx))
    }
}

impl ConfigDescriptor for HGRN2Config {
    const MODEL_TYPE: &'static str = "hgrn2";

    fn validate(&self) -> Result<(), RegistryError> {
        if self.hidden_size == 0 {
            return Err(RegistryError::invalid(Self::MODEL_TYPE, "hidden_size must be non-zero"));
        }
        if self.num_hidden_layers == 0 || self.num_hidden_layers > MAX_HIDDEN_LAYERS {
            return Err(RegistryError::invalid(
                Self::MODEL_TYPE,
                format!(
                    "num_hidden_layers ({}) must be between 1 and {}",
                    self.num_hidden_layers, MAX_HIDDEN_LAYERS
                ),
            ));
        }
        if self.vocab_size == 0 {
            return Err(RegistryError::invalid(Self::MODEL_TYPE, "vocab_size must be non-zero"));
        }
        if !ATTN_MODES.contains(&self.attn_mode.as_str()) {
            return Err(RegistryError::invalid(
                Self::MODEL_TYPE,
                format!("unsupported attn_mode '{}', expected one of {:?}", self.attn_mode, ATTN_MODES),
            ));
        }
        if self.use_short_conv && self.conv_size == 0 {
            return Err(RegistryError::invalid(Self::MODEL_TYPE, "conv_size must be non-zero with use_short_conv"));
        }
        self.forget_dim()?;
        self.mlp_intermediate_size()?;
        if let Some(attn) = &self.attn {
            attn.check(Self::MODEL_TYPE, self.num_hidden_layers, self.hidden_size)?;
        }
        Ok(())
    }
}
