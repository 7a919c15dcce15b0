//! Hyperparameter sidecar (`params.json`) loading and validation.

use crate::error::{ConvertError, Result};
use ggml_format::{FloatType, GgmlHeader};
use serde::Deserialize;
use std::path::Path;

/// Architecture-describing scalars read from the model directory.
///
/// The sidecar is an explicit, statically validated structure: unrecognized
/// keys are rejected at the boundary rather than silently carried along.
/// `vocab_size` in the file is advisory (LLaMA ships `-1` there); the
/// authoritative value comes from the tokenizer.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Hparams {
    pub dim: i32,
    pub multiple_of: i32,
    pub n_heads: i32,
    pub n_layers: i32,
    #[serde(default)]
    pub norm_eps: Option<f64>,
    #[serde(default)]
    pub vocab_size: Option<i32>,
}

impl Hparams {
    /// Load and validate `params.json`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConvertError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let hparams: Self = serde_json::from_str(&content).map_err(|e| {
            ConvertError::InvalidArgument(format!("cannot parse {}: {e}", path.display()))
        })?;
        hparams.validate()?;
        Ok(hparams)
    }

    /// Check the structural invariants the file format relies on.
    pub fn validate(&self) -> Result<()> {
        if self.dim <= 0 || self.n_heads <= 0 || self.n_layers <= 0 || self.multiple_of <= 0 {
            return Err(ConvertError::InvalidArgument(format!(
                "hyperparameters must be positive (dim={}, multiple_of={}, n_heads={}, n_layers={})",
                self.dim, self.multiple_of, self.n_heads, self.n_layers
            )));
        }
        // The rotary dimension dim / n_heads must be exact.
        if self.dim % self.n_heads != 0 {
            return Err(ConvertError::InvalidArgument(format!(
                "dim {} is not divisible by n_heads {}",
                self.dim, self.n_heads
            )));
        }
        Ok(())
    }

    /// Derived rotary dimension.
    pub fn rot(&self) -> i32 {
        self.dim / self.n_heads
    }

    /// Build the fixed file header for a given vocabulary size and precision.
    pub fn to_header(&self, vocab_size: i32, ftype: FloatType) -> GgmlHeader {
        GgmlHeader {
            vocab_size,
            dim: self.dim,
            multiple_of: self.multiple_of,
            n_heads: self.n_heads,
            n_layers: self.n_layers,
            rot: self.rot(),
            ftype,
        }
    }
}

/// Model-parallelism part count for a given embedding dimension.
///
/// Fixed lookup table matching how the upstream checkpoints are sharded; any
/// other dimension is fatal before a single byte is written.
pub fn part_count_for_dim(dim: i32) -> Result<u32> {
    match dim {
        4096 => Ok(1),
        5120 => Ok(2),
        6656 => Ok(4),
        8192 => Ok(8),
        _ => Err(ConvertError::UnsupportedShape { dim }),
    }
}
