//! Checkpoint shard access.
//!
//! One safetensors shard per model part, memory-mapped and borrowed for the
//! duration of that part's conversion. Tensors are read once, optionally
//! down-cast, and never mutated.

use crate::error::{ConvertError, Result};
use ggml_format::FloatType;
use half::{bf16, f16};
use memmap2::Mmap;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::path::{Path, PathBuf};

/// Shard file for part `part` inside the model directory.
pub fn shard_path(model_dir: &Path, part: u32) -> PathBuf {
    model_dir.join(format!("consolidated.0{part}.safetensors"))
}

/// Memory-map a shard file.
pub fn open_shard(path: &Path) -> Result<Mmap> {
    if !path.exists() {
        return Err(ConvertError::NotFound(path.to_path_buf()));
    }
    let file = std::fs::File::open(path)?;
    // SAFETY: the mapping is read-only and outlives every borrow of it.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

/// Deserialize a mapped shard.
pub fn deserialize<'d>(path: &Path, data: &'d [u8]) -> Result<SafeTensors<'d>> {
    SafeTensors::deserialize(data).map_err(|e| ConvertError::MalformedCheckpoint {
        name: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Tensor names of a shard in deterministic (lexicographic) emission order.
///
/// safetensors does not define a stable iteration order, so the converter
/// fixes one to keep the output byte-reproducible; the engine's loader looks
/// records up by name and does not care.
pub fn ordered_names(shard: &SafeTensors<'_>) -> Vec<String> {
    let mut names: Vec<String> = shard.names().into_iter().map(String::from).collect();
    names.sort();
    names
}

/// Convert one tensor's elements to `target` precision, little-endian packed.
///
/// Supported source dtypes are F32, F16, and BF16. The byte-by-byte chunking
/// avoids alignment assumptions about the mapped data.
pub fn convert_elements(name: &str, view: &TensorView<'_>, target: FloatType) -> Result<Vec<u8>> {
    let expected: usize = view.shape().iter().product();
    let bytes = match target {
        FloatType::F32 => {
            let values = to_f32(name, view)?;
            check_element_count(name, values.len(), expected)?;
            bytemuck::cast_slice::<f32, u8>(&values).to_vec()
        }
        FloatType::F16 => {
            let values = to_f16(name, view)?;
            check_element_count(name, values.len(), expected)?;
            bytemuck::cast_slice::<f16, u8>(&values).to_vec()
        }
    };
    Ok(bytes)
}

fn check_element_count(name: &str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(ConvertError::MalformedCheckpoint {
            name: name.to_string(),
            reason: format!("element count {got} does not match shape product {expected}"),
        });
    }
    Ok(())
}

fn unsupported_dtype(name: &str, dtype: Dtype) -> ConvertError {
    ConvertError::MalformedCheckpoint {
        name: name.to_string(),
        reason: format!("unsupported dtype {dtype:?}"),
    }
}

fn to_f32(name: &str, view: &TensorView<'_>) -> Result<Vec<f32>> {
    let data = view.data();
    Ok(match view.dtype() {
        Dtype::F32 => data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        Dtype::F16 => data
            .chunks_exact(2)
            .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        Dtype::BF16 => data
            .chunks_exact(2)
            .map(|c| bf16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        other => return Err(unsupported_dtype(name, other)),
    })
}

fn to_f16(name: &str, view: &TensorView<'_>) -> Result<Vec<f16>> {
    let data = view.data();
    Ok(match view.dtype() {
        Dtype::F32 => data
            .chunks_exact(4)
            .map(|c| f16::from_f32(f32::from_le_bytes([c[0], c[1], c[2], c[3]])))
            .collect(),
        Dtype::F16 => data.chunks_exact(2).map(|c| f16::from_le_bytes([c[0], c[1]])).collect(),
        Dtype::BF16 => data
            .chunks_exact(2)
            .map(|c| f16::from_f32(bf16::from_le_bytes([c[0], c[1]]).to_f32()))
            .collect(),
        other => return Err(unsupported_dtype(name, other)),
    })
}
