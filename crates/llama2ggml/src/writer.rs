//! GGML model writer.
//!
//! Streams the header, the vocabulary, and the tensor records of one model
//! part into any `Write` sink, applying the format's tensor policy: rotary
//! frequency tensors are skipped, degenerate axes are squeezed away, and
//! one-dimensional tensors are pinned to f32.

use crate::checkpoint;
use crate::error::Result;
use crate::hparams::Hparams;
use crate::vocab::VocabSource;
use ggml_format::{FloatType, TensorHeader};
use safetensors::tensor::TensorView;
use std::io::Write;

/// Suffix of precomputed rotary-embedding tensors; the engine rebuilds them
/// at load time, so they are never persisted.
const ROPE_FREQS_SUFFIX: &str = "freqs";

/// Returns `true` for tensors excluded from the output.
pub fn is_rope_freqs(name: &str) -> bool {
    name.ends_with(ROPE_FREQS_SUFFIX)
}

/// Drop degenerate (size-1) axes before recording dimensionality.
///
/// A tensor whose axes are all degenerate squeezes to zero dimensions.
pub fn squeeze(shape: &[usize]) -> Vec<i32> {
    shape.iter().filter(|&&d| d != 1).map(|&d| d as i32).collect()
}

/// Per-tensor output precision.
///
/// One-dimensional tensors (bias and norm vectors) always stay f32 for
/// numeric stability; only multi-dimensional tensors honor the requested
/// precision.
pub fn resolve_tensor_ftype(n_dims: usize, requested: FloatType) -> FloatType {
    if n_dims == 1 { FloatType::F32 } else { requested }
}

/// Streaming writer for one GGML model part.
pub struct GgmlModelWriter<W: Write> {
    out: W,
    ftype: FloatType,
    tensors_written: usize,
}

impl<W: Write> GgmlModelWriter<W> {
    pub fn new(out: W, ftype: FloatType) -> Self {
        Self { out, ftype, tensors_written: 0 }
    }

    /// Number of tensor records emitted so far.
    pub fn tensors_written(&self) -> usize {
        self.tensors_written
    }

    /// Write the fixed header.
    pub fn write_header(&mut self, hparams: &Hparams, vocab_size: i32) -> Result<()> {
        hparams.to_header(vocab_size, self.ftype).write_to(&mut self.out)?;
        Ok(())
    }

    /// Write exactly `vocab.vocab_size()` entries in ascending id order.
    pub fn write_vocab(&mut self, vocab: &dyn VocabSource) -> Result<()> {
        for id in 0..vocab.vocab_size() as u32 {
            vocab.variant(id)?.to_entry().write_to(&mut self.out)?;
        }
        Ok(())
    }

    /// Write one checkpoint tensor, applying the tensor policy.
    ///
    /// Returns the resolved precision, or `None` if the tensor was skipped.
    pub fn write_checkpoint_tensor(
        &mut self,
        name: &str,
        view: &TensorView<'_>,
    ) -> Result<Option<FloatType>> {
        if is_rope_freqs(name) {
            tracing::debug!(tensor = name, "skipping precomputed rotary frequencies");
            return Ok(None);
        }

        let dims = squeeze(view.shape());
        let resolved = resolve_tensor_ftype(dims.len(), self.ftype);
        tracing::debug!(
            tensor = name,
            shape = ?view.shape(),
            ftype = resolved.tag(),
            "writing tensor"
        );

        let data = checkpoint::convert_elements(name, view, resolved)?;
        self.write_tensor_record(name, dims, resolved, &data)?;
        Ok(Some(resolved))
    }

    /// Write a fully resolved tensor record: header, then row-major data.
    pub fn write_tensor_record(
        &mut self,
        name: &str,
        dims: Vec<i32>,
        tensor_ftype: FloatType,
        data: &[u8],
    ) -> Result<()> {
        let header = TensorHeader { name: name.to_string(), dims, ftype: tensor_ftype };
        debug_assert_eq!(data.len() as u64, header.data_len());
        header.write_to(&mut self.out)?;
        self.out.write_all(data)?;
        self.tensors_written += 1;
        Ok(())
    }

    /// Flush the underlying sink.
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}
