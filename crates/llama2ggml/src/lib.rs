//! LLaMA checkpoint to GGML converter.
//!
//! Reads a model directory (hyperparameter sidecar plus one safetensors
//! shard per part) and a SentencePiece vocabulary, and serializes them into
//! the flat binary GGML files the native inference engine loads. The byte
//! layout itself lives in the `ggml-format` crate; this crate supplies the
//! input handling and the conversion policy:
//!
//! - a fixed part-count table keyed on the embedding dimension,
//! - the three-way token variant encoding of the vocabulary,
//! - tensor squeezing, rotary-frequency exclusion, and 1-D f32 pinning,
//! - all-parts output with numeric suffixes beyond the first,
//! - partial-output cleanup and cooperative cancellation between records.
//!
//! Quantization of the produced files is a separate downstream step and is
//! not performed here.

pub mod checkpoint;
pub mod convert;
pub mod error;
pub mod hparams;
pub mod test_utils;
pub mod vocab;
pub mod writer;

pub use convert::{convert, convert_with, CancelToken, ConvertOptions};
pub use error::{ConvertError, Result};
pub use hparams::{part_count_for_dim, Hparams};
pub use vocab::{decode_byte_piece, SpmVocab, TokenVariant, VocabSource};
pub use writer::GgmlModelWriter;
