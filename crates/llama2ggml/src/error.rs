//! Conversion error taxonomy.
//!
//! Every variant is fatal for the part being written; none is retried
//! internally. The driver guarantees the partial output file of the failing
//! part is removed before the error propagates.

use ggml_format::GgmlError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Bad precision flag, inconsistent hyperparameters, or an unreadable
    /// sidecar file.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The embedding dimension has no entry in the part-count table.
    #[error("unsupported embedding dim {dim} (expected one of 4096, 5120, 6656, 8192)")]
    UnsupportedShape { dim: i32 },

    /// A required input file is missing.
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A byte-token piece whose escaped form is not exactly six characters.
    #[error("malformed vocabulary: token {id} has byte piece {piece:?} (expected a 6-character <0xXX> form)")]
    MalformedVocabulary { id: u32, piece: String },

    /// The tokenizer model file itself could not be decoded.
    #[error("malformed tokenizer model: {0}")]
    MalformedTokenizer(String),

    /// A checkpoint shard or one of its tensors could not be used.
    #[error("malformed checkpoint tensor {name:?}: {reason}")]
    MalformedCheckpoint { name: String, reason: String },

    /// Cooperative cancellation was requested between records.
    #[error("conversion cancelled")]
    Cancelled,

    #[error(transparent)]
    Format(#[from] GgmlError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ConvertError>;
