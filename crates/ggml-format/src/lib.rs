//! Lightweight GGML model file-format types and serializers.
//!
//! Provides the byte layout of the single-file GGML model snapshot consumed
//! by the native inference engine: magic validation, the fixed seven-field
//! hyperparameter header, length-prefixed vocabulary entries, and per-tensor
//! record headers with innermost-first dimension order.
//!
//! All integers are little-endian 32-bit signed values on the wire. The
//! layout is a hard compatibility surface; the write and read paths in this
//! crate are byte-exact inverses of each other.
//!
//! # Example
//!
//! ```no_run
//! use ggml_format::{check_magic, parse_header};
//! use std::fs;
//!
//! let data = fs::read("ggml-model-f16.bin").unwrap();
//! if check_magic(&data) {
//!     let header = parse_header(&data).unwrap();
//!     println!("{header:?}");
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::path::Path;
use thiserror::Error;

pub mod record;

pub use record::{
    RawVocabEntry, TensorHeader, VocabEntry, read_tensor_header, read_vocab_entry,
    UNKNOWN_TOKEN_TEXT, WORD_BOUNDARY_MARKER,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// The magic constant every GGML model file starts with ("ggml" in hex).
pub const GGML_MAGIC: i32 = 0x6767_6d6c;

/// Serialized header length: magic plus seven `i32` fields.
pub const GGML_HEADER_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned when reading or writing the GGML layout.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GgmlError {
    #[error("bad magic: {0:02x?}")]
    BadMagic([u8; 4]),
    #[error("invalid float type {0} (expected 0 for f32 or 1 for f16)")]
    InvalidFloatType(i32),
    #[error("short header: {0} bytes, need {GGML_HEADER_LEN}")]
    ShortHeader(usize),
    #[error("string too large: {0} bytes")]
    StringTooLarge(u64),
    #[error("malformed record")]
    Malformed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, GgmlError>;

// ---------------------------------------------------------------------------
// Float type
// ---------------------------------------------------------------------------

/// Element precision of stored tensor data.
///
/// Numeric values match the `ftype` discriminant in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum FloatType {
    F32 = 0,
    F16 = 1,
}

impl FloatType {
    /// Convert from the raw i32 discriminant in the file.
    pub const fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::F32),
            1 => Some(Self::F16),
            _ => None,
        }
    }

    /// Short tag used in output file names.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F16 => "f16",
        }
    }

    /// Size of one element in bytes.
    pub const fn element_size(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F16 => 2,
        }
    }
}

impl TryFrom<i32> for FloatType {
    type Error = GgmlError;

    fn try_from(v: i32) -> Result<Self> {
        Self::from_i32(v).ok_or(GgmlError::InvalidFloatType(v))
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// The fixed-layout GGML model header.
///
/// Wire order after the magic: `vocab_size`, `dim`, `multiple_of`,
/// `n_heads`, `n_layers`, `rot`, `ftype`. `rot` is the derived rotary
/// dimension `dim / n_heads`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GgmlHeader {
    pub vocab_size: i32,
    pub dim: i32,
    pub multiple_of: i32,
    pub n_heads: i32,
    pub n_layers: i32,
    pub rot: i32,
    pub ftype: FloatType,
}

impl GgmlHeader {
    /// Serialize the header, magic first, to `w`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_i32_le(w, GGML_MAGIC)?;
        write_i32_le(w, self.vocab_size)?;
        write_i32_le(w, self.dim)?;
        write_i32_le(w, self.multiple_of)?;
        write_i32_le(w, self.n_heads)?;
        write_i32_le(w, self.n_layers)?;
        write_i32_le(w, self.rot)?;
        write_i32_le(w, self.ftype as i32)?;
        Ok(())
    }

    /// Read a header, validating magic and float type.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let magic = read_i32_le(r)?;
        if magic != GGML_MAGIC {
            return Err(GgmlError::BadMagic(magic.to_le_bytes()));
        }
        let vocab_size = read_i32_le(r)?;
        let dim = read_i32_le(r)?;
        let multiple_of = read_i32_le(r)?;
        let n_heads = read_i32_le(r)?;
        let n_layers = read_i32_le(r)?;
        let rot = read_i32_le(r)?;
        let ftype = FloatType::try_from(read_i32_le(r)?)?;
        Ok(Self { vocab_size, dim, multiple_of, n_heads, n_layers, rot, ftype })
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Returns `true` if `data` starts with the GGML magic bytes.
#[inline]
pub fn check_magic(data: &[u8]) -> bool {
    data.get(0..4) == Some(&GGML_MAGIC.to_le_bytes()[..])
}

/// Parse only the fixed header without reading vocabulary or tensors.
///
/// Never panics, regardless of the input bytes.
pub fn parse_header(data: &[u8]) -> Result<GgmlHeader> {
    if data.len() < GGML_HEADER_LEN {
        return Err(GgmlError::ShortHeader(data.len()));
    }
    GgmlHeader::read_from(&mut &data[..])
}

/// Memory-map a GGML model file and parse its header.
///
/// The mapping is released when the call returns.
pub fn probe(path: &Path) -> Result<GgmlHeader> {
    let file = std::fs::File::open(path)?;
    // SAFETY: we do not mutate the mapping and the file is opened read-only.
    let mmap = unsafe { memmap2::Mmap::map(&file) }?;
    parse_header(&mmap[..])
}

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

#[inline]
pub(crate) fn read_i32_le<R: Read>(r: &mut R) -> Result<i32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(i32::from_le_bytes(b))
}

#[inline]
pub(crate) fn write_i32_le<W: Write>(w: &mut W, v: i32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
