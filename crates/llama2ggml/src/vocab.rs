//! Subword vocabulary sources.
//!
//! The writer only needs a narrow capability surface from the tokenizer:
//! its size and, per token id, which of four variants the token is. The
//! variant is resolved once per id into [`TokenVariant`] instead of being
//! re-derived through sequential boolean queries.
//!
//! [`SpmVocab`] is the concrete source: it decodes the piece table straight
//! out of a serialized SentencePiece `ModelProto` (field 1 holds the pieces;
//! each piece carries its text in field 1 and its type in field 3), walking
//! the protobuf wire format by hand the same way the GGML records themselves
//! are walked.

use crate::error::{ConvertError, Result};
use ggml_format::{VocabEntry, WORD_BOUNDARY_MARKER};
use std::path::Path;

/// One token, resolved to exactly one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenVariant {
    /// The unknown-token placeholder; serialized as fixed replacement text.
    Unknown,
    /// Control tokens such as `<s>`/`</s>`; serialized as a zero-length entry.
    Control,
    /// A raw byte token decoded from its `<0xXX>` escaped form.
    Byte(u8),
    /// Normal text with the word-boundary marker already remapped to a space.
    Normal(String),
}

impl TokenVariant {
    /// The wire-level vocabulary entry for this variant.
    pub fn to_entry(&self) -> VocabEntry {
        match self {
            Self::Unknown => VocabEntry::Unknown,
            Self::Control => VocabEntry::Control,
            Self::Byte(b) => VocabEntry::Byte(*b),
            Self::Normal(text) => VocabEntry::Normal(text.clone()),
        }
    }
}

/// Capability surface the writer requires from a tokenizer model.
pub trait VocabSource {
    fn vocab_size(&self) -> usize;

    /// Resolve the variant for `id`; ids are queried in ascending order,
    /// `0..vocab_size`.
    fn variant(&self, id: u32) -> Result<TokenVariant>;
}

/// Decode the escaped byte-token form `<0xXX>`.
///
/// The form must be exactly six characters; anything else aborts the whole
/// conversion rather than producing a file with a wrong byte table.
pub fn decode_byte_piece(id: u32, piece: &str) -> Result<u8> {
    let chars: Vec<char> = piece.chars().collect();
    if chars.len() != 6 {
        return Err(ConvertError::MalformedVocabulary { id, piece: piece.to_string() });
    }
    let hex: String = chars[3..5].iter().collect();
    u8::from_str_radix(&hex, 16)
        .map_err(|_| ConvertError::MalformedVocabulary { id, piece: piece.to_string() })
}

// ---------------------------------------------------------------------------
// SentencePiece model
// ---------------------------------------------------------------------------

/// Piece type discriminants from the SentencePiece `ModelProto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PieceKind {
    Normal,
    Unknown,
    Control,
    UserDefined,
    Unused,
    Byte,
}

impl PieceKind {
    fn from_raw(v: u64) -> Option<Self> {
        match v {
            1 => Some(Self::Normal),
            2 => Some(Self::Unknown),
            3 => Some(Self::Control),
            4 => Some(Self::UserDefined),
            5 => Some(Self::Unused),
            6 => Some(Self::Byte),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct SpmPiece {
    text: String,
    kind: PieceKind,
}

/// Vocabulary backed by a serialized SentencePiece model file.
#[derive(Debug)]
pub struct SpmVocab {
    pieces: Vec<SpmPiece>,
}

impl SpmVocab {
    /// Load and decode `tokenizer.model`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConvertError::NotFound(path.to_path_buf()));
        }
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }

    /// Decode a serialized `ModelProto`.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let pieces = parse_model_proto(data)?;
        if pieces.is_empty() {
            return Err(ConvertError::MalformedTokenizer("model contains no pieces".into()));
        }
        Ok(Self { pieces })
    }
}

impl VocabSource for SpmVocab {
    fn vocab_size(&self) -> usize {
        self.pieces.len()
    }

    fn variant(&self, id: u32) -> Result<TokenVariant> {
        let piece = self.pieces.get(id as usize).ok_or_else(|| {
            ConvertError::MalformedTokenizer(format!(
                "token id {id} out of range (vocab size {})",
                self.pieces.len()
            ))
        })?;
        Ok(match piece.kind {
            PieceKind::Unknown => TokenVariant::Unknown,
            PieceKind::Control => TokenVariant::Control,
            PieceKind::Byte => TokenVariant::Byte(decode_byte_piece(id, &piece.text)?),
            PieceKind::Normal | PieceKind::UserDefined | PieceKind::Unused => {
                TokenVariant::Normal(piece.text.replace(WORD_BOUNDARY_MARKER, " "))
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Minimal protobuf wire walking
// ---------------------------------------------------------------------------

fn malformed(what: &str) -> ConvertError {
    ConvertError::MalformedTokenizer(what.to_string())
}

fn read_varint(data: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = *data.get(*pos).ok_or_else(|| malformed("truncated varint"))?;
        *pos += 1;
        let chunk = u64::from(byte & 0x7f);
        if shift >= 64 || (shift == 63 && chunk > 1) {
            return Err(malformed("varint overflow"));
        }
        value |= chunk << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

fn read_len_delimited<'a>(data: &'a [u8], pos: &mut usize) -> Result<&'a [u8]> {
    let len = read_varint(data, pos)? as usize;
    let end = pos.checked_add(len).ok_or_else(|| malformed("length overflow"))?;
    if end > data.len() {
        return Err(malformed("truncated field"));
    }
    let slice = &data[*pos..end];
    *pos = end;
    Ok(slice)
}

fn skip_field(data: &[u8], pos: &mut usize, wire_type: u64) -> Result<()> {
    match wire_type {
        0 => {
            read_varint(data, pos)?;
        }
        1 => {
            *pos = pos.checked_add(8).filter(|&e| e <= data.len()).ok_or_else(|| {
                malformed("truncated 64-bit field")
            })?;
        }
        2 => {
            read_len_delimited(data, pos)?;
        }
        5 => {
            *pos = pos.checked_add(4).filter(|&e| e <= data.len()).ok_or_else(|| {
                malformed("truncated 32-bit field")
            })?;
        }
        _ => return Err(malformed("unsupported wire type")),
    }
    Ok(())
}

fn parse_model_proto(data: &[u8]) -> Result<Vec<SpmPiece>> {
    let mut pieces = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let key = read_varint(data, &mut pos)?;
        let (field, wire_type) = (key >> 3, key & 7);
        if field == 1 && wire_type == 2 {
            let body = read_len_delimited(data, &mut pos)?;
            pieces.push(parse_piece(body)?);
        } else {
            skip_field(data, &mut pos, wire_type)?;
        }
    }
    Ok(pieces)
}

fn parse_piece(data: &[u8]) -> Result<SpmPiece> {
    let mut text = String::new();
    // Type defaults to NORMAL when the field is absent.
    let mut kind = PieceKind::Normal;
    let mut pos = 0;
    while pos < data.len() {
        let key = read_varint(data, &mut pos)?;
        let (field, wire_type) = (key >> 3, key & 7);
        match (field, wire_type) {
            (1, 2) => {
                let bytes = read_len_delimited(data, &mut pos)?;
                text = std::str::from_utf8(bytes)
                    .map_err(|_| malformed("piece text is not UTF-8"))?
                    .to_string();
            }
            (3, 0) => {
                let raw = read_varint(data, &mut pos)?;
                kind = PieceKind::from_raw(raw)
                    .ok_or_else(|| malformed("unknown piece type"))?;
            }
            (_, wt) => skip_field(data, &mut pos, wt)?,
        }
    }
    Ok(SpmPiece { text, kind })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
