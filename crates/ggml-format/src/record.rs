//! Vocabulary entries and tensor records.
//!
//! Both record kinds follow the same convention as the header: `i32`
//! little-endian scalars, then raw bytes. Vocabulary entries are a length
//! prefix plus payload; tensor records are a three-field header, the
//! dimension list in innermost-first order, the name bytes, then element
//! data at the record's own precision.

use crate::{read_i32_le, write_i32_le, FloatType, GgmlError, Result};
use std::io::{Read, Write};

/// Replacement text written for the unknown-token placeholder.
pub const UNKNOWN_TOKEN_TEXT: &str = " \u{2047} ";

/// SentencePiece word-boundary marker (LOWER ONE EIGHTH BLOCK); the producer
/// remaps it to an ASCII space before a normal token reaches the wire.
pub const WORD_BOUNDARY_MARKER: char = '\u{2581}';

// Sanity caps for the read path; a well-formed model never approaches them.
const MAX_TOKEN_LEN: i32 = 1024 * 1024; // 1 MiB
const MAX_NAME_LEN: i32 = 1024 * 1024; // 1 MiB
const MAX_DIMS: i32 = 8;

// ---------------------------------------------------------------------------
// Vocabulary entries
// ---------------------------------------------------------------------------

/// One vocabulary entry, resolved to its variant before serialization.
///
/// Exactly one variant applies per token id. `Control` serializes as a
/// zero-length entry, `Byte` as a single raw byte, `Unknown` as the fixed
/// replacement text, and `Normal` as its UTF-8 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VocabEntry {
    Unknown,
    Control,
    Byte(u8),
    Normal(String),
}

impl VocabEntry {
    /// Serialize as a length-prefixed payload.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        match self {
            Self::Unknown => {
                let text = UNKNOWN_TOKEN_TEXT.as_bytes();
                write_i32_le(w, text.len() as i32)?;
                w.write_all(text)?;
            }
            Self::Control => {
                write_i32_le(w, 0)?;
            }
            Self::Byte(b) => {
                write_i32_le(w, 1)?;
                w.write_all(&[*b])?;
            }
            Self::Normal(text) => {
                let bytes = text.as_bytes();
                write_i32_le(w, bytes.len() as i32)?;
                w.write_all(bytes)?;
            }
        }
        Ok(())
    }
}

/// A vocabulary entry as seen by a reader: the raw payload bytes.
///
/// The writer-side variants are not recoverable from the wire (a control
/// token and an empty normal token are indistinguishable), so the read path
/// stays structural.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawVocabEntry {
    pub payload: Vec<u8>,
}

impl RawVocabEntry {
    /// `true` for a zero-length (control-shaped) entry.
    pub fn is_control_shaped(&self) -> bool {
        self.payload.is_empty()
    }

    /// The byte value for a single-byte entry.
    pub fn as_byte(&self) -> Option<u8> {
        match self.payload[..] {
            [b] => Some(b),
            _ => None,
        }
    }
}

/// Read one length-prefixed vocabulary entry.
pub fn read_vocab_entry<R: Read>(r: &mut R) -> Result<RawVocabEntry> {
    let len = read_i32_le(r)?;
    if len < 0 {
        return Err(GgmlError::Malformed);
    }
    if len > MAX_TOKEN_LEN {
        return Err(GgmlError::StringTooLarge(len as u64));
    }
    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload)?;
    Ok(RawVocabEntry { payload })
}

// ---------------------------------------------------------------------------
// Tensor records
// ---------------------------------------------------------------------------

/// Header of one tensor record.
///
/// `dims` is held in logical (outermost-first) order; serialization reverses
/// it so the innermost axis is written first, and the read path reverses it
/// back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorHeader {
    pub name: String,
    pub dims: Vec<i32>,
    pub ftype: FloatType,
}

impl TensorHeader {
    /// Number of dimensions as stored on the wire.
    pub fn n_dims(&self) -> i32 {
        self.dims.len() as i32
    }

    /// Total element count across all dimensions.
    pub fn element_count(&self) -> u64 {
        self.dims.iter().map(|&d| d.max(0) as u64).product()
    }

    /// Byte length of the element data that follows this header.
    pub fn data_len(&self) -> u64 {
        self.element_count() * self.ftype.element_size() as u64
    }

    /// Serialize the record header (not the element data).
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let name = self.name.as_bytes();
        write_i32_le(w, self.n_dims())?;
        write_i32_le(w, name.len() as i32)?;
        write_i32_le(w, self.ftype as i32)?;
        // Innermost axis first.
        for &d in self.dims.iter().rev() {
            write_i32_le(w, d)?;
        }
        w.write_all(name)?;
        Ok(())
    }
}

/// Read one tensor record header, restoring logical dimension order.
pub fn read_tensor_header<R: Read>(r: &mut R) -> Result<TensorHeader> {
    let n_dims = read_i32_le(r)?;
    if !(0..=MAX_DIMS).contains(&n_dims) {
        return Err(GgmlError::Malformed);
    }
    let name_len = read_i32_le(r)?;
    if name_len < 0 {
        return Err(GgmlError::Malformed);
    }
    if name_len > MAX_NAME_LEN {
        return Err(GgmlError::StringTooLarge(name_len as u64));
    }
    let ftype = FloatType::try_from(read_i32_le(r)?)?;

    let mut dims = Vec::with_capacity(n_dims as usize);
    for _ in 0..n_dims {
        dims.push(read_i32_le(r)?);
    }
    dims.reverse();

    let mut name_buf = vec![0u8; name_len as usize];
    r.read_exact(&mut name_buf)?;
    let name = String::from_utf8(name_buf).map_err(|_| GgmlError::Malformed)?;

    Ok(TensorHeader { name, dims, ftype })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_entry_is_zero_length() {
        let mut data = Vec::new();
        VocabEntry::Control.write_to(&mut data).unwrap();
        assert_eq!(data, 0i32.to_le_bytes());

        let back = read_vocab_entry(&mut &data[..]).unwrap();
        assert!(back.is_control_shaped());
    }

    #[test]
    fn byte_entry_is_length_one() {
        let mut data = Vec::new();
        VocabEntry::Byte(0x41).write_to(&mut data).unwrap();
        assert_eq!(data.len(), 5);
        assert_eq!(data[0..4], 1i32.to_le_bytes());
        assert_eq!(data[4], 0x41);

        let back = read_vocab_entry(&mut &data[..]).unwrap();
        assert_eq!(back.as_byte(), Some(0x41));
    }

    #[test]
    fn unknown_entry_writes_replacement_text() {
        let mut data = Vec::new();
        VocabEntry::Unknown.write_to(&mut data).unwrap();

        let back = read_vocab_entry(&mut &data[..]).unwrap();
        assert_eq!(back.payload, UNKNOWN_TOKEN_TEXT.as_bytes());
        // " \u{2047} " is five bytes of UTF-8.
        assert_eq!(back.payload.len(), 5);
    }

    #[test]
    fn normal_entry_round_trips_utf8() {
        let mut data = Vec::new();
        VocabEntry::Normal("héllo".into()).write_to(&mut data).unwrap();

        let back = read_vocab_entry(&mut &data[..]).unwrap();
        assert_eq!(back.payload, "héllo".as_bytes());
    }

    #[test]
    fn vocab_entry_rejects_negative_length() {
        let mut data = Vec::new();
        data.extend_from_slice(&(-1i32).to_le_bytes());
        assert!(matches!(read_vocab_entry(&mut &data[..]), Err(GgmlError::Malformed)));
    }

    #[test]
    fn vocab_entry_rejects_oversized_length() {
        let mut data = Vec::new();
        data.extend_from_slice(&(i32::MAX).to_le_bytes());
        assert!(matches!(
            read_vocab_entry(&mut &data[..]),
            Err(GgmlError::StringTooLarge(_))
        ));
    }

    #[test]
    fn tensor_header_dims_are_reversed_on_wire() {
        let header = TensorHeader {
            name: "w".into(),
            dims: vec![512, 256],
            ftype: FloatType::F16,
        };
        let mut data = Vec::new();
        header.write_to(&mut data).unwrap();

        // n_dims, name_len, ftype, then dims innermost-first.
        let field = |i: usize| i32::from_le_bytes(data[i * 4..i * 4 + 4].try_into().unwrap());
        assert_eq!(field(0), 2);
        assert_eq!(field(1), 1);
        assert_eq!(field(2), 1);
        assert_eq!(field(3), 256); // innermost axis first
        assert_eq!(field(4), 512);
        assert_eq!(&data[20..], b"w");
    }

    #[test]
    fn tensor_header_round_trip_restores_logical_order() {
        let header = TensorHeader {
            name: "layers.0.attention.wq.weight".into(),
            dims: vec![4096, 4096],
            ftype: FloatType::F32,
        };
        let mut data = Vec::new();
        header.write_to(&mut data).unwrap();

        let back = read_tensor_header(&mut &data[..]).unwrap();
        assert_eq!(back, header);
    }

    #[test]
    fn tensor_header_zero_dims() {
        // A fully squeezed scalar records no dimensions at all.
        let header = TensorHeader { name: "s".into(), dims: vec![], ftype: FloatType::F16 };
        let mut data = Vec::new();
        header.write_to(&mut data).unwrap();

        let back = read_tensor_header(&mut &data[..]).unwrap();
        assert_eq!(back.n_dims(), 0);
        assert_eq!(back.element_count(), 1);
    }

    #[test]
    fn tensor_header_data_len() {
        let h32 = TensorHeader { name: "a".into(), dims: vec![4096], ftype: FloatType::F32 };
        assert_eq!(h32.data_len(), 4096 * 4);
        let h16 = TensorHeader { name: "a".into(), dims: vec![64, 32], ftype: FloatType::F16 };
        assert_eq!(h16.data_len(), 64 * 32 * 2);
    }

    #[test]
    fn tensor_header_rejects_excessive_dims() {
        let mut data = Vec::new();
        data.extend_from_slice(&9i32.to_le_bytes());
        data.extend_from_slice(&1i32.to_le_bytes());
        data.extend_from_slice(&0i32.to_le_bytes());
        assert!(matches!(read_tensor_header(&mut &data[..]), Err(GgmlError::Malformed)));
    }

    #[test]
    fn tensor_header_rejects_non_utf8_name() {
        let mut data = Vec::new();
        data.extend_from_slice(&0i32.to_le_bytes()); // n_dims
        data.extend_from_slice(&2i32.to_le_bytes()); // name_len
        data.extend_from_slice(&0i32.to_le_bytes()); // ftype
        data.extend_from_slice(&[0xff, 0xfe]);
        assert!(matches!(read_tensor_header(&mut &data[..]), Err(GgmlError::Malformed)));
    }

    // --- proptest -----------------------------------------------------------

    proptest::proptest! {
        #[test]
        fn tensor_header_always_round_trips(
            name in "[a-z0-9_.]{1,64}",
            dims in proptest::collection::vec(1i32..100_000, 0..4),
            ftype_raw in 0i32..=1,
        ) {
            let header = TensorHeader {
                name,
                dims,
                ftype: FloatType::from_i32(ftype_raw).unwrap(),
            };
            let mut data = Vec::new();
            header.write_to(&mut data).unwrap();
            let back = read_tensor_header(&mut &data[..]).unwrap();
            proptest::prop_assert_eq!(back, header);
        }

        #[test]
        fn read_tensor_header_never_panics(
            data in proptest::collection::vec(0u8..=255, 0..128)
        ) {
            let _ = read_tensor_header(&mut &data[..]);
        }
    }
}
