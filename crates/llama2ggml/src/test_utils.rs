//! Fixture builders shared by unit and integration tests.
//!
//! Hand-encodes the two input formats the converter consumes: a serialized
//! SentencePiece `ModelProto` and a safetensors checkpoint shard. Building
//! the bytes manually keeps the fixtures independent of any encoder and
//! documents the wire layout the parsers are tested against.

/// One vocabulary piece for [`spm_model_proto`].
pub struct SpmTestPiece {
    pub text: String,
    /// Raw `ModelProto` piece-type discriminant.
    pub kind: u64,
}

impl SpmTestPiece {
    pub fn normal(text: &str) -> Self {
        Self { text: text.into(), kind: 1 }
    }

    pub fn unknown(text: &str) -> Self {
        Self { text: text.into(), kind: 2 }
    }

    pub fn control(text: &str) -> Self {
        Self { text: text.into(), kind: 3 }
    }

    pub fn byte(text: &str) -> Self {
        Self { text: text.into(), kind: 6 }
    }
}

fn push_varint(buf: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Serialize a minimal SentencePiece `ModelProto` holding `pieces` in order.
pub fn spm_model_proto(pieces: &[SpmTestPiece]) -> Vec<u8> {
    let mut proto = Vec::new();
    for piece in pieces {
        let mut body = Vec::new();
        // field 1: piece text
        body.push(0x0a);
        push_varint(&mut body, piece.text.len() as u64);
        body.extend_from_slice(piece.text.as_bytes());
        // field 2: score (fixed32 float)
        body.push(0x15);
        body.extend_from_slice(&0.0f32.to_le_bytes());
        // field 3: piece type
        body.push(0x18);
        push_varint(&mut body, piece.kind);

        // ModelProto field 1: one SentencePiece message
        proto.push(0x0a);
        push_varint(&mut proto, body.len() as u64);
        proto.extend_from_slice(&body);
    }
    proto
}

/// One tensor for [`safetensors_buffer`].
pub struct ShardTestTensor {
    pub name: String,
    pub dtype: &'static str,
    pub shape: Vec<usize>,
    pub data: Vec<u8>,
}

impl ShardTestTensor {
    pub fn f32(name: &str, shape: &[usize], values: &[f32]) -> Self {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self { name: name.into(), dtype: "F32", shape: shape.to_vec(), data }
    }
}

/// Serialize a safetensors buffer: `u64` header length, JSON header, then
/// tensor data packed in declaration order.
pub fn safetensors_buffer(tensors: &[ShardTestTensor]) -> Vec<u8> {
    let mut entries = Vec::new();
    let mut offset = 0usize;
    for t in tensors {
        let shape =
            t.shape.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(",");
        let end = offset + t.data.len();
        entries.push(format!(
            r#""{}":{{"dtype":"{}","shape":[{}],"data_offsets":[{},{}]}}"#,
            t.name, t.dtype, shape, offset, end
        ));
        offset = end;
    }
    let header = format!("{{{}}}", entries.join(","));

    let mut buffer = Vec::new();
    buffer.extend_from_slice(&(header.len() as u64).to_le_bytes());
    buffer.extend_from_slice(header.as_bytes());
    for t in tensors {
        buffer.extend_from_slice(&t.data);
    }
    buffer
}
