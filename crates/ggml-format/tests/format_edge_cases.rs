//! Edge-case tests for ggml-format: assembling and walking a complete
//! header + vocabulary + tensor-record stream.

use ggml_format::{
    check_magic, parse_header, read_tensor_header, read_vocab_entry, FloatType, GgmlHeader,
    TensorHeader, VocabEntry, GGML_HEADER_LEN,
};

fn tiny_header() -> GgmlHeader {
    GgmlHeader {
        vocab_size: 3,
        dim: 4096,
        multiple_of: 256,
        n_heads: 32,
        n_layers: 1,
        rot: 128,
        ftype: FloatType::F16,
    }
}

#[test]
fn full_stream_walks_back_exactly() {
    let mut data = Vec::new();
    tiny_header().write_to(&mut data).unwrap();

    VocabEntry::Unknown.write_to(&mut data).unwrap();
    VocabEntry::Control.write_to(&mut data).unwrap();
    VocabEntry::Normal("the".into()).write_to(&mut data).unwrap();

    let tensor = TensorHeader { name: "norm.weight".into(), dims: vec![8], ftype: FloatType::F32 };
    tensor.write_to(&mut data).unwrap();
    data.extend(std::iter::repeat(0u8).take(8 * 4));

    assert!(check_magic(&data));
    let header = parse_header(&data).unwrap();
    assert_eq!(header, tiny_header());

    let mut r = &data[GGML_HEADER_LEN..];
    for _ in 0..header.vocab_size {
        read_vocab_entry(&mut r).unwrap();
    }
    let back = read_tensor_header(&mut r).unwrap();
    assert_eq!(back, tensor);
    assert_eq!(r.len() as u64, back.data_len());
}

#[test]
fn vocab_entries_preserve_id_order() {
    let entries = vec![
        VocabEntry::Unknown,
        VocabEntry::Control,
        VocabEntry::Byte(0x0a),
        VocabEntry::Normal("hello".into()),
        VocabEntry::Normal(" world".into()),
    ];
    let mut data = Vec::new();
    for e in &entries {
        e.write_to(&mut data).unwrap();
    }

    let mut r = &data[..];
    let raw: Vec<_> = (0..entries.len()).map(|_| read_vocab_entry(&mut r).unwrap()).collect();
    assert!(r.is_empty());
    assert_eq!(raw.len(), entries.len());
    assert_eq!(raw[1].payload.len(), 0);
    assert_eq!(raw[2].as_byte(), Some(0x0a));
    assert_eq!(raw[3].payload, b"hello");
}

#[test]
fn truncated_tensor_header_is_an_error() {
    let tensor = TensorHeader {
        name: "layers.0.feed_forward.w1.weight".into(),
        dims: vec![11008, 4096],
        ftype: FloatType::F16,
    };
    let mut data = Vec::new();
    tensor.write_to(&mut data).unwrap();

    for cut in [1, 4, 12, data.len() - 1] {
        assert!(read_tensor_header(&mut &data[..cut]).is_err(), "cut at {cut} must fail");
    }
}
