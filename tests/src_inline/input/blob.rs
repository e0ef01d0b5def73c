use ndarray::array;

use super::*;
use crate::model::candidate::{Pseudotime, Segment};

fn sample_matrix() -> ExpressionMatrix {
    ExpressionMatrix::new(
        vec!["g1".into(), "g2".into()],
        vec!["c1".into(), "c2".into()],
        array![[0.0, f64::NAN], [-0.0, 1.5e-300]],
    )
    .unwrap()
}

fn sample_candidate() -> Candidate {
    Candidate::new(
        "umap_a".into(),
        vec!["c1".into(), "c2".into()],
        array![[0.0, 1.0], [2.0, f64::NAN]],
        Pseudotime {
            branches: vec!["b1".into()],
            values: array![[0.1], [f64::NAN]],
        },
        vec![Segment {
            x0: 0.0,
            y0: 0.0,
            x1: 1.0,
            y1: 1.0,
        }],
        Some(sample_matrix()),
    )
    .unwrap()
}

#[test]
fn test_blob_roundtrip_is_bit_exact() {
    let matrix = sample_matrix();
    let back: ExpressionMatrix = decode_blob(&encode_blob(&matrix).unwrap()).unwrap();
    assert_eq!(matrix, back);
    assert_eq!(back.values[[1, 0]].to_bits(), (-0.0f64).to_bits());

    let candidate = sample_candidate();
    let back: Candidate = decode_blob(&encode_blob(&candidate).unwrap()).unwrap();
    assert_eq!(candidate, back);
}

#[test]
fn test_blob_kind_mismatch() {
    let bytes = encode_blob(&sample_matrix()).unwrap();
    match decode_blob::<Candidate>(&bytes) {
        Err(InputError::Blob(msg)) => assert!(msg.contains("expected a candidate blob")),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn test_blob_detects_corruption() {
    let mut bytes = encode_blob(&sample_matrix()).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    assert!(matches!(
        decode_blob::<ExpressionMatrix>(&bytes),
        Err(InputError::Blob(_))
    ));

    let mut bad_magic = encode_blob(&sample_matrix()).unwrap();
    bad_magic[0] = b'X';
    assert!(matches!(
        decode_blob::<ExpressionMatrix>(&bad_magic),
        Err(InputError::Blob(_))
    ));

    let truncated = encode_blob(&sample_matrix()).unwrap();
    assert!(matches!(
        decode_blob::<ExpressionMatrix>(&truncated[..truncated.len() - 3]),
        Err(InputError::Blob(_))
    ));
    assert!(matches!(
        decode_blob::<ExpressionMatrix>(&truncated[..10]),
        Err(InputError::Blob(_))
    ));
}

#[test]
fn test_structure_blob_file_roundtrip() {
    let result = StructureCheckResult {
        if_connected: false,
        clusters: vec![1, 1, 2],
        k: 2,
        signal_pct: 0.61,
        cells: vec!["a".into(), "b".into(), "c".into()],
        dataset_fingerprint: 0xfeed,
    };
    let mut path = std::env::temp_dir();
    path.push(format!(
        "kira_trajectoryqc_blob_{}/nested/stage1.ktq",
        std::process::id()
    ));
    write_blob(&path, &result).unwrap();
    let back: StructureCheckResult = read_blob(&path).unwrap();
    assert_eq!(result, back);
}

#[test]
fn test_decoded_payload_is_validated() {
    let bad = StructureCheckResult {
        if_connected: true,
        clusters: vec![1, 2],
        k: 2,
        signal_pct: 0.5,
        cells: vec!["a".into(), "b".into()],
        dataset_fingerprint: 1,
    };
    let bytes = encode_blob(&bad).unwrap();
    assert!(matches!(
        decode_blob::<StructureCheckResult>(&bytes),
        Err(InputError::Model { .. })
    ));
}
