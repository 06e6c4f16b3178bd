use ragfile::config::BuilderConfig;
use ragfile::error::RagFileError;
use ragfile::record::EmbeddingInput;
use ragfile::scan::{match_top_k, ScanMethod};
use ragfile::{io, RagFile};

fn cfg() -> BuilderConfig {
    BuilderConfig::default()
}

#[test]
fn round_trip_preserves_embedding_within_f16_tolerance() {
    let record = RagFile::new(
        "Sample text",
        &[1, 2, 3, 4],
        EmbeddingInput::Single(vec![0.1, 0.2, 0.3, 0.4]),
        "some-huggingface/tokenizer_id",
        "some/embedding_id_str",
        1,
        None,
        &cfg(),
    )
    .expect("build record");

    let bytes = io::dumps(&record).expect("serialize record");
    let loaded = io::loads(&bytes).expect("deserialize record");

    let original = record.header.dense_vector.to_f32();
    let round_tripped = loaded.header.dense_vector.to_f32();
    for (a, b) in original.iter().zip(round_tripped.iter()) {
        assert!((a - b).abs() < 1e-3, "expected {a} ~= {b} within f16 tolerance");
    }
}

#[test]
fn self_similarity_is_one_across_all_three_kernels() {
    let record = RagFile::new(
        "Sample text",
        &[1, 2, 3, 4],
        EmbeddingInput::Single(vec![0.1, 0.2, 0.3, 0.4]),
        "tok",
        "emb",
        1,
        None,
        &cfg(),
    )
    .expect("build record");

    let bytes = io::dumps(&record).expect("serialize record");
    let reloaded = io::loads(&bytes).expect("deserialize record");

    assert_eq!(record.jaccard(&reloaded).expect("jaccard"), 1.0);
    assert_eq!(record.hamming(&reloaded).expect("hamming"), 1.0);
    assert_eq!(
        record.cosine(&reloaded, ragfile::similarity::ReduceMode::Max).expect("cosine"),
        1.0
    );
}

#[test]
fn top_k_scan_returns_at_most_top_k_sorted_descending() {
    let dir = tempfile::tempdir().expect("tempdir");

    let query = RagFile::new(
        "query document",
        &[1, 2, 3, 4],
        EmbeddingInput::Single(vec![1.0, 0.0, 0.0]),
        "tok",
        "emb",
        1,
        None,
        &cfg(),
    )
    .expect("build query");

    let mut paths = Vec::new();
    for (name, dense) in [("a.rag", vec![1.0, 0.0, 0.0]), ("b.rag", vec![0.0, 1.0, 0.0])] {
        let candidate = RagFile::new(
            "candidate document",
            &[1, 2, 3, 4],
            EmbeddingInput::Single(dense),
            "tok",
            "emb",
            1,
            None,
            &cfg(),
        )
        .expect("build candidate");
        let path = dir.path().join(name);
        std::fs::write(&path, io::dumps(&candidate).expect("serialize candidate")).expect("write candidate");
        paths.push(Ok(path.to_string_lossy().into_owned()));
    }

    let matches = match_top_k(&query, paths.into_iter(), 2, ScanMethod::Cosine, || false).expect("scan");

    assert!(matches.len() <= 2);
    for window in matches.windows(2) {
        assert!(window[0].score >= window[1].score, "results must be sorted descending");
    }
}

#[test]
fn metadata_round_trip_preserves_hash_and_chunk_number() {
    use ragfile::metadata::MetadataV1;
    use sha2::{Digest, Sha256};

    let source_text = "The quick brown fox jumps over the lazy dog.";
    let metadata = MetadataV1::build("dataset", "row-7", "source.txt", source_text, 3, &[1, 2], 1_700_000_000)
        .expect("build metadata");

    let bytes = metadata.serialize().expect("serialize metadata");
    let reloaded = MetadataV1::deserialize(&bytes).expect("deserialize metadata");

    let expected_hash = format!("{:x}", Sha256::digest(source_text.as_bytes()));
    assert_eq!(reloaded.sourcefile_hash, expected_hash[..64]);
    assert_eq!(reloaded.chunk_number, 3);
}

#[test]
fn short_token_ids_reject_with_invalid_argument() {
    let err = RagFile::new(
        "text",
        &[1, 2],
        EmbeddingInput::Single(vec![0.1, 0.2]),
        "tok",
        "emb",
        1,
        None,
        &cfg(),
    )
    .expect_err("fewer than 3 token_ids must be rejected");
    assert!(matches!(err, RagFileError::InvalidArgument(_)));
}

#[test]
fn wrong_magic_rejects_with_magic_mismatch() {
    let record = RagFile::new(
        "text",
        &[1, 2, 3],
        EmbeddingInput::Single(vec![0.1, 0.2]),
        "tok",
        "emb",
        1,
        None,
        &cfg(),
    )
    .expect("build record");
    let mut bytes = io::dumps(&record).expect("serialize record");
    bytes[0] = b'X';

    let err = io::loads(&bytes).expect_err("corrupted magic must be rejected");
    assert!(matches!(err, RagFileError::MagicMismatch { .. }));
}
