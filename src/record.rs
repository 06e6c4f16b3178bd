//! `RagFile` — the in-memory record (component E). Immutable after
//! construction; the constructor never partially builds a record; any
//! invariant violation rejects with [`RagFileError::InvalidArgument`] before
//! any field is committed.

use crate::config::BuilderConfig;
use crate::error::{RagFileError, Result};
use crate::float16::f32_to_f16;
use crate::header::{DenseVector, Flags, RagFileHeader, CURRENT_VERSION};
use crate::minhash::{minhash_char, minhash_merge, minhash_tokens, minhash_word};
use crate::quantize::quantize_sign;
use crate::similarity::{self, ReduceMode};

/// The embedder's output: either a single pooled vector, or one vector per
/// chunk (an embeddings matrix). When a matrix is supplied, the header's
/// single `dense_vector` is taken from the first row (the pooled/representative
/// vector, per spec §3).
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingInput {
    Single(Vec<f32>),
    Matrix(Vec<Vec<f32>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RagFile {
    pub header: RagFileHeader,
    pub text: String,
    pub token_ids: Vec<u32>,
    /// Present only when the caller supplied an embeddings matrix (one
    /// vector per chunk). Always stored at full f32/f16 precision matching
    /// the header's dense-vector flag.
    pub embeddings: Option<Vec<Vec<f32>>>,
}

fn round_up_to_64(bits: usize) -> usize {
    bits.div_ceil(64) * 64
}

/// Sign-quantize `dense`, then pad the bit-packed result up to the next
/// multiple of 64 bits with zero tail bits.
fn scan_vector_for(dense: &[f32]) -> (u32, Vec<u8>) {
    let rounded_bits = round_up_to_64(dense.len());
    let mut packed = quantize_sign(dense);
    packed.resize(rounded_bits / 8, 0);
    (rounded_bits as u32, packed)
}

impl RagFile {
    /// Build a record from embedder outputs. Fails with
    /// [`RagFileError::InvalidArgument`] if any §3 invariant is violated.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        text: &str,
        token_ids: &[u32],
        embedding: EmbeddingInput,
        tokenizer_id: &str,
        embedding_id: &str,
        metadata_version: u16,
        extended_metadata: Option<Vec<u8>>,
        config: &BuilderConfig,
    ) -> Result<Self> {
        if text.is_empty() {
            return Err(RagFileError::InvalidArgument("text must not be empty".into()));
        }
        if token_ids.len() < 3 {
            return Err(RagFileError::InvalidArgument(format!(
                "token_ids must have at least 3 elements, got {}",
                token_ids.len()
            )));
        }

        let (dense_f32, embeddings_matrix): (Vec<f32>, Option<Vec<Vec<f32>>>) = match embedding {
            EmbeddingInput::Single(v) => {
                if v.is_empty() {
                    return Err(RagFileError::InvalidArgument(
                        "embedding must not be empty".into(),
                    ));
                }
                (v, None)
            }
            EmbeddingInput::Matrix(rows) => {
                if rows.is_empty() || rows[0].is_empty() {
                    return Err(RagFileError::InvalidArgument(
                        "embeddings matrix must have at least one non-empty row".into(),
                    ));
                }
                let cols = rows[0].len();
                if rows.iter().any(|r| r.len() != cols) {
                    return Err(RagFileError::InvalidArgument(
                        "all rows of the embeddings matrix must share the same width".into(),
                    ));
                }
                let pooled = rows[0].clone();
                (pooled, Some(rows))
            }
        };

        let dense_vector_dim = dense_f32.len() as u32;

        let minhash_params = &config.minhash;
        let sig_char = minhash_char(text, minhash_params.ngram_chars, minhash_params.permute, minhash_params.seed);
        let sig_word = minhash_word(text, minhash_params.ngram_words, minhash_params.permute, minhash_params.seed);
        let sig_tokens = minhash_tokens(token_ids, minhash_params.ngram_tokens, minhash_params.permute, minhash_params.seed);
        let minhash = minhash_merge(&minhash_merge(&sig_char, &sig_word)?, &sig_tokens)?;

        let (scan_vector_dim, scan_vector, has_scan_vector) = if config.scan_vector.enabled() {
            let (dim, packed) = scan_vector_for(&dense_f32);
            (dim, packed, true)
        } else {
            (0u32, Vec::new(), false)
        };

        let store_f16 = config.store_dense_as_f16;
        let dense_vector = if store_f16 {
            DenseVector::F16(dense_f32.iter().map(|&x| f32_to_f16(x)).collect())
        } else {
            DenseVector::F32(dense_f32.clone())
        };

        let embeddings = embeddings_matrix;

        let flags = Flags::new(store_f16, has_scan_vector, embeddings.is_some());

        let header = RagFileHeader {
            version: CURRENT_VERSION,
            flags,
            tokenizer_id: tokenizer_id.to_string(),
            embedding_id: embedding_id.to_string(),
            metadata_version,
            minhash_permute: minhash_params.permute,
            minhash,
            scan_vector_dim,
            scan_vector,
            dense_vector_dim,
            dense_vector,
            extended_metadata: extended_metadata.unwrap_or_default(),
        };

        header.validate()?;

        Ok(Self {
            header,
            text: text.to_string(),
            token_ids: token_ids.to_vec(),
            embeddings,
        })
    }

    /// Jaccard similarity of this record's MinHash signature against `other`'s.
    pub fn jaccard(&self, other: &RagFile) -> Result<f64> {
        similarity::jaccard(&self.header.minhash, &other.header.minhash)
    }

    /// Hamming similarity of this record's scan vector against `other`'s.
    pub fn hamming(&self, other: &RagFile) -> Result<f64> {
        if !self.header.flags.has_scan_vector() || !other.header.flags.has_scan_vector() {
            return Err(RagFileError::DimensionMismatch(
                "hamming: both records must carry a scan vector".into(),
            ));
        }
        if self.header.scan_vector_dim != other.header.scan_vector_dim {
            return Err(RagFileError::DimensionMismatch(format!(
                "hamming: scan_vector_dim differs ({} vs {})",
                self.header.scan_vector_dim, other.header.scan_vector_dim
            )));
        }
        if self.header.dense_vector_dim != other.header.dense_vector_dim {
            return Err(RagFileError::DimensionMismatch(format!(
                "hamming: dense_vector_dim differs ({} vs {})",
                self.header.dense_vector_dim, other.header.dense_vector_dim
            )));
        }
        similarity::hamming(&self.header.scan_vector, &other.header.scan_vector, self.header.dense_vector_dim)
    }

    /// Cosine similarity of this record's dense vector against `other`'s.
    /// When `other` carries an embeddings matrix, reduces over it with `mode`.
    pub fn cosine(&self, other: &RagFile, mode: ReduceMode) -> Result<f64> {
        let query = self.header.dense_vector.to_f32();
        if let Some(matrix) = &other.embeddings {
            similarity::cosine_matrix(&query, matrix, mode)
        } else {
            similarity::cosine(&query, &other.header.dense_vector.to_f32())
        }
    }
}
