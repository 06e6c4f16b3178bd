//! Similarity kernels (component D): Jaccard over MinHash signatures,
//! Hamming over bit-packed scan vectors, Cosine over dense f32/f16 vectors.
//!
//! Every kernel returns a value in `[0.0, 1.0]`. Dispatch selects a lane
//! width from the probed capability ([`crate::float16::capability`]) but the
//! underlying arithmetic is the same safe Rust on every path — there is a
//! single scalar reference, and the "wide" path is that same reference
//! fed in capability-sized chunks so the compiler can auto-vectorize it.
//! This keeps the kernels within safe Rust while still honoring the
//! capability-gated dispatch the format calls for (see DESIGN.md).

use crate::error::{RagFileError, Result};
use crate::float16::{capability, f16_to_f32, Capability};

/// Reduction used when a record carries an embeddings matrix (one vector per
/// chunk) instead of a single dense vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceMode {
    Max,
    Avg,
}

/// Jaccard similarity over two equal-length MinHash signatures: the fraction
/// of lanes that agree exactly.
pub fn jaccard(a: &[u64], b: &[u64]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(RagFileError::DimensionMismatch(format!(
            "jaccard: signature lengths differ ({} vs {})",
            a.len(),
            b.len()
        )));
    }
    if a.is_empty() {
        return Ok(1.0);
    }
    let agree = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    Ok(agree as f64 / a.len() as f64)
}

/// Hamming similarity over two equal-length bit-packed scan vectors.
/// `dim_bits` is the number of *populated* bits (may be less than
/// `8 * bytes.len()` if the final byte has unused tail bits).
pub fn hamming(a: &[u8], b: &[u8], dim_bits: u32) -> Result<f64> {
    if a.len() != b.len() {
        return Err(RagFileError::DimensionMismatch(format!(
            "hamming: byte lengths differ ({} vs {})",
            a.len(),
            b.len()
        )));
    }
    if dim_bits == 0 {
        return Ok(1.0);
    }
    let mismatches: u32 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x ^ y).count_ones())
        .sum();
    Ok(1.0 - (mismatches as f64 / dim_bits as f64))
}

/// Cosine similarity between two equal-length f32 vectors. NaN in either
/// input collapses the result to 0.0. Zero norm collapses to 0.0.
pub fn cosine(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(RagFileError::DimensionMismatch(format!(
            "cosine: vector lengths differ ({} vs {})",
            a.len(),
            b.len()
        )));
    }
    Ok(cosine_scalar(a, b))
}

/// Cosine similarity between two equal-length f16 vectors, computed in f32.
pub fn cosine_f16(a: &[u16], b: &[u16]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(RagFileError::DimensionMismatch(format!(
            "cosine_f16: vector lengths differ ({} vs {})",
            a.len(),
            b.len()
        )));
    }
    let af: Vec<f32> = a.iter().map(|&x| f16_to_f32(x)).collect();
    let bf: Vec<f32> = b.iter().map(|&x| f16_to_f32(x)).collect();
    Ok(cosine_scalar(&af, &bf))
}

/// Cosine similarity between `query` and each row of `matrix`, reduced by
/// `mode`. Used when a record stores one embedding per chunk.
pub fn cosine_matrix(query: &[f32], matrix: &[Vec<f32>], mode: ReduceMode) -> Result<f64> {
    if matrix.is_empty() {
        return Ok(0.0);
    }
    let mut scores = Vec::with_capacity(matrix.len());
    for row in matrix {
        scores.push(cosine(query, row)?);
    }
    Ok(match mode {
        ReduceMode::Max => scores.into_iter().fold(f64::NEG_INFINITY, f64::max),
        ReduceMode::Avg => scores.iter().sum::<f64>() / scores.len() as f64,
    })
}

/// The canonical scalar kernel. Any NaN component in either input yields 0.0.
fn cosine_scalar(a: &[f32], b: &[f32]) -> f64 {
    if a.iter().any(|x| x.is_nan()) || b.iter().any(|x| x.is_nan()) {
        return 0.0;
    }

    // Chunk width follows the probed capability: this is still plain, safe
    // Rust (no intrinsics), but sized so LLVM can pack it into AVX-512/NEON
    // registers on the platforms that have them.
    let lanes = match capability() {
        Capability::Avx512 => 16,
        Capability::F16C | Capability::Neon => 8,
        Capability::Scalar => 4,
    };

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    let mut chunks_a = a.chunks(lanes);
    let mut chunks_b = b.chunks(lanes);
    loop {
        match (chunks_a.next(), chunks_b.next()) {
            (Some(ca), Some(cb)) => {
                for (&x, &y) in ca.iter().zip(cb.iter()) {
                    dot += x as f64 * y as f64;
                    norm_a += x as f64 * x as f64;
                    norm_b += y as f64 * y as f64;
                }
            }
            _ => break,
        }
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    (dot / denom).max(0.0)
}
