//! MinHash signature construction over character, word, and token-id n-grams
//! (component B). Deterministic given `(content, ngram, permute, seed)`;
//! merge is elementwise min, associative, commutative, and idempotent.

use crate::error::{RagFileError, Result};

/// Fixed odd constant used to derive independent hash lanes from a single
/// base hash. Must be odd so `seed + i * ODD_C` visits distinct residues.
const ODD_C: u64 = 0x9E37_79B9_7F4A_7C15;

/// Single-byte separator used when concatenating variable-length shingle
/// elements (char runs, words). Chosen as NUL, which terminates the zero-padded
/// string fields elsewhere in this format and is vanishingly rare in prose.
const SEPARATOR: u8 = 0x00;

/// FNV-1a 64-bit — the base hash `h(g)` of a shingle.
fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01B3;
    let mut hash = OFFSET;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// High-quality 64-bit finalizer (MurmurHash3-style xorshift-multiply mix).
fn mix(mut x: u64) -> u64 {
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^= x >> 33;
    x
}

/// Derive the `i`-th lane hash from a shingle's base hash and the signature seed.
fn lane_hash(base: u64, seed: u64, i: u16) -> u64 {
    let perturbed = seed.wrapping_add((i as u64).wrapping_mul(ODD_C));
    mix(base ^ perturbed)
}

/// Fold one shingle's base hash into the running per-lane minima.
fn update_signature(sig: &mut [u64], base: u64, seed: u64) {
    for (i, slot) in sig.iter_mut().enumerate() {
        let h = lane_hash(base, seed, i as u16);
        if h < *slot {
            *slot = h;
        }
    }
}

fn new_signature(permute: u16) -> Vec<u64> {
    vec![u64::MAX; permute as usize]
}

/// MinHash signature over character n-grams (shingles of `ngram` consecutive
/// Unicode scalar values, joined by [`SEPARATOR`]).
pub fn minhash_char(text: &str, ngram: usize, permute: u16, seed: u64) -> Vec<u64> {
    let mut sig = new_signature(permute);
    let chars: Vec<char> = text.chars().collect();
    if ngram == 0 || chars.len() < ngram {
        return sig;
    }
    let mut buf = Vec::new();
    for window in chars.windows(ngram) {
        buf.clear();
        for (i, c) in window.iter().enumerate() {
            if i > 0 {
                buf.push(SEPARATOR);
            }
            let mut tmp = [0u8; 4];
            buf.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
        }
        let base = fnv1a_64(&buf);
        update_signature(&mut sig, base, seed);
    }
    sig
}

/// MinHash signature over word n-grams. A word is a maximal run of
/// non-whitespace characters.
pub fn minhash_word(text: &str, ngram: usize, permute: u16, seed: u64) -> Vec<u64> {
    let mut sig = new_signature(permute);
    let words: Vec<&str> = text.split_whitespace().collect();
    if ngram == 0 || words.len() < ngram {
        return sig;
    }
    let mut buf = Vec::new();
    for window in words.windows(ngram) {
        buf.clear();
        for (i, w) in window.iter().enumerate() {
            if i > 0 {
                buf.push(SEPARATOR);
            }
            buf.extend_from_slice(w.as_bytes());
        }
        let base = fnv1a_64(&buf);
        update_signature(&mut sig, base, seed);
    }
    sig
}

/// MinHash signature over token-id n-grams. Each token id is encoded as a
/// little-endian u32 word; shingles concatenate these words directly (no
/// separator needed since each element has fixed width).
pub fn minhash_tokens(token_ids: &[u32], ngram: usize, permute: u16, seed: u64) -> Vec<u64> {
    let mut sig = new_signature(permute);
    if ngram == 0 || token_ids.len() < ngram {
        return sig;
    }
    let mut buf = Vec::with_capacity(ngram * 4);
    for window in token_ids.windows(ngram) {
        buf.clear();
        for t in window {
            buf.extend_from_slice(&t.to_le_bytes());
        }
        let base = fnv1a_64(&buf);
        update_signature(&mut sig, base, seed);
    }
    sig
}

/// Elementwise min of two equal-length signatures. Associative, commutative,
/// idempotent.
pub fn minhash_merge(a: &[u64], b: &[u64]) -> Result<Vec<u64>> {
    if a.len() != b.len() {
        return Err(RagFileError::DimensionMismatch(format!(
            "minhash_merge: signature lengths differ ({} vs {})",
            a.len(),
            b.len()
        )));
    }
    Ok(a.iter().zip(b.iter()).map(|(&x, &y)| x.min(y)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_length_matches_permute() {
        let sig = minhash_char("this is a test text", 3, 128, 42);
        assert_eq!(sig.len(), 128);
        let sig = minhash_word("this is a test text", 2, 256, 42);
        assert_eq!(sig.len(), 256);
    }

    #[test]
    fn deterministic_across_runs() {
        let a = minhash_char("the quick brown fox", 3, 64, 42);
        let b = minhash_char("the quick brown fox", 3, 64, 42);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_input_is_all_max() {
        let sig = minhash_char("", 3, 64, 42);
        assert!(sig.iter().all(|&x| x == u64::MAX));
    }

    #[test]
    fn merge_is_commutative_idempotent_associative() {
        let a = minhash_char("alpha beta gamma delta", 2, 32, 1);
        let b = minhash_char("beta gamma delta epsilon", 2, 32, 2);
        let c = minhash_char("gamma delta epsilon zeta", 2, 32, 3);

        let ab = minhash_merge(&a, &b).unwrap();
        let ba = minhash_merge(&b, &a).unwrap();
        assert_eq!(ab, ba, "merge must be commutative");

        let aa = minhash_merge(&a, &a).unwrap();
        assert_eq!(aa, a, "merge must be idempotent");

        let ab_c = minhash_merge(&ab, &c).unwrap();
        let bc = minhash_merge(&b, &c).unwrap();
        let a_bc = minhash_merge(&a, &bc).unwrap();
        assert_eq!(ab_c, a_bc, "merge must be associative");
    }

    #[test]
    fn merge_of_disjoint_halves_keeps_the_lower_half() {
        let a: Vec<u64> = (0..128).collect();
        let b: Vec<u64> = (128..256).collect();
        let merged = minhash_merge(&a, &b).unwrap();
        assert_eq!(merged.len(), 128);
        for (i, &v) in merged.iter().enumerate() {
            assert_eq!(v, a[i].min(b[i]));
            assert_eq!(v, a[i]);
        }
    }

    #[test]
    fn merge_rejects_unequal_length() {
        let a = vec![0u64; 64];
        let b = vec![0u64; 32];
        assert!(minhash_merge(&a, &b).is_err());
    }

    #[test]
    fn token_ngrams_are_deterministic() {
        let tokens = [1u32, 2, 3, 4, 5, 6];
        let a = minhash_tokens(&tokens, 2, 64, 7);
        let b = minhash_tokens(&tokens, 2, 64, 7);
        assert_eq!(a, b);
        assert_ne!(a, minhash_tokens(&tokens, 2, 64, 8));
    }
}
