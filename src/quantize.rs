//! Sign-quantization of a dense vector into a bit-packed scan vector
//! (component C). Bit `i` is 1 iff `v[i] >= 0`, MSB-first within each byte;
//! tail bits of the final byte are zero.

/// Quantize `v` into `ceil(len/8)` bytes, MSB-first.
pub fn quantize_sign(v: &[f32]) -> Vec<u8> {
    let mut out = vec![0u8; v.len().div_ceil(8)];
    for (i, &x) in v.iter().enumerate() {
        if x >= 0.0 {
            let byte = i / 8;
            let bit = 7 - (i % 8);
            out[byte] |= 1 << bit;
        }
    }
    out
}
