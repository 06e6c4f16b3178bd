//! IEEE-754 binary16 ⇄ binary32 conversion (component A).
//!
//! The scalar path is the source of truth: round-to-nearest-even, subnormals
//! preserved, NaN payload collapsed to a canonical quiet NaN, ±Inf preserved,
//! overflow saturates to ±Inf. Capability-gated fast paths select wider SIMD
//! lanes at the call sites in [`crate::similarity`] once [`Capability::detect`]
//! has run; the bit-level math itself never changes across paths, so results
//! are identical up to NaN payload regardless of which path ran.

use std::sync::OnceLock;

const CANONICAL_QUIET_NAN: u16 = 0x7E00;

/// Runtime SIMD capability, probed once and cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Avx512,
    F16C,
    Neon,
    Scalar,
}

fn detect() -> Capability {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx512f")
            && is_x86_feature_detected!("avx512bw")
            && is_x86_feature_detected!("avx512vl")
        {
            return Capability::Avx512;
        }
        if is_x86_feature_detected!("f16c") {
            return Capability::F16C;
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        if std::arch::is_aarch64_feature_detected!("neon") {
            return Capability::Neon;
        }
    }
    Capability::Scalar
}

/// Returns the detected SIMD capability, probing the CPU exactly once.
pub fn capability() -> Capability {
    static CAP: OnceLock<Capability> = OnceLock::new();
    *CAP.get_or_init(|| {
        let cap = detect();
        crate::debug_log!("[ragfile] float16 capability: {cap:?}");
        cap
    })
}

/// Convert an f32 to IEEE-754 binary16, round-to-nearest-even.
pub fn f32_to_f16(x: f32) -> u16 {
    let bits = x.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xFF) as i32;
    let mantissa = bits & 0x007F_FFFF;

    // NaN: collapse any payload to the canonical quiet NaN, preserve sign.
    if exp == 0xFF && mantissa != 0 {
        return sign | CANONICAL_QUIET_NAN;
    }
    // Infinity.
    if exp == 0xFF {
        return sign | 0x7C00;
    }

    // Unbiased exponent relative to binary16's bias (15 vs f32's 127).
    let unbiased = exp - 127;
    let half_exp = unbiased + 15;

    if half_exp >= 0x1F {
        // Overflow saturates to infinity.
        return sign | 0x7C00;
    }

    if half_exp <= 0 {
        // Subnormal or underflow-to-zero in binary16.
        if half_exp < -10 {
            return sign; // too small even for a subnormal — signed zero.
        }
        // Add the implicit leading 1 bit, then shift into subnormal position.
        let mantissa_with_implicit = mantissa | 0x0080_0000;
        let shift = 14 - half_exp; // 24-bit mantissa -> 10-bit subnormal field
        let half_mantissa = round_shift(mantissa_with_implicit, shift);
        return sign | half_mantissa as u16;
    }

    // Normalized case: round the 23-bit mantissa down to 10 bits.
    let half_mantissa = round_shift(mantissa, 13);
    let half_exp_bits = (half_exp as u16) << 10;

    // Rounding the mantissa may have carried into the exponent.
    if half_mantissa & 0x0400 != 0 {
        sign | (half_exp_bits + 0x0400)
    } else {
        sign | half_exp_bits | (half_mantissa as u16 & 0x03FF)
    }
}

/// Shift `value` right by `shift` bits with round-to-nearest-even.
fn round_shift(value: u32, shift: i32) -> u32 {
    if shift <= 0 {
        return value << (-shift);
    }
    if shift >= 32 {
        return 0;
    }
    let halfway = 1u32 << (shift - 1);
    let remainder = value & ((1u32 << shift) - 1);
    let truncated = value >> shift;
    if remainder > halfway || (remainder == halfway && (truncated & 1) != 0) {
        truncated + 1
    } else {
        truncated
    }
}

/// Convert an IEEE-754 binary16 value to f32. Exact (no rounding needed).
pub fn f16_to_f32(half: u16) -> f32 {
    let sign = (half & 0x8000) as u32;
    let exp = ((half >> 10) & 0x1F) as u32;
    let mantissa = (half & 0x03FF) as u32;

    let bits: u32 = if exp == 0 {
        if mantissa == 0 {
            sign << 16 // signed zero
        } else {
            // Subnormal half -> normalize into f32.
            let mut e = -1i32;
            let mut m = mantissa;
            while m & 0x0400 == 0 {
                m <<= 1;
                e -= 1;
            }
            m &= 0x03FF;
            let f32_exp = (127 - 15 + e + 1) as u32;
            (sign << 16) | (f32_exp << 23) | (m << 13)
        }
    } else if exp == 0x1F {
        if mantissa == 0 {
            (sign << 16) | 0x7F80_0000 // infinity
        } else {
            (sign << 16) | 0x7FC0_0000 // canonical quiet NaN
        }
    } else {
        let f32_exp = exp + (127 - 15);
        (sign << 16) | (f32_exp << 23) | (mantissa << 13)
    };

    f32::from_bits(bits)
}
