//! Packing of `nkeys` one-bit DPF leaves into one base-`nservers` digit per item.
//!
//! Leaf `l` holds one bit per item. Bit `b` of every leaf contributes `weights[l]` to the digit of
//! item `b` of the block, and the digit is the sum of those contributions modulo `nservers`.
use crate::Block;

/// Number of items covered by one leaf block
pub const DIGITS_PER_BLOCK: usize = 128;

/// Writes the digit of each of the `DIGITS_PER_BLOCK` items covered by `masks` into `out`
#[inline]
pub fn splice(masks: &[Block], weights: &[u8], nservers: u8, out: &mut [u8; DIGITS_PER_BLOCK]) {
    debug_assert_eq!(masks.len(), weights.len());

    #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
    {
        avx2::splice(masks, weights, nservers, out)
    }

    #[cfg(not(all(target_arch = "x86_64", target_feature = "avx2")))]
    {
        splice_portable(masks, weights, nservers, out)
    }
}

/// Byte-at-a-time version of [`splice`]. Produces exactly the same digits.
pub fn splice_portable(
    masks: &[Block],
    weights: &[u8],
    nservers: u8,
    out: &mut [u8; DIGITS_PER_BLOCK],
) {
    let mut acc = [0u32; DIGITS_PER_BLOCK];
    for (mask, weight) in masks.iter().zip(weights) {
        let bits = mask.to_u128();
        for (b, a) in acc.iter_mut().enumerate() {
            *a += ((bits >> b) & 1) as u32 * *weight as u32;
        }
    }
    for (o, a) in out.iter_mut().zip(acc) {
        *o = (a % nservers as u32) as u8;
    }
}

#[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
mod avx2 {
    use std::arch::x86_64::*;

    use super::DIGITS_PER_BLOCK;
    use crate::Block;

    /// Adds `rem` to `acc` modulo `n` in every byte lane, given `acc < n` and `rem < n`.
    ///
    /// The sum can exceed 255 when `n > 128`, so the wraparound is detected before adding:
    /// `acc + rem >= n` iff `acc >= n - rem`.
    #[inline(always)]
    unsafe fn add_mod(acc: __m256i, rem: __m256i, n: __m256i) -> __m256i {
        let n_minus_rem = _mm256_sub_epi8(n, rem);
        let wraps = _mm256_cmpeq_epi8(_mm256_max_epu8(acc, n_minus_rem), acc);
        _mm256_sub_epi8(_mm256_add_epi8(acc, rem), _mm256_and_si256(wraps, n))
    }

    /// Spreads the 32 bits of `word` over 32 byte lanes as `0xff` (set) or `0x00` (clear)
    #[inline(always)]
    unsafe fn spread_bits(word: u32) -> __m256i {
        let shuffle = _mm256_setr_epi64x(
            0x0000000000000000,
            0x0101010101010101,
            0x0202020202020202,
            0x0303030303030303,
        );
        let bit_mask = _mm256_set1_epi64x(0x7fbfdfeff7fbfdfe);
        let spread = _mm256_shuffle_epi8(_mm256_set1_epi32(word as i32), shuffle);
        _mm256_cmpeq_epi8(_mm256_or_si256(spread, bit_mask), _mm256_set1_epi8(-1))
    }

    pub(super) fn splice(
        masks: &[Block],
        weights: &[u8],
        nservers: u8,
        out: &mut [u8; DIGITS_PER_BLOCK],
    ) {
        unsafe {
            let n = _mm256_set1_epi8(nservers as i8);
            let mut acc = [_mm256_setzero_si256(); 4];

            for (mask, weight) in masks.iter().zip(weights) {
                let rem = _mm256_set1_epi8(*weight as i8);
                for (j, a) in acc.iter_mut().enumerate() {
                    let bits = spread_bits(mask.lane_u32(j));
                    *a = add_mod(*a, _mm256_and_si256(rem, bits), n);
                }
            }

            for (chunk, a) in out.chunks_exact_mut(32).zip(acc) {
                _mm256_storeu_si256(chunk.as_mut_ptr() as *mut __m256i, a);
            }
        }
    }
}
