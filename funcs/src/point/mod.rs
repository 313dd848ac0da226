//! A module implementing distributed point functions over a GGM tree
use std::{fmt::Debug, ops::BitXor};

use crate::{Block, Result, FSS};

#[cfg(test)]
pub(crate) mod tests;

mod params;
pub use params::DpfParams;

/// DPF scheme built from a GGM tree with per-level correction words, as in [[BGI16]].
///
/// [BGI16]: https://eprint.iacr.org/2018/707
pub mod ggm;
pub use ggm::{DpfKey, EvalScratch, GgmDpf};

/// The description of a point function: the domain size, a point in that domain, and the value
/// at that point.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PointFunction<L> {
    pub nitems: usize,
    pub point: usize,
    pub output: L,
}

impl<L: Leaf> PointFunction<L> {
    /// A point function which outputs the unit value of `L` at `point`
    pub fn new(nitems: usize, point: usize) -> Self {
        Self::with_output(nitems, point, L::one())
    }

    pub fn with_output(nitems: usize, point: usize, output: L) -> Self {
        Self {
            nitems,
            point,
            output,
        }
    }
}

/// A distributed point function (DPF) is a type of FSS scheme for point functions whose shares
/// are combined with XOR.
pub trait DPF<L: Leaf>:
    FSS<Domain = usize, Range = L, Share = L, Description = PointFunction<L>>
{
    /// Evaluates `key` on every point of its domain in a single pass
    fn eval_full(key: &Self::Key) -> Result<Vec<L>>;
}

/// The output type of a point function. Values are packed into 128-bit leaf blocks: a leaf of
/// at most 128 bits occupies one lane of a single block, wider leaves span `BITS / 128` blocks.
pub trait Leaf: Copy + Debug + Default + Eq + BitXor<Output = Self> {
    /// Width of a value in bits
    const BITS: usize;

    /// The default nonzero output of a point function
    fn one() -> Self;

    /// Reads the value stored at `lane` of `leaf`
    fn extract(leaf: &[Block], lane: usize) -> Self;

    /// XORs `self` into `lane` of `leaf`
    fn deposit(self, leaf: &mut [Block], lane: usize);
}

impl Leaf for bool {
    const BITS: usize = 1;

    fn one() -> Self {
        true
    }

    #[inline]
    fn extract(leaf: &[Block], lane: usize) -> Self {
        (leaf[0].to_u128() >> lane) & 1 == 1
    }

    #[inline]
    fn deposit(self, leaf: &mut [Block], lane: usize) {
        leaf[0] ^= Block::from_u128((self as u128) << lane);
    }
}

macro_rules! impl_narrow_leaf {
    ($($t:ty),*) => {
        $(
            impl Leaf for $t {
                const BITS: usize = <$t>::BITS as usize;

                fn one() -> Self {
                    1
                }

                #[inline]
                fn extract(leaf: &[Block], lane: usize) -> Self {
                    (leaf[0].to_u128() >> (lane * <Self as Leaf>::BITS)) as $t
                }

                #[inline]
                fn deposit(self, leaf: &mut [Block], lane: usize) {
                    leaf[0] ^= Block::from_u128((self as u128) << (lane * <Self as Leaf>::BITS));
                }
            }
        )*
    };
}

impl_narrow_leaf!(u8, u16, u32, u64, u128);

/// A leaf spanning `N` whole blocks
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WideLeaf<const N: usize>(pub [Block; N]);

impl<const N: usize> Default for WideLeaf<N> {
    fn default() -> Self {
        Self([Block::ZERO; N])
    }
}

impl<const N: usize> BitXor for WideLeaf<N> {
    type Output = Self;

    fn bitxor(mut self, rhs: Self) -> Self::Output {
        self.0.iter_mut().zip(rhs.0).for_each(|(a, b)| *a ^= b);
        self
    }
}

impl<const N: usize> Leaf for WideLeaf<N> {
    const BITS: usize = 128 * N;

    fn one() -> Self {
        let mut out = Self::default();
        out.0[0] = Block::from_u128(1);
        out
    }

    fn extract(leaf: &[Block], _lane: usize) -> Self {
        let mut out = Self::default();
        out.0.copy_from_slice(&leaf[..N]);
        out
    }

    fn deposit(self, leaf: &mut [Block], _lane: usize) {
        leaf.iter_mut().zip(self.0).for_each(|(l, b)| *l ^= b);
    }
}
