//! Puncturable pseudorandom sets.
//!
//! A 128-bit seed is expanded through a GGM tree into `set_size` elements of `[0, univ_size)`.
//! Each leaf block holds four 32-bit lanes and every lane yields one element, so a tree of
//! height `h` has `h - 2` levels of expansion. Puncturing at a position produces one sibling
//! seed per level together with the final leaf block with the punctured lane zeroed, which is
//! enough to rebuild every other element without learning the seed.
use ark_serialize::{
    CanonicalDeserialize as Deserialize, CanonicalSerialize as Serialize, SerializationError,
};
use ark_std::io::{Read, Write};
use rand::{CryptoRng, RngCore};
use tracing::debug;

use crate::{ceil_log2, Block, Error, Prg, BLOCK_SIZE};

#[cfg(test)]
mod tests;

/// Elements held by one leaf block
const LANES: usize = 4;

/// XORed into a seed to derive its right child
const ONE: Block = Block::from_u128(1 << 96);

/// Height of the tree covering `set_size` elements
pub fn get_height(set_size: usize) -> usize {
    if set_size <= 1 {
        1
    } else {
        ceil_log2(set_size)
    }
}

/// Bytes of scratch memory a [`SetGenerator`] allocates for the given sizes: two buffers of
/// one block per leaf
pub fn workspace_size(_univ_size: usize, set_size: usize) -> usize {
    2 * (1 << get_height(set_size)) * BLOCK_SIZE
}

/// A punctured set: one sibling seed per level of the tree followed by the leaf block holding
/// the punctured position, with that position's lane zeroed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PuncturedSet {
    pub keys: Vec<Block>,
}

impl PuncturedSet {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.keys.iter().flat_map(|k| k.0).collect()
    }

    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        if bytes.is_empty() || bytes.len() % BLOCK_SIZE != 0 {
            return Err(Error::LengthMismatch {
                expected: bytes.len().div_ceil(BLOCK_SIZE).max(1) * BLOCK_SIZE,
                actual: bytes.len(),
            });
        }
        let keys = bytes
            .chunks_exact(BLOCK_SIZE)
            .map(|chunk| {
                let mut block = Block::ZERO;
                block.0.copy_from_slice(chunk);
                block
            })
            .collect();
        Ok(Self { keys })
    }
}

impl Serialize for PuncturedSet {
    fn serialize<W: Write>(&self, writer: W) -> Result<(), SerializationError> {
        self.keys.serialize(writer)
    }

    fn serialized_size(&self) -> usize {
        self.keys.serialized_size()
    }
}

impl Deserialize for PuncturedSet {
    fn deserialize<R: Read>(reader: R) -> Result<Self, SerializationError> {
        let keys = Vec::<Block>::deserialize(reader)?;
        if keys.is_empty() {
            return Err(SerializationError::InvalidData);
        }
        Ok(Self { keys })
    }
}

/// Expands seeds into sets of a fixed size over a fixed universe.
///
/// The generator owns the tree buffers, which are allocated once and reused by every call.
pub struct SetGenerator {
    univ_size: usize,
    set_size: usize,
    height: usize,
    keys: Vec<Block>,
    tmp: Vec<Block>,
}

impl SetGenerator {
    pub fn new(univ_size: usize, set_size: usize) -> crate::Result<Self> {
        if univ_size == 0 || set_size == 0 {
            return Err(Error::InvalidParams(
                "universe and set must both be non-empty".into(),
            ));
        }
        if univ_size > u32::MAX as usize {
            return Err(Error::InvalidParams(format!(
                "universe of size {} does not fit in 32 bits",
                univ_size
            )));
        }

        let height = get_height(set_size);
        let blocks = workspace_size(univ_size, set_size) / (2 * BLOCK_SIZE);
        debug!(univ_size, set_size, height, "initialised set generator");
        Ok(Self {
            univ_size,
            set_size,
            height,
            keys: vec![Block::ZERO; blocks],
            tmp: vec![Block::ZERO; blocks],
        })
    }

    /// Draws a fresh seed
    pub fn sample_seed<RNG: CryptoRng + RngCore>(rng: &mut RNG) -> Block {
        Block::random(rng)
    }

    #[inline]
    pub fn univ_size(&self) -> usize {
        self.univ_size
    }

    #[inline]
    pub fn set_size(&self) -> usize {
        self.set_size
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of elements recovered from a punctured set
    #[inline]
    pub fn punctured_len(&self) -> usize {
        self.set_size - 1
    }

    /// Number of blocks in a punctured set
    #[inline]
    pub fn punc_blocks(&self) -> usize {
        self.height.saturating_sub(1).max(1)
    }

    /// Writes all `set_size` elements derived from `seed` into `elems`
    pub fn eval_into(
        &mut self,
        prg: &Prg,
        seed: &Block,
        elems: &mut [u64],
    ) -> crate::Result<()> {
        if elems.len() != self.set_size {
            return Err(Error::LengthMismatch {
                expected: self.set_size,
                actual: elems.len(),
            });
        }

        self.expand_tree(prg, seed);
        for (i, e) in elems.iter_mut().enumerate() {
            *e = self.elem_from_leaves(i);
        }
        Ok(())
    }

    pub fn eval(&mut self, prg: &Prg, seed: &Block) -> Vec<u64> {
        self.expand_tree(prg, seed);
        (0..self.set_size).map(|i| self.elem_from_leaves(i)).collect()
    }

    /// The element at `pos`, computed along a single path of the tree
    pub fn elem_at(&self, prg: &Prg, seed: &Block, pos: usize) -> crate::Result<u64> {
        self.check_pos(pos)?;

        let mut key = *seed;
        let mut height = self.height;
        while height > 2 {
            let children = Self::children(prg, &key);
            key = children[(pos >> (height - 1)) & 1];
            height -= 1;
        }
        Ok(self.reduce(key.lane_u32(pos % LANES)))
    }

    /// The first position of `seed`'s set holding `elem`, if any
    pub fn find_pos(&mut self, prg: &Prg, seed: &Block, elem: u64) -> Option<usize> {
        self.eval(prg, seed).iter().position(|e| *e == elem)
    }

    /// Punctures the set of `seed` at `pos`
    pub fn punc(&self, prg: &Prg, seed: &Block, pos: usize) -> crate::Result<PuncturedSet> {
        self.check_pos(pos)?;

        let mut keys = Vec::with_capacity(self.punc_blocks());
        let mut key = *seed;
        let mut height = self.height;
        while height > 2 {
            let [left, right] = Self::children(prg, &key);
            if (pos >> (height - 1)) & 1 == 1 {
                keys.push(left);
                key = right;
            } else {
                keys.push(right);
                key = left;
            }
            height -= 1;
        }
        key.set_lane_u32(pos % LANES, 0);
        keys.push(key);

        Ok(PuncturedSet { keys })
    }

    /// Writes every element of a set punctured at `pos`, except the one at `pos`, into `elems`
    pub fn eval_punc_into(
        &mut self,
        prg: &Prg,
        pset: &PuncturedSet,
        pos: usize,
        elems: &mut [u64],
    ) -> crate::Result<()> {
        self.check_pos(pos)?;
        if pset.keys.len() != self.punc_blocks() {
            return Err(Error::LengthMismatch {
                expected: self.punc_blocks(),
                actual: pset.keys.len(),
            });
        }
        if elems.len() != self.punctured_len() {
            return Err(Error::LengthMismatch {
                expected: self.punctured_len(),
                actual: elems.len(),
            });
        }

        // The path to `pos` is unknown. Its node is expanded like every other one and the
        // sibling taken from `pset` is written over the wrong child at each level.
        self.keys[0] = Block::ZERO;
        let mut height = self.height;
        let mut depth = 0;
        while height > 2 {
            self.expand_layer(prg, 1 << depth);
            height -= 1;
            self.keys[(pos >> height) ^ 1] = pset.keys[depth];
            depth += 1;
        }
        self.keys[pos / LANES] = pset.keys[depth];

        let mut out = elems.iter_mut();
        for i in (0..self.set_size).filter(|i| *i != pos) {
            if let Some(e) = out.next() {
                *e = self.elem_from_leaves(i);
            }
        }
        Ok(())
    }

    pub fn eval_punc(
        &mut self,
        prg: &Prg,
        pset: &PuncturedSet,
        pos: usize,
    ) -> crate::Result<Vec<u64>> {
        let mut elems = vec![0u64; self.punctured_len()];
        self.eval_punc_into(prg, pset, pos, &mut elems)?;
        Ok(elems)
    }

    /// Expands `seed` down to the leaf blocks, one whole layer at a time
    fn expand_tree(&mut self, prg: &Prg, seed: &Block) {
        self.keys[0] = *seed;
        for depth in 0..self.height.saturating_sub(2) {
            self.expand_layer(prg, 1 << depth);
        }
    }

    /// Replaces the `width` seeds at the front of `keys` by their `2 * width` children
    fn expand_layer(&mut self, prg: &Prg, width: usize) {
        for i in 0..width {
            self.tmp[2 * i] = self.keys[i];
            self.tmp[2 * i + 1] = self.keys[i] ^ ONE;
        }
        let (tmp, keys) = (&self.tmp[..2 * width], &mut self.keys[..2 * width]);
        keys.copy_from_slice(tmp);
        prg.hash_in_place(keys);
    }

    #[inline]
    fn children(prg: &Prg, key: &Block) -> [Block; 2] {
        let mut children = [*key, *key ^ ONE];
        prg.hash_in_place(&mut children);
        children
    }

    #[inline]
    fn elem_from_leaves(&self, i: usize) -> u64 {
        self.reduce(self.keys[i / LANES].lane_u32(i % LANES))
    }

    /// Maps a 32-bit value into `[0, univ_size)` by taking the high half of the product
    #[inline]
    fn reduce(&self, lane: u32) -> u64 {
        (lane as u64 * self.univ_size as u64) >> 32
    }

    fn check_pos(&self, pos: usize) -> crate::Result<()> {
        if pos >= self.set_size {
            return Err(Error::PositionOutOfRange {
                pos,
                set_size: self.set_size,
            });
        }
        Ok(())
    }
}

/// Returns `false` if `elems` contains a duplicate.
///
/// Elements are hashed by their low bits into a table of `next_pow2(4 * len)` slots with linear
/// probing.
pub fn distinct(elems: &[u64]) -> bool {
    let table_size = (4 * elems.len()).max(1).next_power_of_two();
    let mask = table_size as u64 - 1;
    let mut table: Vec<Option<u64>> = vec![None; table_size];

    for e in elems {
        let mut slot = (e & mask) as usize;
        loop {
            match table[slot] {
                None => {
                    table[slot] = Some(*e);
                    break;
                }
                Some(v) if v == *e => return false,
                _ => slot = (slot + 1) & (table_size - 1),
            }
        }
    }
    true
}
