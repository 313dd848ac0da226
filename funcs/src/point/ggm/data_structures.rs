use ark_serialize::{
    CanonicalDeserialize as Deserialize, CanonicalSerialize as Serialize, SerializationError,
};
use ark_std::io::{Read, Write};
use std::marker::PhantomData;

use crate::{
    point::{DpfParams, Leaf},
    Block, Error, Pair, BLOCK_SIZE,
};

/// One party's share of a point function.
///
/// Both shares carry identical correction words and advice bits; only the roots differ.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DpfKey<L: Leaf> {
    pub params: DpfParams,
    /// Root seed, whose lsb is the root control bit
    pub root: Block,
    /// One correction word per level of the tree
    pub cw: Vec<Block>,
    /// Correction applied to the leaf when the final control bit is set
    pub final_cw: Vec<Block>,
    /// Advice bits for the left and right child at each level
    pub t: Vec<Pair<bool>>,
    pub(super) _leaf: PhantomData<L>,
}

impl<L: Leaf> DpfKey<L> {
    /// Encodes the key as `root ‖ cw[0..depth) ‖ final ‖ t[0..depth)` with both advice bits of a
    /// level packed into one byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.params.key_size());
        out.extend_from_slice(&self.root.0);
        self.cw.iter().for_each(|c| out.extend_from_slice(&c.0));
        self.final_cw.iter().for_each(|f| out.extend_from_slice(&f.0));
        out.extend(self.t.iter().map(Pair::to_byte));
        out
    }

    /// Decodes a key produced by `to_bytes` for a domain described by `params`
    pub fn from_bytes(params: DpfParams, bytes: &[u8]) -> crate::Result<Self> {
        if params.leaf_bits != L::BITS {
            return Err(Error::InvalidParams(format!(
                "key has {}-bit leaves but the output type is {} bits wide",
                params.leaf_bits,
                L::BITS
            )));
        }
        if bytes.len() != params.key_size() {
            return Err(Error::LengthMismatch {
                expected: params.key_size(),
                actual: bytes.len(),
            });
        }

        let mut blocks = bytes.chunks_exact(BLOCK_SIZE).map(|chunk| {
            let mut block = Block::ZERO;
            block.0.copy_from_slice(chunk);
            block
        });
        let root = blocks.next().unwrap_or_default();
        let cw: Vec<Block> = blocks.by_ref().take(params.depth).collect();
        let final_cw: Vec<Block> = blocks.take(params.blocks_per_leaf).collect();

        let bits_start = BLOCK_SIZE * (1 + params.depth + params.blocks_per_leaf);
        let t = bytes[bits_start..]
            .iter()
            .map(|b| Pair::from_byte(*b))
            .collect();

        Ok(Self {
            params,
            root,
            cw,
            final_cw,
            t,
            _leaf: PhantomData,
        })
    }
}

/// Keys are framed by the domain size so the receiver can rebuild the parameters.
impl<L: Leaf> Serialize for DpfKey<L> {
    fn serialize<W: Write>(&self, mut writer: W) -> Result<(), SerializationError> {
        (self.params.nitems as u64).serialize(&mut writer)?;
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    fn serialized_size(&self) -> usize {
        8 + self.params.key_size()
    }
}

impl<L: Leaf> Deserialize for DpfKey<L> {
    fn deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let nitems = u64::deserialize(&mut reader)? as usize;
        let params =
            DpfParams::for_leaf::<L>(nitems).map_err(|_| SerializationError::InvalidData)?;
        let mut bytes = vec![0u8; params.key_size()];
        reader.read_exact(&mut bytes)?;
        Self::from_bytes(params, &bytes).map_err(|_| SerializationError::InvalidData)
    }
}

/// Caller-owned double buffers used by full-domain evaluation. One layer of the tree is read
/// from one buffer while the next layer is written into the other.
#[derive(Clone, Debug, Default)]
pub struct EvalScratch {
    pub(super) seeds: [Vec<Block>; 2],
    pub(super) bits: [Vec<bool>; 2],
}

impl EvalScratch {
    pub fn new(params: &DpfParams) -> Self {
        let mut scratch = Self::default();
        scratch.reserve_for(params);
        scratch
    }

    /// Grows the buffers if they are too small for `params`. Buffers that are already large
    /// enough are left untouched.
    pub fn reserve_for(&mut self, params: &DpfParams) {
        // Every layer but the last is expanded into at most `leaf_count + 1` children
        let len = params.leaf_count + 1;
        for buf in self.seeds.iter_mut() {
            if buf.len() < len {
                buf.resize(len, Block::ZERO);
            }
        }
        for buf in self.bits.iter_mut() {
            if buf.len() < len {
                buf.resize(len, false);
            }
        }
    }
}
