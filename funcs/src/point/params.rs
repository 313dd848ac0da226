use crate::{ceil_log2, Error, Result, BLOCK_SIZE};

/// Shape of a GGM tree for a given domain size and leaf width. Computed once when a key is
/// generated and passed to every tree walk.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DpfParams {
    /// Size of the domain `[0, nitems)`
    pub nitems: usize,
    /// Width of one output value in bits
    pub leaf_bits: usize,
    /// Number of outputs packed into a single leaf block
    pub outs_per_block: usize,
    pub lg_outs_per_block: usize,
    /// Number of 128-bit blocks making up one leaf
    pub blocks_per_leaf: usize,
    /// Number of leaves of the tree that are actually used
    pub leaf_count: usize,
    /// Number of levels between the root and the leaves
    pub depth: usize,
}

impl DpfParams {
    pub fn new(nitems: usize, leaf_bits: usize) -> Result<Self> {
        if nitems == 0 {
            return Err(Error::InvalidParams("domain must not be empty".into()));
        }

        let (outs_per_block, blocks_per_leaf) = match leaf_bits {
            1 | 8 | 16 | 32 | 64 | 128 => (128 / leaf_bits, 1),
            b if b > 128 && b % 128 == 0 => (1, b / 128),
            b => {
                return Err(Error::InvalidParams(format!(
                    "unsupported leaf width of {} bits",
                    b
                )))
            }
        };

        let leaf_count = nitems.div_ceil(outs_per_block);
        Ok(Self {
            nitems,
            leaf_bits,
            outs_per_block,
            lg_outs_per_block: outs_per_block.trailing_zeros() as usize,
            blocks_per_leaf,
            leaf_count,
            depth: ceil_log2(leaf_count),
        })
    }

    /// Parameters for a domain of `nitems` outputs of type `L`
    pub fn for_leaf<L: super::Leaf>(nitems: usize) -> Result<Self> {
        Self::new(nitems, L::BITS)
    }

    /// Index of the leaf holding `input`
    #[inline]
    pub fn leaf_index(&self, input: usize) -> usize {
        input >> self.lg_outs_per_block
    }

    /// Position of `input` inside its leaf
    #[inline]
    pub fn lane(&self, input: usize) -> usize {
        input & (self.outs_per_block - 1)
    }

    /// The branch taken at `level` on the path to `input`, most significant bit first
    #[inline]
    pub fn path_bit(&self, input: usize, level: usize) -> bool {
        debug_assert!(level < self.depth);
        (self.leaf_index(input) >> (self.depth - 1 - level)) & 1 == 1
    }

    /// Number of nodes at `level` that have at least one leaf below them
    #[inline]
    pub fn nodes_at(&self, level: usize) -> usize {
        debug_assert!(level <= self.depth);
        self.leaf_count.div_ceil(1 << (self.depth - level))
    }

    /// Number of blocks produced by a full-domain evaluation
    #[inline]
    pub fn output_blocks(&self) -> usize {
        self.leaf_count * self.blocks_per_leaf
    }

    /// Size of a key share in its raw binary layout
    #[inline]
    pub fn key_size(&self) -> usize {
        BLOCK_SIZE * (1 + self.depth + self.blocks_per_leaf) + self.depth
    }
}
