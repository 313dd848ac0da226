use rand::{CryptoRng, RngCore};
use std::marker::PhantomData;
use tracing::debug;

use super::{DpfParams, Leaf, PointFunction, DPF};
use crate::{Block, Error, Pair, Prg, Result, FSS};

mod data_structures;
pub use data_structures::*;

/// DPF scheme over a GGM tree with one correction word and two advice bits per level.
///
/// Each party expands its root seed with the fixed-key [`Prg`]. At every level a correction word
/// is XORed into the child of any node whose control bit is set, which makes the two parties'
/// trees agree everywhere except along the path to the programmed point.
pub struct GgmDpf<L: Leaf> {
    _leaf: PhantomData<L>,
}

impl<L: Leaf> GgmDpf<L> {
    /// Generates both key shares for `f(point) = output` and returns, alongside them, the value
    /// that the first share evaluates to at `point`.
    pub fn gen_with_leaf<RNG: CryptoRng + RngCore>(
        prg: &Prg,
        params: &DpfParams,
        point: usize,
        output: L,
        rng: &mut RNG,
    ) -> Result<(DpfKey<L>, DpfKey<L>, L)> {
        Self::check_params(params)?;
        if point >= params.nitems {
            return Err(Error::PointOutOfRange {
                point,
                nitems: params.nitems,
            });
        }

        // The roots are random apart from their control bits, which must differ so that the two
        // trees diverge at the root.
        let root_0 = Block::random(rng);
        let root_1 = Block::random(rng).set_lsb(!root_0.lsb());

        let mut seeds = Pair::new(root_0, root_1);
        let mut bits = Pair::new(root_0.lsb(), root_1.lsb());

        let mut cw = Vec::with_capacity(params.depth);
        let mut t = Vec::with_capacity(params.depth);

        for level in 0..params.depth {
            let (s0, t0) = prg.expand(&seeds[0]);
            let (s1, t1) = prg.expand(&seeds[1]);

            // `keep` is the child on the path to `point`, `lose` is its sibling
            let bit = params.path_bit(point, level);
            let (keep, lose) = (bit, !bit);

            // Applying the correction word to exactly one party's `lose` child makes both
            // parties hold the same seed there. The lsb of intermediate seeds is never read by
            // `expand`, so it is cleared everywhere but the last level.
            let mut word = s0[lose] ^ s1[lose];
            if level + 1 < params.depth {
                word = word.clear_lsb();
            }

            // Advice bits are chosen such that the control bits of the `lose` children agree and
            // the control bits of the `keep` children differ.
            let advice = Pair::new(
                t0[false] ^ t1[false] ^ !bit,
                t0[true] ^ t1[true] ^ bit,
            );

            seeds = Pair::new(
                s0[keep].xor_if(&word, bits[0]),
                s1[keep].xor_if(&word, bits[1]),
            );
            bits = Pair::new(
                t0[keep] ^ (bits[0] & advice[keep]),
                t1[keep] ^ (bits[1] & advice[keep]),
            );

            cw.push(word);
            t.push(advice);
        }

        // The final correction word makes the XOR of the two leaves equal to `output` in the
        // lane of `point` and zero in every other lane.
        let lane = params.lane(point);
        let mut leaf_0 = vec![Block::ZERO; params.blocks_per_leaf];
        let mut leaf_1 = vec![Block::ZERO; params.blocks_per_leaf];
        Self::leaf_from_seed(prg, params, &seeds[0], &mut leaf_0);
        Self::leaf_from_seed(prg, params, &seeds[1], &mut leaf_1);

        let mut final_cw = vec![Block::ZERO; params.blocks_per_leaf];
        output.deposit(&mut final_cw, lane);
        final_cw
            .iter_mut()
            .zip(leaf_0.iter().zip(&leaf_1))
            .for_each(|(f, (l0, l1))| *f ^= *l0 ^ *l1);

        let share_0: Vec<Block> = leaf_0
            .iter()
            .zip(&final_cw)
            .map(|(l, f)| l.xor_if(f, bits[0]))
            .collect();
        let achieved = L::extract(&share_0, lane);

        debug!(
            nitems = params.nitems,
            depth = params.depth,
            leaf_bits = params.leaf_bits,
            "generated DPF key pair"
        );

        let key_0 = DpfKey {
            params: *params,
            root: root_0,
            cw,
            final_cw,
            t,
            _leaf: PhantomData,
        };
        let key_1 = DpfKey {
            root: root_1,
            ..key_0.clone()
        };

        Ok((key_0, key_1, achieved))
    }

    /// Evaluates `key` at `input` by walking the single path from the root to its leaf
    pub fn eval_with(prg: &Prg, key: &DpfKey<L>, input: usize) -> Result<L> {
        let params = &key.params;
        if input >= params.nitems {
            return Err(Error::PointOutOfRange {
                point: input,
                nitems: params.nitems,
            });
        }

        let mut seed = key.root;
        let mut bit = seed.lsb();
        for level in 0..params.depth {
            let dir = params.path_bit(input, level);
            let (children, child_bits) = prg.expand(&seed);
            seed = children[dir].xor_if(&key.cw[level], bit);
            bit = child_bits[dir] ^ (key.t[level][dir] & bit);
        }

        let mut leaf = vec![Block::ZERO; params.blocks_per_leaf];
        Self::leaf_from_seed(prg, params, &seed, &mut leaf);
        leaf.iter_mut()
            .zip(&key.final_cw)
            .for_each(|(l, f)| *l = l.xor_if(f, bit));

        Ok(L::extract(&leaf, params.lane(input)))
    }

    /// Evaluates `key` on the whole domain, writing `params.output_blocks()` leaf blocks into
    /// `out`.
    ///
    /// The tree is expanded breadth first, one layer at a time, so each node is expanded once.
    /// Every layer is processed in full regardless of the key.
    pub fn eval_full_into(
        prg: &Prg,
        key: &DpfKey<L>,
        scratch: &mut EvalScratch,
        out: &mut [Block],
    ) -> Result<()> {
        let params = &key.params;
        if out.len() != params.output_blocks() {
            return Err(Error::LengthMismatch {
                expected: params.output_blocks(),
                actual: out.len(),
            });
        }
        scratch.reserve_for(params);

        let [seeds_a, seeds_b] = &mut scratch.seeds;
        let [bits_a, bits_b] = &mut scratch.bits;
        let (mut cur_seeds, mut next_seeds) = (seeds_a, seeds_b);
        let (mut cur_bits, mut next_bits) = (bits_a, bits_b);

        cur_seeds[0] = key.root;
        cur_bits[0] = key.root.lsb();

        for level in 0..params.depth {
            let width = params.nodes_at(level);

            // Lay out both children of every node and hash the whole layer in one batch
            for j in 0..width {
                next_seeds[2 * j] = cur_seeds[j].clear_lsb();
                next_seeds[2 * j + 1] = cur_seeds[j].set_lsb(true);
            }
            prg.hash_in_place(&mut next_seeds[..2 * width]);

            let word = key.cw[level];
            let advice = key.t[level];
            for j in 0..width {
                let parent_bit = cur_bits[j];
                for dir in [false, true] {
                    let idx = 2 * j + dir as usize;
                    let child = next_seeds[idx];
                    next_bits[idx] = child.lsb() ^ (advice[dir] & parent_bit);
                    next_seeds[idx] = child.xor_if(&word, parent_bit);
                }
            }

            std::mem::swap(&mut cur_seeds, &mut next_seeds);
            std::mem::swap(&mut cur_bits, &mut next_bits);
        }

        let width = params.blocks_per_leaf;
        for (j, leaf) in out.chunks_exact_mut(width).enumerate() {
            Self::leaf_from_seed(prg, params, &cur_seeds[j], leaf);
            leaf.iter_mut()
                .zip(&key.final_cw)
                .for_each(|(l, f)| *l = l.xor_if(f, cur_bits[j]));
        }

        debug!(
            nitems = params.nitems,
            leaves = params.leaf_count,
            "evaluated DPF on the full domain"
        );
        Ok(())
    }

    /// Allocating wrapper around [`Self::eval_full_into`]
    pub fn eval_full_with(prg: &Prg, key: &DpfKey<L>) -> Result<Vec<Block>> {
        let mut scratch = EvalScratch::new(&key.params);
        let mut out = vec![Block::ZERO; key.params.output_blocks()];
        Self::eval_full_into(prg, key, &mut scratch, &mut out)?;
        Ok(out)
    }

    /// Unpacks the output of a full-domain evaluation into one value per input
    pub fn leaves(params: &DpfParams, blocks: &[Block]) -> Vec<L> {
        let width = params.blocks_per_leaf;
        (0..params.nitems)
            .map(|x| {
                let start = params.leaf_index(x) * width;
                L::extract(&blocks[start..start + width], params.lane(x))
            })
            .collect()
    }

    fn check_params(params: &DpfParams) -> Result<()> {
        if params.leaf_bits != L::BITS {
            return Err(Error::InvalidParams(format!(
                "parameters describe {}-bit leaves but the output type is {} bits wide",
                params.leaf_bits,
                L::BITS
            )));
        }
        Ok(())
    }

    /// Narrow leaves are the seed itself. Wide leaves stretch the seed over several blocks.
    #[inline]
    fn leaf_from_seed(prg: &Prg, params: &DpfParams, seed: &Block, out: &mut [Block]) {
        if params.blocks_per_leaf == 1 {
            out[0] = *seed;
        } else {
            prg.stretch(seed, out);
        }
    }
}

impl<L: Leaf> FSS for GgmDpf<L> {
    type Key = DpfKey<L>;
    type Description = PointFunction<L>;
    type Domain = usize;
    type Range = L;
    type Share = L;

    fn gen<RNG: CryptoRng + RngCore>(
        f: &Self::Description,
        rng: &mut RNG,
    ) -> Result<(Self::Key, Self::Key)> {
        let params = DpfParams::for_leaf::<L>(f.nitems)?;
        let (key_0, key_1, _) = Self::gen_with_leaf(Prg::fixed(), &params, f.point, f.output, rng)?;
        Ok((key_0, key_1))
    }

    fn eval(key: &Self::Key, point: &Self::Domain) -> Result<Self::Share> {
        Self::eval_with(Prg::fixed(), key, *point)
    }

    fn decode(shares: (&Self::Share, &Self::Share)) -> Result<Self::Range> {
        Ok(*shares.0 ^ *shares.1)
    }
}

impl<L: Leaf> DPF<L> for GgmDpf<L> {
    fn eval_full(key: &Self::Key) -> Result<Vec<L>> {
        let blocks = Self::eval_full_with(Prg::fixed(), key)?;
        Ok(Self::leaves(&key.params, &blocks))
    }
}
