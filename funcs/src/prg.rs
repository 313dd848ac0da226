use aes::{
    cipher::{BlockEncrypt, KeyInit},
    Aes128,
};
use once_cell::sync::Lazy;

use crate::{Block, Pair, BLOCK_SIZE};

/// Public key of the fixed-key AES instance. Security rests on AES behaving as a random
/// permutation under a known key, so this value is not secret.
pub const FIXED_KEY: [u8; BLOCK_SIZE] = [
    36, 156, 50, 234, 92, 230, 49, 9, 174, 170, 205, 160, 98, 236, 29, 243,
];

/// Number of blocks handed to the cipher per call. AES-NI pipelines 8 blocks at a time.
const PAR_BLOCKS: usize = 8;

static FIXED_PRG: Lazy<Prg> = Lazy::new(|| Prg::with_key(FIXED_KEY));

/// A length-doubling PRG built from AES-128 under a fixed key, used in Matyas-Meyer-Oseas
/// mode: `H(x) = AES_k(x) ^ x`.
#[derive(Clone)]
pub struct Prg {
    aes: Aes128,
}

impl Prg {
    /// The process-wide PRG keyed with [`FIXED_KEY`]. Constructed on first use and never
    /// mutated afterwards.
    pub fn fixed() -> &'static Prg {
        &FIXED_PRG
    }

    pub fn with_key(key: [u8; BLOCK_SIZE]) -> Self {
        Self {
            aes: Aes128::new(&key.into()),
        }
    }

    /// Encrypts `input` into `out` in batches of `PAR_BLOCKS`
    pub fn encrypt_into(&self, input: &[Block], out: &mut [Block]) {
        debug_assert_eq!(input.len(), out.len());
        let mut buf = [aes::Block::default(); PAR_BLOCKS];
        for (ins, outs) in input.chunks(PAR_BLOCKS).zip(out.chunks_mut(PAR_BLOCKS)) {
            let n = ins.len();
            buf.iter_mut()
                .zip(ins)
                .for_each(|(b, x)| b.copy_from_slice(&x.0));
            self.aes.encrypt_blocks(&mut buf[..n]);
            outs.iter_mut()
                .zip(&buf[..n])
                .for_each(|(o, b)| o.0.copy_from_slice(b));
        }
    }

    /// Encrypts `blocks` in place
    pub fn encrypt_blocks(&self, blocks: &mut [Block]) {
        let mut buf = [aes::Block::default(); PAR_BLOCKS];
        for chunk in blocks.chunks_mut(PAR_BLOCKS) {
            let n = chunk.len();
            buf.iter_mut()
                .zip(chunk.iter())
                .for_each(|(b, x)| b.copy_from_slice(&x.0));
            self.aes.encrypt_blocks(&mut buf[..n]);
            chunk.iter_mut()
                .zip(&buf[..n])
                .for_each(|(x, b)| x.0.copy_from_slice(b));
        }
    }

    /// Replaces every block `x` with `AES(x) ^ x`
    pub fn hash_in_place(&self, blocks: &mut [Block]) {
        let mut buf = [aes::Block::default(); PAR_BLOCKS];
        for chunk in blocks.chunks_mut(PAR_BLOCKS) {
            let n = chunk.len();
            buf.iter_mut()
                .zip(chunk.iter())
                .for_each(|(b, x)| b.copy_from_slice(&x.0));
            self.aes.encrypt_blocks(&mut buf[..n]);
            chunk.iter_mut().zip(&buf[..n]).for_each(|(x, b)| {
                x.0.iter_mut().zip(b.iter()).for_each(|(x, b)| *x ^= b);
            });
        }
    }

    /// Expands `seed` into its left and right GGM children together with their control bits.
    ///
    /// The children are `H(seed with lsb cleared)` and `H(seed with lsb set)`, so the lsb of
    /// `seed` itself never influences the output. Each child's control bit is its own lsb.
    #[inline]
    pub fn expand(&self, seed: &Block) -> (Pair<Block>, Pair<bool>) {
        let mut children = [seed.clear_lsb(), seed.set_lsb(true)];
        self.hash_in_place(&mut children);
        (
            Pair::new(children[0], children[1]),
            Pair::new(children[0].lsb(), children[1].lsb()),
        )
    }

    /// Stretches `seed` into `out.len()` blocks as `out[i] = AES(seed ^ i) ^ seed ^ i`
    pub fn stretch(&self, seed: &Block, out: &mut [Block]) {
        out.iter_mut()
            .enumerate()
            .for_each(|(i, o)| *o = *seed ^ Block::from_u128(i as u128));
        self.hash_in_place(out);
    }
}
