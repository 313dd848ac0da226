//! Multi-server PIR queries built from `nkeys` parallel one-bit DPFs.
//!
//! Every server receives one share of each DPF. Summing its shares at an item, weighted by
//! `2^i mod nservers`, yields a base-`nservers` digit. Away from the queried point all servers
//! obtain the same digit, while at the point server `w` obtains digit `w`. Each row of the
//! database is split into `nservers - 1` words and a server returns the XOR of word `digit` of
//! every row, skipping rows whose digit is `nservers - 1`.
use ark_serialize::{
    CanonicalDeserialize as Deserialize, CanonicalSerialize as Serialize, SerializationError,
};
use ark_std::io::{Read, Write};
use bitvec::prelude::*;
use rand::{CryptoRng, RngCore};
use tracing::debug;

use crate::{
    ceil_log2,
    point::{DpfKey, DpfParams, EvalScratch, GgmDpf},
    schemes::Database,
    Block, Error, Pair, Prg,
};


mod splice;
pub use splice::{splice, splice_portable, DIGITS_PER_BLOCK};

/// Number of extra DPFs used when `nservers` is not a power of two. The assignment of servers
/// to key shares is then within statistical distance `2^-soundness` of uniform.
pub const DEFAULT_SOUNDNESS: usize = 128;

/// Largest accepted soundness parameter
pub const MAX_SOUNDNESS: usize = 256;

/// Digits are stored in a byte
pub const MAX_SERVERS: usize = 255;

fn check_nservers(nservers: usize) -> crate::Result<()> {
    if !(2..=MAX_SERVERS).contains(&nservers) {
        return Err(Error::InvalidParams(format!(
            "number of servers must be in [2, {}], got {}",
            MAX_SERVERS, nservers
        )));
    }
    Ok(())
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct QueryParams {
    pub nitems: usize,
    pub nservers: usize,
    pub soundness: usize,
    /// Number of parallel DPFs
    pub nkeys: usize,
    dpf: DpfParams,
}

impl QueryParams {
    pub fn new(nitems: usize, nservers: usize) -> crate::Result<Self> {
        Self::with_soundness(nitems, nservers, DEFAULT_SOUNDNESS)
    }

    pub fn with_soundness(nitems: usize, nservers: usize, soundness: usize) -> crate::Result<Self> {
        check_nservers(nservers)?;
        if soundness > MAX_SOUNDNESS {
            return Err(Error::InvalidParams(format!(
                "soundness must be at most {}, got {}",
                MAX_SOUNDNESS, soundness
            )));
        }
        let dpf = DpfParams::for_leaf::<bool>(nitems)?;

        let nkeys = if nservers.is_power_of_two() {
            ceil_log2(nservers)
        } else {
            ceil_log2(nservers) + soundness
        };

        Ok(Self {
            nitems,
            nservers,
            soundness,
            nkeys,
            dpf,
        })
    }

    #[inline]
    pub fn dpf_params(&self) -> &DpfParams {
        &self.dpf
    }

    /// `2^i mod nservers` for every key `i`
    pub fn weights(&self) -> Vec<u8> {
        let mut w = 1 % self.nservers;
        (0..self.nkeys)
            .map(|_| {
                let out = w as u8;
                w = (2 * w) % self.nservers;
                out
            })
            .collect()
    }

    /// Number of words each row is split into
    #[inline]
    pub fn nwords(&self) -> usize {
        self.nservers - 1
    }

    /// Length of one word of a `row_len`-byte row
    #[inline]
    pub fn word_len(&self, row_len: usize) -> usize {
        row_len.div_ceil(self.nwords())
    }
}

/// The client's state for a single query: both shares of every DPF and the share selection of
/// every server.
pub struct Query {
    params: QueryParams,
    keys: Vec<Pair<DpfKey<bool>>>,
    /// `assignment[w][i]` selects which share of DPF `i` goes to server `w`
    assignment: Vec<BitVec<u8, Lsb0>>,
}

impl Query {
    /// Builds the shares of a query for `point`
    pub fn new<RNG: CryptoRng + RngCore>(
        prg: &Prg,
        params: &QueryParams,
        point: usize,
        rng: &mut RNG,
    ) -> crate::Result<Self> {
        // `perm[i]` is the value the first share of DPF `i` takes at `point`. The second share
        // takes the opposite value there.
        let mut keys = Vec::with_capacity(params.nkeys);
        let mut perm: BitVec<u8, Lsb0> = BitVec::with_capacity(params.nkeys);
        for _ in 0..params.nkeys {
            let (k0, k1, bit) = GgmDpf::gen_with_leaf(prg, &params.dpf, point, true, rng)?;
            keys.push(Pair::new(k0, k1));
            perm.push(bit);
        }

        // Selecting the shares `perm ^ r` makes the server's digit at `point` equal to
        // `sum(r_i * 2^i) mod nservers`
        let mut assignment = vec![BitVec::new(); params.nservers];
        if params.nservers.is_power_of_two() {
            for (w, selection) in assignment.iter_mut().enumerate() {
                *selection = perm
                    .iter()
                    .by_vals()
                    .enumerate()
                    .map(|(i, p)| p ^ ((w >> i) & 1 == 1))
                    .collect();
            }
        } else {
            let weights = params.weights();
            let mut filled = bitvec![0; params.nservers];
            let mut rounds = 0usize;

            // Terminates with probability 1. The expected number of rounds is about
            // `nservers * ln(nservers)`.
            while !filled.all() {
                rounds += 1;
                let mut rnd: BitVec<u8, Lsb0> = bitvec![u8, Lsb0; 0; params.nkeys];
                rng.fill_bytes(rnd.as_raw_mut_slice());

                let slot = rnd
                    .iter()
                    .by_vals()
                    .zip(&weights)
                    .filter(|(bit, _)| *bit)
                    .fold(0usize, |acc, (_, w)| (acc + *w as usize) % params.nservers);

                if !filled[slot] {
                    assignment[slot] = perm
                        .iter()
                        .by_vals()
                        .zip(rnd.iter().by_vals())
                        .map(|(p, r)| p ^ r)
                        .collect();
                    filled.set(slot, true);
                }
            }
            debug!(nservers = params.nservers, rounds, "assigned key shares to servers");
        }

        debug!(
            nitems = params.nitems,
            nservers = params.nservers,
            nkeys = params.nkeys,
            "built BitMore query"
        );
        Ok(Self {
            params: *params,
            keys,
            assignment,
        })
    }

    #[inline]
    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    /// The request sent to `server`
    pub fn request(&self, server: usize) -> crate::Result<Request> {
        let selection = self
            .assignment
            .get(server)
            .ok_or(Error::ServerOutOfRange {
                server,
                nservers: self.params.nservers,
            })?;
        let keys = self
            .keys
            .iter()
            .zip(selection.iter().by_vals())
            .map(|(pair, bit)| pair[bit].clone())
            .collect();
        Ok(Request {
            params: self.params,
            keys,
        })
    }
}

/// One server's share of a query
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Request {
    pub params: QueryParams,
    pub keys: Vec<DpfKey<bool>>,
}

impl Request {
    /// The digit of a single item
    pub fn eval(&self, prg: &Prg, item: usize) -> crate::Result<u8> {
        let weights = self.params.weights();
        let mut digit = 0usize;
        for (key, weight) in self.keys.iter().zip(weights) {
            if GgmDpf::eval_with(prg, key, item)? {
                digit += weight as usize;
            }
        }
        Ok((digit % self.params.nservers) as u8)
    }

    /// Computes the digit of every item into `digits`, which must hold `nitems` entries.
    ///
    /// All keys are evaluated over the full domain before their leaves are spliced together.
    pub fn expand_into(
        &self,
        prg: &Prg,
        scratch: &mut EvalScratch,
        digits: &mut [u8],
    ) -> crate::Result<()> {
        let params = &self.params;
        if digits.len() != params.nitems {
            return Err(Error::LengthMismatch {
                expected: params.nitems,
                actual: digits.len(),
            });
        }

        let leaf_count = params.dpf.output_blocks();
        let mut leaves = vec![Block::ZERO; params.nkeys * leaf_count];
        for (key, out) in self.keys.iter().zip(leaves.chunks_exact_mut(leaf_count)) {
            GgmDpf::eval_full_into(prg, key, scratch, out)?;
        }

        let weights = params.weights();
        let mut masks = vec![Block::ZERO; params.nkeys];
        let mut block = [0u8; DIGITS_PER_BLOCK];
        for (j, chunk) in digits.chunks_mut(DIGITS_PER_BLOCK).enumerate() {
            masks
                .iter_mut()
                .enumerate()
                .for_each(|(l, m)| *m = leaves[l * leaf_count + j]);
            splice(&masks, &weights, params.nservers as u8, &mut block);
            chunk.copy_from_slice(&block[..chunk.len()]);
        }

        debug!(nitems = params.nitems, nkeys = params.nkeys, "expanded BitMore request");
        Ok(())
    }

    /// Allocating wrapper around [`Self::expand_into`]
    pub fn expand(&self, prg: &Prg) -> crate::Result<Vec<u8>> {
        let mut scratch = EvalScratch::new(&self.params.dpf);
        let mut digits = vec![0u8; self.params.nitems];
        self.expand_into(prg, &mut scratch, &mut digits)?;
        Ok(digits)
    }

    /// The server's response: one word of XOR-accumulated database bytes
    pub fn answer(&self, prg: &Prg, db: &Database) -> crate::Result<Vec<u8>> {
        let digits = self.expand(prg)?;
        answer_digits(&digits, self.params.nservers, db)
    }
}

/// XORs word `digits[i]` of every row `i` of `db`, skipping rows whose digit is
/// `nservers - 1`. Words are `ceil(row_len / (nservers - 1))` bytes and the final word of a row
/// is zero-padded.
pub fn answer_digits(digits: &[u8], nservers: usize, db: &Database) -> crate::Result<Vec<u8>> {
    if digits.len() != db.nitems() {
        return Err(Error::LengthMismatch {
            expected: db.nitems(),
            actual: digits.len(),
        });
    }
    check_nservers(nservers)?;
    let nwords = nservers - 1;
    let word_len = db.row_len().div_ceil(nwords);

    let mut out = vec![0u8; word_len];
    for (i, digit) in digits.iter().enumerate() {
        let digit = *digit as usize;
        if digit >= nwords {
            continue;
        }
        let row = db.row(i);
        let start = (digit * word_len).min(row.len());
        let end = (start + word_len).min(row.len());
        out.iter_mut()
            .zip(&row[start..end])
            .for_each(|(o, r)| *o ^= r);
    }
    Ok(out)
}

/// Recovers a `row_len`-byte row from the responses of all `nservers` servers, ordered by server
pub fn reconstruct(responses: &[Vec<u8>], row_len: usize) -> crate::Result<Vec<u8>> {
    let (last, rest) = responses
        .split_last()
        .ok_or_else(|| Error::InvalidParams("no responses to reconstruct from".into()))?;
    if rest.is_empty() {
        return Err(Error::InvalidParams(
            "at least two responses are required".into(),
        ));
    }

    let word_len = row_len.div_ceil(rest.len());
    let mut row = Vec::with_capacity(word_len * rest.len());
    for response in responses {
        if response.len() != word_len {
            return Err(Error::LengthMismatch {
                expected: word_len,
                actual: response.len(),
            });
        }
    }
    for response in rest {
        row.extend(response.iter().zip(last).map(|(a, b)| a ^ b));
    }
    row.truncate(row_len);
    Ok(row)
}

/// Requests are framed by `(nitems, nservers, soundness)` followed by the raw bytes of every key.
impl Serialize for Request {
    fn serialize<W: Write>(&self, mut writer: W) -> Result<(), SerializationError> {
        (self.params.nitems as u64).serialize(&mut writer)?;
        (self.params.nservers as u64).serialize(&mut writer)?;
        (self.params.soundness as u64).serialize(&mut writer)?;
        for key in &self.keys {
            writer.write_all(&key.to_bytes())?;
        }
        Ok(())
    }

    fn serialized_size(&self) -> usize {
        24 + self.params.nkeys * self.params.dpf.key_size()
    }
}

impl Deserialize for Request {
    fn deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let nitems = u64::deserialize(&mut reader)? as usize;
        let nservers = u64::deserialize(&mut reader)? as usize;
        let soundness = u64::deserialize(&mut reader)? as usize;
        let params = QueryParams::with_soundness(nitems, nservers, soundness)
            .map_err(|_| SerializationError::InvalidData)?;

        let mut bytes = vec![0u8; params.dpf.key_size()];
        let mut keys = Vec::with_capacity(params.nkeys);
        for _ in 0..params.nkeys {
            reader.read_exact(&mut bytes)?;
            let key = DpfKey::from_bytes(params.dpf, &bytes)
                .map_err(|_| SerializationError::InvalidData)?;
            keys.push(key);
        }
        Ok(Self { params, keys })
    }
}
