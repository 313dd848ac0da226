//! End-to-end PIR schemes built from the primitives of this crate.
//!
//! Each scheme exposes a client `query`, a server `answer` against a [`Database`] and a client
//! `reconstruct` that combines the answers of all servers into the requested row. The punctured
//! set scheme adds an offline hint built by one of the servers.
use ark_serialize::{
    CanonicalDeserialize as Deserialize, CanonicalSerialize as Serialize, SerializationError,
};
use ark_std::io::{Read, Write};
use bitvec::prelude::*;
use rand::{CryptoRng, Rng, RngCore};
use tracing::debug;

use crate::{
    bitmore,
    point::{DpfKey, DpfParams, GgmDpf},
    xor::xor_rows_by_bits,
    Block, Error, Prg,
};


mod punc;
pub use punc::{
    punc_set_size, Punc, PuncClient, PuncHint, PuncHintRequest, PuncQuery, PuncQueryState,
    PuncResponse, SampledSet, SetKey, SetSampler, DEFAULT_HINTS_MULTIPLIER,
};

/// A read-only view of `nitems` rows of `row_len` bytes each, stored back to back
#[derive(Copy, Clone, Debug)]
pub struct Database<'a> {
    bytes: &'a [u8],
    nitems: usize,
    row_len: usize,
}

impl<'a> Database<'a> {
    pub fn new(bytes: &'a [u8], row_len: usize) -> crate::Result<Self> {
        if row_len == 0 || bytes.is_empty() || bytes.len() % row_len != 0 {
            return Err(Error::InvalidParams(format!(
                "{} bytes cannot be split into rows of {} bytes",
                bytes.len(),
                row_len
            )));
        }
        Ok(Self {
            bytes,
            nitems: bytes.len() / row_len,
            row_len,
        })
    }

    #[inline]
    pub fn nitems(&self) -> usize {
        self.nitems
    }

    #[inline]
    pub fn row_len(&self) -> usize {
        self.row_len
    }

    #[inline]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    #[inline]
    pub fn row(&self, i: usize) -> &'a [u8] {
        &self.bytes[i * self.row_len..(i + 1) * self.row_len]
    }

    /// XOR of the rows selected by `bits`
    pub fn xor_selected(&self, bits: &BitSlice<u64, Lsb0>) -> Vec<u8> {
        let mut out = vec![0u8; self.row_len];
        xor_rows_by_bits(self.bytes, self.row_len, bits, &mut out);
        out
    }
}

/// XORs equally long responses together
pub fn xor_responses(responses: &[Vec<u8>]) -> crate::Result<Vec<u8>> {
    let (first, rest) = responses
        .split_first()
        .ok_or_else(|| Error::InvalidParams("no responses to reconstruct from".into()))?;
    let mut out = first.clone();
    for response in rest {
        if response.len() != out.len() {
            return Err(Error::LengthMismatch {
                expected: out.len(),
                actual: response.len(),
            });
        }
        out.iter_mut().zip(response).for_each(|(o, r)| *o ^= r);
    }
    Ok(out)
}

fn check_point(point: usize, nitems: usize) -> crate::Result<()> {
    if point >= nitems {
        return Err(Error::PointOutOfRange { point, nitems });
    }
    Ok(())
}

/// One server's share of a two-server query: a selection bit per row
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BitQuery(pub BitVec<u64, Lsb0>);

impl Serialize for BitQuery {
    fn serialize<W: Write>(&self, mut writer: W) -> Result<(), SerializationError> {
        (self.0.len() as u64).serialize(&mut writer)?;
        for word in self.0.as_raw_slice() {
            word.serialize(&mut writer)?;
        }
        Ok(())
    }

    fn serialized_size(&self) -> usize {
        8 * (1 + self.0.as_raw_slice().len())
    }
}

impl Deserialize for BitQuery {
    fn deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let nbits = u64::deserialize(&mut reader)? as usize;
        let words = (0..nbits.div_ceil(64))
            .map(|_| u64::deserialize(&mut reader))
            .collect::<Result<Vec<_>, _>>()?;
        let mut bits = BitVec::from_vec(words);
        bits.truncate(nbits);
        Ok(Self(bits))
    }
}

/// The information-theoretic two-server scheme of Chor et al.: the servers receive random
/// subsets of the rows that differ only in the queried row.
pub struct Chor;

impl Chor {
    pub fn query<RNG: CryptoRng + RngCore>(
        nitems: usize,
        point: usize,
        rng: &mut RNG,
    ) -> crate::Result<[BitQuery; 2]> {
        check_point(point, nitems)?;

        let mut first = bitvec![u64, Lsb0; 0; nitems];
        rng.fill(first.as_raw_mut_slice());
        let mut second = first.clone();
        let flipped = !second[point];
        second.set(point, flipped);

        debug!(nitems, "built Chor query");
        Ok([BitQuery(first), BitQuery(second)])
    }

    pub fn answer(query: &BitQuery, db: &Database) -> crate::Result<Vec<u8>> {
        if query.0.len() != db.nitems() {
            return Err(Error::LengthMismatch {
                expected: db.nitems(),
                actual: query.0.len(),
            });
        }
        Ok(db.xor_selected(&query.0))
    }

    pub fn reconstruct(responses: &[Vec<u8>; 2]) -> crate::Result<Vec<u8>> {
        xor_responses(responses)
    }
}

/// The two-server scheme of Boyle et al.: the servers receive the shares of a one-bit DPF and
/// expand them into complementary subsets of the rows.
pub struct Boyle;

impl Boyle {
    pub fn query<RNG: CryptoRng + RngCore>(
        prg: &Prg,
        nitems: usize,
        point: usize,
        rng: &mut RNG,
    ) -> crate::Result<[DpfKey<bool>; 2]> {
        let params = DpfParams::for_leaf::<bool>(nitems)?;
        let (k0, k1, _) = GgmDpf::gen_with_leaf(prg, &params, point, true, rng)?;
        debug!(nitems, "built Boyle query");
        Ok([k0, k1])
    }

    pub fn answer(prg: &Prg, key: &DpfKey<bool>, db: &Database) -> crate::Result<Vec<u8>> {
        if key.params.nitems != db.nitems() {
            return Err(Error::LengthMismatch {
                expected: db.nitems(),
                actual: key.params.nitems,
            });
        }
        let leaves = GgmDpf::eval_full_with(prg, key)?;
        Ok(db.xor_selected(&Self::selection(&leaves)))
    }

    pub fn reconstruct(responses: &[Vec<u8>; 2]) -> crate::Result<Vec<u8>> {
        xor_responses(responses)
    }

    /// Reinterprets packed one-bit leaves as a bit vector over the rows
    fn selection(leaves: &[Block]) -> BitVec<u64, Lsb0> {
        let words = leaves
            .iter()
            .flat_map(|leaf| [leaf.lane_u64(0), leaf.lane_u64(1)])
            .collect();
        BitVec::from_vec(words)
    }
}

/// One server's share of a plain BitMore query: a digit per row
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DigitQuery {
    pub nservers: u8,
    pub digits: Vec<u8>,
}

impl Serialize for DigitQuery {
    fn serialize<W: Write>(&self, mut writer: W) -> Result<(), SerializationError> {
        self.nservers.serialize(&mut writer)?;
        self.digits.serialize(&mut writer)
    }

    fn serialized_size(&self) -> usize {
        1 + self.digits.serialized_size()
    }
}

impl Deserialize for DigitQuery {
    fn deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let nservers = u8::deserialize(&mut reader)?;
        if nservers < 2 {
            return Err(SerializationError::InvalidData);
        }
        let digits = Vec::<u8>::deserialize(&mut reader)?;
        Ok(Self { nservers, digits })
    }
}

/// The information-theoretic variant of BitMore: every row gets a uniformly random digit shared
/// by all servers, except the queried row, whose digit is the index of the server.
pub struct PlainBitMore;

impl PlainBitMore {
    pub fn query<RNG: CryptoRng + RngCore>(
        nitems: usize,
        nservers: usize,
        point: usize,
        rng: &mut RNG,
    ) -> crate::Result<Vec<DigitQuery>> {
        check_point(point, nitems)?;
        if !(2..=bitmore::MAX_SERVERS).contains(&nservers) {
            return Err(Error::InvalidParams(format!(
                "number of servers must be in [2, {}], got {}",
                bitmore::MAX_SERVERS,
                nservers
            )));
        }

        let mut digits: Vec<u8> = (0..nitems)
            .map(|_| rng.gen_range(0..nservers) as u8)
            .collect();
        let queries = (0..nservers)
            .map(|k| {
                digits[point] = k as u8;
                DigitQuery {
                    nservers: nservers as u8,
                    digits: digits.clone(),
                }
            })
            .collect();

        debug!(nitems, nservers, "built plain BitMore query");
        Ok(queries)
    }

    pub fn answer(query: &DigitQuery, db: &Database) -> crate::Result<Vec<u8>> {
        bitmore::answer_digits(&query.digits, query.nservers as usize, db)
    }

    pub fn reconstruct(responses: &[Vec<u8>], row_len: usize) -> crate::Result<Vec<u8>> {
        bitmore::reconstruct(responses, row_len)
    }
}
