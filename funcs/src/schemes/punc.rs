//! Two-server PIR with offline hints over puncturable sets.
//!
//! During an offline phase the left server expands a client-chosen key into many sets of about
//! `sqrt(nitems)` rows and returns the XOR of the rows of each set as a hint. To read row `i` the
//! client picks a stored set containing `i`, punctures it at `i` and sends it to the right
//! server, whose answer differs from the hint by exactly row `i`. A freshly sampled set through
//! `i` goes to the left server and its answer becomes the replacement hint. With probability
//! about `2 / sqrt(nitems)` both servers instead receive the fresh set, punctured at two
//! different points, so that the right server's view does not depend on the stored sets.
use ark_serialize::{
    CanonicalDeserialize as Deserialize, CanonicalSerialize as Serialize, SerializationError,
};
use ark_std::io::{Read, Write};
use rand::{CryptoRng, Rng, RngCore};
use tracing::debug;

use super::Database;
use crate::{
    pset::{distinct, PuncturedSet, SetGenerator},
    xor::{self, xor_rows},
    Block, Error, Prg, BLOCK_SIZE,
};

/// Hints per row of the database, `floor(128 * ln 2)`. A row is left uncovered by every hint set
/// with probability about `2^-128`.
pub const DEFAULT_HINTS_MULTIPLIER: usize = 88;

const SEED_TAG: u8 = 0xAA;
const SHIFT_TAG: u8 = 0xBB;

/// Size of the hint sets for a database of `nitems` rows: `sqrt(nitems)` rounded, and at least 2
pub fn punc_set_size(nitems: usize) -> crate::Result<usize> {
    if nitems < 2 {
        return Err(Error::InvalidParams(format!(
            "punctured set PIR needs at least 2 rows, got {}",
            nitems
        )));
    }
    Ok(((nitems as f64).sqrt().round() as usize).clamp(2, nitems))
}

/// Identifies a set drawn by a [`SetSampler`]: the id its seed is derived from and the shift
/// applied to every element.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SetKey {
    pub id: u32,
    pub shift: u64,
}

/// A set expanded from its key. `elems` are shifted and pairwise distinct.
#[derive(Clone, Debug)]
pub struct SampledSet {
    pub key: SetKey,
    pub seed: Block,
    pub elems: Vec<u64>,
}

/// Draws sets with distinct elements from a secret key. Set `id` is seeded with the encryption
/// of `(0xAA, id)` under the key and `(0xBB, id)` selects its shift, so anyone holding the key
/// reproduces the same sequence of sets.
pub struct SetSampler {
    cipher: Prg,
    gen: SetGenerator,
    next_id: u32,
}

impl SetSampler {
    pub fn new(
        key: [u8; BLOCK_SIZE],
        start_id: u32,
        univ_size: usize,
        set_size: usize,
    ) -> crate::Result<Self> {
        Ok(Self {
            cipher: Prg::with_key(key),
            gen: SetGenerator::new(univ_size, set_size)?,
            next_id: start_id,
        })
    }

    /// The id the next sampled set will be tried with
    #[inline]
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    #[inline]
    pub fn univ_size(&self) -> usize {
        self.gen.univ_size()
    }

    #[inline]
    pub fn set_size(&self) -> usize {
        self.gen.set_size()
    }

    /// Samples the next set with distinct elements, shifted by a pseudorandom amount below the
    /// set size.
    pub fn sample(&mut self, prg: &Prg) -> crate::Result<SampledSet> {
        let (id, seed, elems) = self.sample_distinct(prg)?;
        let shift = self.derive(SHIFT_TAG, id).lane_u32(0) as u64 % self.set_size() as u64;
        Ok(self.shifted(SetKey { id, shift }, seed, elems))
    }

    /// Samples the next set with distinct elements, shifted so that the element at a
    /// pseudorandom position becomes `val`.
    pub fn sample_with(&mut self, prg: &Prg, val: u64) -> crate::Result<SampledSet> {
        let univ_size = self.univ_size() as u64;
        if val >= univ_size {
            return Err(Error::PointOutOfRange {
                point: val as usize,
                nitems: self.univ_size(),
            });
        }

        let (id, seed, elems) = self.sample_distinct(prg)?;
        let pos = self.derive(SHIFT_TAG, id).lane_u64(0) % self.set_size() as u64;
        let shift = (val + univ_size - elems[pos as usize]) % univ_size;
        Ok(self.shifted(SetKey { id, shift }, seed, elems))
    }

    /// Expands the set identified by `key`
    pub fn eval(&mut self, prg: &Prg, key: SetKey) -> SampledSet {
        let seed = self.derive(SEED_TAG, key.id);
        let elems = self.gen.eval(prg, &seed);
        self.shifted(key, seed, elems)
    }

    /// Punctures `set` at the position holding `elem` and asks for row `extra` alongside
    pub fn punc(
        &self,
        prg: &Prg,
        set: &SampledSet,
        elem: u64,
        extra: u64,
    ) -> crate::Result<PuncQuery> {
        let hole = set
            .elems
            .iter()
            .position(|e| *e == elem)
            .ok_or_else(|| Error::InvalidParams(format!("{} is not in the set", elem)))?;
        Ok(PuncQuery {
            set_size: self.set_size(),
            hole,
            shift: set.key.shift,
            extra: extra as usize,
            pset: self.gen.punc(prg, &set.seed, hole)?,
        })
    }

    fn sample_distinct(&mut self, prg: &Prg) -> crate::Result<(u32, Block, Vec<u64>)> {
        loop {
            let id = self.next_id;
            self.next_id = id
                .checked_add(1)
                .ok_or_else(|| Error::InvalidParams("set ids exhausted".into()))?;

            let seed = self.derive(SEED_TAG, id);
            let elems = self.gen.eval(prg, &seed);
            if distinct(&elems) {
                return Ok((id, seed, elems));
            }
        }
    }

    fn derive(&self, tag: u8, id: u32) -> Block {
        let mut block = [Block::ZERO];
        block[0].0[0] = tag;
        block[0].0[1..5].copy_from_slice(&id.to_le_bytes());
        self.cipher.encrypt_blocks(&mut block);
        block[0]
    }

    fn shifted(&self, key: SetKey, seed: Block, mut elems: Vec<u64>) -> SampledSet {
        let univ_size = self.univ_size() as u64;
        if key.shift != 0 {
            elems
                .iter_mut()
                .for_each(|e| *e = (*e + key.shift % univ_size) % univ_size);
        }
        SampledSet { key, seed, elems }
    }
}

/// The client's request for hints. The key seeds every hint set and must stay hidden from the
/// right server.
#[derive(Clone, Debug)]
pub struct PuncHintRequest {
    pub key: [u8; BLOCK_SIZE],
    pub hints_multiplier: usize,
}

impl PuncHintRequest {
    pub fn new<RNG: CryptoRng + RngCore>(rng: &mut RNG) -> Self {
        let mut key = [0u8; BLOCK_SIZE];
        rng.fill_bytes(&mut key);
        Self {
            key,
            hints_multiplier: DEFAULT_HINTS_MULTIPLIER,
        }
    }
}

/// The left server's offline answer: one XOR of rows per set drawn from the request's key
#[derive(Clone, Debug)]
pub struct PuncHint {
    pub nitems: usize,
    pub row_len: usize,
    pub set_size: usize,
    pub key: [u8; BLOCK_SIZE],
    pub hints: Vec<Vec<u8>>,
}

/// One server's share of an online query
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PuncQuery {
    /// Size of the set before puncturing
    pub set_size: usize,
    pub hole: usize,
    pub shift: u64,
    /// A row returned in the clear next to the answer
    pub extra: usize,
    pub pset: PuncturedSet,
}

impl Serialize for PuncQuery {
    fn serialize<W: Write>(&self, mut writer: W) -> Result<(), SerializationError> {
        (self.set_size as u64).serialize(&mut writer)?;
        (self.hole as u64).serialize(&mut writer)?;
        self.shift.serialize(&mut writer)?;
        (self.extra as u64).serialize(&mut writer)?;
        self.pset.serialize(&mut writer)
    }

    fn serialized_size(&self) -> usize {
        32 + self.pset.serialized_size()
    }
}

impl Deserialize for PuncQuery {
    fn deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let set_size = u64::deserialize(&mut reader)? as usize;
        let hole = u64::deserialize(&mut reader)? as usize;
        let shift = u64::deserialize(&mut reader)?;
        let extra = u64::deserialize(&mut reader)? as usize;
        let pset = PuncturedSet::deserialize(&mut reader)?;
        Ok(Self {
            set_size,
            hole,
            shift,
            extra,
            pset,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PuncResponse {
    /// XOR of the rows of the punctured set
    pub answer: Vec<u8>,
    /// The requested extra row
    pub extra: Vec<u8>,
}

impl Serialize for PuncResponse {
    fn serialize<W: Write>(&self, mut writer: W) -> Result<(), SerializationError> {
        self.answer.serialize(&mut writer)?;
        self.extra.serialize(&mut writer)
    }

    fn serialized_size(&self) -> usize {
        self.answer.serialized_size() + self.extra.serialized_size()
    }
}

impl Deserialize for PuncResponse {
    fn deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let answer = Vec::<u8>::deserialize(&mut reader)?;
        let extra = Vec::<u8>::deserialize(&mut reader)?;
        Ok(Self { answer, extra })
    }
}

/// Server side of the punctured set scheme
pub struct Punc;

impl Punc {
    /// Builds the hints for `request` over `db`
    pub fn hint(prg: &Prg, request: &PuncHintRequest, db: &Database) -> crate::Result<PuncHint> {
        let nitems = db.nitems();
        let set_size = punc_set_size(nitems)?;
        let nhints = request.hints_multiplier * nitems / set_size;
        let mut sampler = SetSampler::new(request.key, 0, nitems, set_size)?;

        let mut offsets = vec![0u64; set_size];
        let mut hints = Vec::with_capacity(nhints);
        for _ in 0..nhints {
            let set = sampler.sample(prg)?;
            offsets
                .iter_mut()
                .zip(&set.elems)
                .for_each(|(o, e)| *o = e * db.row_len() as u64);
            let mut hint = vec![0u8; db.row_len()];
            xor_rows(db.bytes(), &offsets, &mut hint);
            hints.push(hint);
        }

        debug!(nitems, set_size, nhints, "built punctured set hints");
        Ok(PuncHint {
            nitems,
            row_len: db.row_len(),
            set_size,
            key: request.key,
            hints,
        })
    }

    pub fn answer(prg: &Prg, query: &PuncQuery, db: &Database) -> crate::Result<PuncResponse> {
        if query.extra >= db.nitems() {
            return Err(Error::PointOutOfRange {
                point: query.extra,
                nitems: db.nitems(),
            });
        }
        if query.set_size > db.nitems() {
            return Err(Error::InvalidParams(format!(
                "sets of {} elements do not fit in {} rows",
                query.set_size,
                db.nitems()
            )));
        }

        let mut gen = SetGenerator::new(db.nitems(), query.set_size)?;
        let mut answer = vec![0u8; db.row_len()];
        xor::answer(
            prg,
            &mut gen,
            &query.pset,
            query.hole,
            query.shift,
            db.bytes(),
            db.row_len(),
            &mut answer,
        )?;
        Ok(PuncResponse {
            answer,
            extra: db.row(query.extra).to_vec(),
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum QueryCase {
    /// The right server holds the stored set. The left server's answer is the hint of the
    /// fresh set that replaces it.
    Refresh(SetKey),
    /// Both servers hold the fresh set. Only the right one is punctured at the queried row.
    RightExtra,
    /// Both servers hold the fresh set. Only the left one is punctured at the queried row.
    LeftExtra,
}

/// What the client needs to remember between a query and its reconstruction
#[derive(Copy, Clone, Debug)]
pub struct PuncQueryState {
    set_idx: usize,
    case: QueryCase,
}

/// Client of the punctured set scheme, holding the hints and the keys of their sets
pub struct PuncClient {
    nitems: usize,
    row_len: usize,
    set_size: usize,
    sets: Vec<SetKey>,
    hints: Vec<Vec<u8>>,
    hint_sampler: SetSampler,
    fresh_sampler: SetSampler,
    /// A set known to contain each row, if any
    index: Vec<Option<usize>>,
}

impl PuncClient {
    /// Replays the sets behind `hint` and indexes their rows. Sets drawn later come from a fresh
    /// key that the left server never sees.
    pub fn new<RNG: CryptoRng + RngCore>(
        prg: &Prg,
        hint: PuncHint,
        rng: &mut RNG,
    ) -> crate::Result<Self> {
        let mut hint_sampler = SetSampler::new(hint.key, 0, hint.nitems, hint.set_size)?;
        let mut index = vec![None; hint.nitems];
        let mut sets = Vec::with_capacity(hint.hints.len());
        for (j, h) in hint.hints.iter().enumerate() {
            if h.len() != hint.row_len {
                return Err(Error::LengthMismatch {
                    expected: hint.row_len,
                    actual: h.len(),
                });
            }
            let set = hint_sampler.sample(prg)?;
            for e in &set.elems {
                index[*e as usize] = Some(j);
            }
            sets.push(set.key);
        }

        let mut fresh_key = [0u8; BLOCK_SIZE];
        rng.fill_bytes(&mut fresh_key);
        let fresh_sampler = SetSampler::new(
            fresh_key,
            hint_sampler.next_id(),
            hint.nitems,
            hint.set_size,
        )?;

        Ok(Self {
            nitems: hint.nitems,
            row_len: hint.row_len,
            set_size: hint.set_size,
            sets,
            hints: hint.hints,
            hint_sampler,
            fresh_sampler,
            index,
        })
    }

    #[inline]
    pub fn nitems(&self) -> usize {
        self.nitems
    }

    #[inline]
    pub fn nhints(&self) -> usize {
        self.hints.len()
    }

    /// Builds the queries for row `point`, addressed to the left and right server in that order
    pub fn query<RNG: CryptoRng + RngCore>(
        &mut self,
        prg: &Prg,
        point: usize,
        rng: &mut RNG,
    ) -> crate::Result<([PuncQuery; 2], PuncQueryState)> {
        if point >= self.nitems {
            return Err(Error::PointOutOfRange {
                point,
                nitems: self.nitems,
            });
        }
        let set_idx = self
            .find_index(prg, point)
            .ok_or_else(|| Error::InvalidParams(format!("no hint set covers row {}", point)))?;

        let elem = point as u64;
        let fresh = self.fresh_sampler.sample_with(prg, elem)?;
        let odds = self.set_size - 1;
        let coin = rng.gen_range(0..self.nitems);

        let (queries, case) = if coin < odds {
            let extra_right = random_member_except(&fresh, elem, rng);
            let extra_left = random_member_except(&fresh, extra_right, rng);
            let left = self.fresh_sampler.punc(prg, &fresh, extra_right, extra_left)?;
            let right = self.fresh_sampler.punc(prg, &fresh, elem, extra_right)?;
            ([left, right], QueryCase::RightExtra)
        } else if coin < 2 * odds {
            let extra_left = random_member_except(&fresh, elem, rng);
            let extra_right = random_member_except(&fresh, extra_left, rng);
            let left = self.fresh_sampler.punc(prg, &fresh, elem, extra_left)?;
            let right = self.fresh_sampler.punc(prg, &fresh, extra_left, extra_right)?;
            ([left, right], QueryCase::LeftExtra)
        } else {
            let stored = self.eval_set(prg, self.sets[set_idx]);
            let extra_left = random_member_except(&fresh, elem, rng);
            let extra_right = random_member_except(&stored, elem, rng);
            let left = self.fresh_sampler.punc(prg, &fresh, elem, extra_left)?;
            let right = self.fresh_sampler.punc(prg, &stored, elem, extra_right)?;
            ([left, right], QueryCase::Refresh(fresh.key))
        };

        Ok((queries, PuncQueryState { set_idx, case }))
    }

    /// Recovers the queried row from the left and right responses. A refreshed query also
    /// replaces the consumed hint.
    pub fn reconstruct(
        &mut self,
        prg: &Prg,
        state: PuncQueryState,
        responses: &[PuncResponse; 2],
    ) -> crate::Result<Vec<u8>> {
        for response in responses {
            for part in [&response.answer, &response.extra] {
                if part.len() != self.row_len {
                    return Err(Error::LengthMismatch {
                        expected: self.row_len,
                        actual: part.len(),
                    });
                }
            }
        }
        let [left, right] = responses;

        let row = match state.case {
            QueryCase::Refresh(key) => {
                let row = xor_all(&[&self.hints[state.set_idx], &right.answer]);
                self.hints[state.set_idx] = xor_all(&[&left.answer, &row]);
                self.replace_set(prg, state.set_idx, key);
                row
            }
            QueryCase::RightExtra => xor_all(&[&left.answer, &right.answer, &right.extra]),
            QueryCase::LeftExtra => xor_all(&[&left.answer, &right.answer, &left.extra]),
        };
        Ok(row)
    }

    /// The set holding `point`. Falls back to scanning every set, repairing the index of each
    /// row seen on the way.
    fn find_index(&mut self, prg: &Prg, point: usize) -> Option<usize> {
        if let Some(j) = self.index[point] {
            return Some(j);
        }
        for j in 0..self.sets.len() {
            let set = self.eval_set(prg, self.sets[j]);
            for e in set.elems {
                let e = e as usize;
                if e == point {
                    return Some(j);
                }
                self.index[e] = Some(j);
            }
        }
        None
    }

    fn eval_set(&mut self, prg: &Prg, key: SetKey) -> SampledSet {
        if key.id < self.hint_sampler.next_id() {
            self.hint_sampler.eval(prg, key)
        } else {
            self.fresh_sampler.eval(prg, key)
        }
    }

    fn replace_set(&mut self, prg: &Prg, set_idx: usize, key: SetKey) {
        let old = self.eval_set(prg, self.sets[set_idx]);
        for e in old.elems {
            let slot = &mut self.index[e as usize];
            if *slot == Some(set_idx) {
                *slot = None;
            }
        }

        self.sets[set_idx] = key;
        let new = self.eval_set(prg, key);
        for e in new.elems {
            self.index[e as usize] = Some(set_idx);
        }
    }
}

/// A uniformly random element of `set` other than `except`. `set` has at least two distinct
/// elements.
fn random_member_except<RNG: RngCore>(set: &SampledSet, except: u64, rng: &mut RNG) -> u64 {
    loop {
        let e = set.elems[rng.gen_range(0..set.elems.len())];
        if e != except {
            return e;
        }
    }
}

fn xor_all(rows: &[&Vec<u8>]) -> Vec<u8> {
    let mut out = vec![0u8; rows.first().map_or(0, |r| r.len())];
    for row in rows {
        out.iter_mut().zip(row.iter()).for_each(|(o, r)| *o ^= r);
    }
    out
}
