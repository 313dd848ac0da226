//! Server-side aggregation of database rows
use bitvec::prelude::*;
use tracing::debug;

use crate::{
    pset::{PuncturedSet, SetGenerator},
    Error, Prg, Result,
};

/// Zeroes `out` and XORs into it the `out.len()`-byte row starting at each byte offset in
/// `offsets`. Offsets whose row would run past the end of `db` are skipped.
pub fn xor_rows(db: &[u8], offsets: &[u64], out: &mut [u8]) {
    let row_len = out.len();
    out.fill(0);
    for offset in offsets {
        let start = match usize::try_from(*offset) {
            Ok(start) if start.checked_add(row_len).is_some_and(|end| end <= db.len()) => start,
            _ => continue,
        };
        out.iter_mut()
            .zip(&db[start..start + row_len])
            .for_each(|(o, d)| *o ^= d);
    }
}

/// Zeroes `out` and XORs into it every `row_len`-byte row `i` of `db` for which `bits[i]` is
/// set. Bits past the last row are ignored.
pub fn xor_rows_by_bits(db: &[u8], row_len: usize, bits: &BitSlice<u64, Lsb0>, out: &mut [u8]) {
    out.fill(0);
    let nrows = db.len() / row_len.max(1);
    for i in bits.iter_ones().take_while(|i| *i < nrows) {
        out.iter_mut()
            .zip(&db[i * row_len..(i + 1) * row_len])
            .for_each(|(o, d)| *o ^= d);
    }
}

/// Answers a punctured-set query: the XOR of the rows indexed by every element of the
/// punctured set, each shifted by `shift` modulo the universe size.
///
/// `gen` must be a generator for sets of `pset`'s original size, one more than the number of
/// rows aggregated.
#[allow(clippy::too_many_arguments)]
pub fn answer(
    prg: &Prg,
    gen: &mut SetGenerator,
    pset: &PuncturedSet,
    pos: usize,
    shift: u64,
    db: &[u8],
    row_len: usize,
    out: &mut [u8],
) -> Result<()> {
    if out.len() != row_len {
        return Err(Error::LengthMismatch {
            expected: row_len,
            actual: out.len(),
        });
    }

    let univ_size = gen.univ_size() as u64;
    let shift = shift % univ_size;
    let mut offsets = gen.eval_punc(prg, pset, pos)?;
    offsets
        .iter_mut()
        .for_each(|e| *e = ((*e + shift) % univ_size) * row_len as u64);

    xor_rows(db, &offsets, out);
    debug!(rows = offsets.len(), row_len, "answered punctured set query");
    Ok(())
}
