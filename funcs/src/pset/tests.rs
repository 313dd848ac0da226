use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::test_rng;
use rand::Rng;

use super::*;

#[test]
fn test_height() {
    assert_eq!(get_height(1), 1);
    assert_eq!(get_height(2), 1);
    assert_eq!(get_height(3), 2);
    assert_eq!(get_height(4), 2);
    assert_eq!(get_height(5), 3);
    assert_eq!(get_height(1024), 10);
    assert_eq!(get_height(1025), 11);

    assert_eq!(workspace_size(1 << 20, 1024), 2 * 1024 * 16);

    for set_size in [1, 3, 100, 1024] {
        let gen = SetGenerator::new(1 << 20, set_size).unwrap();
        let allocated = (gen.keys.len() + gen.tmp.len()) * BLOCK_SIZE;
        assert_eq!(allocated, workspace_size(1 << 20, set_size));
    }
}

#[test]
fn test_single_element_set() {
    // A single-element set is the reduced first lane of the seed itself
    let prg = Prg::fixed();
    let mut gen = SetGenerator::new(1 << 20, 1).unwrap();
    assert_eq!(gen.eval(prg, &Block::ZERO), vec![0]);

    let seed = Block::from_u128(0xffff_ffff);
    assert_eq!(gen.eval(prg, &seed), vec![(1 << 20) - 1]);

    let pset = gen.punc(prg, &Block::ZERO, 0).unwrap();
    assert_eq!(pset.keys.len(), 1);
    assert!(gen.eval_punc(prg, &pset, 0).unwrap().is_empty());
}

#[test]
fn test_elements_in_universe() {
    let mut rng = test_rng();
    let prg = Prg::fixed();

    for (univ_size, set_size) in [(1, 5), (7, 100), (1000, 64), (1 << 20, 1024)] {
        let mut gen = SetGenerator::new(univ_size, set_size).unwrap();
        let seed = SetGenerator::sample_seed(&mut rng);
        let elems = gen.eval(prg, &seed);
        assert_eq!(elems.len(), set_size);
        assert!(elems.iter().all(|e| (*e as usize) < univ_size));

        // Reusing the generator gives the same set
        assert_eq!(elems, gen.eval(prg, &seed));
    }
}

#[test]
fn test_elem_at_matches_eval() {
    let mut rng = test_rng();
    let prg = Prg::fixed();

    for set_size in [1, 2, 3, 4, 5, 17, 64, 100] {
        let mut gen = SetGenerator::new(1 << 16, set_size).unwrap();
        let seed = SetGenerator::sample_seed(&mut rng);
        let elems = gen.eval(prg, &seed);
        for (pos, e) in elems.iter().enumerate() {
            assert_eq!(gen.elem_at(prg, &seed, pos).unwrap(), *e);
        }
        assert!(gen.elem_at(prg, &seed, set_size).is_err());

        let pos = rng.gen_range(0..set_size);
        let found = gen.find_pos(prg, &seed, elems[pos]).unwrap();
        assert_eq!(elems[found], elems[pos]);
    }
}

#[test]
fn test_punc_round_trip() {
    // Evaluating a punctured set yields the full set with the punctured position removed
    let mut rng = test_rng();
    let prg = Prg::fixed();

    for set_size in [2, 3, 4, 5, 8, 13, 32, 33] {
        let mut gen = SetGenerator::new(1 << 20, set_size).unwrap();
        let seed = SetGenerator::sample_seed(&mut rng);
        let elems = gen.eval(prg, &seed);

        for pos in 0..set_size {
            let pset = gen.punc(prg, &seed, pos).unwrap();
            assert_eq!(pset.keys.len(), gen.punc_blocks());

            let mut expected = elems.clone();
            expected.remove(pos);
            assert_eq!(gen.eval_punc(prg, &pset, pos).unwrap(), expected);
        }
    }
}

#[test]
fn test_punc_hides_element() {
    // The punctured lane is zeroed, so the element at `pos` cannot be read from the last block
    let prg = Prg::fixed();
    let gen = SetGenerator::new(1 << 20, 16).unwrap();
    let seed = Block::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);

    for pos in 0..16 {
        let pset = gen.punc(prg, &seed, pos).unwrap();
        let last = pset.keys.last().unwrap();
        assert_eq!(last.lane_u32(pos % 4), 0);
    }
}

#[test]
fn test_bad_inputs() {
    let mut rng = test_rng();
    let prg = Prg::fixed();
    assert!(SetGenerator::new(0, 10).is_err());
    assert!(SetGenerator::new(10, 0).is_err());

    let mut gen = SetGenerator::new(1000, 20).unwrap();
    let seed = SetGenerator::sample_seed(&mut rng);
    assert!(gen.punc(prg, &seed, 20).is_err());

    let pset = gen.punc(prg, &seed, 3).unwrap();
    assert!(gen.eval_punc(prg, &pset, 20).is_err());

    let truncated = PuncturedSet {
        keys: pset.keys[1..].to_vec(),
    };
    assert!(gen.eval_punc(prg, &truncated, 3).is_err());

    let mut short = vec![0u64; 5];
    assert!(gen.eval_into(prg, &seed, &mut short).is_err());
}

#[test]
fn test_punctured_set_serialization() {
    let mut rng = test_rng();
    let prg = Prg::fixed();
    let gen = SetGenerator::new(1 << 20, 1000).unwrap();
    let seed = SetGenerator::sample_seed(&mut rng);
    let pset = gen.punc(prg, &seed, 777).unwrap();

    let bytes = pset.to_bytes();
    assert_eq!(bytes.len(), 16 * (gen.height() - 1));
    assert_eq!(PuncturedSet::from_bytes(&bytes).unwrap(), pset);
    assert!(PuncturedSet::from_bytes(&bytes[1..]).is_err());

    let mut serialized = vec![0; pset.serialized_size()];
    pset.serialize(&mut serialized[..]).unwrap();
    let recovered = PuncturedSet::deserialize(serialized.as_slice()).unwrap();
    assert_eq!(pset, recovered);
}

#[test]
fn test_distinct() {
    assert!(distinct(&[]));
    assert!(distinct(&[0]));
    assert!(distinct(&[0, 1, 2, 3]));
    assert!(!distinct(&[0, 0]));
    assert!(!distinct(&[5, 1, 9, 5]));
    // Colliding hashes are resolved by probing
    assert!(distinct(&[0, 16, 32, 48]));
    assert!(!distinct(&[0, 16, 32, 16]));
    // The whole range of u64 is accepted
    assert!(distinct(&[u64::MAX, 0, u64::MAX - 1]));
    assert!(!distinct(&[u64::MAX, 3, u64::MAX]));
}

#[test]
fn test_large_sets_are_mostly_distinct() {
    // Over a universe much larger than the square of the set size, duplicates are rare
    let mut rng = test_rng();
    let prg = Prg::fixed();
    let mut gen = SetGenerator::new(1 << 30, 256).unwrap();

    let ndistinct = (0..100)
        .filter(|_| {
            let seed = SetGenerator::sample_seed(&mut rng);
            distinct(&gen.eval(prg, &seed))
        })
        .count();
    assert!(ndistinct >= 95);
}
