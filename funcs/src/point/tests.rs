use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::test_rng;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;

use crate::{
    point::{DpfKey, DpfParams, EvalScratch, GgmDpf, Leaf, PointFunction, WideLeaf, DPF},
    Block, Prg, FSS,
};

const DOMAIN_SIZES: [usize; 9] = [1, 2, 3, 7, 100, 128, 129, 1000, 4097];

fn test_correctness_helper<L: Leaf, D: DPF<L>>(mut sample: impl FnMut(&mut ChaChaRng) -> L) {
    let mut rng = ChaChaRng::seed_from_u64(0);

    for nitems in DOMAIN_SIZES {
        // Generate a random point in the given domain and a random output
        let x = rng.gen_range(0..nitems);
        let y = sample(&mut rng);

        let func = PointFunction::with_output(nitems, x, y);
        let (key1, key2) = D::gen(&func, &mut rng).unwrap();

        // Evaluate each point of the DPF
        for p in 0..nitems {
            let p1_result = D::eval(&key1, &p).unwrap();
            let p2_result = D::eval(&key2, &p).unwrap();
            if p == x {
                assert_eq!(D::decode((&p1_result, &p2_result)).unwrap(), y);
            } else {
                assert_eq!(D::decode((&p1_result, &p2_result)).unwrap(), L::default());
            }
        }
    }
}

fn test_eval_full_helper<L: Leaf, D: DPF<L>>() {
    let mut rng = test_rng();

    for nitems in DOMAIN_SIZES {
        let x = rng.gen_range(0..nitems);
        let func = PointFunction::<L>::new(nitems, x);
        let (key1, key2) = D::gen(&func, &mut rng).unwrap();

        let full1 = D::eval_full(&key1).unwrap();
        let full2 = D::eval_full(&key2).unwrap();
        assert_eq!(full1.len(), nitems);

        // Full-domain evaluation agrees with pointwise evaluation on every input
        for p in 0..nitems {
            assert_eq!(full1[p], D::eval(&key1, &p).unwrap());
            assert_eq!(full2[p], D::eval(&key2, &p).unwrap());
            let expected = if p == x { L::one() } else { L::default() };
            assert_eq!(full1[p] ^ full2[p], expected);
        }
    }
}

fn test_bad_inputs_helper<L: Leaf, D: DPF<L>>() {
    let mut rng = test_rng();
    let max = 1 << 10;
    let bad_range = max..2 * max;

    // Test Gen fail
    let x = rng.gen_range(bad_range.clone());
    let result = D::gen(&PointFunction::<L>::new(max, x), &mut rng);
    assert!(result.is_err());

    // Empty domains are rejected
    let result = D::gen(&PointFunction::<L>::new(0, 0), &mut rng);
    assert!(result.is_err());

    // Test Eval fail
    let x = rng.gen_range(0..max);
    let (k1, k2) = D::gen(&PointFunction::<L>::new(max, x), &mut rng).unwrap();

    let p = rng.gen_range(bad_range);
    assert!(D::eval(&k1, &p).is_err());
    assert!(D::eval(&k2, &p).is_err());
}

#[test]
fn test_correctness() {
    test_correctness_helper::<bool, GgmDpf<bool>>(|_| true);
    test_correctness_helper::<u8, GgmDpf<u8>>(|rng| rng.gen_range(1..=u8::MAX));
    test_correctness_helper::<u32, GgmDpf<u32>>(|rng| rng.gen_range(1..=u32::MAX));
    test_correctness_helper::<u64, GgmDpf<u64>>(|rng| rng.gen_range(1..=u64::MAX));
    test_correctness_helper::<u128, GgmDpf<u128>>(|rng| rng.gen::<u128>() | 1);
    test_correctness_helper::<WideLeaf<2>, GgmDpf<WideLeaf<2>>>(|rng| {
        WideLeaf([Block::random(rng), Block::random(rng)])
    });
}

#[test]
fn test_eval_full() {
    test_eval_full_helper::<bool, GgmDpf<bool>>();
    test_eval_full_helper::<u16, GgmDpf<u16>>();
    test_eval_full_helper::<u128, GgmDpf<u128>>();
    test_eval_full_helper::<WideLeaf<3>, GgmDpf<WideLeaf<3>>>();
}

#[test]
fn test_bad_inputs() {
    test_bad_inputs_helper::<bool, GgmDpf<bool>>();
    test_bad_inputs_helper::<u64, GgmDpf<u64>>();
}

#[test]
fn test_mismatched_leaf_width() {
    let mut rng = test_rng();
    let params = DpfParams::new(64, 8).unwrap();
    let result = GgmDpf::<u32>::gen_with_leaf(Prg::fixed(), &params, 3, 1, &mut rng);
    assert!(result.is_err());

    assert!(DpfParams::new(64, 7).is_err());
    assert!(DpfParams::new(64, 192).is_err());
    assert!(DpfParams::new(64, 256).is_ok());
}

#[test]
fn test_achieved_leaf() {
    let mut rng = test_rng();
    let prg = Prg::fixed();

    for nitems in DOMAIN_SIZES {
        let params = DpfParams::for_leaf::<u32>(nitems).unwrap();
        let point = rng.gen_range(0..nitems);
        let (k0, k1, achieved) =
            GgmDpf::<u32>::gen_with_leaf(prg, &params, point, 0xdead_beef, &mut rng).unwrap();

        assert_eq!(achieved, GgmDpf::eval_with(prg, &k0, point).unwrap());
        assert_eq!(
            achieved ^ GgmDpf::eval_with(prg, &k1, point).unwrap(),
            0xdead_beef
        );
    }
}

#[test]
fn test_shallow_tree() {
    // A domain that fits in a single leaf block has no levels at all
    let mut rng = test_rng();
    let params = DpfParams::for_leaf::<bool>(100).unwrap();
    assert_eq!(params.depth, 0);
    assert_eq!(params.leaf_count, 1);

    let (k0, k1, _) =
        GgmDpf::<bool>::gen_with_leaf(Prg::fixed(), &params, 57, true, &mut rng).unwrap();
    assert!(k0.cw.is_empty());
    let full0 = GgmDpf::<bool>::eval_full(&k0).unwrap();
    let full1 = GgmDpf::<bool>::eval_full(&k1).unwrap();
    for p in 0..100 {
        assert_eq!(full0[p] ^ full1[p], p == 57);
    }
}

#[test]
fn test_scratch_reuse() {
    // One scratch buffer can serve keys over domains of different sizes
    let mut rng = test_rng();
    let prg = Prg::fixed();
    let mut scratch = EvalScratch::default();

    for nitems in [5000, 300, 70_000] {
        let params = DpfParams::for_leaf::<bool>(nitems).unwrap();
        let point = rng.gen_range(0..nitems);
        let (k0, k1, _) =
            GgmDpf::<bool>::gen_with_leaf(prg, &params, point, true, &mut rng).unwrap();

        let mut out0 = vec![Block::ZERO; params.output_blocks()];
        let mut out1 = vec![Block::ZERO; params.output_blocks()];
        GgmDpf::eval_full_into(prg, &k0, &mut scratch, &mut out0).unwrap();
        GgmDpf::eval_full_into(prg, &k1, &mut scratch, &mut out1).unwrap();

        let leaves0 = GgmDpf::<bool>::leaves(&params, &out0);
        let leaves1 = GgmDpf::<bool>::leaves(&params, &out1);
        let set: Vec<usize> = (0..nitems).filter(|&p| leaves0[p] ^ leaves1[p]).collect();
        assert_eq!(set, vec![point]);

        // A wrongly sized output buffer is rejected
        let mut short = vec![Block::ZERO; params.output_blocks() - 1];
        assert!(GgmDpf::eval_full_into(prg, &k0, &mut scratch, &mut short).is_err());
    }
}

#[test]
fn test_key_privacy() {
    // Every block of a single share should look uniformly random. Count the fraction of set bits
    // in each block over many keys for the same point.
    let mut rng = test_rng();
    let prg = Prg::fixed();
    let params = DpfParams::for_leaf::<u64>(1 << 12).unwrap();
    let nkeys = 500;

    let mut ones = vec![0usize; 1 + params.depth + params.blocks_per_leaf];
    for _ in 0..nkeys {
        let (k0, _, _) = GgmDpf::<u64>::gen_with_leaf(prg, &params, 1234, 1, &mut rng).unwrap();
        let blocks = std::iter::once(&k0.root)
            .chain(k0.cw.iter())
            .chain(k0.final_cw.iter());
        for (count, block) in ones.iter_mut().zip(blocks) {
            *count += block.to_u128().count_ones() as usize;
        }
    }

    for (i, count) in ones.iter().enumerate() {
        let frac = *count as f64 / (nkeys * 128) as f64;
        assert!((0.45..=0.55).contains(&frac), "block {} is biased: {}", i, frac);
    }
}

#[test]
fn test_serialization() {
    let mut rng = test_rng();
    let prg = Prg::fixed();

    for nitems in [1, 1000, 1 << 16] {
        let params = DpfParams::for_leaf::<WideLeaf<2>>(nitems).unwrap();
        let (key, _, _) = GgmDpf::<WideLeaf<2>>::gen_with_leaf(
            prg,
            &params,
            nitems / 2,
            WideLeaf::one(),
            &mut rng,
        )
        .unwrap();

        // Raw layout
        let bytes = key.to_bytes();
        assert_eq!(bytes.len(), params.key_size());
        assert_eq!(&bytes[..16], &key.root.0[..]);
        let recovered = DpfKey::<WideLeaf<2>>::from_bytes(params, &bytes).unwrap();
        assert_eq!(key, recovered);
        assert!(DpfKey::<WideLeaf<2>>::from_bytes(params, &bytes[1..]).is_err());

        // Framed canonical encoding
        let mut serialized = vec![0; key.serialized_size()];
        key.serialize(&mut serialized[..]).unwrap();
        let recovered = DpfKey::<WideLeaf<2>>::deserialize(serialized.as_slice()).unwrap();
        assert_eq!(key, recovered);
    }
}

#[test]
fn test_advice_bit_packing() {
    let mut rng = test_rng();
    let params = DpfParams::for_leaf::<bool>(1 << 14).unwrap();
    let (key, _, _) =
        GgmDpf::<bool>::gen_with_leaf(Prg::fixed(), &params, 99, true, &mut rng).unwrap();

    let bytes = key.to_bytes();
    let bits = &bytes[bytes.len() - params.depth..];
    for (byte, t) in bits.iter().zip(&key.t) {
        assert_eq!(*byte, (t[0] as u8) << 1 | t[1] as u8);
    }
}
