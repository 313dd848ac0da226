use ark_std::test_rng;
use criterion::{black_box, BenchmarkId, Criterion};
use rand::Rng;

use pir_funcs::{
    bitmore::{Query, QueryParams},
    point::{DpfParams, EvalScratch, GgmDpf, Leaf, PointFunction},
    pset::SetGenerator,
    schemes::Database,
    Block, Prg, FSS,
};

#[macro_use]
extern crate criterion;

const LOG_DOMAIN_RANGE: [usize; 3] = [16, 20, 24];

/// Bench the `gen()` function for the GGM point function
fn gen_point_bench<L: Leaf>(c: &mut Criterion, f: &str) {
    let mut rng = test_rng();

    for log_domain in LOG_DOMAIN_RANGE {
        let nitems = 1 << log_domain;
        let x = rng.gen_range(0..nitems);
        let func = PointFunction::<L>::new(nitems, x);

        c.bench_with_input(
            BenchmarkId::new(format!("{}/Gen", f), log_domain),
            &log_domain,
            |b, _| b.iter(|| black_box(GgmDpf::<L>::gen(&func, &mut rng))),
        );
    }
}

/// Bench the `eval()` and full-domain evaluation of the GGM point function
fn eval_point_bench<L: Leaf>(c: &mut Criterion, func: &str) {
    let mut rng = test_rng();
    let prg = Prg::fixed();

    let mut group = c.benchmark_group(format!("{}/Eval", func));

    for log_domain in LOG_DOMAIN_RANGE {
        let nitems = 1 << log_domain;
        let x = rng.gen_range(0..nitems);
        let params = DpfParams::for_leaf::<L>(nitems).unwrap();
        let (k1, _, _) = GgmDpf::<L>::gen_with_leaf(prg, &params, x, L::one(), &mut rng).unwrap();

        // Random evaluation point
        let p = rng.gen_range(0..nitems);

        group.bench_with_input(
            BenchmarkId::new("P1/Random", log_domain),
            &log_domain,
            |b, _| b.iter(|| black_box(GgmDpf::eval_with(prg, &k1, p))),
        );

        let mut scratch = EvalScratch::new(&params);
        let mut out = vec![Block::ZERO; params.output_blocks()];
        group.bench_with_input(BenchmarkId::new("Full", log_domain), &log_domain, |b, _| {
            b.iter(|| black_box(GgmDpf::eval_full_into(prg, &k1, &mut scratch, &mut out)))
        });
    }
    group.finish();
}

fn bench_dpf(c: &mut Criterion) {
    gen_point_bench::<bool>(c, "Point/bool");
    eval_point_bench::<bool>(c, "Point/bool");
    gen_point_bench::<u64>(c, "Point/u64");
    eval_point_bench::<u64>(c, "Point/u64");
}

fn bench_bitmore(c: &mut Criterion) {
    let mut rng = test_rng();
    let prg = Prg::fixed();
    let (nitems, row_len) = (1 << 16, 256);
    let mut bytes = vec![0u8; nitems * row_len];
    rng.fill(&mut bytes[..]);
    let db = Database::new(&bytes, row_len).unwrap();

    let mut group = c.benchmark_group("BitMore");
    group.sample_size(10);
    for nservers in [4, 5] {
        let params = QueryParams::new(nitems, nservers).unwrap();
        let x = rng.gen_range(0..nitems);

        group.bench_with_input(BenchmarkId::new("Query", nservers), &nservers, |b, _| {
            b.iter(|| black_box(Query::new(prg, &params, x, &mut rng)))
        });

        let request = Query::new(prg, &params, x, &mut rng)
            .unwrap()
            .request(0)
            .unwrap();
        group.bench_with_input(BenchmarkId::new("Answer", nservers), &nservers, |b, _| {
            b.iter(|| black_box(request.answer(prg, &db)))
        });
    }
    group.finish();
}

fn bench_pset(c: &mut Criterion) {
    let mut rng = test_rng();
    let prg = Prg::fixed();

    let mut group = c.benchmark_group("PuncturableSet");
    for log_set in [10, 12, 14] {
        let set_size = 1 << log_set;
        let mut gen = SetGenerator::new(1 << 28, set_size).unwrap();
        let seed = SetGenerator::sample_seed(&mut rng);
        let pos = rng.gen_range(0..set_size);
        let pset = gen.punc(prg, &seed, pos).unwrap();

        let mut elems = vec![0u64; set_size];
        group.bench_with_input(BenchmarkId::new("Eval", log_set), &log_set, |b, _| {
            b.iter(|| black_box(gen.eval_into(prg, &seed, &mut elems)))
        });

        let mut elems = vec![0u64; set_size - 1];
        group.bench_with_input(BenchmarkId::new("EvalPunc", log_set), &log_set, |b, _| {
            b.iter(|| black_box(gen.eval_punc_into(prg, &pset, pos, &mut elems)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_dpf, bench_bitmore, bench_pset);
criterion_main!(benches);
