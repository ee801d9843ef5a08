use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode};
use std::time::Duration;

use braid::elgamal::{Ciphertext, PublicKey};
use braid::group::Group;
use braid::rug_b::SchnorrGroup;
use braid::shuffler::Shuffler;
use rug::Integer;

fn shuffle_f(n: usize) -> bool {
    let group = SchnorrGroup::default_group();
    let exp_hasher = &*group.exp_hasher();

    let sk = group.gen_key();
    let pk = PublicKey::from(&sk.public_value, &group);

    let es: Vec<Ciphertext<Integer>> = (0..n)
        .map(|_| pk.encrypt(&group.encode(&group.rnd_exp())))
        .collect();

    let hs = group.generators(es.len() + 1, 0, b"bench");
    let shuffler = Shuffler {
        pk: &pk,
        generators: &hs,
        hasher: exp_hasher,
    };

    let (e_primes, rs, perm_data) = shuffler.gen_shuffle(&es);
    let proof = shuffler.gen_proof(&es, &e_primes, &rs, &perm_data);

    shuffler.check_proof(&proof, &es, &e_primes)
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("shuffle");
    group
        .sample_size(10)
        .measurement_time(Duration::from_secs(60))
        .sampling_mode(SamplingMode::Flat);

    for size in [200].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| shuffle_f(size));
        });
    }

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
