use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use stark_engine::example_airs::fibonacci_air;
use stark_engine::example_airs::fibonacci_trace;
use stark_engine::prelude::*;

const LOG2_NUM_ROWS: [usize; 3] = [8, 10, 12];

/// cargo criterion --bench prove_verify
fn prove_verify_fibonacci(criterion: &mut Criterion) {
    let parameters = StarkParameters::default();
    let prover = Prover::new(parameters);
    let verifier = Verifier::new(parameters);
    let claim = Claim::new(Digest::default());

    let mut group = criterion.benchmark_group("prove_verify_fibonacci");
    group.sample_size(10);
    for log2_num_rows in LOG2_NUM_ROWS {
        let num_rows = 1 << log2_num_rows;
        let air = fibonacci_air(num_rows);
        let trace = fibonacci_trace(num_rows);

        let prove_id = BenchmarkId::new("prove", num_rows);
        group.bench_function(prove_id, |bencher| {
            bencher.iter(|| prover.prove(&claim, &air, &trace))
        });

        let proof = prover.prove(&claim, &air, &trace).unwrap();
        let verify_id = BenchmarkId::new("verify", num_rows);
        group.bench_function(verify_id, |bencher| {
            bencher.iter(|| verifier.verify(&claim, &air, &proof))
        });

        let proof_len = proof.0.len();
        eprintln!("padded height 2^{log2_num_rows}: proof has {proof_len} field elements");
    }
    group.finish();
}

criterion_group!(benches, prove_verify_fibonacci);
criterion_main!(benches);
