use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use adtape::{JacobianLinearTape, JacobianReuseTape};

#[path = "common/mod.rs"]
mod common;
use common::*;

fn bench_record_and_reverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("rosenbrock_gradient");
    for n in [10, 100, 1000, 10_000] {
        let x = make_input(n);

        group.bench_with_input(BenchmarkId::new("f64_eval", n), &x, |b, x| {
            b.iter(|| black_box(rosenbrock_f64(black_box(x))))
        });

        group.bench_with_input(BenchmarkId::new("linear", n), &x, |b, x| {
            let mut tape = JacobianLinearTape::<f64>::with_capacity(2 * n);
            b.iter(|| {
                tape.reset();
                let xs = register(&mut tape, black_box(x));
                let y = record_rosenbrock(&mut tape, &xs);
                tape.set_gradient(y.identifier(), 1.0);
                tape.evaluate();
                black_box(tape.gradient(xs[0].identifier()))
            })
        });

        group.bench_with_input(BenchmarkId::new("reuse", n), &x, |b, x| {
            let mut tape = JacobianReuseTape::<f64>::new();
            b.iter(|| {
                tape.reset();
                let mut xs = register(&mut tape, black_box(x));
                let mut y = record_rosenbrock(&mut tape, &xs);
                tape.set_gradient(y.identifier(), 1.0);
                tape.evaluate();
                let g = tape.gradient(xs[0].identifier());
                release(&mut tape, &mut xs);
                release(&mut tape, std::slice::from_mut(&mut y));
                black_box(g)
            })
        });
    }
    group.finish();
}

fn bench_sweeps_only(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep_only");
    for n in [100, 10_000] {
        let x = make_input(n);
        let mut tape = JacobianLinearTape::<f64>::new();
        let xs = register(&mut tape, &x);
        let y = record_rosenbrock(&mut tape, &xs);

        group.bench_function(BenchmarkId::new("reverse", n), |b| {
            b.iter(|| {
                tape.clear_adjoints();
                tape.set_gradient(y.identifier(), 1.0);
                tape.evaluate();
                black_box(tape.gradient(xs[0].identifier()))
            })
        });

        group.bench_function(BenchmarkId::new("forward", n), |b| {
            b.iter(|| {
                tape.clear_adjoints();
                tape.set_gradient(xs[0].identifier(), 1.0);
                tape.evaluate_forward_all();
                black_box(tape.gradient(y.identifier()))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_record_and_reverse, bench_sweeps_only);
criterion_main!(benches);
