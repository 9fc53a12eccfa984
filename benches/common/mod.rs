#![allow(dead_code)]

use adtape::{Active, IndexManager, Tape};

pub fn make_input(n: usize) -> Vec<f64> {
    (0..n).map(|i| 0.5 + 0.01 * i as f64).collect()
}

pub fn register<I: IndexManager>(tape: &mut Tape<f64, I>, x: &[f64]) -> Vec<Active<f64>> {
    x.iter()
        .map(|&v| {
            let mut a = Active::constant(v);
            tape.register_input(&mut a);
            a
        })
        .collect()
}

// ─── Rosenbrock ────────────────────────────────────────────────────────────
// f(x) = Σ (1 - x_i)² + 100 (x_{i+1} - x_i²)², recorded one term per statement.

pub fn record_rosenbrock<I: IndexManager>(
    tape: &mut Tape<f64, I>,
    x: &[Active<f64>],
) -> Active<f64> {
    let mut sum = Active::constant(0.0);
    for w in x.windows(2) {
        let (a, b) = (w[0].value(), w[1].value());
        let t1 = 1.0 - a;
        let t2 = b - a * a;
        let mut term = Active::default();
        tape.store(
            &mut term,
            t1 * t1 + 100.0 * t2 * t2,
            &[
                (w[0].identifier(), -2.0 * t1 - 400.0 * a * t2),
                (w[1].identifier(), 200.0 * t2),
            ],
        );
        let prev = sum;
        tape.store(
            &mut sum,
            prev.value() + term.value(),
            &[(prev.identifier(), 1.0), (term.identifier(), 1.0)],
        );
        tape.free_identifier(term.identifier_mut());
    }
    sum
}

/// Hand identifiers back so a reuse tape does not grow between iterations.
pub fn release<I: IndexManager>(tape: &mut Tape<f64, I>, vars: &mut [Active<f64>]) {
    for v in vars {
        tape.free_identifier(v.identifier_mut());
    }
}

pub fn rosenbrock_f64(x: &[f64]) -> f64 {
    let mut sum = 0.0;
    for i in 0..x.len() - 1 {
        let t1 = 1.0 - x[i];
        let t2 = x[i + 1] - x[i] * x[i];
        sum += t1 * t1 + 100.0 * t2 * t2;
    }
    sum
}
