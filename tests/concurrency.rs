//! Independent tapes on several threads sharing the external function
//! registry.

#![cfg(feature = "nalgebra")]

use std::sync::Mutex;

use adtape::linalg::MatrixMultiply;
use adtape::{matrix_multiply, Active, ExternalFunction, JacobianReuseTape, Storage, Token};

#[test]
fn tokens_agree_across_threads() {
    let tokens = Mutex::new(Vec::<Token>::new());
    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                let token = MatrixMultiply::<f64>::token();
                tokens.lock().unwrap().push(token);
            });
        }
    });
    let tokens = tokens.into_inner().unwrap();
    assert_eq!(tokens.len(), 8);
    assert!(tokens.iter().all(|&t| t == tokens[0]));
}

#[test]
fn one_tape_per_thread() {
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|t| {
                s.spawn(move || {
                    let scale = t as f64 + 1.0;
                    let mut tape = JacobianReuseTape::<f64>::with_primals();
                    let mut a: Vec<_> = [1.0, 2.0, 3.0, 4.0]
                        .iter()
                        .map(|&v| Active::constant(v * scale))
                        .collect();
                    for x in &mut a {
                        tape.register_input(x);
                    }
                    let b: Vec<_> = [1.0, 0.0, 0.0, 1.0]
                        .iter()
                        .map(|&v| Active::constant(v))
                        .collect();
                    let mut r = vec![Active::default(); 4];
                    for _ in 0..50 {
                        matrix_multiply(&mut tape, Storage::RowMajor, &a, &b, &mut r, 2, 2, 2);
                        tape.set_gradient(r[0].identifier(), 1.0);
                        tape.evaluate();
                        assert_eq!(tape.gradient(a[0].identifier()), 1.0);
                        assert_eq!(r[0].value(), scale);
                        tape.reset();
                    }
                    r.iter().map(|x| x.value()).sum::<f64>()
                })
            })
            .collect();
        for (t, h) in handles.into_iter().enumerate() {
            let sum = h.join().unwrap();
            assert_eq!(sum, 10.0 * (t as f64 + 1.0));
        }
    });
}
