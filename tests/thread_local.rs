//! Thread-local active tape.

use adtape::{
    with_active_tape, Active, JacobianLinearTape, JacobianReuseTape, LinearIndexManager,
    TapeGuard,
};

fn square(x: Active<f64>) -> Active<f64> {
    with_active_tape::<f64, LinearIndexManager, _>(|tape| {
        let mut y = Active::default();
        tape.store(
            &mut y,
            x.value() * x.value(),
            &[(x.identifier(), 2.0 * x.value())],
        );
        y
    })
}

#[test]
fn recording_through_the_guard() {
    let mut tape = JacobianLinearTape::<f64>::new();
    let mut x = Active::constant(3.0);
    tape.register_input(&mut x);
    {
        let _guard = TapeGuard::new(&mut tape);
        let y = square(x);
        with_active_tape::<f64, LinearIndexManager, _>(|tape| {
            tape.set_gradient(y.identifier(), 1.0);
            tape.evaluate();
        });
    }
    assert_eq!(tape.gradient(x.identifier()), 6.0);
}

#[test]
#[should_panic(expected = "no active tape on this thread")]
fn no_guard_panics() {
    square(Active::constant(1.0));
}

#[test]
#[should_panic(expected = "active tape is already borrowed")]
fn nested_borrow_panics() {
    let mut tape = JacobianLinearTape::<f64>::new();
    let _guard = TapeGuard::new(&mut tape);
    with_active_tape::<f64, LinearIndexManager, _>(|_| {
        with_active_tape::<f64, LinearIndexManager, _>(|_| {});
    });
}

#[test]
fn guard_drop_restores_previous_tape() {
    let mut outer = JacobianLinearTape::<f64>::new();
    let mut inner = JacobianLinearTape::<f64>::new();
    let _outer = TapeGuard::new(&mut outer);
    {
        let _inner = TapeGuard::new(&mut inner);
        with_active_tape::<f64, LinearIndexManager, _>(|tape| {
            tape.create_identifier();
            tape.create_identifier();
        });
    }
    let largest =
        with_active_tape::<f64, LinearIndexManager, _>(|tape| tape.largest_identifier());
    assert_eq!(largest, 0);
}

#[test]
fn tape_types_are_independent() {
    let mut linear = JacobianLinearTape::<f64>::new();
    let mut reuse = JacobianReuseTape::<f64>::new();
    let _a = TapeGuard::new(&mut linear);
    let _b = TapeGuard::new(&mut reuse);
    with_active_tape::<f64, LinearIndexManager, _>(|lin| {
        lin.create_identifier();
        // A different tape type can be borrowed at the same time.
        with_active_tape::<f64, adtape::ReuseIndexManager, _>(|r| {
            assert_eq!(r.largest_identifier(), 0);
        });
        assert_eq!(lin.largest_identifier(), 1);
    });
}

#[test]
fn borrow_is_returned_after_a_panic() {
    let mut tape = JacobianLinearTape::<f64>::new();
    let _guard = TapeGuard::new(&mut tape);
    let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        with_active_tape::<f64, LinearIndexManager, _>(|_| panic!("inside"));
    }));
    assert!(caught.is_err());
    let largest =
        with_active_tape::<f64, LinearIndexManager, _>(|tape| tape.largest_identifier());
    assert_eq!(largest, 0);
}

#[test]
fn each_thread_has_its_own_tape() {
    std::thread::scope(|s| {
        for t in 0..4 {
            s.spawn(move || {
                let mut tape = JacobianLinearTape::<f64>::new();
                let mut x = Active::constant(t as f64);
                tape.register_input(&mut x);
                let _guard = TapeGuard::new(&mut tape);
                let y = square(x);
                with_active_tape::<f64, LinearIndexManager, _>(|tape| {
                    tape.set_gradient(y.identifier(), 1.0);
                    tape.evaluate();
                    assert_eq!(tape.gradient(x.identifier()), 2.0 * t as f64);
                });
            });
        }
    });
}
