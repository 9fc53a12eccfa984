//! Recording and evaluating through `dyn AdTape`, with the tape variant
//! chosen at construction.

use std::any::TypeId;

use adtape::external::{DeleteContext, ExternalFunction, ExternalFunctionEntry, ReplayContext};
use adtape::{AdTape, Active, JacobianLinearTape, JacobianReuseTape};
use approx::assert_relative_eq;

/// `z = 2 * y`, serialized by hand as two identifiers.
struct Double;

impl ExternalFunction<f64> for Double {
    const NAME: &'static str = "double";

    fn forward(ctx: &mut ReplayContext<'_, f64>) {
        let y: u32 = ctx.fixed.read();
        let z: u32 = ctx.fixed.read();
        let t = ctx.vectors.gradient(y);
        ctx.vectors.set_gradient(z, 2.0 * t);
    }

    fn reverse(ctx: &mut ReplayContext<'_, f64>) {
        let y: u32 = ctx.fixed.read();
        let z: u32 = ctx.fixed.read();
        let a = ctx.vectors.take_gradient(z);
        ctx.vectors.update_gradient(y, 2.0 * a);
    }

    fn delete(_: &mut DeleteContext<'_, f64>) {}
}

/// x = 3; y0 = x * x; y1 = y0 + x; z = 2 * y1 (external).
fn record(tape: &mut dyn AdTape<f64>) -> (Active<f64>, Active<f64>) {
    let mut x = Active::constant(3.0);
    tape.register_input(&mut x);

    let mut y0 = Active::default();
    tape.push_jacobian(x.identifier(), 3.0);
    tape.push_jacobian(x.identifier(), 3.0);
    let id = tape.push_statement(y0.identifier_mut(), 9.0);
    assert_eq!(id, y0.identifier());
    y0.set_value(9.0);

    let mut y1 = Active::default();
    tape.store(&mut y1, 12.0, &[(y0.identifier(), 1.0), (x.identifier(), 1.0)]);

    let token = tape.register_external_function(
        TypeId::of::<Double>(),
        ExternalFunctionEntry {
            name: Double::NAME,
            forward: Double::forward,
            reverse: Double::reverse,
            delete: Double::delete,
        },
    );
    assert_eq!(token, Double::token());

    let z = Active::from_parts(24.0, tape.create_identifier());
    let (mut fixed, dynamic) = tape.push_external_function(token, 8, 0);
    fixed.write(y1.identifier());
    fixed.write(z.identifier());
    fixed.finish();
    dynamic.finish();

    (x, z)
}

fn evaluate_through_trait(tape: &mut dyn AdTape<f64>) {
    let (x, z) = record(tape);
    assert_eq!(tape.position().externals(), 1);

    *tape.gradient_mut(z.identifier()) = 1.0;
    let end = tape.position();
    tape.evaluate_reverse(Default::default(), end);
    // dz/dx = 2 * (2x + 1)
    assert_relative_eq!(tape.gradient(x.identifier()), 14.0);

    tape.clear_adjoints();
    *tape.gradient_mut(x.identifier()) = 1.0;
    tape.evaluate_forward(Default::default(), end);
    assert_relative_eq!(tape.gradient(z.identifier()), 14.0);

    tape.reset();
    assert_eq!(tape.position().statements(), 0);
}

#[test]
fn variants_behind_one_interface() {
    let tapes: Vec<Box<dyn AdTape<f64>>> = vec![
        Box::new(JacobianLinearTape::<f64>::new()),
        Box::new(JacobianReuseTape::<f64>::new()),
        Box::new(JacobianLinearTape::<f64>::with_primals()),
        Box::new(JacobianReuseTape::<f64>::with_primals()),
    ];
    for mut tape in tapes {
        evaluate_through_trait(tape.as_mut());
    }
}

#[test]
fn identifiers_through_the_trait() {
    let mut linear = JacobianLinearTape::<f64>::new();
    let mut reuse = JacobianReuseTape::<f64>::new();
    for (tape, recycles) in [
        (&mut linear as &mut dyn AdTape<f64>, false),
        (&mut reuse as &mut dyn AdTape<f64>, true),
    ] {
        let mut id = tape.create_identifier();
        tape.free_identifier(&mut id);
        assert_eq!(id, 0);
        assert_eq!(tape.create_identifier() == 1, recycles);
    }
}
