//! Jacobian tape for operator-overloading algorithmic differentiation.
//!
//! A front end records every elementary operation as a statement holding
//! the partial derivatives of its result; [`Tape::evaluate_reverse`] and
//! [`Tape::evaluate_forward`] then propagate adjoints or tangents through
//! the recording. Operations with a hand-written derivative, such as
//! [`matrix_multiply`], are recorded as a single external function entry
//! whose arguments are serialized into the tape's byte segments.
//!
//! ```
//! use adtape::{Active, JacobianLinearTape};
//!
//! let mut tape = JacobianLinearTape::<f64>::new();
//! let mut x = Active::constant(3.0);
//! tape.register_input(&mut x);
//!
//! // y0 = x * x, y1 = y0 + x
//! let mut y0 = Active::default();
//! tape.store(&mut y0, 9.0, &[(x.identifier(), 3.0), (x.identifier(), 3.0)]);
//! let mut y1 = Active::default();
//! tape.store(&mut y1, 12.0, &[(y0.identifier(), 1.0), (x.identifier(), 1.0)]);
//!
//! tape.set_gradient(y1.identifier(), 1.0);
//! tape.evaluate();
//! assert_eq!(tape.gradient(x.identifier()), 7.0);
//! ```

pub mod active;
pub mod adjoint;
pub mod error;
pub mod external;
pub mod float;
pub mod index;
#[cfg(feature = "nalgebra")]
pub mod linalg;
pub mod parameters;
pub mod tape;
pub mod values;

pub use active::Active;
pub use adjoint::AdjointVector;
pub use error::{Result, TapeError};
pub use external::{ExternalFunction, Token};
pub use float::Float;
pub use index::{Identifier, IndexManager, LinearIndexManager, ReuseIndexManager, PASSIVE};
#[cfg(feature = "nalgebra")]
pub use linalg::{matrix_multiply, Storage};
pub use parameters::TapeParameter;
pub use tape::{
    with_active_tape, AdTape, JacobianLinearTape, JacobianReuseTape, Position, Tape, TapeGuard,
    TapeKind,
};
pub use values::TapeValues;

/// Type alias for a linear-index Jacobian tape over `f64`.
pub type Tape64 = JacobianLinearTape<f64>;
/// Type alias for a linear-index Jacobian tape over `f32`.
pub type Tape32 = JacobianLinearTape<f32>;
/// Type alias for active values over `f64`.
pub type Active64 = Active<f64>;
/// Type alias for active values over `f32`.
pub type Active32 = Active<f32>;
