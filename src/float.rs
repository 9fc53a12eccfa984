use std::fmt::{Debug, Display};

use num_traits::{Float as NumFloat, FloatConst, FromPrimitive};

use crate::external::ByteValue;

/// Marker trait for the real types a tape can differentiate (`f32`, `f64`).
///
/// Besides the numeric bundle, every real must be byte-serializable so that
/// external function records can carry primal values in their byte segments.
pub trait Float:
    NumFloat
    + FloatConst
    + FromPrimitive
    + ByteValue
    + Copy
    + Send
    + Sync
    + Default
    + Debug
    + Display
    + 'static
{
}

impl Float for f32 {}
impl Float for f64 {}
