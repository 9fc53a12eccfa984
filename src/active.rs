use std::fmt::{self, Display};

use crate::float::Float;
use crate::index::{Identifier, PASSIVE};

/// A tracked variable as the tape sees it: a primal value and the
/// identifier of its derivative slot.
///
/// `Copy` because the tape owns all derivative state; this struct is only
/// a handle into it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Active<F: Float> {
    pub(crate) value: F,
    pub(crate) identifier: Identifier,
}

impl<F: Float> Active<F> {
    /// A passive value, not tracked by any tape.
    #[inline]
    pub fn constant(value: F) -> Self {
        Active {
            value,
            identifier: PASSIVE,
        }
    }

    /// Rebuild a handle from a tape-issued identifier.
    #[inline]
    pub fn from_parts(value: F, identifier: Identifier) -> Self {
        Active { value, identifier }
    }

    #[inline]
    pub fn value(&self) -> F {
        self.value
    }

    /// Overwrite the primal value, keeping the identifier.
    #[inline]
    pub fn set_value(&mut self, value: F) {
        self.value = value;
    }

    #[inline]
    pub fn identifier(&self) -> Identifier {
        self.identifier
    }

    /// The identifier slot, for handing to
    /// [`Tape::free_identifier`](crate::Tape::free_identifier) and friends.
    #[inline]
    pub fn identifier_mut(&mut self) -> &mut Identifier {
        &mut self.identifier
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.identifier != PASSIVE
    }
}

impl<F: Float> Display for Active<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<F: Float> Default for Active<F> {
    fn default() -> Self {
        Active::constant(F::zero())
    }
}
