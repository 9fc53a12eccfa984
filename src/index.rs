//! Identifier management.
//!
//! Every active variable owns one identifier, which names its slot in the
//! adjoint vector. Identifier `0` ([`PASSIVE`]) is reserved for variables
//! that carry no derivative.

use crate::values::TapeValues;

/// Handle naming one tracked variable's derivative slot.
pub type Identifier = u32;

/// The reserved identifier of passive (untracked) variables.
pub const PASSIVE: Identifier = 0;

/// Issues and recycles identifiers for one tape.
///
/// Two policies exist: [`LinearIndexManager`] never reuses an identifier,
/// [`ReuseIndexManager`] recycles identifiers of dead variables. The tape
/// consults [`LINEAR`](IndexManager::LINEAR) wherever the policies differ.
pub trait IndexManager: Default + Send + 'static {
    /// `true` if identifiers are issued monotonically and never recycled.
    const LINEAR: bool;

    /// Short name used in diagnostics.
    const NAME: &'static str;

    /// Issue a fresh identifier.
    fn create(&mut self) -> Identifier;

    /// Release `id` and set it to [`PASSIVE`]. No-op for linear handling.
    fn free(&mut self, id: &mut Identifier);

    /// Give the left-hand side of a statement an identifier.
    ///
    /// A reusing manager keeps a live identifier; a linear one always
    /// issues a new one. Returns the identifier now held by `id`.
    fn assign(&mut self, id: &mut Identifier) -> Identifier;

    /// Give `id` an identifier that no other live variable shares.
    fn assign_unused(&mut self, id: &mut Identifier) -> Identifier {
        self.free(id);
        *id = self.create();
        *id
    }

    /// Largest identifier issued so far. Sizes the adjoint vector.
    fn largest_created(&self) -> Identifier;

    /// Rewind to the state recorded by `largest`, a value previously
    /// returned by [`largest_created`](Self::largest_created). Only linear
    /// managers rewind; identifiers of a reusing manager stay valid.
    fn reset_to(&mut self, largest: Identifier);

    /// Called when the owning tape is reset.
    fn reset(&mut self) {
        self.reset_to(PASSIVE);
    }

    /// Report statistics to a diagnostics sink.
    fn add_values(&self, values: &mut TapeValues);

    #[inline]
    fn is_active(id: Identifier) -> bool {
        id != PASSIVE
    }
}

#[inline]
fn next_identifier(largest: Identifier) -> Identifier {
    match largest.checked_add(1) {
        Some(id) => id,
        None => panic!("identifier space exhausted: more than {} variables", Identifier::MAX),
    }
}

/// Monotonic identifiers; one-to-one with time of creation.
#[derive(Clone, Debug, Default)]
pub struct LinearIndexManager {
    largest: Identifier,
}

impl IndexManager for LinearIndexManager {
    const LINEAR: bool = true;
    const NAME: &'static str = "linear";

    #[inline]
    fn create(&mut self) -> Identifier {
        self.largest = next_identifier(self.largest);
        self.largest
    }

    #[inline]
    fn free(&mut self, id: &mut Identifier) {
        *id = PASSIVE;
    }

    #[inline]
    fn assign(&mut self, id: &mut Identifier) -> Identifier {
        *id = self.create();
        *id
    }

    #[inline]
    fn largest_created(&self) -> Identifier {
        self.largest
    }

    fn reset_to(&mut self, largest: Identifier) {
        debug_assert!(largest <= self.largest, "rewinding past the largest identifier");
        self.largest = largest;
    }

    fn add_values(&self, values: &mut TapeValues) {
        values.add_section("Index manager");
        values.add_unsigned_entry("Policy: linear, max. live indices", self.largest as usize);
    }
}

/// Identifiers recycled from a free list once their variable dies.
///
/// The tape must guarantee that no two simultaneously-live variables share
/// an identifier; [`free`](IndexManager::free) is the only way back into the
/// pool.
#[derive(Clone, Debug, Default)]
pub struct ReuseIndexManager {
    largest: Identifier,
    unused: Vec<Identifier>,
}

impl ReuseIndexManager {
    /// Number of identifiers waiting on the free list.
    pub fn unused_count(&self) -> usize {
        self.unused.len()
    }
}

impl IndexManager for ReuseIndexManager {
    const LINEAR: bool = false;
    const NAME: &'static str = "reuse";

    #[inline]
    fn create(&mut self) -> Identifier {
        match self.unused.pop() {
            Some(id) => id,
            None => {
                self.largest = next_identifier(self.largest);
                self.largest
            }
        }
    }

    #[inline]
    fn free(&mut self, id: &mut Identifier) {
        if *id != PASSIVE {
            debug_assert!(*id <= self.largest, "freeing identifier {} never issued", id);
            self.unused.push(*id);
            *id = PASSIVE;
        }
    }

    #[inline]
    fn assign(&mut self, id: &mut Identifier) -> Identifier {
        if *id == PASSIVE {
            *id = self.create();
        }
        *id
    }

    #[inline]
    fn largest_created(&self) -> Identifier {
        self.largest
    }

    // Variables outside the tape still hold their identifiers.
    fn reset_to(&mut self, _: Identifier) {}

    fn add_values(&self, values: &mut TapeValues) {
        let stored = self.unused.len();
        values.add_section("Index manager");
        values.add_unsigned_entry("Max. live indices", self.largest as usize);
        values.add_unsigned_entry("Cur. live indices", self.largest as usize - stored);
        values.add_unsigned_entry("Indices stored", stored);
        values.add_double_entry(
            "Memory used",
            (stored * std::mem::size_of::<Identifier>()) as f64,
            true,
        );
    }
}
