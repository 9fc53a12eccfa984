//! Dense derivative storage indexed by identifier.
//!
//! The same vector serves as adjoint vector in reverse sweeps, as tangent
//! vector in forward sweeps, and as primal store on primal-value tapes.

use crate::float::Float;
use crate::index::Identifier;

/// Dense array of values indexed by [`Identifier`].
///
/// Slot 0 always exists. Const reads of identifiers past the end return the
/// slot-0 value without allocating; mutable access grows the vector first.
/// The vector never shrinks unless [`resize`](Self::resize) is called.
#[derive(Clone, Debug)]
pub struct AdjointVector<F: Float> {
    data: Vec<F>,
}

impl<F: Float> Default for AdjointVector<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> AdjointVector<F> {
    /// Vector holding only slot 0.
    pub fn new() -> Self {
        AdjointVector {
            data: vec![F::zero()],
        }
    }

    /// Vector with `len` zeroed slots (at least one).
    pub fn with_len(len: usize) -> Self {
        AdjointVector {
            data: vec![F::zero(); len.max(1)],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always `false`: slot 0 exists.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Value at `id`, or the slot-0 value if `id` is out of range.
    #[inline]
    pub fn get(&self, id: Identifier) -> F {
        match self.data.get(id as usize) {
            Some(&v) => v,
            None => self.data[0],
        }
    }

    /// Mutable slot for `id`, growing the vector to `id + 1` if needed.
    #[inline]
    pub fn get_mut(&mut self, id: Identifier) -> &mut F {
        self.ensure(id);
        &mut self.data[id as usize]
    }

    /// Make sure `id` indexes a valid slot.
    #[inline]
    pub fn ensure(&mut self, id: Identifier) {
        if id as usize >= self.data.len() {
            self.grow(id as usize + 1);
        }
    }

    #[cold]
    #[inline(never)]
    fn grow(&mut self, len: usize) {
        log::debug!("growing derivative vector from {} to {} slots", self.data.len(), len);
        self.data.resize(len, F::zero());
    }

    /// Set the number of slots. Never drops below one.
    pub fn resize(&mut self, len: usize) {
        self.data.resize(len.max(1), F::zero());
    }

    /// Reset every slot to zero, keeping the capacity.
    pub fn zero_all(&mut self) {
        self.data.fill(F::zero());
    }

    /// Overwrite `self` with the slots of `other`, reusing the allocation.
    pub fn copy_from(&mut self, other: &Self) {
        self.data.clear();
        self.data.extend_from_slice(&other.data);
    }

    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.data, &mut other.data);
    }

    #[inline]
    pub fn as_slice(&self) -> &[F] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [F] {
        &mut self.data
    }

    /// Bytes held by the slots.
    pub fn memory(&self) -> usize {
        self.data.len() * std::mem::size_of::<F>()
    }
}
