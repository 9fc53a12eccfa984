//! Field schema of external function records.
//!
//! A record type lists its fields once, in [`RecordLayout::visit`]. Sizing,
//! storing, restoring, primal bookkeeping and releasing of staging buffers
//! are all visitors walking that same list, so the byte order used by the
//! store routine and by every replay routine cannot drift apart.
//!
//! Activity masks and passive scalars live in the fixed segment. Arrays live
//! in the dynamic segment: their lengths are computed from scalars that a
//! reader has already restored when it reaches them.

use std::mem;

use crate::active::Active;
use crate::float::Float;
use crate::index::{Identifier, PASSIVE};

use super::bytes::{ByteReader, ByteValue, ByteWriter};
use super::scratch::ScratchAllocator;
use super::VectorAccess;

/// Tape properties that change which fields are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutConfig {
    /// The tape keeps a primal vector.
    pub has_primals: bool,
    /// The tape never reuses identifiers.
    pub linear: bool,
}

impl LayoutConfig {
    /// Outputs carry the primal values they overwrote.
    #[inline]
    pub fn stores_old_primals(self) -> bool {
        self.has_primals && !self.linear
    }
}

/// Per-argument activity flags of one record, one bit per argument.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Activity(u32);

impl Activity {
    pub const MAX_ARGUMENTS: usize = 32;

    #[inline]
    pub fn set(&mut self, arg: usize, active: bool) {
        assert!(arg < Self::MAX_ARGUMENTS, "activity mask holds at most 32 arguments");
        if active {
            self.0 |= 1 << arg;
        } else {
            self.0 &= !(1 << arg);
        }
    }

    #[inline]
    pub fn get(self, arg: usize) -> bool {
        arg < Self::MAX_ARGUMENTS && self.0 & (1 << arg) != 0
    }

    #[inline]
    pub fn any(self) -> bool {
        self.0 != 0
    }
}

impl ByteValue for Activity {
    const SIZE: usize = u32::SIZE;

    fn write_to(self, out: &mut [u8]) {
        self.0.write_to(out);
    }

    fn read_from(bytes: &[u8]) -> Self {
        Activity(u32::read_from(bytes))
    }
}

/// How an input array takes part in a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputUse {
    /// At least one element carries an identifier.
    pub active: bool,
    /// Another argument's derivative needs this argument's primal values.
    pub values_needed: bool,
}

impl InputUse {
    pub fn new(active: bool, values_needed: bool) -> Self {
        InputUse {
            active,
            values_needed,
        }
    }

    /// Primal tapes always need input values, to recompute the outputs.
    #[inline]
    pub fn needs_values(self, config: LayoutConfig) -> bool {
        self.values_needed || config.has_primals
    }

    /// Where replay finds this argument's primal values.
    #[inline]
    pub fn value_source(self, config: LayoutConfig) -> ValueSource {
        if !self.needs_values(config) {
            ValueSource::None
        } else if config.has_primals && self.active {
            ValueSource::PrimalVector
        } else {
            ValueSource::Stream
        }
    }
}

/// Origin of an input's primal values during replay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueSource {
    /// Values are not needed.
    None,
    /// All values are serialized in the dynamic segment.
    Stream,
    /// Active elements are read from the primal vector; only the values of
    /// passive elements are serialized.
    PrimalVector,
}

fn passive_count(identifiers: &[Identifier]) -> usize {
    identifiers.iter().filter(|&&id| id == PASSIVE).count()
}

/// Staging storage for one array argument while a record is processed.
///
/// All four buffers come from the [`ScratchAllocator`] and go back to it
/// when the record is released. Buffers a given call does not need are
/// left empty.
#[derive(Debug, Default)]
pub struct ArrayArgument<F: Float> {
    pub identifiers: Vec<Identifier>,
    pub values: Vec<F>,
    pub gradients: Vec<F>,
    pub old_values: Vec<F>,
}

impl<F: Float> ArrayArgument<F> {
    /// Stage an input array at store time.
    pub fn from_inputs(scratch: &mut ScratchAllocator<F>, args: &[Active<F>]) -> Self {
        let mut identifiers = scratch.identifiers(args.len());
        let mut values = scratch.values(args.len());
        for ((id, v), a) in identifiers.iter_mut().zip(values.iter_mut()).zip(args) {
            *id = a.identifier;
            *v = a.value;
        }
        ArrayArgument {
            identifiers,
            values,
            gradients: scratch.values(0),
            old_values: scratch.values(0),
        }
    }

    /// Stage an output array of `len` elements at store time.
    pub fn outputs(scratch: &mut ScratchAllocator<F>, len: usize) -> Self {
        ArrayArgument {
            identifiers: scratch.identifiers(len),
            values: scratch.values(len),
            gradients: scratch.values(0),
            old_values: scratch.values(len),
        }
    }

    pub fn len(&self) -> usize {
        self.identifiers.len().max(self.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` if any element carries an identifier.
    pub fn is_active(&self) -> bool {
        self.identifiers.iter().any(|&id| id != PASSIVE)
    }

    /// Read this argument's tangents (or adjoints) from the vector.
    pub fn gather_gradients(&mut self, vectors: &VectorAccess<'_, F>) {
        for (g, &id) in self.gradients.iter_mut().zip(&self.identifiers) {
            *g = vectors.gradient(id);
        }
    }

    /// Read and clear this argument's adjoints.
    pub fn take_gradients(&mut self, vectors: &mut VectorAccess<'_, F>) {
        for (g, &id) in self.gradients.iter_mut().zip(&self.identifiers) {
            *g = vectors.take_gradient(id);
        }
    }

    /// Overwrite this argument's tangents in the vector.
    pub fn scatter_gradients(&self, vectors: &mut VectorAccess<'_, F>) {
        for (&g, &id) in self.gradients.iter().zip(&self.identifiers) {
            vectors.set_gradient(id, g);
        }
    }

    /// Add this argument's adjoint contributions into the vector.
    pub fn accumulate_gradients(&self, vectors: &mut VectorAccess<'_, F>) {
        for (&g, &id) in self.gradients.iter().zip(&self.identifiers) {
            vectors.update_gradient(id, g);
        }
    }

    /// Write this argument's values into the primal vector.
    pub fn write_primals(&self, vectors: &mut VectorAccess<'_, F>) {
        for (&v, &id) in self.values.iter().zip(&self.identifiers) {
            vectors.set_primal(id, v);
        }
    }
}

/// A record type: an ordered list of typed fields.
pub trait RecordLayout<F: Float>: Default {
    /// Present every field to `visitor`, in storage order.
    ///
    /// Lengths passed for arrays may depend on scalars visited earlier;
    /// readers restore those scalars before reaching the arrays.
    fn visit<V: FieldVisitor<F>>(&mut self, visitor: &mut V);
}

/// One pass over a record's fields.
pub trait FieldVisitor<F: Float> {
    fn activity(&mut self, activity: &mut Activity);

    fn passive<T: ByteValue>(&mut self, value: &mut T);

    fn input(&mut self, arg: &mut ArrayArgument<F>, len: usize, usage: InputUse);

    fn output(&mut self, arg: &mut ArrayArgument<F>, len: usize);
}

/// Counting pass: exact byte sizes of both segments.
pub(crate) struct SizeCounter {
    pub(crate) config: LayoutConfig,
    pub(crate) fixed: usize,
    pub(crate) dynamic: usize,
}

impl SizeCounter {
    pub(crate) fn new(config: LayoutConfig) -> Self {
        SizeCounter {
            config,
            fixed: 0,
            dynamic: 0,
        }
    }
}

impl<F: Float> FieldVisitor<F> for SizeCounter {
    fn activity(&mut self, _: &mut Activity) {
        self.fixed += Activity::SIZE;
    }

    fn passive<T: ByteValue>(&mut self, _: &mut T) {
        self.fixed += T::SIZE;
    }

    fn input(&mut self, arg: &mut ArrayArgument<F>, len: usize, usage: InputUse) {
        if usage.active {
            self.dynamic += len * Identifier::SIZE;
        }
        self.dynamic += F::SIZE
            * match usage.value_source(self.config) {
                ValueSource::None => 0,
                ValueSource::Stream => len,
                ValueSource::PrimalVector => passive_count(&arg.identifiers[..len]),
            };
    }

    fn output(&mut self, _: &mut ArrayArgument<F>, len: usize) {
        self.dynamic += len * Identifier::SIZE;
        if self.config.stores_old_primals() {
            self.dynamic += len * F::SIZE;
        }
    }
}

/// Store pass: serialize into freshly reserved segments.
pub(crate) struct RecordWriter<'a> {
    pub(crate) config: LayoutConfig,
    pub(crate) fixed: ByteWriter<'a>,
    pub(crate) dynamic: ByteWriter<'a>,
}

impl<'a, F: Float> FieldVisitor<F> for RecordWriter<'a> {
    fn activity(&mut self, activity: &mut Activity) {
        self.fixed.write(*activity);
    }

    fn passive<T: ByteValue>(&mut self, value: &mut T) {
        self.fixed.write(*value);
    }

    fn input(&mut self, arg: &mut ArrayArgument<F>, len: usize, usage: InputUse) {
        if usage.active {
            self.dynamic.write_slice(&arg.identifiers[..len]);
        }
        match usage.value_source(self.config) {
            ValueSource::None => {}
            ValueSource::Stream => self.dynamic.write_slice(&arg.values[..len]),
            ValueSource::PrimalVector => {
                for (&v, &id) in arg.values[..len].iter().zip(&arg.identifiers[..len]) {
                    if id == PASSIVE {
                        self.dynamic.write(v);
                    }
                }
            }
        }
    }

    fn output(&mut self, arg: &mut ArrayArgument<F>, len: usize) {
        self.dynamic.write_slice(&arg.identifiers[..len]);
        if self.config.stores_old_primals() {
            self.dynamic.write_slice(&arg.old_values[..len]);
        }
    }
}

/// Restore pass: deserialize into scratch buffers.
pub(crate) struct RecordReader<'r, 'a, F: Float> {
    pub(crate) config: LayoutConfig,
    pub(crate) fixed: &'r mut ByteReader<'a>,
    pub(crate) dynamic: &'r mut ByteReader<'a>,
    pub(crate) scratch: &'r mut ScratchAllocator<F>,
}

impl<'r, 'a, F: Float> FieldVisitor<F> for RecordReader<'r, 'a, F> {
    fn activity(&mut self, activity: &mut Activity) {
        *activity = self.fixed.read();
    }

    fn passive<T: ByteValue>(&mut self, value: &mut T) {
        *value = self.fixed.read();
    }

    fn input(&mut self, arg: &mut ArrayArgument<F>, len: usize, usage: InputUse) {
        let active_len = if usage.active { len } else { 0 };
        let value_len = if usage.needs_values(self.config) { len } else { 0 };
        arg.identifiers = self.scratch.identifiers(active_len);
        arg.values = self.scratch.values(value_len);
        arg.gradients = self.scratch.values(active_len);
        arg.old_values = self.scratch.values(0);
        if usage.active {
            self.dynamic.read_into(&mut arg.identifiers);
        }
        match usage.value_source(self.config) {
            ValueSource::None => {}
            ValueSource::Stream => self.dynamic.read_into(&mut arg.values),
            ValueSource::PrimalVector => {
                for (v, &id) in arg.values.iter_mut().zip(&arg.identifiers) {
                    if id == PASSIVE {
                        *v = self.dynamic.read();
                    }
                }
            }
        }
    }

    fn output(&mut self, arg: &mut ArrayArgument<F>, len: usize) {
        let old_len = if self.config.stores_old_primals() { len } else { 0 };
        arg.identifiers = self.scratch.identifiers(len);
        arg.values = self.scratch.values(len);
        arg.gradients = self.scratch.values(len);
        arg.old_values = self.scratch.values(old_len);
        self.dynamic.read_into(&mut arg.identifiers);
        self.dynamic.read_into(&mut arg.old_values);
    }
}

/// Reverse replay on reuse tapes: put back the primal values the outputs
/// overwrote, before any input primal is read.
pub(crate) struct PrimalRestorer<'v, 'a, F: Float> {
    pub(crate) vectors: &'v mut VectorAccess<'a, F>,
}

impl<'v, 'a, F: Float> FieldVisitor<F> for PrimalRestorer<'v, 'a, F> {
    fn activity(&mut self, _: &mut Activity) {}

    fn passive<T: ByteValue>(&mut self, _: &mut T) {}

    fn input(&mut self, _: &mut ArrayArgument<F>, _: usize, _: InputUse) {}

    fn output(&mut self, arg: &mut ArrayArgument<F>, _: usize) {
        for (&old, &id) in arg.old_values.iter().zip(&arg.identifiers) {
            self.vectors.set_primal(id, old);
        }
    }
}

/// Fill input values that were left to the primal vector.
pub(crate) struct PrimalFetcher<'v, 'a, F: Float> {
    pub(crate) config: LayoutConfig,
    pub(crate) vectors: &'v VectorAccess<'a, F>,
}

impl<'v, 'a, F: Float> FieldVisitor<F> for PrimalFetcher<'v, 'a, F> {
    fn activity(&mut self, _: &mut Activity) {}

    fn passive<T: ByteValue>(&mut self, _: &mut T) {}

    fn input(&mut self, arg: &mut ArrayArgument<F>, _: usize, usage: InputUse) {
        if usage.value_source(self.config) == ValueSource::PrimalVector {
            for (v, &id) in arg.values.iter_mut().zip(&arg.identifiers) {
                if id != PASSIVE {
                    *v = self.vectors.primal(id);
                }
            }
        }
    }

    fn output(&mut self, _: &mut ArrayArgument<F>, _: usize) {}
}

/// Hand every staging buffer back to the allocator.
pub(crate) struct Reclaimer<'s, F: Float> {
    pub(crate) scratch: &'s mut ScratchAllocator<F>,
}

impl<'s, F: Float> Reclaimer<'s, F> {
    fn reclaim(&mut self, arg: &mut ArrayArgument<F>) {
        self.scratch.recycle_identifiers(mem::take(&mut arg.identifiers));
        self.scratch.recycle_values(mem::take(&mut arg.values));
        self.scratch.recycle_values(mem::take(&mut arg.gradients));
        self.scratch.recycle_values(mem::take(&mut arg.old_values));
    }
}

impl<'s, F: Float> FieldVisitor<F> for Reclaimer<'s, F> {
    fn activity(&mut self, _: &mut Activity) {}

    fn passive<T: ByteValue>(&mut self, _: &mut T) {}

    fn input(&mut self, arg: &mut ArrayArgument<F>, _: usize, _: InputUse) {
        self.reclaim(arg);
    }

    fn output(&mut self, arg: &mut ArrayArgument<F>, _: usize) {
        self.reclaim(arg);
    }
}
