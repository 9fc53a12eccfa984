//! External (low-level) functions.
//!
//! An external function is a hand-written derivative kernel, such as a
//! matrix multiply, recorded as one opaque tape entry instead of one
//! statement per scalar operation. Its arguments are serialized into two
//! byte segments owned by the tape:
//!
//! - the *fixed* segment holds activity flags and passive scalars,
//! - the *dynamic* segment holds arrays whose lengths depend on those scalars.
//!
//! A record type describes its fields once through [`RecordLayout`]; the
//! tape's store routine and the replay helpers on [`ReplayContext`] and
//! [`DeleteContext`] all walk that description.
//!
//! # Example
//!
//! ```ignore
//! #[derive(Default)]
//! struct ScaleRecord<F: Float> {
//!     activity: Activity,
//!     n: u32,
//!     factor: F,
//!     x: ArrayArgument<F>,
//!     y: ArrayArgument<F>,
//! }
//!
//! impl<F: Float> RecordLayout<F> for ScaleRecord<F> {
//!     fn visit<V: FieldVisitor<F>>(&mut self, v: &mut V) {
//!         v.activity(&mut self.activity);
//!         v.passive(&mut self.n);
//!         v.passive(&mut self.factor);
//!         let n = self.n as usize;
//!         v.input(&mut self.x, n, InputUse::new(self.activity.get(0), false));
//!         v.output(&mut self.y, n);
//!     }
//! }
//! ```

mod bytes;
mod layout;
mod registry;
mod scratch;

pub use self::bytes::{ByteReader, ByteValue, ByteWriter};
pub use self::layout::{
    Activity, ArrayArgument, FieldVisitor, InputUse, LayoutConfig, RecordLayout, ValueSource,
};
pub use self::registry::{
    lookup, register_external_function, registered_count, DeleteFn, ExternalFunction,
    ExternalFunctionEntry, ForwardFn, ReverseFn, Token,
};
pub use self::scratch::ScratchAllocator;

pub(crate) use self::layout::{Reclaimer, RecordWriter, SizeCounter};

use self::layout::{PrimalFetcher, PrimalRestorer, RecordReader};
use crate::adjoint::AdjointVector;
use crate::float::Float;
use crate::index::{Identifier, PASSIVE};

/// Gradient and primal access handed to external function callbacks.
///
/// Writes addressed to [`PASSIVE`] are dropped, so slot 0 keeps serving as
/// the zero fallback of out-of-range reads.
pub struct VectorAccess<'a, F: Float> {
    adjoints: &'a mut AdjointVector<F>,
    primals: Option<&'a mut AdjointVector<F>>,
}

impl<'a, F: Float> VectorAccess<'a, F> {
    pub(crate) fn new(
        adjoints: &'a mut AdjointVector<F>,
        primals: Option<&'a mut AdjointVector<F>>,
    ) -> Self {
        VectorAccess { adjoints, primals }
    }

    #[inline]
    pub fn gradient(&self, id: Identifier) -> F {
        self.adjoints.get(id)
    }

    #[inline]
    pub fn set_gradient(&mut self, id: Identifier, value: F) {
        if id != PASSIVE {
            *self.adjoints.get_mut(id) = value;
        }
    }

    /// Add `delta` to the gradient of `id`.
    #[inline]
    pub fn update_gradient(&mut self, id: Identifier, delta: F) {
        if id != PASSIVE {
            let slot = self.adjoints.get_mut(id);
            *slot = *slot + delta;
        }
    }

    /// Read the gradient of `id` and reset it to zero.
    #[inline]
    pub fn take_gradient(&mut self, id: Identifier) -> F {
        if id == PASSIVE {
            return self.adjoints.get(PASSIVE);
        }
        std::mem::replace(self.adjoints.get_mut(id), F::zero())
    }

    #[inline]
    pub fn has_primals(&self) -> bool {
        self.primals.is_some()
    }

    /// Primal value of `id`. Zero on tapes without a primal vector.
    #[inline]
    pub fn primal(&self, id: Identifier) -> F {
        match &self.primals {
            Some(p) => p.get(id),
            None => F::zero(),
        }
    }

    /// Set the primal value of `id`. No-op on tapes without a primal vector.
    #[inline]
    pub fn set_primal(&mut self, id: Identifier, value: F) {
        if let Some(p) = self.primals.as_mut() {
            if id != PASSIVE {
                *p.get_mut(id) = value;
            }
        }
    }
}

/// Everything a forward or reverse callback gets for one record.
pub struct ReplayContext<'a, F: Float> {
    pub fixed: ByteReader<'a>,
    pub dynamic: ByteReader<'a>,
    pub scratch: &'a mut ScratchAllocator<F>,
    pub vectors: VectorAccess<'a, F>,
    pub config: LayoutConfig,
}

impl<'a, F: Float> ReplayContext<'a, F> {
    fn restore<L: RecordLayout<F>>(&mut self) -> L {
        let mut record = L::default();
        record.visit(&mut RecordReader {
            config: self.config,
            fixed: &mut self.fixed,
            dynamic: &mut self.dynamic,
            scratch: &mut *self.scratch,
        });
        self.fixed.finish();
        self.dynamic.finish();
        record
    }

    fn release<L: RecordLayout<F>>(&mut self, mut record: L) {
        record.visit(&mut Reclaimer {
            scratch: &mut *self.scratch,
        });
        debug_assert!(self.scratch.is_idle(), "record did not return all scratch buffers");
    }

    /// Forward replay: restore the record, fill input primals from the
    /// primal vector where the layout left them there, run `body`, release.
    pub fn forward<L: RecordLayout<F>>(
        &mut self,
        body: impl FnOnce(&mut L, &mut VectorAccess<'_, F>),
    ) {
        let mut record = self.restore::<L>();
        record.visit(&mut PrimalFetcher {
            config: self.config,
            vectors: &self.vectors,
        });
        body(&mut record, &mut self.vectors);
        self.release(record);
    }

    /// Reverse replay: restore the record, undo the outputs' primal
    /// overwrites on reuse tapes, fetch input primals, run `body`, release.
    pub fn reverse<L: RecordLayout<F>>(
        &mut self,
        body: impl FnOnce(&mut L, &mut VectorAccess<'_, F>),
    ) {
        let mut record = self.restore::<L>();
        if self.config.stores_old_primals() {
            record.visit(&mut PrimalRestorer {
                vectors: &mut self.vectors,
            });
        }
        record.visit(&mut PrimalFetcher {
            config: self.config,
            vectors: &self.vectors,
        });
        body(&mut record, &mut self.vectors);
        self.release(record);
    }
}

/// Everything a delete callback gets for one record. No gradient access.
pub struct DeleteContext<'a, F: Float> {
    pub fixed: ByteReader<'a>,
    pub dynamic: ByteReader<'a>,
    pub scratch: &'a mut ScratchAllocator<F>,
    pub config: LayoutConfig,
}

impl<'a, F: Float> DeleteContext<'a, F> {
    /// Restore the record, hand it to `body`, release it.
    pub fn delete<L: RecordLayout<F>>(&mut self, body: impl FnOnce(&mut L)) {
        let mut record = L::default();
        record.visit(&mut RecordReader {
            config: self.config,
            fixed: &mut self.fixed,
            dynamic: &mut self.dynamic,
            scratch: &mut *self.scratch,
        });
        self.fixed.finish();
        self.dynamic.finish();
        body(&mut record);
        record.visit(&mut Reclaimer {
            scratch: &mut *self.scratch,
        });
    }
}
