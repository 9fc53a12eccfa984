use std::any::TypeId;

use crate::active::Active;
use crate::error::stream_position;
use crate::external::{
    lookup, register_external_function, ByteReader, ByteWriter,
    DeleteContext, ExternalFunction, ExternalFunctionEntry, Reclaimer, RecordLayout, RecordWriter,
    ReplayContext, SizeCounter, Token, VectorAccess,
};
use crate::float::Float;
use crate::index::{IndexManager, PASSIVE};

use super::{ExternalRecord, StatementKind, Tape};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Sweep {
    Forward,
    Reverse,
}

impl<F: Float, I: IndexManager> Tape<F, I> {
    /// Register a callback triple under `identity`. Tokens are process-wide;
    /// registering the same identity again returns the same token.
    pub fn register_external_function(
        &self,
        identity: TypeId,
        entry: ExternalFunctionEntry<F>,
    ) -> Token {
        register_external_function(identity, entry)
    }

    /// Token of the external function `E`.
    pub fn external_token<E: ExternalFunction<F>>(&self) -> Token {
        E::token()
    }

    /// Append an external record and reserve its two byte segments.
    ///
    /// The returned writers must be filled exactly; see
    /// [`ByteWriter::finish`].
    pub fn push_external_function(
        &mut self,
        token: Token,
        fixed_size: usize,
        dynamic_size: usize,
    ) -> (ByteWriter<'_>, ByteWriter<'_>) {
        lookup::<F>(token);

        let fixed_start = self.fixed_data.len();
        let dynamic_start = self.dynamic_data.len();
        self.fixed_data.resize(fixed_start + fixed_size, 0);
        self.dynamic_data.resize(dynamic_start + dynamic_size, 0);

        let index = stream_position(self.externals.len(), "external function");
        self.externals.push(ExternalRecord {
            token,
            fixed: fixed_start..fixed_start + fixed_size,
            dynamic: dynamic_start..dynamic_start + dynamic_size,
        });
        self.push_entry(PASSIVE, StatementKind::External(index), F::zero());

        (
            ByteWriter::new("fixed", &mut self.fixed_data[fixed_start..]),
            ByteWriter::new("dynamic", &mut self.dynamic_data[dynamic_start..]),
        )
    }

    /// Size, reserve and serialize `record` as a new external record.
    pub fn store_external<L: RecordLayout<F>>(&mut self, token: Token, record: &mut L) {
        let config = self.layout_config();
        let mut counter = SizeCounter::new(config);
        record.visit(&mut counter);
        let (fixed_size, dynamic_size) = (counter.fixed, counter.dynamic);

        let (fixed, dynamic) = self.push_external_function(token, fixed_size, dynamic_size);
        let mut writer = RecordWriter {
            config,
            fixed,
            dynamic,
        };
        record.visit(&mut writer);
        writer.fixed.finish();
        writer.dynamic.finish();
        log::trace!(
            "stored external record {token}: {fixed_size} fixed, {dynamic_size} dynamic bytes"
        );
    }

    /// Give an output of an external function a fresh identifier.
    ///
    /// On primal-value tapes the output's value is written to the primal
    /// vector and the value it replaced is returned; otherwise zero.
    pub fn register_external_output(&mut self, out: &mut Active<F>) -> F {
        let id = self.index_manager.assign_unused(&mut out.identifier);
        match self.primals.as_mut() {
            Some(primals) => std::mem::replace(primals.get_mut(id), out.value),
            None => F::zero(),
        }
    }

    /// Hand the staging buffers of a store-time record back to the tape.
    pub fn release_record<L: RecordLayout<F>>(&mut self, record: &mut L) {
        record.visit(&mut Reclaimer {
            scratch: &mut self.scratch,
        });
    }

    pub(crate) fn replay_external(&mut self, index: usize, sweep: Sweep) {
        let config = self.layout_config();
        let record = &self.externals[index];
        let entry = lookup::<F>(record.token);
        let mut ctx = ReplayContext {
            fixed: ByteReader::new("fixed", &self.fixed_data[record.fixed.clone()]),
            dynamic: ByteReader::new("dynamic", &self.dynamic_data[record.dynamic.clone()]),
            scratch: &mut self.scratch,
            vectors: VectorAccess::new(&mut self.adjoints, self.primals.as_mut()),
            config,
        };
        match sweep {
            Sweep::Forward => (entry.forward)(&mut ctx),
            Sweep::Reverse => (entry.reverse)(&mut ctx),
        }
    }

    /// Run the delete callbacks of records `from..`, newest first, and drop
    /// them from the record table.
    pub(crate) fn delete_externals(&mut self, from: usize) {
        if from >= self.externals.len() {
            return;
        }
        let config = self.layout_config();
        for record in self.externals[from..].iter().rev() {
            let entry = lookup::<F>(record.token);
            let mut ctx = DeleteContext {
                fixed: ByteReader::new("fixed", &self.fixed_data[record.fixed.clone()]),
                dynamic: ByteReader::new("dynamic", &self.dynamic_data[record.dynamic.clone()]),
                scratch: &mut self.scratch,
                config,
            };
            (entry.delete)(&mut ctx);
        }
        log::debug!("deleted {} external records", self.externals.len() - from);
        self.externals.truncate(from);
    }
}
