//! Jacobian tape for operator-overloading reverse-mode AD.
//!
//! The front end records each elementary operation `y = f(x1..xn)` as one
//! statement: the identifier of `y` plus the partial derivatives
//! `∂f/∂xi` of its active arguments. Sweeps over the recorded statements are
//! plain multiply-accumulate loops; no operation is re-evaluated.
//!
//! Statements are stored two-stack style: a statement only keeps the end of
//! its Jacobian range, the start being the end of the previous statement. A
//! sentinel statement at index 0 makes that lookup valid for every real
//! statement.
//!
//! External functions are interleaved with the elementary statements as
//! statements of their own kind; see [`crate::external`].

mod external;
mod forward;
mod reverse;
mod thread_local;

pub use self::thread_local::{with_active_tape, TapeGuard};

use std::any::TypeId;
use std::fmt;
use std::mem;
use std::ops::Range;

use crate::active::Active;
use crate::adjoint::AdjointVector;
use crate::error::{fatal, stream_position, Result, TapeError};
use crate::external::{ByteWriter, ExternalFunctionEntry, LayoutConfig, ScratchAllocator, Token};
use crate::float::Float;
use crate::index::{Identifier, IndexManager, LinearIndexManager, ReuseIndexManager, PASSIVE};
use crate::parameters::TapeParameter;
use crate::values::TapeValues;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StatementKind {
    Elementary,
    /// Input registration on tapes that restore overwritten primals.
    Input,
    /// Index into the external record table.
    External(u32),
}

/// A recorded operation: its result lives at `lhs`, and its arguments'
/// partials span `[prev.end_plus_one .. self.end_plus_one)`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Statement {
    lhs: Identifier,
    end_plus_one: u32,
    kind: StatementKind,
}

impl Statement {
    const SENTINEL: Statement = Statement {
        lhs: PASSIVE,
        end_plus_one: 0,
        kind: StatementKind::Elementary,
    };
}

/// Primal bookkeeping of one statement on primal-value tapes.
#[derive(Clone, Copy, Debug, Default)]
struct PrimalEntry<F> {
    new: F,
    /// Value the statement overwrote at its output slot.
    old: F,
}

/// Location of one external function's bytes.
#[derive(Clone, Debug)]
pub(crate) struct ExternalRecord {
    token: Token,
    fixed: Range<usize>,
    dynamic: Range<usize>,
}

/// A point in the recording, as returned by [`Tape::position`].
///
/// Positions order by the number of statements recorded before them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    statement: usize,
    external: usize,
    largest: Identifier,
}

impl Position {
    /// The beginning of every tape.
    pub const ZERO: Position = Position {
        statement: 0,
        external: 0,
        largest: PASSIVE,
    };

    /// Number of statements recorded before this position.
    pub fn statements(self) -> usize {
        self.statement
    }

    /// Number of external function records before this position.
    pub fn externals(self) -> usize {
        self.external
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.statement)
    }
}

/// What a tape records besides the Jacobian.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TapeKind {
    /// Partial derivatives only.
    Jacobian,
    /// Partial derivatives plus a primal vector indexed by identifier.
    PrimalValues,
}

/// Recording and evaluation state of one tape.
///
/// `I` selects the identifier policy. Not internally synchronized: give
/// each thread its own tape.
pub struct Tape<F: Float, I: IndexManager = LinearIndexManager> {
    statements: Vec<Statement>,
    jacobians: Vec<F>,
    arguments: Vec<Identifier>,
    /// Aligned with `statements` when `primals` is present, empty otherwise.
    primal_log: Vec<PrimalEntry<F>>,
    externals: Vec<ExternalRecord>,
    fixed_data: Vec<u8>,
    dynamic_data: Vec<u8>,
    adjoints: AdjointVector<F>,
    primals: Option<AdjointVector<F>>,
    /// Saved primal vector while a reverse sweep on a reuse tape rolls the
    /// primals back.
    primal_copy: AdjointVector<F>,
    index_manager: I,
    scratch: ScratchAllocator<F>,
}

/// Jacobian tape with monotonic identifiers.
pub type JacobianLinearTape<F> = Tape<F, LinearIndexManager>;
/// Jacobian tape that recycles identifiers of dead variables.
pub type JacobianReuseTape<F> = Tape<F, ReuseIndexManager>;

impl<F: Float, I: IndexManager> Default for Tape<F, I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float, I: IndexManager> Tape<F, I> {
    /// Create an empty Jacobian tape.
    pub fn new() -> Self {
        Self::with_kind(TapeKind::Jacobian)
    }

    /// Create an empty tape that also keeps a primal vector.
    pub fn with_primals() -> Self {
        Self::with_kind(TapeKind::PrimalValues)
    }

    pub fn with_kind(kind: TapeKind) -> Self {
        let primals = match kind {
            TapeKind::Jacobian => None,
            TapeKind::PrimalValues => Some(AdjointVector::new()),
        };
        let mut tape = Tape {
            statements: Vec::new(),
            jacobians: Vec::new(),
            arguments: Vec::new(),
            primal_log: Vec::new(),
            externals: Vec::new(),
            fixed_data: Vec::new(),
            dynamic_data: Vec::new(),
            adjoints: AdjointVector::new(),
            primals,
            primal_copy: AdjointVector::new(),
            index_manager: I::default(),
            scratch: ScratchAllocator::new(),
        };
        tape.push_sentinel();
        tape
    }

    /// Create a Jacobian tape with room for about `est_ops` statements.
    pub fn with_capacity(est_ops: usize) -> Self {
        let mut tape = Self::new();
        tape.statements.reserve(est_ops);
        tape.jacobians.reserve(est_ops * 2);
        tape.arguments.reserve(est_ops * 2);
        tape
    }

    fn push_sentinel(&mut self) {
        self.statements.push(Statement::SENTINEL);
        if self.primals.is_some() {
            self.primal_log.push(PrimalEntry::default());
        }
    }

    pub fn kind(&self) -> TapeKind {
        if self.primals.is_some() {
            TapeKind::PrimalValues
        } else {
            TapeKind::Jacobian
        }
    }

    #[inline]
    pub fn has_primals(&self) -> bool {
        self.primals.is_some()
    }

    /// Which fields external records carry on this tape.
    #[inline]
    pub fn layout_config(&self) -> LayoutConfig {
        LayoutConfig {
            has_primals: self.primals.is_some(),
            linear: I::LINEAR,
        }
    }

    // ── Identifiers ──

    #[inline]
    pub fn create_identifier(&mut self) -> Identifier {
        self.index_manager.create()
    }

    /// Release `id` (reusing policies only) and set it to [`PASSIVE`].
    #[inline]
    pub fn free_identifier(&mut self, id: &mut Identifier) {
        self.index_manager.free(id);
    }

    #[inline]
    pub fn largest_identifier(&self) -> Identifier {
        self.index_manager.largest_created()
    }

    pub fn index_manager(&self) -> &I {
        &self.index_manager
    }

    // ── Recording ──

    /// Append one argument of the statement being recorded.
    ///
    /// Passive arguments contribute nothing and are skipped. Call this for
    /// every argument, then [`push_statement`](Self::push_statement).
    #[inline]
    pub fn push_jacobian(&mut self, arg: Identifier, partial: F) {
        if arg != PASSIVE {
            self.jacobians.push(partial);
            self.arguments.push(arg);
        }
    }

    /// Close the statement whose arguments were just pushed.
    ///
    /// Gives `lhs` an identifier according to the index policy and returns
    /// it. A statement without arguments is still recorded; it clears the
    /// derivative of `lhs` when swept.
    #[inline]
    pub fn push_statement(&mut self, lhs: &mut Identifier, value: F) -> Identifier {
        let id = self.index_manager.assign(lhs);
        self.push_entry(id, StatementKind::Elementary, value);
        id
    }

    pub(crate) fn push_entry(&mut self, lhs: Identifier, kind: StatementKind, value: F) {
        let end_plus_one = stream_position(self.jacobians.len(), "Jacobian");
        self.statements.push(Statement {
            lhs,
            end_plus_one,
            kind,
        });
        if let Some(primals) = self.primals.as_mut() {
            let old = if lhs == PASSIVE {
                F::zero()
            } else {
                mem::replace(primals.get_mut(lhs), value)
            };
            self.primal_log.push(PrimalEntry { new: value, old });
        }
    }

    /// Record `lhs = value` with the given `(argument, partial)` pairs.
    ///
    /// If no argument is active the result is passive: `lhs` loses its
    /// identifier and nothing is recorded.
    pub fn store(&mut self, lhs: &mut Active<F>, value: F, args: &[(Identifier, F)]) {
        lhs.value = value;
        if args.iter().all(|&(id, _)| id == PASSIVE) {
            self.index_manager.free(&mut lhs.identifier);
            return;
        }
        for &(arg, partial) in args {
            self.push_jacobian(arg, partial);
        }
        self.push_statement(&mut lhs.identifier, value);
    }

    /// Make `x` an independent variable with a fresh identifier.
    ///
    /// Inputs are leaves: no statement clears their derivative in a sweep.
    pub fn register_input(&mut self, x: &mut Active<F>) -> Identifier {
        let id = self.index_manager.assign_unused(&mut x.identifier);
        if self.layout_config().stores_old_primals() {
            self.push_entry(id, StatementKind::Input, x.value);
        } else if let Some(primals) = self.primals.as_mut() {
            *primals.get_mut(id) = x.value;
        }
        id
    }

    /// Give the active output `y` an identifier no other variable shares,
    /// by recording a copy statement. Passive outputs are left alone.
    pub fn register_output(&mut self, y: &mut Active<F>) -> Identifier {
        if y.identifier == PASSIVE {
            return PASSIVE;
        }
        self.push_jacobian(y.identifier, F::one());
        let mut fresh = PASSIVE;
        let id = self.push_statement(&mut fresh, y.value);
        let mut old = mem::replace(&mut y.identifier, id);
        self.index_manager.free(&mut old);
        id
    }

    // ── Positions ──

    /// The current end of the recording.
    pub fn position(&self) -> Position {
        Position {
            statement: self.statements.len() - 1,
            external: self.externals.len(),
            largest: self.index_manager.largest_created(),
        }
    }

    /// Number of recorded statements, external records included.
    pub fn statement_count(&self) -> usize {
        self.statements.len() - 1
    }

    /// Clear the recording and all adjoints. Capacity is kept.
    pub fn reset(&mut self) {
        self.reset_to(Position::ZERO);
        self.adjoints.zero_all();
        log::debug!("tape reset");
    }

    /// Drop everything recorded after `pos`.
    ///
    /// The delete callback of every discarded external record runs first,
    /// newest record first. Adjoints are left untouched.
    pub fn reset_to(&mut self, pos: Position) {
        if pos.statement > self.statement_count() || pos.external > self.externals.len() {
            fatal(TapeError::InvalidRange {
                start: pos.statement,
                end: self.statement_count(),
            });
        }
        self.delete_externals(pos.external);

        self.statements.truncate(pos.statement + 1);
        let jacobian_end = self.statements[pos.statement].end_plus_one as usize;
        self.jacobians.truncate(jacobian_end);
        self.arguments.truncate(jacobian_end);
        if self.primals.is_some() {
            self.primal_log.truncate(pos.statement + 1);
        }

        let (fixed_end, dynamic_end) = match self.externals.last() {
            Some(record) => (record.fixed.end, record.dynamic.end),
            None => (0, 0),
        };
        self.fixed_data.truncate(fixed_end);
        self.dynamic_data.truncate(dynamic_end);

        self.index_manager.reset_to(pos.largest);
    }

    pub(crate) fn check_range(&self, start: Position, end: Position) {
        if start.statement > end.statement || end.statement > self.statement_count() {
            fatal(TapeError::InvalidRange {
                start: start.statement,
                end: end.statement,
            });
        }
    }

    /// Grow the derivative and primal vectors to cover every issued identifier.
    pub(crate) fn prepare_vectors(&mut self) {
        let largest = self.index_manager.largest_created();
        self.adjoints.ensure(largest);
        if let Some(primals) = self.primals.as_mut() {
            primals.ensure(largest);
        }
    }

    // ── Derivative access ──

    /// Adjoint (or tangent) of `id`. Identifiers past the end read slot 0.
    #[inline]
    pub fn gradient(&self, id: Identifier) -> F {
        self.adjoints.get(id)
    }

    /// Mutable adjoint (or tangent) of `id`, growing the vector if needed.
    #[inline]
    pub fn gradient_mut(&mut self, id: Identifier) -> &mut F {
        self.adjoints.get_mut(id)
    }

    /// Seed the adjoint (or tangent) of `id`. Passive identifiers are ignored.
    #[inline]
    pub fn set_gradient(&mut self, id: Identifier, value: F) {
        if id != PASSIVE {
            *self.adjoints.get_mut(id) = value;
        }
    }

    pub fn adjoints(&self) -> &AdjointVector<F> {
        &self.adjoints
    }

    pub fn adjoints_mut(&mut self) -> &mut AdjointVector<F> {
        &mut self.adjoints
    }

    /// Zero every adjoint, keeping the vector's size.
    pub fn clear_adjoints(&mut self) {
        self.adjoints.zero_all();
    }

    /// Release the adjoint vector down to slot 0, along with the sweep's
    /// primal copy and the pooled scratch buffers.
    pub fn delete_adjoint_vector(&mut self) {
        self.adjoints = AdjointVector::new();
        self.primal_copy = AdjointVector::new();
        self.scratch.shrink();
    }

    /// Primal value of `id` on primal-value tapes.
    pub fn primal(&self, id: Identifier) -> Option<F> {
        self.primals.as_ref().map(|p| p.get(id))
    }

    pub fn primals(&self) -> Option<&AdjointVector<F>> {
        self.primals.as_ref()
    }

    /// Staging memory used while external records are processed.
    pub fn scratch(&mut self) -> &mut ScratchAllocator<F> {
        &mut self.scratch
    }

    /// Exchange all recorded and derivative state with `other`.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    // ── Parameters ──

    pub fn get_parameter(&self, parameter: TapeParameter) -> Result<usize> {
        Ok(match parameter {
            TapeParameter::AdjointSize => self.adjoints.len(),
            TapeParameter::PrimalSize => match &self.primals {
                Some(primals) => primals.len(),
                None => return Err(TapeError::ParameterUnavailable { parameter }),
            },
            TapeParameter::StatementSize => self.statement_count(),
            TapeParameter::JacobianSize => self.jacobians.len(),
            TapeParameter::ExternalFunctionSize => self.externals.len(),
            TapeParameter::ByteDataSize => self.fixed_data.len() + self.dynamic_data.len(),
            TapeParameter::LargestIdentifier => self.index_manager.largest_created() as usize,
        })
    }

    /// Resize the adjoint or primal vector, or reserve recording capacity.
    pub fn set_parameter(&mut self, parameter: TapeParameter, value: usize) -> Result<()> {
        match parameter {
            TapeParameter::AdjointSize => self.adjoints.resize(value),
            TapeParameter::PrimalSize => match self.primals.as_mut() {
                Some(primals) => primals.resize(value),
                None => return Err(TapeError::ParameterUnavailable { parameter }),
            },
            TapeParameter::StatementSize => {
                let additional = value.saturating_sub(self.statement_count());
                self.statements.reserve(additional);
                if self.primals.is_some() {
                    self.primal_log.reserve(additional);
                }
            }
            TapeParameter::JacobianSize => {
                let additional = value.saturating_sub(self.jacobians.len());
                self.jacobians.reserve(additional);
                self.arguments.reserve(additional);
            }
            TapeParameter::ExternalFunctionSize => {
                self.externals
                    .reserve(value.saturating_sub(self.externals.len()));
            }
            TapeParameter::ByteDataSize => {
                self.fixed_data
                    .reserve(value.saturating_sub(self.fixed_data.len()));
                self.dynamic_data
                    .reserve(value.saturating_sub(self.dynamic_data.len()));
            }
            TapeParameter::LargestIdentifier => {
                return Err(TapeError::ReadOnlyParameter { parameter })
            }
        }
        log::debug!("tape parameter {parameter} set to {value}");
        Ok(())
    }

    pub fn get_parameter_by_name(&self, name: &str) -> Result<usize> {
        self.get_parameter(name.parse()?)
    }

    pub fn set_parameter_by_name(&mut self, name: &str, value: usize) -> Result<()> {
        self.set_parameter(name.parse()?, value)
    }

    // ── Diagnostics ──

    /// Sizes and memory of every part of the tape.
    pub fn tape_values(&self) -> TapeValues {
        let kind = match self.kind() {
            TapeKind::Jacobian => "Jacobian",
            TapeKind::PrimalValues => "Primal value",
        };
        let mut values = TapeValues::new(format!("{kind} tape ({} indices)", I::NAME));

        values.add_section("Adjoint vector");
        values.add_unsigned_entry("Number of adjoints", self.adjoints.len());
        values.add_double_entry("Memory allocated", self.adjoints.memory() as f64, true);

        if let Some(primals) = &self.primals {
            values.add_section("Primal vector");
            values.add_unsigned_entry("Number of primals", primals.len());
            values.add_double_entry("Memory allocated", primals.memory() as f64, true);
            values.add_double_entry("Sweep copy memory", self.primal_copy.memory() as f64, true);
        }

        self.index_manager.add_values(&mut values);

        let statement_bytes = self.statements.capacity() * mem::size_of::<Statement>()
            + self.primal_log.capacity() * mem::size_of::<PrimalEntry<F>>();
        values.add_section("Statement entries");
        values.add_unsigned_entry("Total number", self.statement_count());
        values.add_double_entry("Memory allocated", statement_bytes as f64, true);

        let jacobian_bytes = self.jacobians.capacity() * mem::size_of::<F>()
            + self.arguments.capacity() * mem::size_of::<Identifier>();
        values.add_section("Jacobian entries");
        values.add_unsigned_entry("Total number", self.jacobians.len());
        values.add_double_entry("Memory allocated", jacobian_bytes as f64, true);

        values.add_section("External function entries");
        values.add_unsigned_entry("Total number", self.externals.len());
        values.add_unsigned_entry("Fixed data bytes", self.fixed_data.len());
        values.add_unsigned_entry("Dynamic data bytes", self.dynamic_data.len());
        values.add_double_entry(
            "Memory allocated",
            (self.fixed_data.capacity() + self.dynamic_data.capacity()) as f64,
            true,
        );
        values.add_double_entry("Scratch memory", self.scratch.pooled_bytes() as f64, true);

        values
    }
}

impl<F: Float, I: IndexManager> Drop for Tape<F, I> {
    fn drop(&mut self) {
        // A panicking sweep may have left a record half read.
        if !std::thread::panicking() {
            self.delete_externals(0);
        }
    }
}

/// The capability set every tape variant offers, for code that records or
/// evaluates without caring about the index policy or tape kind.
pub trait AdTape<F: Float> {
    fn create_identifier(&mut self) -> Identifier;

    fn free_identifier(&mut self, id: &mut Identifier);

    fn register_input(&mut self, x: &mut Active<F>) -> Identifier;

    fn register_output(&mut self, y: &mut Active<F>) -> Identifier;

    fn push_jacobian(&mut self, arg: Identifier, partial: F);

    fn push_statement(&mut self, lhs: &mut Identifier, value: F) -> Identifier;

    fn store(&mut self, lhs: &mut Active<F>, value: F, args: &[(Identifier, F)]);

    fn register_external_function(
        &self,
        identity: TypeId,
        entry: ExternalFunctionEntry<F>,
    ) -> Token;

    fn push_external_function(
        &mut self,
        token: Token,
        fixed_size: usize,
        dynamic_size: usize,
    ) -> (ByteWriter<'_>, ByteWriter<'_>);

    fn position(&self) -> Position;

    fn evaluate_forward(&mut self, start: Position, end: Position);

    fn evaluate_reverse(&mut self, start: Position, end: Position);

    fn gradient(&self, id: Identifier) -> F;

    fn gradient_mut(&mut self, id: Identifier) -> &mut F;

    fn clear_adjoints(&mut self);

    fn reset(&mut self);
}

impl<F: Float, I: IndexManager> AdTape<F> for Tape<F, I> {
    fn create_identifier(&mut self) -> Identifier {
        Tape::create_identifier(self)
    }

    fn free_identifier(&mut self, id: &mut Identifier) {
        Tape::free_identifier(self, id)
    }

    fn register_input(&mut self, x: &mut Active<F>) -> Identifier {
        Tape::register_input(self, x)
    }

    fn register_output(&mut self, y: &mut Active<F>) -> Identifier {
        Tape::register_output(self, y)
    }

    fn push_jacobian(&mut self, arg: Identifier, partial: F) {
        Tape::push_jacobian(self, arg, partial)
    }

    fn push_statement(&mut self, lhs: &mut Identifier, value: F) -> Identifier {
        Tape::push_statement(self, lhs, value)
    }

    fn store(&mut self, lhs: &mut Active<F>, value: F, args: &[(Identifier, F)]) {
        Tape::store(self, lhs, value, args)
    }

    fn register_external_function(
        &self,
        identity: TypeId,
        entry: ExternalFunctionEntry<F>,
    ) -> Token {
        Tape::register_external_function(self, identity, entry)
    }

    fn push_external_function(
        &mut self,
        token: Token,
        fixed_size: usize,
        dynamic_size: usize,
    ) -> (ByteWriter<'_>, ByteWriter<'_>) {
        Tape::push_external_function(self, token, fixed_size, dynamic_size)
    }

    fn position(&self) -> Position {
        Tape::position(self)
    }

    fn evaluate_forward(&mut self, start: Position, end: Position) {
        Tape::evaluate_forward(self, start, end)
    }

    fn evaluate_reverse(&mut self, start: Position, end: Position) {
        Tape::evaluate_reverse(self, start, end)
    }

    fn gradient(&self, id: Identifier) -> F {
        Tape::gradient(self, id)
    }

    fn gradient_mut(&mut self, id: Identifier) -> &mut F {
        Tape::gradient_mut(self, id)
    }

    fn clear_adjoints(&mut self) {
        Tape::clear_adjoints(self)
    }

    fn reset(&mut self) {
        Tape::reset(self)
    }
}
