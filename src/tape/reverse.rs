use crate::float::Float;
use crate::index::IndexManager;

use super::external::Sweep;
use super::{Position, StatementKind, Tape};

impl<F: Float, I: IndexManager> Tape<F, I> {
    /// Reverse (adjoint) sweep over the statements in `[start, end)`, newest
    /// first.
    ///
    /// Each statement reads and clears its output adjoint, then accumulates
    /// `partial * adjoint` into every argument. Zero adjoints are skipped.
    /// On reuse tapes with primals, the primal each statement overwrote is
    /// restored before anything else happens to it; the primal vector is
    /// saved first and put back once the sweep returns, so sweeps can be
    /// repeated. Panics if `start > end` or `end` lies past the current
    /// position.
    pub fn evaluate_reverse(&mut self, start: Position, end: Position) {
        self.check_range(start, end);
        if start.statement == end.statement {
            return;
        }
        log::trace!("reverse sweep over statements {}..{}", start, end);
        self.prepare_vectors();
        let restore = self.layout_config().stores_old_primals();
        if restore {
            if let Some(primals) = self.primals.as_ref() {
                self.primal_copy.copy_from(primals);
            }
        }

        for idx in (start.statement + 1..=end.statement).rev() {
            let stmt = self.statements[idx];
            match stmt.kind {
                StatementKind::Elementary => {
                    if restore {
                        if let Some(primals) = self.primals.as_mut() {
                            *primals.get_mut(stmt.lhs) = self.primal_log[idx].old;
                        }
                    }
                    let a = self.adjoints.get(stmt.lhs);
                    if a != F::zero() {
                        *self.adjoints.get_mut(stmt.lhs) = F::zero();
                        let begin = self.statements[idx - 1].end_plus_one as usize;
                        for j in begin..stmt.end_plus_one as usize {
                            let slot = self.adjoints.get_mut(self.arguments[j]);
                            *slot = *slot + self.jacobians[j] * a;
                        }
                    }
                }
                StatementKind::Input => {
                    if restore {
                        if let Some(primals) = self.primals.as_mut() {
                            *primals.get_mut(stmt.lhs) = self.primal_log[idx].old;
                        }
                    }
                }
                StatementKind::External(k) => self.replay_external(k as usize, Sweep::Reverse),
            }
        }

        if restore {
            if let Some(primals) = self.primals.as_mut() {
                primals.swap(&mut self.primal_copy);
            }
        }
    }

    /// Reverse sweep over the whole recording.
    pub fn evaluate(&mut self) {
        let end = self.position();
        self.evaluate_reverse(Position::ZERO, end);
    }
}
