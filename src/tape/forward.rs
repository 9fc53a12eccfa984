use crate::float::Float;
use crate::index::IndexManager;

use super::external::Sweep;
use super::{Position, StatementKind, Tape};

impl<F: Float, I: IndexManager> Tape<F, I> {
    /// Forward (tangent) sweep over the statements in `[start, end)`.
    ///
    /// Each statement overwrites its output tangent with
    /// `Σ partial * tangent[arg]`. On primal-value tapes the recorded primal
    /// is written back as well. Panics if `start > end` or `end` lies past
    /// the current position.
    pub fn evaluate_forward(&mut self, start: Position, end: Position) {
        self.check_range(start, end);
        if start.statement == end.statement {
            return;
        }
        log::trace!("forward sweep over statements {}..{}", start, end);
        self.prepare_vectors();

        for idx in start.statement + 1..=end.statement {
            let stmt = self.statements[idx];
            match stmt.kind {
                StatementKind::Elementary => {
                    let begin = self.statements[idx - 1].end_plus_one as usize;
                    let mut tangent = F::zero();
                    for j in begin..stmt.end_plus_one as usize {
                        tangent = tangent + self.jacobians[j] * self.adjoints.get(self.arguments[j]);
                    }
                    *self.adjoints.get_mut(stmt.lhs) = tangent;
                    if let Some(primals) = self.primals.as_mut() {
                        *primals.get_mut(stmt.lhs) = self.primal_log[idx].new;
                    }
                }
                StatementKind::Input => {
                    if let Some(primals) = self.primals.as_mut() {
                        *primals.get_mut(stmt.lhs) = self.primal_log[idx].new;
                    }
                }
                StatementKind::External(k) => self.replay_external(k as usize, Sweep::Forward),
            }
        }
    }

    /// Forward sweep over the whole recording.
    pub fn evaluate_forward_all(&mut self) {
        let end = self.position();
        self.evaluate_forward(Position::ZERO, end);
    }
}
