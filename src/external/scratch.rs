//! Short-lived staging memory for external function (de)serialization.

use crate::float::Float;
use crate::index::Identifier;

/// Pool of buffers lent out while one external record is stored, replayed
/// or deleted.
///
/// Buffers keep their capacity between calls, so steady-state replay does
/// not allocate. Every buffer taken during a call is handed back before the
/// call returns; [`is_idle`](Self::is_idle) checks that.
#[derive(Debug)]
pub struct ScratchAllocator<F: Float> {
    values: Vec<Vec<F>>,
    identifiers: Vec<Vec<Identifier>>,
    lent: usize,
    peak_bytes: usize,
}

impl<F: Float> Default for ScratchAllocator<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> ScratchAllocator<F> {
    pub fn new() -> Self {
        ScratchAllocator {
            values: Vec::new(),
            identifiers: Vec::new(),
            lent: 0,
            peak_bytes: 0,
        }
    }

    /// Zeroed buffer of `len` reals.
    pub fn values(&mut self, len: usize) -> Vec<F> {
        let mut buf = self.values.pop().unwrap_or_default();
        buf.clear();
        buf.resize(len, F::zero());
        self.lent += 1;
        buf
    }

    /// Buffer of `len` passive identifiers.
    pub fn identifiers(&mut self, len: usize) -> Vec<Identifier> {
        let mut buf = self.identifiers.pop().unwrap_or_default();
        buf.clear();
        buf.resize(len, 0);
        self.lent += 1;
        buf
    }

    pub fn recycle_values(&mut self, buf: Vec<F>) {
        debug_assert!(self.lent > 0, "recycling a buffer that was not lent");
        self.lent = self.lent.saturating_sub(1);
        self.values.push(buf);
        self.track_peak();
    }

    pub fn recycle_identifiers(&mut self, buf: Vec<Identifier>) {
        debug_assert!(self.lent > 0, "recycling a buffer that was not lent");
        self.lent = self.lent.saturating_sub(1);
        self.identifiers.push(buf);
        self.track_peak();
    }

    fn track_peak(&mut self) {
        let bytes = self.pooled_bytes();
        if bytes > self.peak_bytes {
            self.peak_bytes = bytes;
        }
    }

    /// `true` when no buffer is currently lent out.
    pub fn is_idle(&self) -> bool {
        self.lent == 0
    }

    /// Capacity currently parked in the pool, in bytes.
    pub fn pooled_bytes(&self) -> usize {
        let v: usize = self.values.iter().map(|b| b.capacity()).sum();
        let i: usize = self.identifiers.iter().map(|b| b.capacity()).sum();
        v * std::mem::size_of::<F>() + i * std::mem::size_of::<Identifier>()
    }

    pub fn peak_bytes(&self) -> usize {
        self.peak_bytes
    }

    /// Drop all pooled buffers.
    pub fn shrink(&mut self) {
        debug_assert!(self.is_idle(), "shrinking scratch memory while buffers are lent");
        self.values = Vec::new();
        self.identifiers = Vec::new();
    }
}
