//! Byte cursors over the fixed and dynamic segments of an external record.

use crate::error::{fatal, TapeError};

/// Plain values that can be copied into and out of a byte segment.
///
/// Layouts are in-memory only, so native endianness is used.
pub trait ByteValue: Copy + Default + 'static {
    const SIZE: usize;

    fn write_to(self, out: &mut [u8]);

    fn read_from(bytes: &[u8]) -> Self;
}

macro_rules! impl_byte_value {
    ($($t:ty),*) => {
        $(
            impl ByteValue for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                #[inline]
                fn write_to(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_ne_bytes());
                }

                #[inline]
                fn read_from(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(bytes);
                    <$t>::from_ne_bytes(raw)
                }
            }
        )*
    };
}

impl_byte_value!(u8, u16, u32, u64, usize, i8, i16, i32, i64, f32, f64);

impl ByteValue for bool {
    const SIZE: usize = 1;

    #[inline]
    fn write_to(self, out: &mut [u8]) {
        out[0] = self as u8;
    }

    #[inline]
    fn read_from(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// Write cursor over one reserved segment.
///
/// The segment was sized by a counting pass; writing past its end, or
/// finishing before it is full, is a layout mismatch.
pub struct ByteWriter<'a> {
    segment: &'static str,
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ByteWriter<'a> {
    pub(crate) fn new(segment: &'static str, buf: &'a mut [u8]) -> Self {
        ByteWriter {
            segment,
            buf,
            pos: 0,
        }
    }

    #[inline]
    fn take(&mut self, len: usize) -> &mut [u8] {
        let end = self.pos + len;
        if end > self.buf.len() {
            fatal(TapeError::LayoutMismatch {
                segment: self.segment,
                expected: self.buf.len(),
                actual: end,
            });
        }
        let out = &mut self.buf[self.pos..end];
        self.pos = end;
        out
    }

    #[inline]
    pub fn write<T: ByteValue>(&mut self, value: T) {
        value.write_to(self.take(T::SIZE));
    }

    pub fn write_slice<T: ByteValue>(&mut self, values: &[T]) {
        let out = self.take(T::SIZE * values.len());
        for (chunk, &v) in out.chunks_exact_mut(T::SIZE).zip(values) {
            v.write_to(chunk);
        }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Check that the whole segment was written.
    pub fn finish(&self) {
        if self.pos != self.buf.len() {
            fatal(TapeError::LayoutMismatch {
                segment: self.segment,
                expected: self.buf.len(),
                actual: self.pos,
            });
        }
    }
}

/// Read cursor over one recorded segment.
pub struct ByteReader<'a> {
    segment: &'static str,
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(segment: &'static str, buf: &'a [u8]) -> Self {
        ByteReader {
            segment,
            buf,
            pos: 0,
        }
    }

    #[inline]
    fn take(&mut self, len: usize) -> &'a [u8] {
        let end = self.pos + len;
        if end > self.buf.len() {
            fatal(TapeError::LayoutMismatch {
                segment: self.segment,
                expected: self.buf.len(),
                actual: end,
            });
        }
        let buf: &'a [u8] = self.buf;
        self.pos = end;
        &buf[end - len..end]
    }

    #[inline]
    pub fn read<T: ByteValue>(&mut self) -> T {
        T::read_from(self.take(T::SIZE))
    }

    pub fn read_into<T: ByteValue>(&mut self, out: &mut [T]) {
        let bytes = self.take(T::SIZE * out.len());
        for (v, chunk) in out.iter_mut().zip(bytes.chunks_exact(T::SIZE)) {
            *v = T::read_from(chunk);
        }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Check that the whole segment was consumed.
    pub fn finish(&self) {
        if self.pos != self.buf.len() {
            fatal(TapeError::LayoutMismatch {
                segment: self.segment,
                expected: self.buf.len(),
                actual: self.pos,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_mixed_fields() {
        let mut buf = vec![0u8; 1 + 4 + 2 * 8];
        let mut w = ByteWriter::new("fixed", &mut buf);
        w.write(true);
        w.write(7u32);
        w.write_slice(&[1.5f64, -2.0]);
        assert_eq!(w.remaining(), 0);
        w.finish();

        let mut r = ByteReader::new("fixed", &buf);
        assert!(r.read::<bool>());
        assert_eq!(r.read::<u32>(), 7);
        let mut out = [0.0f64; 2];
        r.read_into(&mut out);
        assert_eq!(out, [1.5, -2.0]);
        r.finish();
    }

    #[test]
    #[should_panic(expected = "byte segment mismatch")]
    fn overrun_is_fatal() {
        let mut buf = vec![0u8; 2];
        let mut w = ByteWriter::new("dynamic", &mut buf);
        w.write(1u32);
    }

    #[test]
    #[should_panic(expected = "fixed byte segment mismatch")]
    fn partial_read_is_fatal() {
        let buf = vec![0u8; 8];
        let mut r = ByteReader::new("fixed", &buf);
        let _ = r.read::<u32>();
        r.finish();
    }
}
