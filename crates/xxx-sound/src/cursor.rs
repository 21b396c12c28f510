//! Bounds-checked random access over a file or an in-memory buffer.
//!
//! Every read and write is checked against the length captured when the
//! cursor was created, so a computed offset can never silently run past the
//! end of the source or grow a file being patched.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{BoundsError, Result};

/// Half-open byte range `[start, end)` in absolute source offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end: end.max(start) }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Round `value` up to the next multiple of `to`.
pub fn align(value: u64, to: u64) -> u64 {
    if to == 0 {
        return value;
    }
    value.div_ceil(to) * to
}

#[derive(Debug)]
pub struct ByteCursor<R> {
    inner: R,
    len: u64,
    pos: u64,
}

impl ByteCursor<Cursor<Vec<u8>>> {
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let len = data.len() as u64;
        Self { inner: Cursor::new(data), len, pos: 0 }
    }
}

impl ByteCursor<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::new(File::open(path)?)
    }

    /// Opens for in-place patching. The file is never extended.
    pub fn open_rw<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::new(File::options().read(true).write(true).open(path)?)
    }
}

impl<R: Seek> ByteCursor<R> {
    pub fn new(mut inner: R) -> io::Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, len, pos: 0 })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.pos)
    }

    pub fn check(&self, offset: u64, len: u64) -> std::result::Result<(), BoundsError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(BoundsError { offset, len, source_len: self.len }),
        }
    }

    pub fn seek(&mut self, pos: u64) -> std::result::Result<(), BoundsError> {
        self.check(pos, 0)?;
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, n: u64) -> std::result::Result<(), BoundsError> {
        self.seek(self.pos.saturating_add(n))
    }

    fn prepare(&mut self, offset: u64, len: u64) -> Result<()> {
        self.check(offset, len)?;
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> ByteCursor<R> {
    pub fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.prepare(offset, buf.len() as u64)?;
        self.inner.read_exact(buf)?;
        Ok(())
    }

    pub fn read_bytes_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.check(offset, len as u64)?;
        let mut buf = vec![0u8; len];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }

    pub fn u8_at(&mut self, offset: u64) -> Result<u8> {
        self.prepare(offset, 1)?;
        Ok(self.inner.read_u8()?)
    }

    pub fn u16_le_at(&mut self, offset: u64) -> Result<u16> {
        self.prepare(offset, 2)?;
        Ok(self.inner.read_u16::<LittleEndian>()?)
    }

    pub fn u32_le_at(&mut self, offset: u64) -> Result<u32> {
        self.prepare(offset, 4)?;
        Ok(self.inner.read_u32::<LittleEndian>()?)
    }

    pub fn i32_le_at(&mut self, offset: u64) -> Result<i32> {
        self.prepare(offset, 4)?;
        Ok(self.inner.read_i32::<LittleEndian>()?)
    }

    pub fn u32_be_at(&mut self, offset: u64) -> Result<u32> {
        self.prepare(offset, 4)?;
        Ok(self.inner.read_u32::<BigEndian>()?)
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        let v = self.u16_le_at(self.pos)?;
        self.pos += 2;
        Ok(v)
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let v = self.u32_le_at(self.pos)?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        let v = self.u32_be_at(self.pos)?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact_at(self.pos, &mut buf)?;
        self.pos += N as u64;
        Ok(buf)
    }

    /// Streams `len` bytes starting at `offset` into `sink` in `chunk`-sized
    /// pieces.
    pub fn copy_range<W: Write>(&mut self, offset: u64, len: u64, sink: &mut W, chunk: usize) -> Result<u64> {
        self.prepare(offset, len)?;
        let mut buf = vec![0u8; chunk.max(1)];
        let mut left = len;
        while left > 0 {
            let n = (left as usize).min(buf.len());
            self.inner.read_exact(&mut buf[..n])?;
            sink.write_all(&buf[..n])?;
            left -= n as u64;
        }
        Ok(len)
    }
}

impl<R: Write + Seek> ByteCursor<R> {
    /// Overwrites existing bytes. Refuses anything that would extend the source.
    pub fn write_all_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.prepare(offset, data.len() as u64)?;
        self.inner.write_all(data)?;
        Ok(())
    }

    pub fn write_zeros_at(&mut self, offset: u64, len: u64, chunk: usize) -> Result<()> {
        self.prepare(offset, len)?;
        write_zeros(&mut self.inner, len, chunk)?;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub fn write_zeros<W: Write>(sink: &mut W, len: u64, chunk: usize) -> io::Result<()> {
    let zeros = vec![0u8; chunk.max(1).min(len as usize)];
    let mut left = len;
    while left > 0 {
        let n = (left as usize).min(zeros.len());
        sink.write_all(&zeros[..n])?;
        left -= n as u64;
    }
    Ok(())
}

/// Forward scanning buffer. Keeps one chunk of the source resident and
/// refills from the requested position whenever a request leaves it, so
/// patterns that straddle chunk boundaries are still seen whole.
#[derive(Debug)]
pub struct ScanWindow {
    buf: Vec<u8>,
    base: u64,
    filled: usize,
    chunk: usize,
}

impl ScanWindow {
    pub fn new(chunk: usize) -> Self {
        Self { buf: Vec::new(), base: 0, filled: 0, chunk: chunk.max(16) }
    }

    /// Returns `n` bytes at `pos`, or `None` when they would run past the
    /// end of the source.
    pub fn bytes<R: Read + Seek>(&mut self, cursor: &mut ByteCursor<R>, pos: u64, n: usize) -> Result<Option<&[u8]>> {
        if cursor.check(pos, n as u64).is_err() {
            return Ok(None);
        }
        let resident = pos >= self.base && pos + n as u64 <= self.base + self.filled as u64;
        if !resident {
            let want = (self.chunk.max(n) as u64).min(cursor.len() - pos) as usize;
            self.buf.resize(want, 0);
            cursor.read_exact_at(pos, &mut self.buf[..want])?;
            self.base = pos;
            self.filled = want;
        }
        let start = (pos - self.base) as usize;
        Ok(Some(&self.buf[start..start + n]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn endian_readers() {
        let mut c = ByteCursor::from_bytes(vec![0x9E, 0x2A, 0x83, 0xC1, 0x01, 0x00, 0x02, 0x00]);
        assert_eq!(c.u32_be_at(0).unwrap(), 0x9E2A83C1);
        assert_eq!(c.u32_le_at(0).unwrap(), 0xC1832A9E);
        c.seek(4).unwrap();
        assert_eq!(c.read_u16_le().unwrap(), 1);
        assert_eq!(c.read_u16_le().unwrap(), 2);
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn reads_past_end_are_bounds_errors() {
        let mut c = ByteCursor::from_bytes(vec![0u8; 6]);
        assert!(matches!(c.u32_le_at(3), Err(Error::Bounds(_))));
        assert!(matches!(c.u32_le_at(u64::MAX - 1), Err(Error::Bounds(_))));
        assert!(c.seek(7).is_err());
        assert!(c.seek(6).is_ok());
    }

    #[test]
    fn writes_never_extend() {
        let mut c = ByteCursor::from_bytes(vec![1u8; 4]);
        assert!(c.write_all_at(2, &[9, 9, 9]).is_err());
        c.write_all_at(2, &[9, 9]).unwrap();
        c.write_zeros_at(0, 1, 64).unwrap();
        assert_eq!(c.into_inner().into_inner(), vec![0, 1, 9, 9]);
    }

    #[test]
    fn copy_range_in_small_chunks() {
        let data: Vec<u8> = (0..100).collect();
        let mut c = ByteCursor::from_bytes(data.clone());
        let mut out = Vec::new();
        assert_eq!(c.copy_range(10, 50, &mut out, 7).unwrap(), 50);
        assert_eq!(out, &data[10..60]);
    }

    #[test]
    fn window_sees_pattern_across_chunk_edge() {
        let mut data = vec![0u8; 40];
        data[15..18].copy_from_slice(b"FSB");
        let mut c = ByteCursor::from_bytes(data);
        let mut w = ScanWindow::new(16);
        let hit = (0..40u64).find(|&p| matches!(w.bytes(&mut c, p, 3).unwrap(), Some(b) if b == b"FSB"));
        assert_eq!(hit, Some(15));
        assert!(w.bytes(&mut c, 38, 3).unwrap().is_none());
    }

    #[test]
    fn align_rounds_up() {
        assert_eq!(align(0, 32), 0);
        assert_eq!(align(1, 32), 32);
        assert_eq!(align(64, 32), 64);
        assert_eq!(align(65, 32), 96);
    }
}
