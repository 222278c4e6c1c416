//! Bounds-checked random access over the byte source backing an open file.

use std::{
    cell::RefCell,
    fmt::Debug,
    io::{self, Read, Seek, SeekFrom},
    rc::Rc,
};
use tracing::trace;

use super::*;

/// Anything the reader can pull bytes from.
pub trait ByteSource: Read + Seek {}

impl<T> ByteSource for T where T: Read + Seek {}

pub struct SourceReader {
    source: Box<dyn ByteSource>,
    size: u64,
}

impl SourceReader {
    /// Takes ownership of `source` and measures its length.
    pub fn new(mut source: Box<dyn ByteSource>) -> io::Result<Self> {
        let size = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;
        Ok(Self { source, size })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read exactly `size` bytes starting at `offset`.
    pub fn read_exact_at(&mut self, offset: u64, size: usize) -> io::Result<Vec<u8>> {
        let in_bounds = offset
            .checked_add(size as u64)
            .is_some_and(|end| end <= self.size);
        if !in_bounds {
            return Err(NdbError::ReadBeyondEnd {
                offset,
                size,
                source_size: self.size,
            }
            .into());
        }

        trace!(offset, size, "read");
        self.source.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0; size];
        self.source.read_exact(&mut buffer)?;
        Ok(buffer)
    }
}

impl Debug for SourceReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceReader")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// A stream shared between the caller and an open file. The file only holds its clone of the
/// [Rc] while it is open.
#[derive(Debug, Default)]
pub struct SharedStream<S>(Rc<RefCell<S>>);

impl<S> SharedStream<S> {
    pub fn new(stream: S) -> Self {
        Self(Rc::new(RefCell::new(stream)))
    }

    pub fn inner(&self) -> &Rc<RefCell<S>> {
        &self.0
    }

    /// Number of live references, including the caller's.
    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl<S> Clone for SharedStream<S> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<S> From<Rc<RefCell<S>>> for SharedStream<S> {
    fn from(value: Rc<RefCell<S>>) -> Self {
        Self(value)
    }
}

impl<S: Read> Read for SharedStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.borrow_mut().read(buf)
    }
}

impl<S: Seek> Seek for SharedStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.borrow_mut().seek(pos)
    }
}
