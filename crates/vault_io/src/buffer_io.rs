//! In-memory read and write drivers.
//!
//! The unit-test currency of the pipeline, and the backing for whole-file
//! storage helpers: a read driver that serves a buffer's content and a write
//! driver that appends into a shared buffer.

use std::cell::RefCell;
use std::rc::Rc;

use types::{Buffer, Result};

use crate::read::ReadDriver;
use crate::write::WriteDriver;

/// Buffer shared between a [`BufferWrite`] driver and its caller.
pub type SharedBuffer = Rc<RefCell<Buffer>>;

/// Creates a [`SharedBuffer`] for collecting write output.
#[must_use]
pub fn shared_buffer() -> SharedBuffer {
    Rc::new(RefCell::new(Buffer::new(0)))
}

/// Read driver serving the content of an in-memory buffer.
pub struct BufferRead {
    source: Buffer,
    pos: usize,
}

impl BufferRead {
    /// Creates a driver that serves `source` from the beginning.
    #[must_use]
    pub fn new(source: Buffer) -> Self {
        Self { source, pos: 0 }
    }
}

impl ReadDriver for BufferRead {
    fn open(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn read(&mut self, out: &mut Buffer) -> Result<usize> {
        let taken = out.append_limited(&self.source.bytes()[self.pos..]);
        self.pos += taken;
        Ok(taken)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Write driver appending into a shared buffer.
pub struct BufferWrite {
    target: SharedBuffer,
}

impl BufferWrite {
    /// Creates a driver that appends to `target`.
    #[must_use]
    pub fn new(target: SharedBuffer) -> Self {
        Self { target }
    }
}

impl WriteDriver for BufferWrite {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, input: &Buffer) -> Result<()> {
        self.target.borrow_mut().append(input.bytes());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
