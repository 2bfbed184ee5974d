//! Trace ring buffers
//!
//! A `DebugBuffer` is a fixed-size ring of bytes that cheap formatted trace
//! lines are appended to. Nothing is written anywhere until the buffer is
//! spewed, typically after something went wrong. Each message is cut to
//! [`MESSAGE_MAX`] bytes before it is stored.
//!
//! `DebugBuffers` keeps every buffer a heap owns so they can all be dumped
//! at once. Ids are never reused, so a killed buffer's id stays dead.

use std::backtrace::Backtrace;
use std::fmt::{self, Write as _};
use std::io;

/// Longest single message kept
pub const MESSAGE_MAX: usize = 255;

/// Frames written by [`DebugBuffer::print_backtrace`]
pub const BACKTRACE_DEPTH: usize = 8;

#[derive(Debug)]
pub struct DebugBuffer {
    name: String,
    data: Box<[u8]>,
    ptr: usize,
    wrapped: bool,
}

impl DebugBuffer {
    /// # Panics
    /// Panics if `size` is zero.
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        assert!(size > 0, "debug buffer size must be positive");
        Self {
            name: name.into(),
            data: vec![0; size].into_boxed_slice(),
            ptr: 0,
            wrapped: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_wrapped(&self) -> bool {
        self.wrapped
    }

    /// Append a formatted message
    pub fn record(&mut self, args: fmt::Arguments<'_>) {
        let mut msg = String::new();
        let _ = msg.write_fmt(args);
        let bytes = &msg.as_bytes()[..msg.len().min(MESSAGE_MAX)];
        self.append(bytes);
    }

    fn append(&mut self, bytes: &[u8]) {
        let size = self.data.len();
        let len = bytes.len();
        if len > size - self.ptr {
            let before = size - self.ptr;
            let after = (len - before).min(size - before);
            self.data[self.ptr..].copy_from_slice(&bytes[..before]);
            self.data[..after].copy_from_slice(&bytes[before..before + after]);
            self.ptr = after;
            self.wrapped = true;
        } else {
            self.data[self.ptr..self.ptr + len].copy_from_slice(bytes);
            self.ptr += len;
        }
    }

    /// Append the caller's backtrace, at most [`BACKTRACE_DEPTH`] frames
    pub fn print_backtrace(&mut self, fun: &str) {
        let trace = Backtrace::force_capture().to_string();
        self.record(format_args!("\nBacktrace in `{}':\n", fun));
        let frames = trace
            .lines()
            .map(str::trim_start)
            .filter_map(|line| {
                let (index, symbol) = line.split_once(": ")?;
                index.parse::<usize>().ok().map(|_| symbol)
            })
            .take(BACKTRACE_DEPTH);
        for symbol in frames {
            self.record(format_args!("\t{}\n", symbol));
        }
    }

    /// Buffered bytes, oldest first
    pub fn contents(&self) -> Vec<u8> {
        if self.wrapped {
            let mut out = Vec::with_capacity(self.data.len());
            out.extend_from_slice(&self.data[self.ptr..]);
            out.extend_from_slice(&self.data[..self.ptr]);
            out
        } else {
            self.data[..self.ptr].to_vec()
        }
    }

    /// Write a header and the buffered bytes; an empty buffer writes nothing
    pub fn spew(&self, out: &mut dyn io::Write) -> io::Result<()> {
        if !self.wrapped && self.ptr == 0 {
            return Ok(());
        }
        write!(out, "\ndebug buffer {}:\n", self.name)?;
        out.write_all(&self.contents())
    }
}

/// Handle to a buffer in a [`DebugBuffers`] set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u32);

/// Every live debug buffer, in creation order
#[derive(Debug, Default)]
pub struct DebugBuffers {
    buffers: Vec<(BufferId, DebugBuffer)>,
    next_id: u32,
}

impl DebugBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    /// Panics if `size` is zero.
    pub fn create(&mut self, name: impl Into<String>, size: usize) -> BufferId {
        let id = BufferId(self.next_id);
        self.next_id += 1;
        self.buffers.push((id, DebugBuffer::new(name, size)));
        id
    }

    pub fn get(&self, id: BufferId) -> Option<&DebugBuffer> {
        self.buffers.iter().find(|(b, _)| *b == id).map(|(_, db)| db)
    }

    pub fn get_mut(&mut self, id: BufferId) -> Option<&mut DebugBuffer> {
        self.buffers.iter_mut().find(|(b, _)| *b == id).map(|(_, db)| db)
    }

    /// Remove a buffer, handing it back
    pub fn kill(&mut self, id: BufferId) -> Option<DebugBuffer> {
        let pos = self.buffers.iter().position(|(b, _)| *b == id)?;
        Some(self.buffers.remove(pos).1)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Spew every buffer, oldest buffer first
    pub fn spew_all(&self, out: &mut dyn io::Write) -> io::Result<()> {
        for (_, db) in &self.buffers {
            db.spew(out)?;
        }
        Ok(())
    }
}
