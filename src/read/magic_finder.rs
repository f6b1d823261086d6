use std::io;

use memchr::memmem::{Finder, FinderRev};

use crate::source::ByteSource;

/// A utility for finding magic symbols from the end of a byte source.
pub(crate) struct MagicFinder<'a> {
    buffer: Box<[u8]>,
    finder: FinderRev<'a>,
    cursor: u64,
    mid_buffer_offset: Option<usize>,
    bounds: (u64, u64),
}

impl<'a> MagicFinder<'a> {
    /// Create a new magic bytes finder to look within specific bounds.
    ///
    /// Matches must lie entirely inside `bounds.0..bounds.1`.
    pub fn new(magic_bytes: &'a [u8], bounds: (u64, u64)) -> Self {
        const BUFFER_SIZE: usize = 2048;

        // Smaller buffer size would be unable to locate bytes.
        // Equal buffer size would stall (the window could not be moved).
        debug_assert!(BUFFER_SIZE > magic_bytes.len());

        Self {
            buffer: vec![0; BUFFER_SIZE].into_boxed_slice(),
            finder: FinderRev::new(magic_bytes),
            cursor: bounds
                .1
                .saturating_sub(BUFFER_SIZE as u64)
                .clamp(bounds.0, bounds.1),
            mid_buffer_offset: None,
            bounds,
        }
    }

    /// Find the next magic bytes from the end of the source.
    ///
    /// Similar in functionality to a double ended iterator, except
    /// it propagates errors first and doesn't hold on to the source
    /// between items.
    pub fn next_back<S: ByteSource + ?Sized>(&mut self, source: &S) -> io::Result<Option<u64>> {
        loop {
            if self.cursor < self.bounds.0 {
                // The finder is consumed
                break;
            }

            /* Position the window and ensure correct length */
            let window_start = self.cursor;
            let window_end = self
                .cursor
                .saturating_add(self.buffer.len() as u64)
                .min(self.bounds.1);

            if window_end <= window_start {
                // Short-circuit on zero-sized windows to prevent loop
                break;
            }

            let window = &mut self.buffer[..(window_end - window_start) as usize];

            if self.mid_buffer_offset.is_none() {
                source.read_exact_at(window_start, window)?;
            }

            let mid_buffer_offset = self.mid_buffer_offset.unwrap_or(window.len());
            let window = &window[..mid_buffer_offset];

            if let Some(offset) = self.finder.rfind(window) {
                let magic_pos = window_start + offset as u64;
                self.mid_buffer_offset = Some(offset);
                return Ok(Some(magic_pos));
            }

            self.mid_buffer_offset = None;

            /* We always want to make sure we go allllll the way back to the start of the
             * bounds if we can't find it elsewhere. However, our `while` condition doesn't
             * check that. So we avoid infinite looping by checking at the end of the loop. */
            if window_start == self.bounds.0 {
                self.bounds.0 = self.bounds.1;
                break;
            }

            /* Move cursor to the next chunk, cover magic at boundary by overlapping one byte short
             * of the needle length. */
            self.cursor = self
                .cursor
                .saturating_add((self.finder.needle().len() as u64).saturating_sub(1))
                .saturating_sub(self.buffer.len() as u64)
                .clamp(self.bounds.0, self.bounds.1);
        }

        Ok(None)
    }
}

/// Find the first occurrence of `magic_bytes` at or after `start`, reading forward in
/// bounded chunks. Used to find data descriptors whose payload length is unknown.
pub(crate) fn find_forward<S: ByteSource + ?Sized>(
    source: &S,
    magic_bytes: &[u8],
    start: u64,
    end: u64,
) -> io::Result<Option<u64>> {
    const BUFFER_SIZE: u64 = 64 * 1024;

    let finder = Finder::new(magic_bytes);
    let overlap = magic_bytes.len() as u64 - 1;
    let mut cursor = start;
    while cursor < end {
        let window_end = cursor.saturating_add(BUFFER_SIZE).min(end);
        let window = source.read_vec_at(cursor, (window_end - cursor) as usize)?;
        if let Some(offset) = finder.find(&window) {
            return Ok(Some(cursor + offset as u64));
        }
        if window_end == end {
            break;
        }
        cursor = window_end - overlap;
    }
    Ok(None)
}
