//! Little-endian byte reader with cursor tracking.

use std::str;

use crate::BufferError;

/// A little-endian reader over a borrowed byte slice.
///
/// The panicking accessors index the slice directly and are meant for layouts
/// that were already bounds-checked. The `try_*` variants report
/// [`BufferError::EndOfBuffer`] instead and leave the cursor untouched.
///
/// # Example
///
/// ```
/// use dstree_buffers::Reader;
///
/// let data = [0x01, 0x02, 0x03, 0x04, 0x05];
/// let mut reader = Reader::new(&data);
///
/// assert_eq!(reader.u8(), 0x01);
/// assert_eq!(reader.u32(), 0x0504_0302);
/// ```
pub struct Reader<'a> {
    /// The underlying byte slice.
    pub uint8: &'a [u8],
    /// Current cursor position.
    pub x: usize,
}

impl<'a> Reader<'a> {
    /// Creates a new reader positioned at the start of `uint8`.
    pub fn new(uint8: &'a [u8]) -> Self {
        Self { uint8, x: 0 }
    }

    /// Creates a reader positioned at offset `x`.
    pub fn at(uint8: &'a [u8], x: usize) -> Self {
        Self { uint8, x }
    }

    /// Returns a subarray of the given size and advances the cursor.
    pub fn buf(&mut self, size: usize) -> &'a [u8] {
        let x = self.x;
        let end = x + size;
        let bin = &self.uint8[x..end];
        self.x = end;
        bin
    }

    /// Reads bytes up to (not including) the next zero byte and steps past it.
    ///
    /// Panics if no terminator follows the cursor.
    pub fn cstr(&mut self) -> &'a [u8] {
        let rest = &self.uint8[self.x..];
        let len = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let bin = &rest[..len];
        self.x += len + 1;
        bin
    }

    #[inline]
    fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.uint8[self.x..self.x + N]);
        self.x += N;
        out
    }

    /// Reads an unsigned 8-bit integer.
    #[inline]
    pub fn u8(&mut self) -> u8 {
        let val = self.uint8[self.x];
        self.x += 1;
        val
    }

    /// Reads an unsigned 32-bit integer.
    #[inline]
    pub fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.array())
    }

    /// Reads an unsigned 64-bit integer.
    #[inline]
    pub fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.array())
    }

    // -----------------------------------------------------------------------
    // Bounds-checked variants
    // -----------------------------------------------------------------------

    /// Checks that `n` more bytes are available from the current cursor.
    #[inline]
    fn check(&self, n: usize) -> Result<(), BufferError> {
        match self.x.checked_add(n) {
            Some(end) if end <= self.uint8.len() => Ok(()),
            _ => Err(BufferError::EndOfBuffer),
        }
    }

    /// Reads an unsigned 64-bit integer, returning `Err` on out-of-bounds.
    #[inline]
    pub fn try_u64(&mut self) -> Result<u64, BufferError> {
        self.check(8)?;
        Ok(self.u64())
    }

    /// Reads `size` raw bytes and advances the cursor, returning `Err` on
    /// out-of-bounds.
    pub fn try_buf(&mut self, size: usize) -> Result<&'a [u8], BufferError> {
        self.check(size)?;
        Ok(self.buf(size))
    }

    /// Reads a zero-terminated run, returning `Err` when the slice ends
    /// before a terminator.
    pub fn try_cstr(&mut self) -> Result<&'a [u8], BufferError> {
        let rest = self.uint8.get(self.x..).ok_or(BufferError::EndOfBuffer)?;
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(BufferError::EndOfBuffer)?;
        let bin = &rest[..len];
        self.x += len + 1;
        Ok(bin)
    }

    /// Reads a zero-terminated UTF-8 string.
    pub fn try_cstr_utf8(&mut self) -> Result<&'a str, BufferError> {
        let start = self.x;
        let bin = self.try_cstr()?;
        str::from_utf8(bin).map_err(|_| {
            self.x = start;
            BufferError::InvalidUtf8
        })
    }
}
