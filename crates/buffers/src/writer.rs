//! In-place little-endian writer.

/// A little-endian writer that patches an existing mutable slice.
///
/// Unlike a growable encoder, the writer never reallocates: every write must
/// fit inside the slice it was created over. Out-of-range writes panic.
///
/// # Example
///
/// ```
/// use dstree_buffers::Writer;
///
/// let mut data = [0u8; 5];
/// let mut writer = Writer::at(&mut data, 0);
/// writer.u8(0x01);
/// writer.u32(0x0504_0302);
/// assert_eq!(data, [0x01, 0x02, 0x03, 0x04, 0x05]);
/// ```
pub struct Writer<'a> {
    /// The underlying byte slice.
    pub uint8: &'a mut [u8],
    /// Current cursor position.
    pub x: usize,
}

impl<'a> Writer<'a> {
    /// Creates a writer positioned at offset `x`.
    pub fn at(uint8: &'a mut [u8], x: usize) -> Self {
        Self { uint8, x }
    }

    /// Writes raw bytes.
    pub fn buf(&mut self, bin: &[u8]) {
        let end = self.x + bin.len();
        self.uint8[self.x..end].copy_from_slice(bin);
        self.x = end;
    }

    /// Fills `length` bytes with zeros.
    pub fn zeros(&mut self, length: usize) {
        let end = self.x + length;
        self.uint8[self.x..end].fill(0);
        self.x = end;
    }

    /// Writes an unsigned 8-bit integer.
    #[inline]
    pub fn u8(&mut self, val: u8) {
        self.uint8[self.x] = val;
        self.x += 1;
    }

    /// Writes an unsigned 32-bit integer.
    #[inline]
    pub fn u32(&mut self, val: u32) {
        self.buf(&val.to_le_bytes());
    }

    /// Writes an unsigned 64-bit integer.
    #[inline]
    pub fn u64(&mut self, val: u64) {
        self.buf(&val.to_le_bytes());
    }

    /// Writes `bin` followed by a zero terminator.
    pub fn cstr(&mut self, bin: &[u8]) {
        self.buf(bin);
        self.u8(0);
    }
}
