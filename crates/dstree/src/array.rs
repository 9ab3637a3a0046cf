//! Variable-length arrays embedded back to back inside one byte buffer.
//!
//! Each array is an 8-byte little-endian element count followed by
//! `count * element_size` bytes of payload. Arrays carry no offsets of their
//! own: an array is found by walking the ones laid out before it, so every
//! location is recomputed from the buffer and never cached across a resize.

use dstree_buffers::{BufferError, Reader, Writer};

use crate::error::{DstreeError, Result};

/// Size of the count field that prefixes every embedded array.
pub const COUNT_SIZE: usize = 8;

/// Element sizes of a sequence of embedded arrays, in layout order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArraySchema {
    element_sizes: &'static [usize],
}

impl ArraySchema {
    pub const fn new(element_sizes: &'static [usize]) -> Self {
        Self { element_sizes }
    }

    pub fn len(&self) -> usize {
        self.element_sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.element_sizes.is_empty()
    }

    pub fn element_size(&self, index: usize) -> usize {
        self.element_sizes[index]
    }

    /// Byte offset of array `index`, given that the first array starts at
    /// `start`.
    pub fn offset_of(&self, buf: &[u8], start: usize, index: usize) -> usize {
        let mut at = start;
        for &element_size in &self.element_sizes[..index] {
            let count = Reader::at(buf, at).u64();
            at += COUNT_SIZE + count as usize * element_size;
        }
        at
    }

    /// Bounds-checked [`offset_of`](Self::offset_of) for buffers that have
    /// not been validated yet. `index` may equal [`len`](Self::len), in which
    /// case the end of the last array is returned.
    pub fn try_offset_of(&self, buf: &[u8], start: usize, index: usize) -> Result<usize> {
        let mut at = start;
        for &element_size in &self.element_sizes[..index] {
            let count = Reader::at(buf, at).try_u64()?;
            let payload = usize::try_from(count)
                .ok()
                .and_then(|count| count.checked_mul(element_size))
                .ok_or(DstreeError::Buffer(BufferError::EndOfBuffer))?;
            at = at
                .checked_add(COUNT_SIZE + payload)
                .filter(|&end| end <= buf.len())
                .ok_or(DstreeError::Buffer(BufferError::EndOfBuffer))?;
        }
        Ok(at)
    }

    /// Locates array `index`.
    pub fn array(&self, buf: &[u8], start: usize, index: usize) -> EmbeddedArray {
        EmbeddedArray {
            offset: self.offset_of(buf, start, index),
            element_size: self.element_sizes[index],
        }
    }
}

/// Location of one embedded array at a point in time.
///
/// The value goes stale as soon as any array laid out before it is resized;
/// re-locate through the schema after every mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedArray {
    offset: usize,
    element_size: usize,
}

impl EmbeddedArray {
    /// Offset of the count field.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Offset of the first element.
    pub fn data_offset(&self) -> usize {
        self.offset + COUNT_SIZE
    }

    pub fn element_offset(&self, index: u64) -> usize {
        self.data_offset() + index as usize * self.element_size
    }

    pub fn len(&self, buf: &[u8]) -> u64 {
        Reader::at(buf, self.offset).u64()
    }

    pub fn is_empty(&self, buf: &[u8]) -> bool {
        self.len(buf) == 0
    }

    /// Offset one past the last payload byte.
    pub fn end_offset(&self, buf: &[u8]) -> usize {
        self.element_offset(self.len(buf))
    }

    pub fn payload<'b>(&self, buf: &'b [u8]) -> &'b [u8] {
        &buf[self.data_offset()..self.end_offset(buf)]
    }

    pub fn payload_mut<'b>(&self, buf: &'b mut [u8]) -> &'b mut [u8] {
        let end = self.end_offset(buf);
        &mut buf[self.data_offset()..end]
    }

    fn set_len(&self, buf: &mut [u8], len: u64) {
        Writer::at(buf, self.offset).u64(len);
    }

    /// Resizes the array in place, using `buf` as the allocator.
    ///
    /// Growing extends the buffer before shifting the trailing bytes forward;
    /// shrinking shifts them back before truncating. New elements are zeroed.
    pub fn resize(&self, buf: &mut Vec<u8>, new_len: u64) -> Result<()> {
        let old_len = self.len(buf);
        if new_len == old_len {
            return Ok(());
        }
        let tail_start = self.element_offset(old_len);
        let old_total = buf.len();
        if new_len > old_len {
            let delta = usize::try_from(new_len - old_len)
                .ok()
                .and_then(|n| n.checked_mul(self.element_size))
                .ok_or(DstreeError::CapacityOverflow)?;
            let new_total = old_total
                .checked_add(delta)
                .ok_or(DstreeError::CapacityOverflow)?;
            buf.resize(new_total, 0);
            buf.copy_within(tail_start..old_total, tail_start + delta);
            buf[tail_start..tail_start + delta].fill(0);
        } else {
            let delta = (old_len - new_len) as usize * self.element_size;
            buf.copy_within(tail_start..old_total, tail_start - delta);
            buf.truncate(old_total - delta);
        }
        self.set_len(buf, new_len);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_U16: ArraySchema = ArraySchema::new(&[2]);
    const U16_THEN_U8: ArraySchema = ArraySchema::new(&[2, 1]);

    fn count_bytes(n: u64) -> [u8; 8] {
        n.to_le_bytes()
    }

    /// `[3 x u16 = 0xffff]` followed by four unrelated trailing bytes.
    fn u16_array_with_tail() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&count_bytes(3));
        buf.extend_from_slice(&[0xff; 6]);
        buf.extend_from_slice(&[108, 109, 110, 111]);
        buf
    }

    /// `[3 x u16 = 0x6464]` then `[4 x u8 = 101]`.
    fn two_arrays() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&count_bytes(3));
        buf.extend_from_slice(&[100; 6]);
        buf.extend_from_slice(&count_bytes(4));
        buf.extend_from_slice(&[101; 4]);
        buf
    }

    #[test]
    fn grow_opens_zeroed_gap_before_tail() {
        let mut buf = u16_array_with_tail();
        let arr = ONE_U16.array(&buf, 0, 0);
        arr.resize(&mut buf, 6).unwrap();

        assert_eq!(arr.len(&buf), 6);
        let mut expected = count_bytes(6).to_vec();
        expected.extend_from_slice(&[0xff; 6]);
        expected.extend_from_slice(&[0; 6]);
        expected.extend_from_slice(&[108, 109, 110, 111]);
        assert_eq!(buf, expected);
    }

    #[test]
    fn shrink_pulls_tail_back() {
        let mut buf = u16_array_with_tail();
        let arr = ONE_U16.array(&buf, 0, 0);
        arr.resize(&mut buf, 1).unwrap();

        assert_eq!(arr.len(&buf), 1);
        let mut expected = count_bytes(1).to_vec();
        expected.extend_from_slice(&[0xff, 0xff, 108, 109, 110, 111]);
        assert_eq!(buf, expected);
    }

    #[test]
    fn same_size_is_noop() {
        let mut buf = u16_array_with_tail();
        let before = buf.clone();
        ONE_U16.array(&buf, 0, 0).resize(&mut buf, 3).unwrap();
        assert_eq!(buf, before);
    }

    #[test]
    fn locate_second_array_by_walking_first() {
        let buf = two_arrays();
        let second = U16_THEN_U8.array(&buf, 0, 1);
        assert_eq!(second.offset(), 8 + 6);
        assert_eq!(second.len(&buf), 4);
        assert_eq!(second.payload(&buf), &[101; 4]);
    }

    #[test]
    fn resizing_first_array_moves_second() {
        let mut buf = two_arrays();
        U16_THEN_U8.array(&buf, 0, 0).resize(&mut buf, 10).unwrap();
        let second = U16_THEN_U8.array(&buf, 0, 1);
        assert_eq!(second.payload(&buf), &[101; 4]);

        second.resize(&mut buf, 10).unwrap();
        assert_eq!(buf.len(), 2 * COUNT_SIZE + 10 * 2 + 10);
        let second = U16_THEN_U8.array(&buf, 0, 1);
        assert_eq!(&second.payload(&buf)[..4], &[101; 4]);
        assert_eq!(&second.payload(&buf)[4..], &[0; 6]);
    }

    #[test]
    fn shrink_to_empty() {
        let mut buf = two_arrays();
        U16_THEN_U8.array(&buf, 0, 0).resize(&mut buf, 0).unwrap();
        assert_eq!(buf.len(), COUNT_SIZE + COUNT_SIZE + 4);
        assert!(U16_THEN_U8.array(&buf, 0, 0).is_empty(&buf));
        assert_eq!(U16_THEN_U8.array(&buf, 0, 1).payload(&buf), &[101; 4]);
    }

    #[test]
    fn arrays_after_a_prefix() {
        let mut buf = vec![7u8; 4];
        buf.extend_from_slice(&two_arrays());
        let second = U16_THEN_U8.array(&buf, 4, 1);
        assert_eq!(second.len(&buf), 4);
        U16_THEN_U8.array(&buf, 4, 0).resize(&mut buf, 0).unwrap();
        assert_eq!(&buf[..4], &[7; 4]);
        assert_eq!(U16_THEN_U8.array(&buf, 4, 1).payload(&buf), &[101; 4]);
    }

    #[test]
    fn try_offset_of_rejects_truncated_buffer() {
        let mut buf = two_arrays();
        assert_eq!(U16_THEN_U8.try_offset_of(&buf, 0, 2), Ok(buf.len()));
        buf.truncate(buf.len() - 1);
        assert_eq!(
            U16_THEN_U8.try_offset_of(&buf, 0, 2),
            Err(DstreeError::Buffer(BufferError::EndOfBuffer))
        );
    }

    #[test]
    fn try_offset_of_rejects_huge_count() {
        let mut buf = two_arrays();
        buf[..8].copy_from_slice(&count_bytes(u64::MAX));
        assert!(U16_THEN_U8.try_offset_of(&buf, 0, 1).is_err());
    }
}
