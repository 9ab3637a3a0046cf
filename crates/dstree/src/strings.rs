//! String pool: zero-terminated runs recycled in place.
//!
//! Destroyed strings are zero-filled and their bytes become reusable gaps.
//! The pool is never compacted, so offsets held by live nodes stay put.

use dstree_buffers::{Reader, Writer};
use tracing::debug;

use crate::error::Result;
use crate::layout::string_pool;

/// Start of the first zero run that can hold `needed` bytes.
///
/// A run directly after a live string begins with that string's terminator,
/// so usable space starts one byte later unless the run opens the pool.
fn find_free_run(pool: &[u8], needed: usize) -> Option<usize> {
    let mut i = 0;
    while i < pool.len() {
        if pool[i] != 0 {
            i += 1;
            continue;
        }
        let run_start = i;
        while i < pool.len() && pool[i] == 0 {
            i += 1;
        }
        let start = if run_start == 0 { 0 } else { run_start + 1 };
        if i >= start && i - start >= needed {
            return Some(start);
        }
    }
    None
}

/// Interns `text` and returns its offset in the pool.
///
/// `text` must be non-empty and contain no zero byte.
pub fn create_string(buf: &mut Vec<u8>, text: &[u8]) -> Result<u64> {
    let needed = text.len() + 1;
    loop {
        let pool = string_pool(buf);
        if let Some(pos) = find_free_run(pool.payload(buf), needed) {
            Writer::at(buf, pool.data_offset() + pos).cstr(text);
            return Ok(pos as u64);
        }
        let old_len = pool.len(buf);
        let new_len = old_len + needed as u64;
        pool.resize(buf, new_len)?;
        debug!(old_len, new_len, "grew string pool");
    }
}

/// Zero-fills the string at `pos` through its terminator.
pub fn destroy_string(buf: &mut [u8], pos: u64) {
    let pool = string_pool(buf);
    for byte in &mut pool.payload_mut(buf)[pos as usize..] {
        if *byte == 0 {
            break;
        }
        *byte = 0;
    }
}

/// Bytes of the string at `pos`, without the terminator.
pub fn get_string(buf: &[u8], pos: u64) -> &[u8] {
    let pool = string_pool(buf);
    Reader::at(pool.payload(buf), pos as usize).cstr()
}

/// UTF-8 view of the string at `pos`, checked against the pool bounds.
pub fn try_get_str(buf: &[u8], pos: u64) -> Result<&str> {
    let pool = string_pool(buf);
    let pos = usize::try_from(pos).unwrap_or(usize::MAX);
    Ok(Reader::at(pool.payload(buf), pos).try_cstr_utf8()?)
}
