//! Byte cursor utilities for fixed-layout binary records.
//!
//! [`Reader`] walks a borrowed slice and [`Writer`] patches a mutable slice in
//! place. Both are little-endian and never grow their backing storage; growth
//! is the caller's business.

mod reader;
mod writer;

pub use reader::Reader;
pub use writer::Writer;

/// Errors raised by the bounds-checked cursor operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("end of buffer")]
    EndOfBuffer,
    #[error("invalid utf-8")]
    InvalidUtf8,
}
