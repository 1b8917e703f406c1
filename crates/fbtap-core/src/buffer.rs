//! Fallible allocation of pixel buffers.
//!
//! Capture buffers run to several megabytes each, so a failed allocation is
//! reported to the caller instead of aborting the process.

use crate::errors::AllocError;

/// Allocate a zero-filled buffer of exactly `len` bytes.
pub fn alloc_zeroed(len: usize) -> Result<Vec<u8>, AllocError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| AllocError { bytes: len })?;
    buf.resize(len, 0);
    Ok(buf)
}
