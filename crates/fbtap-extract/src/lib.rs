//! fbtap-extract: pulls raw bytes out of a buffer object.
//!
//! # Access methods
//!
//! | Priority | Method | Used when |
//! |----------|--------|-----------|
//! | 1 | Page-mapped | object is backed by system-memory pages |
//! | 2 | Foreign-mapped | object imports memory owned by another device |
//!
//! The first method that yields any bytes wins. A missing page is skipped
//! and leaves a hole in the destination; a partial copy is still a success.
//!
//! # Usage
//!
//! ```rust
//! use fbtap_extract::{extract, memory::MemoryObject};
//!
//! let object = MemoryObject::paged(&[7u8; 10_000]);
//! let mut dst = vec![0u8; 8192];
//! let got = extract(Some(&object), &mut dst).unwrap();
//! assert_eq!(got.bytes, 8192);
//! ```

pub mod memory;

use fbtap_core::object::{BufferObject, ForeignMapping, ForeignSource, PageSource, VmapGuard};
use fbtap_core::{alloc_zeroed, ExtractError};
use tracing::{debug, info, warn};

// ── Public types ──────────────────────────────────────────────────────────────

/// Which access method produced the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMethod {
    PageMapped,
    ForeignMapped { io_memory: bool },
}

impl std::fmt::Display for AccessMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PageMapped => write!(f, "page-mapped"),
            Self::ForeignMapped { io_memory: false } => write!(f, "foreign-mapped"),
            Self::ForeignMapped { io_memory: true } => write!(f, "foreign-mapped (iomem)"),
        }
    }
}

/// Result of a successful extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extracted {
    /// Bytes actually copied into the destination.
    pub bytes: usize,
    pub method: AccessMethod,
    /// Pages that could not be looked up (page-mapped method only).
    pub missing_pages: usize,
}

// ── Extraction ────────────────────────────────────────────────────────────────

/// Copy up to `dst.len()` bytes of `object` into `dst`.
///
/// Never writes past the end of `dst`, whatever size the object reports.
pub fn extract(object: Option<&dyn BufferObject>, dst: &mut [u8]) -> Result<Extracted, ExtractError> {
    let object = object.ok_or_else(|| ExtractError::InvalidArgument {
        reason: "null buffer object".into(),
    })?;
    if dst.is_empty() {
        return Err(ExtractError::InvalidArgument { reason: "empty destination".into() });
    }

    debug!("Extracting from buffer object: size={} dst={}", object.size(), dst.len());

    if let Some(pages) = object.pages() {
        let (bytes, missing_pages) = copy_pages(pages, object.size(), dst);
        if bytes > 0 {
            info!("Copied {} bytes via page-mapped method ({} pages missing)", bytes, missing_pages);
            return Ok(Extracted { bytes, method: AccessMethod::PageMapped, missing_pages });
        }
        debug!("Page-mapped method yielded nothing, trying next");
    }

    if let Some(foreign) = object.foreign() {
        if let Some((bytes, io_memory)) = copy_foreign(foreign, dst) {
            if bytes > 0 {
                info!("Copied {} bytes via foreign-mapped method (iomem={})", bytes, io_memory);
                return Ok(Extracted {
                    bytes,
                    method: AccessMethod::ForeignMapped { io_memory },
                    missing_pages: 0,
                });
            }
        }
    }

    warn!("Could not access pixel data from buffer object");
    Err(ExtractError::NoData)
}

/// Extract into a freshly allocated zero-filled buffer of `len` bytes.
///
/// The buffer is dropped again if nothing could be extracted.
pub fn extract_to_vec(
    object: Option<&dyn BufferObject>,
    len: usize,
) -> Result<(Vec<u8>, Extracted), ExtractError> {
    let mut buf = alloc_zeroed(len)?;
    let got = extract(object, &mut buf)?;
    Ok((buf, got))
}

/// Page-by-page copy. Returns `(bytes_copied, missing_pages)`.
fn copy_pages(pages: &dyn PageSource, object_size: usize, dst: &mut [u8]) -> (usize, usize) {
    let page_size = pages.page_size();
    if page_size == 0 {
        return (0, 0);
    }
    let num_pages = pages.page_count().min(object_size.div_ceil(page_size));

    let mut offset = 0;
    let mut copied = 0;
    let mut missing = 0;
    let mut index = 0;
    while offset < dst.len() && index < num_pages {
        match pages.map_page(index) {
            Some(page) => {
                let bytes: &[u8] = (*page).as_ref();
                let n = bytes.len().min(page_size).min(dst.len() - offset);
                dst[offset..offset + n].copy_from_slice(&bytes[..n]);
                copied += n;
            }
            None => {
                debug!("Page {} not resident, skipping", index);
                missing += 1;
            }
        }
        offset = offset.saturating_add(page_size);
        index += 1;
    }
    (copied, missing)
}

/// Whole-object mapping copy. Returns `(bytes_copied, io_memory)`, or `None`
/// if the object refused to map.
fn copy_foreign(foreign: &dyn ForeignSource, dst: &mut [u8]) -> Option<(usize, bool)> {
    let Some(guard) = VmapGuard::map(foreign) else {
        debug!("Foreign mapping refused");
        return None;
    };
    let mapping = guard.mapping();
    let n = mapping.len().min(dst.len());
    match mapping {
        ForeignMapping::System(bytes) => dst[..n].copy_from_slice(&bytes[..n]),
        ForeignMapping::Io(io) => io.copy_from_io(0, &mut dst[..n]),
    }
    Some((n, mapping.is_iomem()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
