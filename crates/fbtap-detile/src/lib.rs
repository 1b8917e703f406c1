//! fbtap-detile
//!
//! Converts tiled framebuffer bytes into a linear (row-major) raster, and the
//! reverse for building tiled test surfaces.
//!
//! # Mapping
//! ```text
//! byte column bx = x * 4
//! tile        = (y / th) * (pitch / tw) + bx / tw
//! src offset  = tile * tw * th + (y % th) * tw + bx % tw
//! dst offset  = y * width * 4 + bx
//! ```
//! Pixels are assumed to be 4 bytes wide whatever the pixel format says.
//! 16-bit formats are carried through with the same arithmetic and will come
//! out scrambled.
//!
//! Every byte copy is bounds-checked against both buffers. Out-of-range
//! offsets are skipped and the destination keeps its zero fill, so a
//! misclassified layout yields a garbled image instead of a fault.

use fbtap_core::{alloc_zeroed, DetileError, TileDims, TilingLayout};
use tracing::debug;

/// Bytes per pixel assumed by the tile arithmetic.
pub const BYTES_PER_PIXEL: usize = 4;

/// Byte counts from one conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetileStats {
    /// Destination bytes written.
    pub copied: usize,
    /// Destination bytes left untouched because an offset was out of range.
    pub skipped: usize,
}

// ── Tiled → linear ────────────────────────────────────────────────────────────

/// Detile `raw` into `dst`.
///
/// For [`TilingLayout::Linear`] this is an identity copy of
/// `min(raw.len(), dst.len())` bytes.
pub fn detile(
    raw: &[u8],
    dst: &mut [u8],
    width: u32,
    height: u32,
    pitch: u32,
    layout: TilingLayout,
) -> Result<DetileStats, DetileError> {
    let Some(dims) = layout.tile_dims() else {
        let n = raw.len().min(dst.len());
        dst[..n].copy_from_slice(&raw[..n]);
        return Ok(DetileStats { copied: n, skipped: 0 });
    };
    check_dims(dims)?;

    debug!(
        "Detiling {} buffer: {}x{}, pitch={}, tile={}x{}, tiles_per_row={}",
        layout,
        width,
        height,
        pitch,
        dims.width,
        dims.height,
        dims.tiles_per_row(pitch)
    );

    let width = width as usize;
    let height = height as usize;
    let row_bytes = width.saturating_mul(BYTES_PER_PIXEL);
    let mut stats = DetileStats::default();

    for y in 0..height {
        let row_start = match y.checked_mul(row_bytes) {
            Some(start) if start < dst.len() => start,
            _ => {
                // Every later row starts further out.
                let rows_left = height - y;
                stats.skipped = stats.skipped.saturating_add(rows_left.saturating_mul(row_bytes));
                break;
            }
        };

        for x in 0..width {
            let byte_x = x * BYTES_PER_PIXEL;
            let dst_off = row_start + byte_x;
            if dst_off >= dst.len() {
                let px_left = width - x;
                stats.skipped = stats.skipped.saturating_add(px_left.saturating_mul(BYTES_PER_PIXEL));
                break;
            }
            match dims.tiled_offset(byte_x, y, pitch) {
                Some(src_off) => copy_pixel(raw, src_off, dst, dst_off, &mut stats),
                None => stats.skipped += BYTES_PER_PIXEL,
            }
        }
    }

    debug!("Detiled {} bytes, skipped {}", stats.copied, stats.skipped);
    Ok(stats)
}

/// Detile into a freshly allocated `width * height * 4` byte buffer.
pub fn detile_to_vec(
    raw: &[u8],
    width: u32,
    height: u32,
    pitch: u32,
    layout: TilingLayout,
) -> Result<Vec<u8>, DetileError> {
    let len = linear_len(width, height)?;
    let mut dst = alloc_zeroed(len)?;
    detile(raw, &mut dst, width, height, pitch, layout)?;
    Ok(dst)
}

// ── Linear → tiled ────────────────────────────────────────────────────────────

/// Rearrange a linear `width * height * 4` raster into `layout`.
///
/// The output covers whole tile rows, `ceil(height / th) * th * pitch` bytes,
/// the way a device pads a tiled surface. Linear input is returned as a copy.
pub fn tile(
    linear: &[u8],
    width: u32,
    height: u32,
    pitch: u32,
    layout: TilingLayout,
) -> Result<Vec<u8>, DetileError> {
    let Some(dims) = layout.tile_dims() else {
        let mut out = alloc_zeroed(linear.len())?;
        out.copy_from_slice(linear);
        return Ok(out);
    };
    check_dims(dims)?;

    let th = dims.height as usize;
    let padded_rows = (height as usize).div_ceil(th) * th;
    let len = padded_rows
        .checked_mul(pitch as usize)
        .ok_or(DetileError::OutOfMemory { bytes: usize::MAX })?;
    let mut out = alloc_zeroed(len)?;

    let width = width as usize;
    let mut stats = DetileStats::default();
    for y in 0..height as usize {
        for x in 0..width {
            let byte_x = x * BYTES_PER_PIXEL;
            let src_off = (y * width + x) * BYTES_PER_PIXEL;
            if let Some(dst_off) = dims.tiled_offset(byte_x, y, pitch) {
                copy_pixel(linear, src_off, &mut out, dst_off, &mut stats);
            }
        }
    }
    Ok(out)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn check_dims(dims: TileDims) -> Result<(), DetileError> {
    if dims.width == 0 || dims.height == 0 {
        return Err(DetileError::InvalidTile { width: dims.width, height: dims.height });
    }
    Ok(())
}

fn linear_len(width: u32, height: u32) -> Result<usize, DetileError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|px| px.checked_mul(BYTES_PER_PIXEL))
        .ok_or(DetileError::OutOfMemory { bytes: usize::MAX })
}

/// Copy one pixel, byte by byte where it straddles either buffer's end.
#[inline]
fn copy_pixel(src: &[u8], src_off: usize, dst: &mut [u8], dst_off: usize, stats: &mut DetileStats) {
    if let (Some(src_end), Some(dst_end)) = (
        src_off.checked_add(BYTES_PER_PIXEL),
        dst_off.checked_add(BYTES_PER_PIXEL),
    ) {
        if src_end <= src.len() && dst_end <= dst.len() {
            dst[dst_off..dst_end].copy_from_slice(&src[src_off..src_end]);
            stats.copied += BYTES_PER_PIXEL;
            return;
        }
    }

    for i in 0..BYTES_PER_PIXEL {
        let s = src_off.checked_add(i).and_then(|o| src.get(o));
        let d = dst_off.checked_add(i);
        match (s, d) {
            (Some(&byte), Some(d)) if d < dst.len() => {
                dst[d] = byte;
                stats.copied += 1;
            }
            _ => stats.skipped += 1,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
