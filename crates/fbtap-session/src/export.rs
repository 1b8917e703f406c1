//! Export side of the session: status listing and raw byte-range reads.
//!
//! The raw stream always serves the most recently written capture that has
//! pixel data. Each call picks that capture afresh under the session lock, so
//! a capture landing between two reads may switch the stream to a newer
//! image. A single call is atomic; a sequence of calls is not.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

use bytes::Bytes;
use fbtap_core::{DeviceId, ExportError, FramebufferId, PixelFormat, TilingLayout};
use serde::Serialize;
use tracing::debug;

use crate::history::Capture;
use crate::session::CaptureSession;

/// Bytes of pixel data shown per capture in the status report.
pub const PREVIEW_BYTES: usize = 64;

// ── Status report ─────────────────────────────────────────────────────────────

/// Metadata of one valid history slot. Holds no pixel data beyond a short
/// preview.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureSummary {
    pub index: usize,
    pub timestamp_ns: u64,
    pub device: DeviceId,
    pub framebuffer: FramebufferId,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub format_name: &'static str,
    pub pitch: u32,
    pub buffer_size: usize,
    pub tiling: TilingLayout,
    pub tiling_guessed: bool,
    pub detiled: bool,
    pub has_pixels: bool,
    /// First [`PREVIEW_BYTES`] bytes, empty without pixel data.
    pub preview: Vec<u8>,
    /// Bytes 0..4 as a little-endian packed pixel.
    pub first_pixel: Option<u32>,
}

impl CaptureSummary {
    fn new(index: usize, c: &Capture) -> Self {
        let (preview, first_pixel) = if c.has_pixels {
            let px = c.pixels();
            let first = px
                .get(..4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
            (px[..px.len().min(PREVIEW_BYTES)].to_vec(), first)
        } else {
            (Vec::new(), None)
        };
        Self {
            index,
            timestamp_ns: c.timestamp_ns,
            device: c.device,
            framebuffer: c.framebuffer,
            width: c.width,
            height: c.height,
            format: c.format,
            format_name: c.format.name(),
            pitch: c.pitch,
            buffer_size: c.buffer_size(),
            tiling: c.tiling,
            tiling_guessed: c.tiling_guessed,
            detiled: c.detiled,
            has_pixels: c.has_pixels,
            preview,
            first_pixel,
        }
    }
}

/// Snapshot of the capture history.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub capacity: usize,
    pub count: usize,
    pub captures: Vec<CaptureSummary>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DRM Framebuffer Pixel Extractor with Detiling")?;
        writeln!(f, "Captured framebuffers: {}", self.count)?;
        writeln!(f)?;

        for c in &self.captures {
            writeln!(f, "Capture {}:", c.index)?;
            writeln!(f, "  Timestamp: {} ns", c.timestamp_ns)?;
            writeln!(f, "  Device: {}", c.device)?;
            writeln!(f, "  Framebuffer: {}", c.framebuffer)?;
            writeln!(f, "  Dimensions: {}x{}", c.width, c.height)?;
            writeln!(f, "  Format: {}", c.format)?;
            writeln!(f, "  Pitch: {} bytes/row", c.pitch)?;
            writeln!(f, "  Buffer size: {} bytes", c.buffer_size)?;
            let guessed = if c.tiling_guessed { " (guessed from pitch)" } else { "" };
            writeln!(f, "  Tiling: {}{}", c.tiling, guessed)?;
            writeln!(f, "  Detiled: {}", if c.detiled { "YES" } else { "NO" })?;
            let avail = if c.has_pixels { "AVAILABLE (LINEAR)" } else { "NOT AVAILABLE" };
            writeln!(f, "  Pixel data: {}", avail)?;

            if c.has_pixels {
                writeln!(f, "  First {} bytes (hex): {}", PREVIEW_BYTES, hex_preview(&c.preview))?;
                if let Some(px) = c.first_pixel {
                    writeln!(f, "  First pixel (ARGB): 0x{:08x}", px)?;
                }
            }
            writeln!(f)?;
        }

        writeln!(f, "Usage:")?;
        writeln!(f, "  Raw linear pixel data of the newest capture is served by the raw export.")?;
        writeln!(f, "  Read Buffer size bytes from offset 0 to get the whole image.")
    }
}

/// Hex bytes in groups of four, sixteen bytes per line.
fn hex_preview(bytes: &[u8]) -> String {
    const INDENT: &str = "\n                        ";
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        out.push_str(&format!("{:02x}", b));
        let n = i + 1;
        if n == bytes.len() {
            break;
        }
        if n % 16 == 0 {
            out.push_str(INDENT);
        } else if n % 4 == 0 {
            out.push(' ');
        }
    }
    out
}

// ── Session export API ────────────────────────────────────────────────────────

impl CaptureSession {
    /// Metadata of every valid slot, in slot order.
    pub fn status(&self) -> StatusReport {
        let state = self.lock();
        let history = &state.history;
        StatusReport {
            capacity: history.capacity(),
            count: history.len(),
            captures: history.iter().map(|(i, c)| CaptureSummary::new(i, c)).collect(),
        }
    }

    /// Read up to `max_len` bytes at `offset` from the newest pixel-bearing
    /// capture.
    ///
    /// An offset at or past the end yields an empty result, not an error.
    pub fn read(&self, offset: u64, max_len: usize) -> Result<Bytes, ExportError> {
        let state = self.lock();
        let capture = state.history.latest_with_pixels().ok_or(ExportError::NoData)?;
        let range = byte_range(capture.buffer_size(), offset, max_len);
        Ok(Bytes::copy_from_slice(&capture.pixels()[range]))
    }

    /// Like [`Self::read`], copying into `dst`. Returns the byte count.
    pub fn read_into(&self, offset: u64, dst: &mut [u8]) -> Result<usize, ExportError> {
        let state = self.lock();
        let capture = state.history.latest_with_pixels().ok_or(ExportError::NoData)?;
        let range = byte_range(capture.buffer_size(), offset, dst.len());
        let n = range.len();
        dst[..n].copy_from_slice(&capture.pixels()[range]);
        Ok(n)
    }

    /// Buffer size of the capture the raw export currently serves.
    pub fn latest_size(&self) -> Result<usize, ExportError> {
        let state = self.lock();
        state
            .history
            .latest_with_pixels()
            .map(Capture::buffer_size)
            .ok_or(ExportError::NoData)
    }

    /// File-like view of the raw export.
    pub fn raw_reader(&self) -> RawReader<'_> {
        RawReader { session: self, pos: 0 }
    }

    /// Stream the newest pixel-bearing capture into `out`, `chunk` bytes per
    /// read. Returns the bytes written.
    pub fn copy_latest_to<W: Write>(&self, out: &mut W, chunk: usize) -> Result<u64, ExportError> {
        let chunk = chunk.max(1);
        let mut offset = 0u64;
        loop {
            let bytes = self.read(offset, chunk)?;
            if bytes.is_empty() {
                break;
            }
            out.write_all(&bytes)
                .map_err(|e| ExportError::Fault { reason: e.to_string() })?;
            offset += bytes.len() as u64;
        }
        out.flush().map_err(|e| ExportError::Fault { reason: e.to_string() })?;
        debug!("Exported {} bytes", offset);
        Ok(offset)
    }
}

fn byte_range(size: usize, offset: u64, max_len: usize) -> std::ops::Range<usize> {
    match usize::try_from(offset) {
        Ok(start) if start < size => start..start + max_len.min(size - start),
        _ => size..size,
    }
}

// ── RawReader ─────────────────────────────────────────────────────────────────

/// `Read + Seek` cursor over the raw export.
///
/// Reads past the end return `Ok(0)`. With no pixel-bearing capture, reads
/// and end-relative seeks fail with [`io::ErrorKind::NotFound`].
pub struct RawReader<'a> {
    session: &'a CaptureSession,
    pos: u64,
}

impl RawReader<'_> {
    pub fn position(&self) -> u64 {
        self.pos
    }
}

fn io_error(e: ExportError) -> io::Error {
    match e {
        ExportError::NoData => io::Error::new(io::ErrorKind::NotFound, e),
        ExportError::Fault { .. } => io::Error::new(io::ErrorKind::Other, e),
    }
}

impl Read for RawReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.session.read_into(self.pos, buf).map_err(io_error)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for RawReader<'_> {
    fn seek(&mut self, from: SeekFrom) -> io::Result<u64> {
        let target = match from {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
            SeekFrom::End(d) => {
                let size = self.session.latest_size().map_err(io_error)? as u64;
                size.checked_add_signed(d)
            }
        };
        let pos = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative or overflowing position")
        })?;
        self.pos = pos;
        Ok(pos)
    }
}
