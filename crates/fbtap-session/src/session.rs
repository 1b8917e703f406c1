use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use fbtap_core::{
    alloc_zeroed, detect, BufferObject, CaptureConfig, CaptureError, ConfigError, DeviceId,
    ExtractError, FramebufferDescriptor,
};
use fbtap_detile::detile;
use fbtap_extract::{extract, extract_to_vec, Extracted};
use tracing::{debug, error, info, warn};

use crate::history::{Capture, CaptureHistory};

/// Owns the capture history and runs one capture per trigger event.
///
/// Every public entry point (capture, listing, byte-range read) takes the
/// same lock for its whole duration, copies included. Captures and reads are
/// therefore totally ordered and a reader never sees a half-written slot.
pub struct CaptureSession {
    config: CaptureConfig,
    epoch: Instant,
    state: Mutex<SessionState>,
}

pub(crate) struct SessionState {
    pub(crate) history: CaptureHistory,
    last_timestamp_ns: u64,
}

impl CaptureSession {
    pub fn new(config: CaptureConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let history = CaptureHistory::new(config.history_capacity);
        info!(
            "Capture session ready: {} slots, max {} bytes per capture",
            config.history_capacity, config.max_capture_size
        );
        Ok(Self {
            config,
            epoch: Instant::now(),
            state: Mutex::new(SessionState { history, last_timestamp_ns: 0 }),
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Trigger entry point: a framebuffer on `device` was created or updated.
    pub fn notify_framebuffer_ready(
        &self,
        device: DeviceId,
        fb: &FramebufferDescriptor<'_>,
    ) -> Result<(), CaptureError> {
        debug!(
            "Framebuffer ready on {}: {}x{}, format={}",
            device, fb.width, fb.height, fb.format
        );
        let result = self.capture(device, fb);
        if let Err(e) = &result {
            warn!("Capture of {} failed: {}", fb.id, e);
        }
        result
    }

    /// Capture `fb` into the next history slot.
    ///
    /// Fails only on a null buffer object or an allocation failure; in the
    /// latter case the slot is left empty and the cursor does not move. A
    /// framebuffer whose pixels cannot be read is stored metadata-only.
    pub fn capture(&self, device: DeviceId, fb: &FramebufferDescriptor<'_>) -> Result<(), CaptureError> {
        let Some(object) = fb.object else {
            return Err(CaptureError::InvalidArgument {
                reason: "framebuffer has no buffer object".into(),
            });
        };

        let mut state = self.lock();
        state.history.vacate_current();
        let timestamp_ns = state.next_timestamp(self.epoch);

        let detection = detect(fb, self.config.pitch_heuristic);
        let mut capture = Capture {
            device,
            framebuffer: fb.id,
            width: fb.width,
            height: fb.height,
            format: fb.format,
            pitch: fb.pitch,
            modifier: fb.modifier,
            timestamp_ns,
            tiling: detection.layout,
            tiling_guessed: detection.is_guess(),
            detiled: false,
            has_pixels: false,
            bytes_extracted: 0,
            method: None,
            pixels: Vec::new(),
        };

        let size = self.config.linear_size(fb.width, fb.height);
        let full = (fb.width as u64).saturating_mul(fb.height as u64).saturating_mul(4);
        if full > size as u64 {
            warn!("Framebuffer too large, limiting to {} of {} bytes", size, full);
        }
        capture.pixels = alloc_zeroed(size).map_err(|e| {
            error!("Failed to allocate pixel buffer ({} bytes)", e.bytes);
            CaptureError::from(e)
        })?;

        info!(
            "Framebuffer info: {}x{}, format={}, pitch={}, tiling={}{}",
            fb.width,
            fb.height,
            fb.format,
            fb.pitch,
            capture.tiling,
            if capture.tiling_guessed { " (guessed)" } else { "" }
        );

        if capture.tiling.is_linear() {
            fill_linear(object, &mut capture)?;
        } else {
            fill_tiled(object, &mut capture)?;
        }

        if capture.has_pixels {
            info!(
                "Captured {} framebuffer pixels: {}x{}, {} bytes",
                if capture.detiled { "and detiled" } else { "linear" },
                capture.width,
                capture.height,
                capture.buffer_size()
            );
        } else {
            info!("Captured framebuffer metadata only: {}x{}", capture.width, capture.height);
        }

        state.history.commit(capture);
        Ok(())
    }

    /// Release every stored capture.
    pub fn clear(&self) {
        let mut state = self.lock();
        info!("Releasing {} capture(s)", state.history.len());
        state.history.clear();
    }

    /// Valid captures currently held.
    pub fn len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A panicking reader cannot leave the ring half-written, so a poisoned
    /// lock is still safe to use.
    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionState {
    fn next_timestamp(&mut self, epoch: Instant) -> u64 {
        let now = u64::try_from(epoch.elapsed().as_nanos()).unwrap_or(u64::MAX);
        let ts = now.max(self.last_timestamp_ns.saturating_add(1));
        self.last_timestamp_ns = ts;
        ts
    }
}

/// Extract straight into the capture's buffer.
fn fill_linear(
    object: &dyn BufferObject,
    capture: &mut Capture,
) -> Result<(), CaptureError> {
    if capture.pixels.is_empty() {
        return Ok(());
    }
    match extract(Some(object), &mut capture.pixels) {
        Ok(got) => record(capture, got),
        Err(e) => metadata_only(e)?,
    }
    capture.has_pixels = capture.bytes_extracted > 0;
    Ok(())
}

/// Extract into a scratch buffer of `height * pitch` bytes, capped at the
/// object's size, then detile into the capture's buffer. Offsets past the
/// scratch end are skipped by the detiler. The scratch buffer is dropped on
/// every path.
fn fill_tiled(
    object: &dyn BufferObject,
    capture: &mut Capture,
) -> Result<(), CaptureError> {
    let raw_len = (capture.height as usize)
        .checked_mul(capture.pitch as usize)
        .ok_or(CaptureError::OutOfMemory { bytes: usize::MAX })?
        .min(object.size());
    if raw_len == 0 || capture.pixels.is_empty() {
        return Ok(());
    }

    let raw = match extract_to_vec(Some(object), raw_len) {
        Ok((raw, got)) => {
            record(capture, got);
            raw
        }
        Err(e) => return metadata_only(e),
    };

    match detile(&raw, &mut capture.pixels, capture.width, capture.height, capture.pitch, capture.tiling) {
        Ok(stats) => {
            capture.detiled = true;
            debug!("Detiled framebuffer: {} bytes copied, {} skipped", stats.copied, stats.skipped);
        }
        Err(e) => warn!("Failed to detile framebuffer: {}", e),
    }
    capture.has_pixels = capture.detiled;
    Ok(())
}

fn record(capture: &mut Capture, got: Extracted) {
    capture.bytes_extracted = got.bytes;
    capture.method = Some(got.method);
    if got.missing_pages > 0 {
        warn!("{} page(s) missing, capture is incomplete", got.missing_pages);
    }
}

/// Allocation failure aborts the capture; anything else degrades it to
/// metadata-only.
fn metadata_only(e: ExtractError) -> Result<(), CaptureError> {
    match e {
        ExtractError::OutOfMemory { bytes } => {
            error!("Failed to allocate raw buffer for detiling ({} bytes)", bytes);
            Err(CaptureError::OutOfMemory { bytes })
        }
        other => {
            warn!("No pixel data extracted: {}", other);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fbtap_core::tiling::I915_FORMAT_MOD_X_TILED;
    use fbtap_core::{FramebufferId, PixelFormat, TilingLayout};
    use fbtap_detile::tile;
    use fbtap_extract::memory::MemoryObject;

    fn descriptor<'a>(
        object: Option<&'a dyn BufferObject>,
        width: u32,
        height: u32,
        modifier: Option<u64>,
    ) -> FramebufferDescriptor<'a> {
        FramebufferDescriptor {
            id: FramebufferId(0x42),
            width,
            height,
            format: PixelFormat::XRGB8888,
            pitch: width * 4,
            modifier,
            object,
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn session(capacity: usize) -> CaptureSession {
        let config = CaptureConfig { history_capacity: capacity, ..CaptureConfig::default() };
        CaptureSession::new(config).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let config = CaptureConfig { history_capacity: 0, ..CaptureConfig::default() };
        assert_eq!(CaptureSession::new(config).err(), Some(ConfigError::ZeroCapacity));
    }

    #[test]
    fn null_object_is_rejected_without_touching_history() {
        let session = session(5);
        let fb = descriptor(None, 4, 4, None);
        let err = session.notify_framebuffer_ready(DeviceId(1), &fb).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidArgument { .. }));
        assert!(session.is_empty());
        assert_eq!(session.lock().history.cursor(), 0);
    }

    #[test]
    fn linear_capture_copies_pixels() {
        let data = pattern(64 * 8 * 4);
        let object = MemoryObject::paged(&data);
        let session = session(5);
        session.capture(DeviceId(1), &descriptor(Some(&object), 64, 8, None)).unwrap();

        let state = session.lock();
        let capture = state.history.get(0).unwrap();
        assert!(capture.has_pixels);
        assert!(!capture.detiled);
        assert_eq!(capture.tiling, TilingLayout::Linear);
        assert_eq!(capture.pixels(), &data[..]);
        assert_eq!(object.live_mappings(), 0);
    }

    #[test]
    fn unreadable_object_is_stored_metadata_only() {
        let object = MemoryObject::imported(vec![1u8; 256]).refuse_mapping();
        let session = session(5);
        session.capture(DeviceId(1), &descriptor(Some(&object), 8, 8, None)).unwrap();

        let state = session.lock();
        assert_eq!(state.history.len(), 1);
        let capture = state.history.get(0).unwrap();
        assert!(!capture.has_pixels);
        assert_eq!(capture.buffer_size(), 8 * 8 * 4);
        assert!(state.history.latest_with_pixels().is_none());
    }

    #[test]
    fn x_tiled_capture_is_detiled() {
        let (w, h) = (256, 16);
        let linear = pattern(w as usize * h as usize * 4);
        let tiled = tile(&linear, w, h, w * 4, TilingLayout::X).unwrap();
        let object = MemoryObject::paged(&tiled);
        let session = session(5);
        let fb = descriptor(Some(&object), w, h, Some(I915_FORMAT_MOD_X_TILED));
        session.capture(DeviceId(1), &fb).unwrap();

        let state = session.lock();
        let capture = state.history.get(0).unwrap();
        assert_eq!(capture.tiling, TilingLayout::X);
        assert!(!capture.tiling_guessed);
        assert!(capture.detiled);
        assert!(capture.has_pixels);
        assert_eq!(capture.pixels(), &linear[..]);
    }

    #[test]
    fn unknown_modifier_with_aligned_pitch_is_guessed_x_tiled() {
        let (w, h) = (128, 8);
        let linear = pattern(w as usize * h as usize * 4);
        let tiled = tile(&linear, w, h, w * 4, TilingLayout::X).unwrap();
        let object = MemoryObject::paged(&tiled);
        let session = session(5);
        let fb = descriptor(Some(&object), w, h, Some(0x0200_0000_0000_0007));
        session.capture(DeviceId(1), &fb).unwrap();

        let state = session.lock();
        let capture = state.history.get(0).unwrap();
        assert_eq!(capture.tiling, TilingLayout::X);
        assert!(capture.tiling_guessed);
        assert_eq!(capture.pixels(), &linear[..]);
    }

    #[test]
    fn oversized_framebuffer_is_clamped() {
        let object = MemoryObject::paged(&pattern(64 * 64 * 4));
        let config = CaptureConfig { max_capture_size: 1024, ..CaptureConfig::default() };
        let session = CaptureSession::new(config).unwrap();
        session.capture(DeviceId(1), &descriptor(Some(&object), 64, 64, None)).unwrap();
        assert_eq!(session.lock().history.get(0).unwrap().buffer_size(), 1024);
    }

    fn raw_descriptor<'a>(
        object: &'a dyn BufferObject,
        width: u32,
        height: u32,
        pitch: u32,
        modifier: Option<u64>,
    ) -> FramebufferDescriptor<'a> {
        FramebufferDescriptor {
            id: FramebufferId(0x99),
            width,
            height,
            format: PixelFormat::XRGB8888,
            pitch,
            modifier,
            object: Some(object),
        }
    }

    /// Two-slot session holding a 1x1 capture of 6s, then one of 7s.
    fn session_with_two_captures(config: CaptureConfig) -> CaptureSession {
        let session = CaptureSession::new(CaptureConfig { history_capacity: 2, ..config }).unwrap();
        for fill in [6u8, 7] {
            let object = MemoryObject::paged(&[fill; 4]);
            session.capture(DeviceId(1), &descriptor(Some(&object), 1, 1, None)).unwrap();
        }
        assert_eq!(session.len(), 2);
        assert_eq!(session.lock().history.cursor(), 0);
        session
    }

    #[test]
    fn huge_geometry_is_clamped_without_overflow() {
        let data = pattern(4096);
        let object = MemoryObject::paged(&data);
        let session = session(5);
        let fb = raw_descriptor(&object, u32::MAX, u32::MAX, u32::MAX, None);
        session.capture(DeviceId(1), &fb).unwrap();

        let state = session.lock();
        let capture = state.history.get(0).unwrap();
        assert_eq!(capture.buffer_size(), session.config().max_capture_size);
        assert!(capture.has_pixels);
        assert_eq!(&capture.pixels()[..4096], &data[..]);
    }

    #[test]
    fn linear_buffer_oom_vacates_slot_and_keeps_cursor() {
        let config = CaptureConfig { max_capture_size: usize::MAX, ..CaptureConfig::default() };
        let session = session_with_two_captures(config);
        let object = MemoryObject::paged(&[1u8; 64]);
        let fb = raw_descriptor(&object, 1 << 30, 1 << 30, u32::MAX, None);

        let err = session.capture(DeviceId(1), &fb).unwrap_err();
        assert!(matches!(err, CaptureError::OutOfMemory { .. }));
        assert_eq!(session.len(), 1);
        assert_eq!(session.lock().history.cursor(), 0);
        assert!(session.lock().history.get(0).is_none());
        assert_eq!(&session.read(0, 16).unwrap()[..], &[7u8; 4]);
    }

    #[test]
    fn tiled_scratch_oom_vacates_slot_and_keeps_cursor() {
        let session = session_with_two_captures(CaptureConfig::default());
        let object = MemoryObject::paged(&[1u8; 64]).with_reported_size(usize::MAX);
        let fb = raw_descriptor(&object, 16, u32::MAX, u32::MAX, Some(I915_FORMAT_MOD_X_TILED));

        let err = session.capture(DeviceId(1), &fb).unwrap_err();
        assert!(matches!(err, CaptureError::OutOfMemory { .. }));
        assert_eq!(session.len(), 1);
        assert_eq!(session.lock().history.cursor(), 0);
        assert_eq!(&session.read(0, 16).unwrap()[..], &[7u8; 4]);
    }

    #[test]
    fn tiled_scratch_is_capped_at_object_size() {
        let (w, h) = (128, 8);
        let linear = pattern(w as usize * h as usize * 4);
        let tiled = tile(&linear, w, h, w * 4, TilingLayout::X).unwrap();
        let object = MemoryObject::paged(&tiled);
        let session = session(5);
        // The claimed pitch would need a multi-gigabyte scratch buffer.
        let fb = raw_descriptor(&object, w, h, 512 << 20, Some(I915_FORMAT_MOD_X_TILED));
        session.capture(DeviceId(1), &fb).unwrap();

        let state = session.lock();
        let capture = state.history.get(0).unwrap();
        assert_eq!(capture.bytes_extracted, tiled.len());
        assert!(capture.detiled);
    }

    #[test]
    fn history_wraps_after_capacity() {
        let object = MemoryObject::paged(&pattern(16));
        let session = session(5);
        for i in 0..6u64 {
            let mut fb = descriptor(Some(&object), 2, 2, None);
            fb.id = FramebufferId(i);
            session.capture(DeviceId(1), &fb).unwrap();
        }
        let state = session.lock();
        assert_eq!(state.history.len(), 5);
        assert_eq!(state.history.cursor(), 1);
        assert_eq!(state.history.get(0).unwrap().framebuffer, FramebufferId(5));
        assert_eq!(state.history.get(1).unwrap().framebuffer, FramebufferId(1));
    }

    #[test]
    fn timestamps_strictly_increase() {
        let object = MemoryObject::paged(&pattern(16));
        let session = session(8);
        for _ in 0..8 {
            session.capture(DeviceId(1), &descriptor(Some(&object), 2, 2, None)).unwrap();
        }
        let state = session.lock();
        let stamps: Vec<u64> = state.history.iter().map(|(_, c)| c.timestamp_ns).collect();
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn clear_empties_history() {
        let object = MemoryObject::paged(&pattern(16));
        let session = session(5);
        session.capture(DeviceId(1), &descriptor(Some(&object), 2, 2, None)).unwrap();
        session.capture(DeviceId(1), &descriptor(Some(&object), 2, 2, None)).unwrap();
        session.clear();
        assert!(session.is_empty());
        assert_eq!(session.lock().history.cursor(), 0);
    }
}
