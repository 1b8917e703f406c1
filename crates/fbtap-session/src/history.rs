//! Fixed-capacity ring of recent captures.

use fbtap_core::{DeviceId, FramebufferId, PixelFormat, TilingLayout};
use fbtap_extract::AccessMethod;

// ── Capture ───────────────────────────────────────────────────────────────────

/// One stored framebuffer snapshot: copied metadata plus its linear pixels.
#[derive(Debug)]
pub struct Capture {
    pub device: DeviceId,
    pub framebuffer: FramebufferId,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pitch: u32,
    pub modifier: Option<u64>,
    /// Nanoseconds since the session started, strictly increasing.
    pub timestamp_ns: u64,
    pub tiling: TilingLayout,
    /// The layout came from the pitch fallback, not a known modifier.
    pub tiling_guessed: bool,
    pub detiled: bool,
    pub has_pixels: bool,
    /// Raw bytes read out of the buffer object.
    pub bytes_extracted: usize,
    pub method: Option<AccessMethod>,
    pub(crate) pixels: Vec<u8>,
}

impl Capture {
    /// Linear pixel bytes, `min(width * height * 4, max_capture_size)` long.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn buffer_size(&self) -> usize {
        self.pixels.len()
    }
}

// ── CaptureHistory ────────────────────────────────────────────────────────────

/// Ring of capture slots, oldest overwritten first.
///
/// Not synchronized; [`crate::CaptureSession`] keeps it behind its lock.
#[derive(Debug)]
pub struct CaptureHistory {
    slots: Vec<Option<Capture>>,
    cursor: usize,
    count: usize,
}

impl CaptureHistory {
    /// `capacity` is clamped to at least one slot.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            cursor: 0,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Valid entries, never more than [`Self::capacity`].
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Slot the next capture will be written to.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn get(&self, index: usize) -> Option<&Capture> {
        self.slots.get(index)?.as_ref()
    }

    /// Release the occupant of the slot under the cursor.
    ///
    /// The slot stays empty until [`Self::commit`]; a failed capture leaves it
    /// that way.
    pub fn vacate_current(&mut self) {
        if self.slots[self.cursor].take().is_some() {
            self.count -= 1;
        }
    }

    /// Store `capture` under the cursor and advance it.
    pub fn commit(&mut self, capture: Capture) {
        self.vacate_current();
        self.slots[self.cursor] = Some(capture);
        self.count += 1;
        self.cursor = (self.cursor + 1) % self.slots.len();
    }

    /// Valid slots in slot order, with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Capture)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|c| (i, c)))
    }

    /// Valid slots from most to least recently written.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &Capture> {
        let cap = self.slots.len();
        (1..=cap).filter_map(move |back| self.slots[(self.cursor + cap - back) % cap].as_ref())
    }

    /// Most recently written capture that holds pixel data.
    pub fn latest_with_pixels(&self) -> Option<&Capture> {
        self.iter_newest_first().find(|c| c.has_pixels)
    }

    /// Release every slot and reset the ring.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.cursor = 0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(timestamp_ns: u64, has_pixels: bool) -> Capture {
        Capture {
            device: DeviceId(1),
            framebuffer: FramebufferId(timestamp_ns),
            width: 2,
            height: 1,
            format: PixelFormat::XRGB8888,
            pitch: 8,
            modifier: None,
            timestamp_ns,
            tiling: TilingLayout::Linear,
            tiling_guessed: false,
            detiled: false,
            has_pixels,
            bytes_extracted: if has_pixels { 8 } else { 0 },
            method: None,
            pixels: vec![timestamp_ns as u8; 8],
        }
    }

    #[test]
    fn wraps_and_evicts_oldest() {
        let mut ring = CaptureHistory::new(5);
        for ts in 1..=6 {
            ring.commit(capture(ts, true));
            assert!(ring.len() <= 5);
        }
        assert_eq!(ring.len(), 5);
        let stamps: Vec<u64> = ring.iter().map(|(_, c)| c.timestamp_ns).collect();
        assert_eq!(stamps, vec![6, 2, 3, 4, 5]);
        assert_eq!(ring.cursor(), 1);
        assert_eq!(ring.latest_with_pixels().map(|c| c.timestamp_ns), Some(6));
    }

    #[test]
    fn newest_first_follows_write_order() {
        let mut ring = CaptureHistory::new(3);
        for ts in 1..=4 {
            ring.commit(capture(ts, true));
        }
        let order: Vec<u64> = ring.iter_newest_first().map(|c| c.timestamp_ns).collect();
        assert_eq!(order, vec![4, 3, 2]);
    }

    #[test]
    fn latest_with_pixels_skips_metadata_only() {
        let mut ring = CaptureHistory::new(4);
        ring.commit(capture(1, true));
        ring.commit(capture(2, true));
        ring.commit(capture(3, false));
        assert_eq!(ring.latest_with_pixels().map(|c| c.timestamp_ns), Some(2));
    }

    #[test]
    fn vacated_slot_is_not_counted() {
        let mut ring = CaptureHistory::new(2);
        ring.commit(capture(1, true));
        ring.commit(capture(2, true));
        // Cursor is back on the slot holding capture 1.
        ring.vacate_current();
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.cursor(), 0);
        assert!(ring.get(0).is_none());
        ring.commit(capture(3, true));
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn clear_releases_everything() {
        let mut ring = CaptureHistory::new(3);
        ring.commit(capture(1, true));
        ring.commit(capture(2, true));
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.cursor(), 0);
        assert!(ring.latest_with_pixels().is_none());
    }
}
