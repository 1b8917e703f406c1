//! Tiling model and tiling detector.
//!
//! A tiled surface is a grid of fixed-size tiles laid out row-major, each tile
//! `width` bytes wide and `height` rows tall and stored row-major inside.
//! Tile dimensions are given in bytes horizontally and rows vertically, so
//! the mapping does not depend on pixel size.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::FramebufferDescriptor;

// MARK: - Modifiers

/// DRM "no tiling" modifier.
pub const DRM_FORMAT_MOD_LINEAR: u64 = 0;
/// DRM "modifier unknown / implicit" marker.
pub const DRM_FORMAT_MOD_INVALID: u64 = 0x00ff_ffff_ffff_ffff;

pub const DRM_FORMAT_MOD_VENDOR_INTEL: u64 = 0x01;

const fn intel_mod(value: u64) -> u64 {
    (DRM_FORMAT_MOD_VENDOR_INTEL << 56) | (value & 0x00ff_ffff_ffff_ffff)
}

pub const I915_FORMAT_MOD_X_TILED: u64 = intel_mod(1);
pub const I915_FORMAT_MOD_Y_TILED: u64 = intel_mod(2);
pub const I915_FORMAT_MOD_YF_TILED: u64 = intel_mod(3);

// MARK: - TileDims

/// Size of one tile: `width` bytes by `height` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileDims {
    pub width: u32,
    pub height: u32,
}

impl TileDims {
    /// Legacy X tiling: 512 bytes by 8 rows.
    pub const X: Self = Self { width: 512, height: 8 };
    /// Y and Yf tiling: 128 bytes by 32 rows.
    pub const Y: Self = Self { width: 128, height: 32 };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Bytes in one tile.
    pub fn tile_size(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Tiles per tile-row for a surface with the given pitch.
    pub fn tiles_per_row(&self, pitch: u32) -> usize {
        if self.width == 0 {
            return 0;
        }
        (pitch / self.width) as usize
    }

    /// Tiled byte offset of the byte at column `byte_x`, row `y`.
    ///
    /// `None` if the tile is degenerate or the arithmetic overflows.
    pub fn tiled_offset(&self, byte_x: usize, y: usize, pitch: u32) -> Option<usize> {
        let tw = self.width as usize;
        let th = self.height as usize;
        if tw == 0 || th == 0 {
            return None;
        }
        let tile_index = (y / th)
            .checked_mul(self.tiles_per_row(pitch))?
            .checked_add(byte_x / tw)?;
        let in_tile = (y % th) * tw + byte_x % tw;
        tile_index.checked_mul(self.tile_size())?.checked_add(in_tile)
    }

    /// Inverse of [`Self::tiled_offset`]: the `(byte_x, y)` a tiled offset
    /// holds. `None` for degenerate geometry.
    pub fn linear_position(&self, offset: usize, pitch: u32) -> Option<(usize, usize)> {
        let tw = self.width as usize;
        let th = self.height as usize;
        let per_row = self.tiles_per_row(pitch);
        if tw == 0 || th == 0 || per_row == 0 {
            return None;
        }
        let tile_index = offset / self.tile_size();
        let in_tile = offset % self.tile_size();
        let byte_x = (tile_index % per_row) * tw + in_tile % tw;
        let y = (tile_index / per_row) * th + in_tile / tw;
        Some((byte_x, y))
    }
}

// MARK: - TilingLayout

/// Memory layout of a framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TilingLayout {
    #[default]
    Linear,
    /// Legacy X tiling.
    XTiled(TileDims),
    /// Y tiling.
    YTiled(TileDims),
    /// Yf tiling. Same tile size as Y in this model.
    YfTiled(TileDims),
}

impl TilingLayout {
    pub const X: Self = Self::XTiled(TileDims::X);
    pub const Y: Self = Self::YTiled(TileDims::Y);
    pub const YF: Self = Self::YfTiled(TileDims::Y);

    pub fn tile_dims(&self) -> Option<TileDims> {
        match *self {
            Self::Linear => None,
            Self::XTiled(d) | Self::YTiled(d) | Self::YfTiled(d) => Some(d),
        }
    }

    pub fn is_linear(&self) -> bool {
        matches!(self, Self::Linear)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear => "Linear",
            Self::XTiled(_) => "X-tiled",
            Self::YTiled(_) => "Y-tiled",
            Self::YfTiled(_) => "Yf-tiled",
        }
    }
}

impl std::fmt::Display for TilingLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// MARK: - Detector

/// What a classification was based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// No modifier, or the linear modifier.
    Absent,
    /// A modifier from the known table.
    Modifier,
    /// Unrecognized modifier, classified by pitch alignment.
    PitchHeuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilingDetection {
    pub layout: TilingLayout,
    pub source: DetectionSource,
}

impl TilingDetection {
    /// True when the layout came from the pitch fallback rather than a
    /// known modifier. Such a layout may be wrong.
    pub fn is_guess(&self) -> bool {
        self.source == DetectionSource::PitchHeuristic && !self.layout.is_linear()
    }
}

/// Map a known modifier to its layout.
pub fn layout_for_modifier(modifier: u64) -> Option<TilingLayout> {
    match modifier {
        DRM_FORMAT_MOD_LINEAR => Some(TilingLayout::Linear),
        I915_FORMAT_MOD_X_TILED => Some(TilingLayout::X),
        I915_FORMAT_MOD_Y_TILED => Some(TilingLayout::Y),
        I915_FORMAT_MOD_YF_TILED => Some(TilingLayout::YF),
        _ => None,
    }
}

/// Classify a framebuffer's memory layout.
///
/// Unknown modifiers fall back to pitch alignment when `pitch_heuristic` is
/// set: a pitch that is a non-zero multiple of the X tile width is assumed
/// X-tiled. That guess can be wrong for a linear surface whose pitch happens
/// to be aligned; callers must tolerate a corrupt-looking result.
pub fn detect(fb: &FramebufferDescriptor<'_>, pitch_heuristic: bool) -> TilingDetection {
    let modifier = match fb.modifier {
        None | Some(DRM_FORMAT_MOD_LINEAR) => {
            return TilingDetection { layout: TilingLayout::Linear, source: DetectionSource::Absent };
        }
        Some(m) => m,
    };

    if let Some(layout) = layout_for_modifier(modifier) {
        debug!("Modifier {:#018x} → {}", modifier, layout);
        return TilingDetection { layout, source: DetectionSource::Modifier };
    }

    let width = TileDims::X.width;
    if pitch_heuristic && fb.pitch != 0 && fb.pitch % width == 0 {
        warn!(
            "Unrecognized modifier {:#018x}; pitch {} is {}-aligned, guessing X-tiled",
            modifier, fb.pitch, width
        );
        return TilingDetection { layout: TilingLayout::X, source: DetectionSource::PitchHeuristic };
    }

    debug!("Unrecognized modifier {:#018x}, treating as linear", modifier);
    TilingDetection { layout: TilingLayout::Linear, source: DetectionSource::PitchHeuristic }
}
