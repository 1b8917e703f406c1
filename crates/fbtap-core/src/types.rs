use serde::{Deserialize, Serialize};

use crate::object::BufferObject;

// MARK: - Opaque handles

/// Opaque identifier of the graphics device that owns a framebuffer.
///
/// Never dereferenced; it is only carried into the status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DeviceId(pub u64);

/// Opaque identifier of a framebuffer description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FramebufferId(pub u64);

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl std::fmt::Display for FramebufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

// MARK: - PixelFormat

/// DRM fourcc pixel format code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PixelFormat(pub u32);

const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) | (code[1] as u32) << 8 | (code[2] as u32) << 16 | (code[3] as u32) << 24
}

impl PixelFormat {
    pub const XRGB8888: Self = Self(fourcc(b"XR24"));
    pub const ARGB8888: Self = Self(fourcc(b"AR24"));
    pub const RGB565: Self = Self(fourcc(b"RG16"));
    pub const XBGR8888: Self = Self(fourcc(b"XB24"));
    pub const ABGR8888: Self = Self(fourcc(b"AB24"));

    /// Short mnemonic used by the status report.
    pub fn name(&self) -> &'static str {
        match *self {
            Self::XRGB8888 => "XRGB8888",
            Self::ARGB8888 => "ARGB8888",
            Self::RGB565 => "RGB565",
            Self::XBGR8888 => "XBGR8888",
            Self::ABGR8888 => "ABGR8888",
            _ => "UNKNOWN",
        }
    }

    /// Storage size of one pixel, if the format is known.
    ///
    /// Capture buffers and the detiler always assume 4 bytes per pixel; this
    /// is informational only.
    pub fn bytes_per_pixel(&self) -> Option<u32> {
        match *self {
            Self::RGB565 => Some(2),
            Self::XRGB8888 | Self::ARGB8888 | Self::XBGR8888 | Self::ABGR8888 => Some(4),
            _ => None,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08x} ({})", self.0, self.name())
    }
}

// MARK: - FramebufferDescriptor

/// Framebuffer metadata handed over by the trigger for one capture call.
///
/// Borrowed for the duration of the call only; the session copies every
/// field it keeps.
#[derive(Clone, Copy)]
pub struct FramebufferDescriptor<'a> {
    pub id: FramebufferId,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Bytes per row as stored by the device.
    pub pitch: u32,
    /// DRM format modifier, `None` when the producer did not supply one.
    pub modifier: Option<u64>,
    /// The single buffer object backing plane 0. `None` is a null handle.
    pub object: Option<&'a dyn BufferObject>,
}

impl std::fmt::Debug for FramebufferDescriptor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramebufferDescriptor")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("pitch", &self.pitch)
            .field("modifier", &self.modifier)
            .field("object_size", &self.object.map(|o| o.size()))
            .finish()
    }
}
