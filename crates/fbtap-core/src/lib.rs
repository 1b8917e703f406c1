//! fbtap-core: shared model for framebuffer capture.
//!
//! Holds the data types, error taxonomy, configuration, the buffer-object
//! access interface and the tiling model/detector used by the other crates.

pub mod buffer;
pub mod config;
pub mod errors;
pub mod object;
pub mod tiling;
pub mod types;

pub use buffer::alloc_zeroed;
pub use config::CaptureConfig;
pub use errors::{CaptureError, ConfigError, DetileError, ExportError, ExtractError};
pub use object::{BufferObject, ForeignMapping, ForeignSource, IoMemory, PageSource, VmapGuard};
pub use tiling::{detect, DetectionSource, TileDims, TilingDetection, TilingLayout};
pub use types::*;
