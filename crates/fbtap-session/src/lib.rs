//! fbtap-session: capture session manager and export interface.
//!
//! ```text
//! framebuffer ready ──► CaptureSession::capture
//!                         │  detect tiling
//!                         │  extract (page-mapped → foreign-mapped)
//!                         │  detile into a linear buffer
//!                         ▼
//!                   CaptureHistory (ring, one lock)
//!                         │
//!          ┌──────────────┴───────────────┐
//!          ▼                              ▼
//!   status() → StatusReport      read(offset, len) → Bytes
//! ```
//!
//! The raw export serves the newest capture that holds pixel data. Captures
//! stored metadata-only are listed in the status report but never served.

mod export;
mod history;
mod session;

pub use export::{CaptureSummary, RawReader, StatusReport, PREVIEW_BYTES};
pub use history::{Capture, CaptureHistory};
pub use session::CaptureSession;
