use thiserror::Error;

/// Failure of one capture attempt.
///
/// Only invalid input and allocation failure abort a capture. A capture whose
/// pixel extraction came up empty is still recorded as metadata-only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("Out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: usize },

    #[error("No pixel data available")]
    NoData,

    #[error("Copy fault: {reason}")]
    Fault { reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("Out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: usize },

    #[error("No access method yielded any bytes")]
    NoData,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetileError {
    #[error("Degenerate tile geometry {width}x{height}")]
    InvalidTile { width: u32, height: u32 },

    #[error("Out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    #[error("No capture with pixel data")]
    NoData,

    #[error("Copy fault: {reason}")]
    Fault { reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("history_capacity must be at least 1")]
    ZeroCapacity,

    #[error("max_capture_size must be at least {min} bytes, got {got}")]
    CaptureSizeTooSmall { min: usize, got: usize },
}

/// Returned by [`crate::buffer::alloc_zeroed`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Allocation of {bytes} bytes failed")]
pub struct AllocError {
    pub bytes: usize,
}

impl From<AllocError> for CaptureError {
    fn from(e: AllocError) -> Self {
        Self::OutOfMemory { bytes: e.bytes }
    }
}

impl From<AllocError> for ExtractError {
    fn from(e: AllocError) -> Self {
        Self::OutOfMemory { bytes: e.bytes }
    }
}

impl From<AllocError> for DetileError {
    fn from(e: AllocError) -> Self {
        Self::OutOfMemory { bytes: e.bytes }
    }
}

impl From<ExtractError> for CaptureError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::InvalidArgument { reason } => Self::InvalidArgument { reason },
            ExtractError::OutOfMemory { bytes } => Self::OutOfMemory { bytes },
            ExtractError::NoData => Self::NoData,
        }
    }
}

impl From<DetileError> for CaptureError {
    fn from(e: DetileError) -> Self {
        match e {
            DetileError::InvalidTile { width, height } => Self::InvalidArgument {
                reason: format!("tile {width}x{height} cannot be detiled"),
            },
            DetileError::OutOfMemory { bytes } => Self::OutOfMemory { bytes },
        }
    }
}

impl From<ExportError> for CaptureError {
    fn from(e: ExportError) -> Self {
        match e {
            ExportError::NoData => Self::NoData,
            ExportError::Fault { reason } => Self::Fault { reason },
        }
    }
}
