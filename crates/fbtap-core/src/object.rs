//! Access-method interface to externally owned buffer objects.
//!
//! The capture path never owns or frees a buffer object. It only reads through
//! one of two narrow access methods:
//!
//! | Method | Backing | Trait |
//! |--------|---------|-------|
//! | Page-mapped | system memory, page by page | [`PageSource`] |
//! | Foreign-mapped | memory imported from another device | [`ForeignSource`] |

/// Page size used by page-backed objects unless they say otherwise.
pub const PAGE_SIZE: usize = 4096;

/// An externally owned memory region holding pixel bytes for one surface.
pub trait BufferObject: Send + Sync {
    /// Size of the object in bytes.
    fn size(&self) -> usize;

    /// Page-mapped access, if the object is backed by system-memory pages.
    fn pages(&self) -> Option<&dyn PageSource> {
        None
    }

    /// Foreign-mapped access, if the object imports another device's memory.
    fn foreign(&self) -> Option<&dyn ForeignSource> {
        None
    }
}

/// A page that stays mapped until dropped.
pub type MappedPage<'a> = Box<dyn AsRef<[u8]> + 'a>;

pub trait PageSource {
    /// Number of backing pages.
    fn page_count(&self) -> usize;

    /// Bytes per page.
    fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    /// Look up and map page `index`. `None` if the page is not resident.
    fn map_page(&self, index: usize) -> Option<MappedPage<'_>>;
}

/// How a foreign mapping may be read.
pub enum ForeignMapping<'a> {
    /// Ordinary memory, readable with a plain copy.
    System(&'a [u8]),
    /// Device I/O memory, readable only through [`IoMemory::copy_from_io`].
    Io(&'a dyn IoMemory),
}

impl ForeignMapping<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::System(bytes) => bytes.len(),
            Self::Io(io) => io.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_iomem(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Device memory that must not be read with ordinary loads.
pub trait IoMemory {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `dst.len()` bytes starting at `offset` using I/O-safe accesses.
    /// The caller guarantees `offset + dst.len() <= self.len()`.
    fn copy_from_io(&self, offset: usize, dst: &mut [u8]);
}

/// Temporary whole-object mapping of imported memory.
pub trait ForeignSource {
    /// Map the whole object. `None` if mapping is refused.
    fn vmap(&self) -> Option<ForeignMapping<'_>>;

    /// Release the mapping created by the last successful [`Self::vmap`].
    fn vunmap(&self);
}

/// Scoped foreign mapping; the mapping is released on drop.
pub struct VmapGuard<'a> {
    source: &'a dyn ForeignSource,
    mapping: ForeignMapping<'a>,
}

impl<'a> VmapGuard<'a> {
    pub fn map(source: &'a dyn ForeignSource) -> Option<Self> {
        let mapping = source.vmap()?;
        Some(Self { source, mapping })
    }

    pub fn mapping(&self) -> &ForeignMapping<'a> {
        &self.mapping
    }
}

impl Drop for VmapGuard<'_> {
    fn drop(&mut self) {
        self.source.vunmap();
    }
}
