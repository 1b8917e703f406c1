//! In-memory buffer objects.
//!
//! Stand-ins for driver-owned buffers: the replay binary wraps framebuffer
//! dumps in them and the tests use them to exercise every access path,
//! including non-resident pages, refused mappings and I/O memory.

use std::sync::atomic::{AtomicUsize, Ordering};

use fbtap_core::object::{
    BufferObject, ForeignMapping, ForeignSource, IoMemory, MappedPage, PageSource, PAGE_SIZE,
};

// MARK: - Page store

struct PageStore {
    page_size: usize,
    pages: Vec<Option<Vec<u8>>>,
}

/// Keeps a page counted as mapped until dropped.
struct PageMapping<'a> {
    bytes: &'a [u8],
    live: &'a AtomicUsize,
}

impl AsRef<[u8]> for PageMapping<'_> {
    fn as_ref(&self) -> &[u8] {
        self.bytes
    }
}

impl Drop for PageMapping<'_> {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// MARK: - Imported store

struct ImportStore {
    data: Vec<u8>,
    io_memory: bool,
    refuse: bool,
}

impl IoMemory for ImportStore {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn copy_from_io(&self, offset: usize, dst: &mut [u8]) {
        dst.copy_from_slice(&self.data[offset..offset + dst.len()]);
    }
}

// MARK: - MemoryObject

/// A buffer object held in process memory.
pub struct MemoryObject {
    size: usize,
    paged: Option<PageStore>,
    import: Option<ImportStore>,
    live: AtomicUsize,
}

impl MemoryObject {
    /// Page-backed object holding a copy of `data`.
    pub fn paged(data: &[u8]) -> Self {
        Self::paged_with_page_size(data, PAGE_SIZE)
    }

    pub fn paged_with_page_size(data: &[u8], page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let pages = data.chunks(page_size).map(|c| Some(c.to_vec())).collect();
        Self {
            size: data.len(),
            paged: Some(PageStore { page_size, pages }),
            import: None,
            live: AtomicUsize::new(0),
        }
    }

    /// Object importing another device's memory, mapped as system memory.
    pub fn imported(data: Vec<u8>) -> Self {
        Self::import_only(data, false)
    }

    /// Object importing another device's memory, mapped as I/O memory.
    pub fn imported_iomem(data: Vec<u8>) -> Self {
        Self::import_only(data, true)
    }

    fn import_only(data: Vec<u8>, io_memory: bool) -> Self {
        Self {
            size: data.len(),
            paged: None,
            import: Some(ImportStore { data, io_memory, refuse: false }),
            live: AtomicUsize::new(0),
        }
    }

    /// Also expose `data` through a foreign mapping.
    pub fn with_import(mut self, data: Vec<u8>, io_memory: bool) -> Self {
        self.import = Some(ImportStore { data, io_memory, refuse: false });
        self
    }

    /// Make page `index` non-resident.
    pub fn with_missing_page(mut self, index: usize) -> Self {
        if let Some(page) = self.paged.as_mut().and_then(|p| p.pages.get_mut(index)) {
            *page = None;
        }
        self
    }

    /// Report a size different from the bytes actually held.
    pub fn with_reported_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Make every foreign mapping attempt fail.
    pub fn refuse_mapping(mut self) -> Self {
        if let Some(import) = self.import.as_mut() {
            import.refuse = true;
        }
        self
    }

    /// Pages and foreign mappings currently held open.
    pub fn live_mappings(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl BufferObject for MemoryObject {
    fn size(&self) -> usize {
        self.size
    }

    fn pages(&self) -> Option<&dyn PageSource> {
        self.paged.as_ref().map(|_| self as &dyn PageSource)
    }

    fn foreign(&self) -> Option<&dyn ForeignSource> {
        self.import.as_ref().map(|_| self as &dyn ForeignSource)
    }
}

impl PageSource for MemoryObject {
    fn page_count(&self) -> usize {
        self.paged.as_ref().map_or(0, |p| p.pages.len())
    }

    fn page_size(&self) -> usize {
        self.paged.as_ref().map_or(PAGE_SIZE, |p| p.page_size)
    }

    fn map_page(&self, index: usize) -> Option<MappedPage<'_>> {
        let bytes = self.paged.as_ref()?.pages.get(index)?.as_deref()?;
        self.live.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(PageMapping { bytes, live: &self.live }))
    }
}

impl ForeignSource for MemoryObject {
    fn vmap(&self) -> Option<ForeignMapping<'_>> {
        let import = self.import.as_ref()?;
        if import.refuse {
            return None;
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        if import.io_memory {
            Some(ForeignMapping::Io(import))
        } else {
            Some(ForeignMapping::System(&import.data))
        }
    }

    fn vunmap(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
