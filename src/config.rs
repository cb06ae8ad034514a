use std::sync::atomic::{AtomicUsize, Ordering};

/// Default page size in bytes, used when the process never calls
/// [`set_page_size`].
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default buffer-pool capacity, in pages.
pub const DEFAULT_BUFFER_POOL_PAGES: usize = 50;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_PAGE_SIZE);

/// Process-wide page size. Heap files and pages created under different
/// page sizes are not interchangeable, so this should only be changed at
/// process init, before any table is opened.
pub fn page_size() -> usize {
    PAGE_SIZE.load(Ordering::Relaxed)
}

/// Override the process-wide page size. Intended for startup configuration
/// and tests; changing it mid-run invalidates the layout of any already-open
/// heap file.
pub fn set_page_size(size: usize) {
    PAGE_SIZE.store(size, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_4096() {
        assert_eq!(DEFAULT_PAGE_SIZE, 4096);
    }
}
