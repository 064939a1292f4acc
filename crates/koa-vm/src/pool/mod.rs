// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Pool allocator for small fixed-size cells.
//!
//! The general structure is pool => page => cell. A pool is a 1 MiB
//! page-aligned region subdivided into 4 KiB pages; every page serves
//! exactly one cell size class (8, 16, ..., 256 bytes) and threads a
//! freelist through its free cells. Requests above the largest class
//! fall through to the system allocator.
//!
//! Every worker thread owns its own [`Allocator`], so allocations in a
//! child never touch the parent's bookkeeping.
//!
//! Allocation failure is fatal: the language has no recovery path for
//! OOM mid-instruction.

#[cfg(test)]
mod pool_test;

use std::alloc::{self, Layout};
use std::collections::HashMap;
use std::ptr::{self, NonNull};

use tracing::trace;

use crate::error::fatal;

/// Backing memory requested per pool.
pub const POOL_REQUEST_SIZE: usize = 1024 * 1024;

/// Size of one page.
pub const PAGE_SIZE: usize = 4096;

/// Largest cell size served from pages.
pub const MAX_CELL_SIZE: usize = 256;

/// Pages per pool.
const PAGES_PER_POOL: usize = POOL_REQUEST_SIZE / PAGE_SIZE;

/// Number of cell size classes (plus the unused class 0 slot).
const NUM_CLASSES: usize = MAX_CELL_SIZE / 8 + 1;

/// A pool must sit empty for this many recycle cycles before its
/// memory is returned to the OS.
const RECYCLE_CYCLE: u32 = 100;

/// Marker for "page not on any free list".
const NO_SLOT: u32 = u32::MAX;

/// Size class index for a request. Class `c` serves cells of `c * 8` bytes.
#[inline]
const fn class_of(size: usize) -> usize {
    let size = if size == 0 { 1 } else { size };
    (size + 7) / 8
}

/// Stable identifier of a page: pool slot plus page index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageId {
    pool: u32,
    page: u32,
}

/// Per-page bookkeeping, kept out of line from the page memory.
struct PageMeta {
    /// Size class currently served, 0 while the page is empty.
    class: u8,
    /// Cells handed out from this page.
    allocated: u16,
    /// Head of the freelist threaded through the page's free cells.
    /// Null means the page is full (or uninitialized).
    free_head: *mut u8,
    /// Index of this page in its class free list, [`NO_SLOT`] if absent.
    free_slot: u32,
}

struct Pool {
    /// 1 MiB of page-aligned backing memory.
    mem: NonNull<u8>,
    pages: Box<[PageMeta]>,
    /// Indices of pages not currently bound to a size class.
    empty: Vec<u32>,
    /// Pages bound to a class.
    used: u32,
    /// Recycle cycles this pool has spent fully empty.
    cycle: u32,
}

impl Pool {
    fn new() -> Self {
        let layout = pool_layout();
        // SAFETY: layout has non-zero size and valid power-of-two alignment.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(mem) = NonNull::new(raw) else {
            fatal("no enough memory.");
        };

        let pages = (0..PAGES_PER_POOL)
            .map(|_| PageMeta {
                class: 0,
                allocated: 0,
                free_head: ptr::null_mut(),
                free_slot: NO_SLOT,
            })
            .collect();

        Self {
            mem,
            pages,
            empty: (0..PAGES_PER_POOL as u32).rev().collect(),
            used: 0,
            cycle: 0,
        }
    }

    #[inline]
    fn page_base(&self, page: u32) -> *mut u8 {
        // SAFETY: page indices never exceed PAGES_PER_POOL.
        unsafe { self.mem.as_ptr().add(page as usize * PAGE_SIZE) }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        // SAFETY: mem was allocated with pool_layout() and not freed before.
        unsafe { alloc::dealloc(self.mem.as_ptr(), pool_layout()) };
    }
}

#[inline]
fn pool_layout() -> Layout {
    // PAGE_SIZE alignment keeps `ptr & !(PAGE_SIZE - 1)` a valid page base.
    match Layout::from_size_align(POOL_REQUEST_SIZE, PAGE_SIZE) {
        Ok(l) => l,
        Err(_) => fatal("bad pool layout."),
    }
}

/// A per-thread allocation context.
///
/// Holds the pool list, the per-class free-page tables and the page
/// hash that decides whether a block came from the pool.
pub struct Allocator {
    pools: Vec<Option<Pool>>,
    free_pages: [Vec<PageId>; NUM_CLASSES],
    /// Page base address -> page identity, for ownership tests on free.
    page_hash: HashMap<usize, PageId>,
    /// Oversized blocks served by the system allocator.
    large: HashMap<usize, Layout>,
}

// An Allocator is only ever used by the thread that owns it; worker
// threads receive a freshly built instance by value.
unsafe impl Send for Allocator {}

impl Allocator {
    /// Create an allocation context with one initial pool.
    #[must_use]
    pub fn new() -> Self {
        let mut allocator = Self {
            pools: Vec::new(),
            free_pages: std::array::from_fn(|_| Vec::new()),
            page_hash: HashMap::new(),
            large: HashMap::new(),
        };
        allocator.pools.push(Some(Pool::new()));
        allocator
    }

    /// Allocate `size` bytes, 8-byte aligned.
    ///
    /// Requests above [`MAX_CELL_SIZE`] go to the system allocator.
    /// Aborts on allocation failure.
    pub fn alloc(&mut self, size: usize) -> *mut u8 {
        if size > MAX_CELL_SIZE {
            return self.alloc_large(size);
        }

        let class = class_of(size);
        let id = match self.free_pages[class].last() {
            Some(&id) => id,
            None => self.bind_empty_page(class),
        };
        self.pop_cell(id)
    }

    /// Allocate `size` zeroed bytes.
    pub fn calloc(&mut self, size: usize) -> *mut u8 {
        let cell = self.alloc(size);
        // SAFETY: `cell` points to at least `size` writable bytes.
        unsafe { ptr::write_bytes(cell, 0, size) };
        cell
    }

    /// Return a block obtained from [`Allocator::alloc`].
    pub fn free(&mut self, block: *mut u8) {
        let page_base = block as usize & !(PAGE_SIZE - 1);
        let Some(&id) = self.page_hash.get(&page_base) else {
            self.free_large(block);
            return;
        };

        let pool_idx = id.pool as usize;
        let was_full;
        {
            let pool = self.pool_mut(pool_idx);
            let meta = &mut pool.pages[id.page as usize];
            was_full = meta.free_head.is_null();
            // SAFETY: `block` is a live cell of this page; the first
            // machine word of a free cell stores the freelist link.
            unsafe { *(block as *mut *mut u8) = meta.free_head };
            meta.free_head = block;
            meta.allocated -= 1;
        }

        if was_full {
            self.list_page(id);
        }

        let emptied = {
            let pool = self.pool_mut(pool_idx);
            pool.pages[id.page as usize].allocated == 0
        };
        if emptied {
            self.unbind_page(id);
        }
    }

    /// Age empty pools and release those empty for longer than the
    /// recycle threshold back to the OS.
    pub fn recycle(&mut self) {
        for slot in &mut self.pools {
            let release = match slot {
                Some(pool) => {
                    if pool.used == 0 {
                        pool.cycle += 1;
                    } else {
                        pool.cycle = 0;
                    }
                    pool.used == 0 && pool.cycle > RECYCLE_CYCLE
                }
                None => false,
            };
            if release {
                trace!("releasing empty pool to the OS");
                *slot = None;
            }
        }
    }

    /// Whether `block` belongs to one of this allocator's pages.
    #[must_use]
    pub fn owns(&self, block: *const u8) -> bool {
        let page_base = block as usize & !(PAGE_SIZE - 1);
        self.page_hash.contains_key(&page_base)
    }

    /// Number of live pools.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.pools.iter().filter(|p| p.is_some()).count()
    }

    fn alloc_large(&mut self, size: usize) -> *mut u8 {
        let Ok(layout) = Layout::from_size_align(size, 16) else {
            fatal("bad allocation layout.");
        };
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc(layout) };
        if raw.is_null() {
            fatal("no enough memory.");
        }
        self.large.insert(raw as usize, layout);
        raw
    }

    fn free_large(&mut self, block: *mut u8) {
        let Some(layout) = self.large.remove(&(block as usize)) else {
            fatal("free of a block this allocator does not own.");
        };
        // SAFETY: `block` was allocated with exactly this layout.
        unsafe { alloc::dealloc(block, layout) };
    }

    #[inline]
    fn pool_mut(&mut self, idx: usize) -> &mut Pool {
        match self.pools[idx].as_mut() {
            Some(pool) => pool,
            None => fatal("page references a released pool."),
        }
    }

    /// Take an empty page from some pool, bind it to `class` and put it
    /// on the class free list.
    fn bind_empty_page(&mut self, class: usize) -> PageId {
        let pool_idx = match self
            .pools
            .iter()
            .position(|p| p.as_ref().is_some_and(|p| !p.empty.is_empty()))
        {
            Some(idx) => idx,
            None => {
                trace!("all pools full, requesting a new pool");
                match self.pools.iter().position(Option::is_none) {
                    Some(idx) => {
                        self.pools[idx] = Some(Pool::new());
                        idx
                    }
                    None => {
                        self.pools.push(Some(Pool::new()));
                        self.pools.len() - 1
                    }
                }
            }
        };

        let pool = self.pool_mut(pool_idx);
        let page = match pool.empty.pop() {
            Some(page) => page,
            None => fatal("selected pool has no empty page."),
        };
        pool.used += 1;
        pool.cycle = 0;

        let cell_size = class * 8;
        let base = pool.page_base(page);
        // Chain all cells of the page into the freelist.
        let cells = PAGE_SIZE / cell_size;
        for i in 0..cells {
            // SAFETY: cell `i` lies fully inside the page.
            unsafe {
                let cell = base.add(i * cell_size);
                let next = if i + 1 < cells {
                    base.add((i + 1) * cell_size)
                } else {
                    ptr::null_mut()
                };
                *(cell as *mut *mut u8) = next;
            }
        }
        let meta = &mut pool.pages[page as usize];
        meta.class = class as u8;
        meta.allocated = 0;
        meta.free_head = base;
        meta.free_slot = NO_SLOT;

        let id = PageId {
            pool: pool_idx as u32,
            page,
        };
        self.page_hash.insert(base as usize, id);
        self.list_page(id);
        id
    }

    /// Pop one cell from a page known to have a free cell.
    fn pop_cell(&mut self, id: PageId) -> *mut u8 {
        let pool = self.pool_mut(id.pool as usize);
        let meta = &mut pool.pages[id.page as usize];
        let cell = meta.free_head;
        if cell.is_null() {
            fatal("no free cell in an empty or used page?");
        }
        // SAFETY: a free cell's first word is its freelist link.
        meta.free_head = unsafe { *(cell as *mut *mut u8) };
        meta.allocated += 1;
        let full = meta.free_head.is_null();
        if full {
            self.unlist_page(id);
        }
        cell
    }

    /// Add a page to its class free list.
    fn list_page(&mut self, id: PageId) {
        let class = {
            let pool = self.pool_mut(id.pool as usize);
            pool.pages[id.page as usize].class as usize
        };
        let slot = self.free_pages[class].len() as u32;
        self.free_pages[class].push(id);
        let pool = self.pool_mut(id.pool as usize);
        pool.pages[id.page as usize].free_slot = slot;
    }

    /// Remove a page from its class free list.
    fn unlist_page(&mut self, id: PageId) {
        let (class, slot) = {
            let pool = self.pool_mut(id.pool as usize);
            let meta = &pool.pages[id.page as usize];
            (meta.class as usize, meta.free_slot)
        };
        if slot == NO_SLOT {
            return;
        }
        self.free_pages[class].swap_remove(slot as usize);
        if let Some(&moved) = self.free_pages[class].get(slot as usize) {
            let pool = self.pool_mut(moved.pool as usize);
            pool.pages[moved.page as usize].free_slot = slot;
        }
        let pool = self.pool_mut(id.pool as usize);
        pool.pages[id.page as usize].free_slot = NO_SLOT;
    }

    /// Return a fully freed page to its pool's empty set.
    fn unbind_page(&mut self, id: PageId) {
        self.unlist_page(id);
        let base = {
            let pool = self.pool_mut(id.pool as usize);
            let base = pool.page_base(id.page);
            let meta = &mut pool.pages[id.page as usize];
            meta.class = 0;
            meta.free_head = ptr::null_mut();
            pool.empty.push(id.page);
            pool.used -= 1;
            if pool.used == 0 {
                pool.cycle = 1;
            }
            base
        };
        self.page_hash.remove(&(base as usize));
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Allocator {
    fn drop(&mut self) {
        // Cells are torn down wholesale with their pools; oversized
        // blocks still need individual release.
        let blocks: Vec<(usize, Layout)> = self.large.drain().collect();
        for (addr, layout) in blocks {
            // SAFETY: each recorded block is live and was allocated
            // with the recorded layout.
            unsafe { alloc::dealloc(addr as *mut u8, layout) };
        }
    }
}
