// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the pool allocator.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{Allocator, MAX_CELL_SIZE, PAGE_SIZE};

#[test]
fn alloc_basic() {
    let mut a = Allocator::new();
    let p = a.alloc(24);
    assert!(!p.is_null());
    assert_eq!(p as usize % 8, 0);
    assert!(a.owns(p));
    a.free(p);
}

#[test]
fn alloc_distinct_cells() {
    let mut a = Allocator::new();
    let p1 = a.alloc(16);
    let p2 = a.alloc(16);
    let p3 = a.alloc(16);
    assert_ne!(p1, p2);
    assert_ne!(p2, p3);
    a.free(p2);
    // The freed cell is handed out again before a fresh one.
    let p4 = a.alloc(16);
    assert_eq!(p4, p2);
    a.free(p1);
    a.free(p3);
    a.free(p4);
}

#[test]
fn size_classes_are_separate_pages() {
    let mut a = Allocator::new();
    let small = a.alloc(8);
    let big = a.alloc(MAX_CELL_SIZE);
    // One size class per page.
    assert_ne!(
        small as usize & !(PAGE_SIZE - 1),
        big as usize & !(PAGE_SIZE - 1)
    );
    a.free(small);
    a.free(big);
}

#[test]
fn zero_sized_requests_get_a_cell() {
    let mut a = Allocator::new();
    let p = a.alloc(0);
    assert!(a.owns(p));
    a.free(p);
}

#[test]
fn fill_a_page_and_beyond() {
    let mut a = Allocator::new();
    let cells_per_page = PAGE_SIZE / 64;
    let mut blocks = Vec::new();
    for _ in 0..cells_per_page + 1 {
        blocks.push(a.alloc(64));
    }
    // All distinct.
    let mut sorted = blocks.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), blocks.len());
    for b in blocks {
        a.free(b);
    }
}

#[test]
fn large_blocks_fall_through_to_the_system() {
    let mut a = Allocator::new();
    let p = a.alloc(MAX_CELL_SIZE + 1);
    assert!(!p.is_null());
    assert!(!a.owns(p));
    a.free(p);
}

#[test]
fn calloc_zeroes() {
    let mut a = Allocator::new();
    let p = a.alloc(32);
    // Scribble over the cell, free it, and get it back zeroed.
    unsafe { std::ptr::write_bytes(p, 0xa5, 32) };
    a.free(p);
    let q = a.calloc(32);
    assert_eq!(q, p);
    for i in 0..32 {
        assert_eq!(unsafe { *q.add(i) }, 0);
    }
    a.free(q);
}

#[test]
fn grows_past_one_pool() {
    let mut a = Allocator::new();
    assert_eq!(a.pool_count(), 1);
    // 256-byte cells: 16 per page, 256 pages per pool.
    let mut blocks = Vec::new();
    for _ in 0..(16 * 256 + 1) {
        blocks.push(a.alloc(256));
    }
    assert!(a.pool_count() >= 2);
    for b in blocks {
        a.free(b);
    }
}

#[test]
fn recycle_releases_long_empty_pools() {
    let mut a = Allocator::new();
    let mut blocks = Vec::new();
    for _ in 0..(16 * 256 + 1) {
        blocks.push(a.alloc(256));
    }
    for b in blocks {
        a.free(b);
    }
    let before = a.pool_count();
    assert!(before >= 2);
    for _ in 0..200 {
        a.recycle();
    }
    assert!(a.pool_count() < before);
}

#[test]
fn reuse_page_for_another_class() {
    let mut a = Allocator::new();
    // Bind a page to class 8, empty it, then the page can serve 128s.
    let p = a.alloc(8);
    let base = p as usize & !(PAGE_SIZE - 1);
    a.free(p);
    // Page went back to the empty set; next distinct class may land on it.
    let q = a.alloc(128);
    let _ = base;
    assert!(a.owns(q));
    a.free(q);
}
