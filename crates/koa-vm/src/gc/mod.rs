// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Generational cycle collector.
//!
//! Reference counting alone cannot reclaim cycles, so every container
//! object (VEC, DICT, STRUCT, UNION) registers with a per-thread,
//! three-generation collector on creation and unregisters on
//! destruction. Block exits and the interpreter's opcode tick drive
//! collection: the oldest generation above its threshold is collected,
//! with all younger generations merged in.
//!
//! Collection seeds a scratch count from each member's reference count,
//! subtracts internal edges, resurrects everything transitively
//! reachable from the surviving roots, then tears the rest down by
//! replacing owned container slots with the VOID dummy and dropping the
//! corresponding references.

#[cfg(test)]
mod gc_test;

use tracing::debug;

use crate::heap::Heap;
use crate::object::{self, GC_IN_COLLECT, GC_UNTRACKED, GcStatus, ObjRef};

/// Collection thresholds per generation.
const THRESHOLDS: [usize; 3] = [500, 10, 10];

/// One generation of tracked containers.
pub struct Gen {
    pub items: Vec<ObjRef>,
    pub threshold: usize,
}

/// Per-thread collector state.
pub struct Gc {
    pub gens: [Gen; 3],
    /// Working set of the collection in progress. Entries become `None`
    /// when a member is freed mid-collection.
    collecting: Vec<Option<ObjRef>>,
}

impl Gc {
    #[must_use]
    pub fn new() -> Self {
        Self {
            gens: THRESHOLDS.map(|threshold| Gen {
                items: Vec::new(),
                threshold,
            }),
            collecting: Vec::new(),
        }
    }

    /// Register a newly created trackable object in generation 0.
    pub fn track(&mut self, r: ObjRef) {
        let head = &mut r.obj_mut().head;
        head.gc.gen = 0;
        head.gc.slot = self.gens[0].items.len() as u32;
        head.gc.status = GcStatus::Reachable;
        self.gens[0].items.push(r);
    }

    /// Remove an object from the collector, wherever it currently sits.
    pub fn untrack(&mut self, r: ObjRef) {
        let (gen, slot) = {
            let gc = &r.obj().head.gc;
            (gc.gen, gc.slot as usize)
        };
        match gen {
            GC_UNTRACKED => {}
            GC_IN_COLLECT => {
                self.collecting[slot] = None;
                r.obj_mut().head.gc.gen = GC_UNTRACKED;
            }
            g => {
                let items = &mut self.gens[g as usize].items;
                items.swap_remove(slot);
                if let Some(&moved) = items.get(slot) {
                    moved.obj_mut().head.gc.slot = slot as u32;
                }
                r.obj_mut().head.gc.gen = GC_UNTRACKED;
            }
        }
    }

    /// Total objects currently tracked, across all generations.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.gens.iter().map(|g| g.items.len()).sum()
    }

    /// Whether any generation is above its collection threshold.
    #[must_use]
    pub fn pressure(&self) -> bool {
        self.gens.iter().any(|g| g.items.len() > g.threshold)
    }
}

impl Default for Gc {
    fn default() -> Self {
        Self::new()
    }
}

/// Collection tick: collect the oldest generation above its threshold,
/// if any, merging all younger generations into it.
pub fn collect(heap: &mut Heap) {
    for gen in (0..3).rev() {
        if heap.gc.gens[gen].items.len() > heap.gc.gens[gen].threshold {
            collect_gen(heap, gen);
            break;
        }
    }
}

/// Unconditional full collection over every generation, used at
/// thread teardown.
pub fn collect_all(heap: &mut Heap) {
    collect_gen(heap, 2);
}

fn collect_gen(heap: &mut Heap, gen: usize) {
    let void = heap.void_obj();

    // 1. Merge all younger generations into the one being collected.
    let mut working: Vec<Option<ObjRef>> = Vec::new();
    for g in 0..=gen {
        for r in heap.gc.gens[g].items.drain(..) {
            let head = &mut r.obj_mut().head;
            head.gc.gen = GC_IN_COLLECT;
            head.gc.slot = working.len() as u32;
            head.gc.gc_ref = head.refcnt;
            head.gc.status = GcStatus::Reachable;
            working.push(Some(r));
        }
    }
    let scanned = working.len();
    heap.gc.collecting = working;

    // 2. Subtract internal edges: every reference from one member to
    // another is not an external root.
    for i in 0..heap.gc.collecting.len() {
        let Some(r) = heap.gc.collecting[i] else {
            continue;
        };
        object::traverse(r, void, &mut |child| {
            let head = &mut child.obj_mut().head;
            if head.gc.gen == GC_IN_COLLECT && head.gc.gc_ref > 0 {
                head.gc.gc_ref -= 1;
            }
            false
        });
    }

    // 3. Members still holding external references are roots; resurrect
    // everything transitively reachable from them.
    let mut worklist: Vec<ObjRef> = Vec::new();
    for i in 0..heap.gc.collecting.len() {
        let Some(r) = heap.gc.collecting[i] else {
            continue;
        };
        let head = &mut r.obj_mut().head;
        if head.gc.gc_ref > 0 {
            head.gc.status = GcStatus::Reachable;
            worklist.push(r);
        } else {
            head.gc.status = GcStatus::Unreachable;
        }
    }
    while let Some(r) = worklist.pop() {
        object::traverse(r, void, &mut |child| {
            let head = &mut child.obj_mut().head;
            if head.gc.gen == GC_IN_COLLECT {
                if head.gc.gc_ref <= 0 {
                    head.gc.gc_ref = 1;
                }
                if head.gc.status == GcStatus::Unreachable {
                    head.gc.status = GcStatus::Reachable;
                    worklist.push(child);
                }
            }
            false
        });
    }

    // 4. Tear down the unreachable members: break their outgoing edges
    // by replacing owned slots with the VOID dummy, then drop the
    // references those slots held.
    let mut freed = 0usize;
    for i in 0..heap.gc.collecting.len() {
        let Some(r) = heap.gc.collecting[i] else {
            continue;
        };
        if r.obj().head.gc.status != GcStatus::Unreachable {
            continue;
        }
        freed += 1;
        // Hold the member alive while its edges are cut.
        r.inc_ref();
        let mut children: Vec<ObjRef> = Vec::new();
        object::traverse(r, void, &mut |child| {
            if child.obj().head.gc.gen != GC_UNTRACKED {
                children.push(child);
                return true;
            }
            false
        });
        for child in children {
            heap.unref(child);
        }
        heap.unref(r);
    }

    // 5. Promote survivors to the next older generation.
    let survivors: Vec<ObjRef> = heap.gc.collecting.drain(..).flatten().collect();
    let target = (gen + 1).min(2);
    for r in survivors {
        let head = &mut r.obj_mut().head;
        head.gc.gen = target as u8;
        head.gc.slot = heap.gc.gens[target].items.len() as u32;
        heap.gc.gens[target].items.push(r);
    }

    if scanned > 0 {
        debug!(gen, scanned, freed, "cycle collection");
    }
}
