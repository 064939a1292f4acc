// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Shared-nothing worker threads.
//!
//! A spawned thread never shares live objects with its parent: the
//! argument vector is deep-copied into a heap built for the child
//! before the OS thread starts, and the target function's code travels
//! as a binary image. The child runs a full interpreter of its own and
//! leaves its return value behind as a serialized blob, which `join`
//! rebuilds in the parent's heap.
//!
//! Cancellation is best-effort: a cancelled thread is detached and its
//! result discarded; no cleanup runs on the cancelled thread's behalf.

#[cfg(test)]
mod thread_test;

use std::collections::HashMap;
use std::rc::Rc;
use std::thread::JoinHandle;

use tracing::debug;

use crate::code::binary::{read_code, write_code, write_metas, ByteReader};
use crate::code::CompoundMeta;
use crate::error::RuntimeError;
use crate::heap::Heap;
use crate::interp::Interp;
use crate::object::{self, copy::deep_copy, ObjRef};

/// Everything a worker needs, built on the parent thread. The heap and
/// the argument objects inside it belong exclusively to the child once
/// the seed moves.
struct WorkerSeed {
    heap: Heap,
    args: ObjRef,
    code_image: Vec<u8>,
}

// The seed is handed to exactly one worker; the parent keeps no handle
// to the heap or the objects inside it.
unsafe impl Send for WorkerSeed {}

/// Handle of one spawned worker.
struct Worker {
    join: Option<JoinHandle<Vec<u8>>>,
    cancelled: bool,
}

/// Per-interpreter registry of spawned workers.
#[derive(Default)]
pub struct ThreadTable {
    next_id: i64,
    workers: HashMap<i64, Worker>,
}

impl ThreadTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 0,
            workers: HashMap::new(),
        }
    }
}

/// Spawn a worker over a deep copy of `args`, returning its id.
pub fn spawn(interp: &mut Interp, func: ObjRef, args: &[ObjRef]) -> Result<i64, RuntimeError> {
    let Some(code) = object::func_code(func) else {
        return Err(RuntimeError::Argument(
            "only a user func can be spawned.".to_string(),
        ));
    };
    if args.len() != code.arg_count() as usize {
        return Err(RuntimeError::Argument(format!(
            "wrong number of arguments, required: {}, passed: {}.",
            code.arg_count(),
            args.len()
        )));
    }

    // Serialize the function code together with the module's compound
    // metadata so the child can resolve every declared type.
    let mut image = Vec::new();
    write_code(&code, &mut image);
    let (structs, unions): (Vec<Rc<CompoundMeta>>, Vec<Rc<CompoundMeta>>) =
        match &interp.global_code {
            Some(global) => (global.struct_metas().to_vec(), global.union_metas().to_vec()),
            None => (Vec::new(), Vec::new()),
        };
    write_metas(&structs, &mut image);
    write_metas(&unions, &mut image);

    // Build the child's heap and copy the arguments into it. This is
    // the secondary-allocator phase: every object the child starts
    // with already lives in the child's allocator.
    let mut child_heap = Heap::new();
    let mut copied = Vec::with_capacity(args.len());
    for &arg in args {
        let c = deep_copy(&mut child_heap, arg)?;
        c.inc_ref();
        copied.push(c);
    }
    let argvec = child_heap.vec_obj(copied);
    argvec.inc_ref();

    let seed = WorkerSeed {
        heap: child_heap,
        args: argvec,
        code_image: image,
    };

    let id = {
        interp.threads.next_id += 1;
        interp.threads.next_id
    };
    debug!(id, func = code.name(), "spawning worker thread");

    let handle = std::thread::spawn(move || worker_main(seed));
    interp.threads.workers.insert(
        id,
        Worker {
            join: Some(handle),
            cancelled: false,
        },
    );
    Ok(id)
}

/// Worker entry: run the function over the copied arguments and leave
/// the serialized return value behind.
fn worker_main(seed: WorkerSeed) -> Vec<u8> {
    let WorkerSeed {
        heap,
        args,
        code_image,
    } = seed;

    let mut interp = Interp::worker(heap);
    let mut reader = ByteReader::new(&code_image);
    let code = match read_code(&mut interp.heap, &mut reader) {
        Ok(mut code) => {
            // The appended module metas make compound tags resolvable.
            if let Ok(structs) = crate::code::binary::read_metas(&mut reader) {
                for m in structs {
                    code.push_meta(m);
                }
            }
            if let Ok(unions) = crate::code::binary::read_metas(&mut reader) {
                for m in unions {
                    code.push_meta(m);
                }
            }
            Rc::new(code)
        }
        Err(_) => return Vec::new(),
    };

    let ret = interp.run_thread(Rc::clone(&code), args);
    let blob = match ret {
        Some(value) => {
            let bytes = object::binary::to_bytes(value);
            interp.heap.unref(value);
            bytes
        }
        None => Vec::new(),
    };
    interp.heap.unref(args);
    blob
}

/// Wait for a worker and rebuild its return value in the parent heap.
pub fn join(interp: &mut Interp, id: i64) -> Result<ObjRef, RuntimeError> {
    let Some(worker) = interp.threads.workers.get_mut(&id) else {
        return Ok(interp.heap.null_obj());
    };
    if worker.cancelled {
        interp.threads.workers.remove(&id);
        return Ok(interp.heap.null_obj());
    }
    let Some(handle) = worker.join.take() else {
        return Ok(interp.heap.null_obj());
    };
    let blob = handle.join().unwrap_or_default();
    interp.threads.workers.remove(&id);
    if blob.is_empty() {
        return Ok(interp.heap.null_obj());
    }
    let mut reader = ByteReader::new(&blob);
    let meta_code = interp.global_code.clone();
    object::binary::read_obj(&mut interp.heap, &mut reader, meta_code.as_deref())
        .map_err(|e| RuntimeError::Type(format!("failed to load thread result: {e}.")))
}

/// Best-effort cancellation: detach the worker and discard whatever it
/// produces. Its allocator is torn down wholesale when the thread
/// finishes on its own.
pub fn cancel(interp: &mut Interp, id: i64) {
    if let Some(worker) = interp.threads.workers.get_mut(&id) {
        worker.cancelled = true;
        if let Some(handle) = worker.join.take() {
            drop(handle);
        }
        debug!(id, "worker thread cancelled");
    }
}
