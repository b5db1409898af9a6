#![deny(unsafe_code)]

//! # Overview
//!
//! Scoped allocation contexts arranged in a tree, with cleanup callbacks that
//! run when a context is freed. Long-running operations create a context per
//! logical scope; everything allocated inside the scope, and every callback
//! registered in it, is released together when the scope ends - normally or
//! on error. This is what makes partial-failure cleanup correct across the
//! streaming pipeline: a driver registers its close/abort action as a free
//! callback and the action runs exactly once no matter how the scope exits.
//!
//! Contexts are addressed by id into a thread-local tree, so parent/child
//! references never dangle. The "current" context is an implicit thread-local
//! cell; [`with_new_context`] and [`with_temp_context`] switch it for the
//! duration of a body and restore it on exit.
//!
//! The tree is single-threaded by design. Each thread owns an independent
//! tree rooted at a `TOP` context that can never be freed.

use std::cell::RefCell;

use types::{Error, Result};

mod tree;

use tree::{ContextState, ContextTree};

thread_local! {
    static TREE: RefCell<ContextTree> = RefCell::new(ContextTree::new());
}

/// Handle to a memory context.
///
/// Copyable id; the context itself lives in the thread-local tree.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MemContext(usize);

/// Handle to a single allocation inside a context.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Alloc {
    context: usize,
    slot: usize,
}

/// Returns the top context, which exists for the life of the thread.
#[must_use]
pub fn top() -> MemContext {
    MemContext(ContextTree::TOP)
}

/// Returns the current context.
#[must_use]
pub fn current() -> MemContext {
    TREE.with(|tree| MemContext(tree.borrow().current()))
}

/// Creates a new context as a child of the current context.
pub fn context_new(name: &str) -> Result<MemContext> {
    if name.is_empty() {
        return Err(Error::assert("context name length must be > 0"));
    }

    TREE.with(|tree| tree.borrow_mut().context_new(name).map(MemContext))
}

/// Switches the current context and returns the previous one.
pub fn switch(context: MemContext) -> Result<MemContext> {
    TREE.with(|tree| tree.borrow_mut().switch(context.0).map(MemContext))
}

/// Returns a context's name.
pub fn name(context: MemContext) -> Result<String> {
    TREE.with(|tree| tree.borrow().name(context.0))
}

/// Registers a callback to run when `context` is freed.
///
/// Callbacks run in registration order, after the context's children have
/// been freed and before its allocations are released. The top context may
/// not carry callbacks.
pub fn on_free(context: MemContext, callback: impl FnOnce() + 'static) -> Result<()> {
    if context.0 == ContextTree::TOP {
        return Err(Error::assert("top context may not have a callback"));
    }

    TREE.with(|tree| tree.borrow_mut().on_free(context.0, Box::new(callback)))
}

/// Frees `context`: descendants bottom-up first, then its callbacks in
/// registration order, then its allocations.
///
/// Freeing the top context, the current context, or a context that contains
/// the current context is a programming error. Re-entry from a callback is a
/// no-op.
pub fn free(context: MemContext) -> Result<()> {
    // Freeing recurses without the tree borrowed so callbacks may call back
    // into the arena.
    let state = TREE.with(|tree| tree.borrow().free_check(context.0))?;

    if state == ContextState::Freeing {
        return Ok(());
    }

    loop {
        let child = TREE.with(|tree| tree.borrow().next_active_child(context.0));

        match child {
            Some(child) => free(MemContext(child))?,
            None => break,
        }
    }

    let callbacks = TREE.with(|tree| tree.borrow_mut().begin_free(context.0));

    for callback in callbacks {
        callback();
    }

    TREE.with(|tree| tree.borrow_mut().finish_free(context.0));
    Ok(())
}

/// Creates a named child context, runs `body` with it current, and restores
/// the previous current context on exit.
///
/// On success the context is kept, owned by its parent; on error it is freed
/// before the error propagates.
pub fn with_new_context<T>(
    name: &str,
    body: impl FnOnce(MemContext) -> Result<T>,
) -> Result<T> {
    let context = context_new(name)?;
    let previous = switch(context)?;

    let result = body(context);
    switch(previous)?;

    match result {
        Ok(value) => Ok(value),
        Err(error) => {
            free(context)?;
            Err(error)
        }
    }
}

/// Runs `body` inside a temporary context that is freed on exit, regardless
/// of outcome.
pub fn with_temp_context<T>(body: impl FnOnce() -> Result<T>) -> Result<T> {
    let context = context_new("temp")?;
    let previous = switch(context)?;

    let result = body();
    switch(previous)?;
    free(context)?;

    result
}

/// Allocates `size` zeroed bytes in the current context.
pub fn alloc(size: usize) -> Result<Alloc> {
    TREE.with(|tree| tree.borrow_mut().alloc(size)).map(|(context, slot)| Alloc { context, slot })
}

/// Grows an allocation to `size`, preserving its content.
pub fn grow(alloc: Alloc, size: usize) -> Result<()> {
    TREE.with(|tree| tree.borrow_mut().grow(alloc.context, alloc.slot, size))
}

/// Frees a single allocation in the current context.
pub fn free_alloc(alloc: Alloc) -> Result<()> {
    TREE.with(|tree| tree.borrow_mut().free_alloc(alloc.context, alloc.slot))
}

/// Reads an allocation's bytes.
pub fn with_bytes<T>(alloc: Alloc, body: impl FnOnce(&[u8]) -> T) -> Result<T> {
    TREE.with(|tree| {
        let tree = tree.borrow();
        Ok(body(tree.bytes(alloc.context, alloc.slot)?))
    })
}

/// Mutates an allocation's bytes.
pub fn with_bytes_mut<T>(alloc: Alloc, body: impl FnOnce(&mut [u8]) -> T) -> Result<T> {
    TREE.with(|tree| {
        let mut tree = tree.borrow_mut();
        Ok(body(tree.bytes_mut(alloc.context, alloc.slot)?))
    })
}
