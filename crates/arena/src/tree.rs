//! Context tree storage.
//!
//! Contexts live in a slot vector addressed by id. A freed context's slot is
//! reused: first by its former parent (the slot id stays in the parent's
//! child list), otherwise through a global free list once the parent itself
//! goes away. Ids therefore never dangle - a stale id addresses a slot whose
//! state is `Free` and every operation checks state first.

use types::{Error, ErrorKind, Result};

/// Context lifecycle state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContextState {
    /// Slot is unused and may be recycled.
    Free,
    /// Context is mid-free: children are gone, callbacks may be running.
    Freeing,
    /// Context is live.
    Active,
}

type Callback = Box<dyn FnOnce()>;

struct Slot {
    state: ContextState,
    name: String,
    parent: usize,
    children: Vec<usize>,
    allocs: Vec<Option<Vec<u8>>>,
    callbacks: Vec<Callback>,
}

impl Slot {
    fn new(name: &str, parent: usize) -> Self {
        Self {
            state: ContextState::Active,
            name: name.to_string(),
            parent,
            children: Vec::new(),
            allocs: Vec::new(),
            callbacks: Vec::new(),
        }
    }
}

pub struct ContextTree {
    slots: Vec<Slot>,
    free_slots: Vec<usize>,
    current: usize,
}

impl ContextTree {
    /// Slot id of the top context.
    pub const TOP: usize = 0;

    pub fn new() -> Self {
        Self {
            slots: vec![Slot::new("TOP", Self::TOP)],
            free_slots: Vec::new(),
            current: Self::TOP,
        }
    }

    pub const fn current(&self) -> usize {
        self.current
    }

    pub fn context_new(&mut self, name: &str) -> Result<usize> {
        let parent = self.current;

        // Reuse a freed child slot of the parent before taking a new one
        let reuse = self.slots[parent]
            .children
            .iter()
            .copied()
            .find(|&child| self.slots[child].state == ContextState::Free);

        let id = match reuse {
            Some(id) => {
                self.slots[id] = Slot::new(name, parent);
                id
            }
            None => match self.free_slots.pop() {
                Some(id) => {
                    self.slots[id] = Slot::new(name, parent);
                    self.slots[parent].children.push(id);
                    id
                }
                None => {
                    let id = self.slots.len();
                    self.slots.push(Slot::new(name, parent));
                    self.slots[parent].children.push(id);
                    id
                }
            },
        };

        tracing::trace!(context = name, id, "context new");
        Ok(id)
    }

    pub fn switch(&mut self, id: usize) -> Result<usize> {
        if self.state(id)? != ContextState::Active {
            return Err(Error::assert("cannot switch to inactive context"));
        }

        let previous = self.current;
        self.current = id;
        Ok(previous)
    }

    pub fn name(&self, id: usize) -> Result<String> {
        if self.state(id)? != ContextState::Active {
            return Err(Error::assert("cannot get name for inactive context"));
        }

        Ok(self.slots[id].name.clone())
    }

    pub fn on_free(&mut self, id: usize, callback: Callback) -> Result<()> {
        if self.state(id)? != ContextState::Active {
            return Err(Error::assert("cannot assign callback to inactive context"));
        }

        self.slots[id].callbacks.push(callback);
        Ok(())
    }

    /// Validates that `id` may be freed and returns its state so the caller
    /// can treat `Freeing` re-entry as a no-op.
    pub fn free_check(&self, id: usize) -> Result<ContextState> {
        let state = self.state(id)?;

        if state == ContextState::Freeing {
            return Ok(state);
        }

        if id == Self::TOP {
            return Err(Error::assert("cannot free top context"));
        }

        if id == self.current {
            return Err(Error::assert(format!(
                "cannot free current context '{}'",
                self.slots[id].name
            )));
        }

        if self.contains(id, self.current) {
            return Err(Error::assert(format!(
                "cannot free context '{}' containing the current context",
                self.slots[id].name
            )));
        }

        if state != ContextState::Active {
            return Err(Error::assert("cannot free inactive context"));
        }

        Ok(state)
    }

    pub fn next_active_child(&self, id: usize) -> Option<usize> {
        self.slots[id]
            .children
            .iter()
            .copied()
            .find(|&child| self.slots[child].state == ContextState::Active)
    }

    /// Marks the context freeing and hands its callbacks to the caller, which
    /// runs them without the tree borrowed.
    pub fn begin_free(&mut self, id: usize) -> Vec<Callback> {
        let slot = &mut self.slots[id];
        slot.state = ContextState::Freeing;
        std::mem::take(&mut slot.callbacks)
    }

    pub fn finish_free(&mut self, id: usize) {
        tracing::trace!(context = %self.slots[id].name, id, "context free");

        // Children are all Free by now; recycle their slots globally since
        // this context's child list is going away
        let children = std::mem::take(&mut self.slots[id].children);
        self.free_slots.extend(children);

        let slot = &mut self.slots[id];
        slot.state = ContextState::Free;
        slot.name.clear();
        slot.allocs.clear();
    }

    pub fn alloc(&mut self, size: usize) -> Result<(usize, usize)> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|_| Error::new(ErrorKind::Memory, format!("unable to allocate {size} bytes")))?;
        bytes.resize(size, 0);

        let slot = &mut self.slots[self.current];
        let index = slot.allocs.iter().position(Option::is_none);

        let index = match index {
            Some(index) => {
                slot.allocs[index] = Some(bytes);
                index
            }
            None => {
                slot.allocs.push(Some(bytes));
                slot.allocs.len() - 1
            }
        };

        Ok((self.current, index))
    }

    pub fn grow(&mut self, context: usize, slot: usize, size: usize) -> Result<()> {
        self.check_alloc_current(context)?;

        let bytes = self.alloc_mut(context, slot)?;

        if size > bytes.len() {
            let additional = size - bytes.len();
            bytes
                .try_reserve_exact(additional)
                .map_err(|_| Error::new(ErrorKind::Memory, format!("unable to reallocate {size} bytes")))?;
        }

        bytes.resize(size, 0);
        Ok(())
    }

    pub fn free_alloc(&mut self, context: usize, slot: usize) -> Result<()> {
        self.check_alloc_current(context)?;

        let allocs = &mut self.slots[context].allocs;

        match allocs.get_mut(slot) {
            Some(entry @ Some(_)) => {
                *entry = None;
                Ok(())
            }
            _ => Err(Error::assert("unable to find allocation")),
        }
    }

    pub fn bytes(&self, context: usize, slot: usize) -> Result<&[u8]> {
        if self.state(context)? == ContextState::Free {
            return Err(Error::assert("allocation context is not active"));
        }

        self.slots[context]
            .allocs
            .get(slot)
            .and_then(Option::as_deref)
            .ok_or_else(|| Error::assert("unable to find allocation"))
    }

    pub fn bytes_mut(&mut self, context: usize, slot: usize) -> Result<&mut [u8]> {
        if self.state(context)? == ContextState::Free {
            return Err(Error::assert("allocation context is not active"));
        }

        self.alloc_mut(context, slot).map(Vec::as_mut_slice)
    }

    fn alloc_mut(&mut self, context: usize, slot: usize) -> Result<&mut Vec<u8>> {
        self.slots[context]
            .allocs
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::assert("unable to find allocation"))
    }

    fn check_alloc_current(&self, context: usize) -> Result<()> {
        if context != self.current {
            return Err(Error::assert(
                "allocation does not belong to the current context",
            ));
        }

        Ok(())
    }

    fn state(&self, id: usize) -> Result<ContextState> {
        self.slots
            .get(id)
            .map(|slot| slot.state)
            .ok_or_else(|| Error::assert("context id out of range"))
    }

    /// True when `ancestor` contains `id` (strictly below it).
    fn contains(&self, ancestor: usize, mut id: usize) -> bool {
        while id != Self::TOP {
            id = self.slots[id].parent;

            if id == ancestor {
                return true;
            }
        }

        false
    }
}
