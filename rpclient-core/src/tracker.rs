//! Stack of currently open report items.
//!
//! The top of the stack is the most recently started item that has not been
//! finished yet. It is the implicit parent of the next started item and the
//! implicit target of the next log entry. The bottom slot of an open launch is
//! always [`Slot::Launch`].
//!
//! The tracker is not synchronized. A [`crate::Session`] owns exactly one and
//! mutates it through `&mut self`.

use crate::{Error, Result};

/// One entry of the item stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Root of a launch. Items started on top of it have no parent item.
    Launch,
    /// Item id assigned by the service.
    Item(String),
}

impl Slot {
    /// Item id held by the slot, `None` for the launch root.
    pub fn item_id(&self) -> Option<&str> {
        match self {
            Slot::Launch => None,
            Slot::Item(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Tracker {
    slots: Vec<Slot>,
}

impl Tracker {
    pub fn new() -> Tracker {
        Tracker::default()
    }

    pub fn push(&mut self, slot: Slot) {
        self.slots.push(slot);
    }

    /// Top slot, or `None` when no launch is active.
    pub fn peek(&self) -> Option<&Slot> {
        self.slots.last()
    }

    pub fn pop(&mut self) -> Result<Slot> {
        self.slots.pop().ok_or(Error::EmptyStack)
    }

    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Id of the innermost open item, skipping the launch root.
    pub fn current_item(&self) -> Option<&str> {
        self.peek().and_then(Slot::item_id)
    }
}
