//! Stack observers

use std::cell::RefCell;
use std::rc::Rc;

/// Observer of stack state transitions
///
/// Callbacks run synchronously on the owner thread, inside the stack call that
/// caused the change, and only for fields whose value actually changed.
pub trait Watcher {
    /// The position index moved
    fn index_changed(&mut self, _idx: usize) {}

    /// The stack entered or left its clean state
    fn clean_changed(&mut self, _clean: bool) {}

    /// Undo availability flipped
    fn can_undo_changed(&mut self, _can_undo: bool) {}

    /// Redo availability flipped
    fn can_redo_changed(&mut self, _can_redo: bool) {}

    /// Caption of the next undo target changed
    fn undo_caption_changed(&mut self, _caption: &str) {}

    /// Caption of the next redo target changed
    fn redo_caption_changed(&mut self, _caption: &str) {}
}

impl<W: Watcher> Watcher for Rc<RefCell<W>> {
    fn index_changed(&mut self, idx: usize) {
        self.borrow_mut().index_changed(idx);
    }

    fn clean_changed(&mut self, clean: bool) {
        self.borrow_mut().clean_changed(clean);
    }

    fn can_undo_changed(&mut self, can_undo: bool) {
        self.borrow_mut().can_undo_changed(can_undo);
    }

    fn can_redo_changed(&mut self, can_redo: bool) {
        self.borrow_mut().can_redo_changed(can_redo);
    }

    fn undo_caption_changed(&mut self, caption: &str) {
        self.borrow_mut().undo_caption_changed(caption);
    }

    fn redo_caption_changed(&mut self, caption: &str) {
        self.borrow_mut().redo_caption_changed(caption);
    }
}

/// Observable fields of a stack at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StackState {
    pub idx: usize,
    pub clean: bool,
    pub can_undo: bool,
    pub can_redo: bool,
    pub undo_caption: String,
    pub redo_caption: String,
}

impl StackState {
    /// Report every field that differs from `before`
    pub fn dispatch(&self, before: &StackState, watcher: &mut dyn Watcher) {
        if self.idx != before.idx {
            watcher.index_changed(self.idx);
        }
        if self.clean != before.clean {
            watcher.clean_changed(self.clean);
        }
        if self.can_undo != before.can_undo {
            watcher.can_undo_changed(self.can_undo);
        }
        if self.can_redo != before.can_redo {
            watcher.can_redo_changed(self.can_redo);
        }
        if self.undo_caption != before.undo_caption {
            watcher.undo_caption_changed(&self.undo_caption);
        }
        if self.redo_caption != before.redo_caption {
            watcher.redo_caption_changed(&self.redo_caption);
        }
    }
}
