//! Undo stack and position state machine

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::{Caption, Command, Entry, Macro};
use crate::context::LocalContexts;
use crate::error::UndoError;
use crate::watcher::{StackState, Watcher};
use crate::Result;

/// Configuration for a [`Stack`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    /// Maximum number of top-level entries kept; 0 means unlimited
    pub undo_limit: usize,
    /// Whether consecutive commands of the same merge group are coalesced
    pub merge_enabled: bool,
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfig {
            undo_limit: 0,
            merge_enabled: true,
        }
    }
}

/// History of reversible commands applied to a subject
///
/// Entries `[0, idx)` are applied to the subject, entries `[idx, len)` are
/// undone and can be redone. The registry returned by
/// [`Stack::contexts_mut`] is handed to every command as it runs.
pub struct Stack<S, C> {
    subject: S,
    entries: Vec<Entry<C>>,
    idx: usize,
    clean_idx: Option<usize>,
    contexts: LocalContexts,
    watcher: Option<Box<dyn Watcher>>,
    open_macros: Vec<Macro<C>>,
    config: StackConfig,
}

impl<S, C> Stack<S, C> {
    /// Create an empty stack around a subject
    pub fn new(subject: S) -> Self {
        Self::with_config(subject, StackConfig::default())
    }

    /// Create an empty stack with custom configuration
    pub fn with_config(subject: S, config: StackConfig) -> Self {
        Stack {
            subject,
            entries: Vec::new(),
            idx: 0,
            clean_idx: Some(0),
            contexts: LocalContexts::new(),
            watcher: None,
            open_macros: Vec::new(),
            config,
        }
    }

    pub(crate) fn from_parts(
        subject: S,
        entries: Vec<Entry<C>>,
        idx: usize,
        clean_idx: Option<usize>,
        config: StackConfig,
    ) -> Self {
        let mut stack = Self::with_config(subject, config);
        stack.entries = entries;
        stack.idx = idx;
        stack.clean_idx = clean_idx;
        stack
    }

    /// The subject
    pub fn subject(&self) -> &S {
        &self.subject
    }

    /// Mutable access to the subject, bypassing history
    pub fn subject_mut(&mut self) -> &mut S {
        &mut self.subject
    }

    /// Consume the stack and return its subject
    pub fn into_subject(self) -> S {
        self.subject
    }

    /// Local context registry consulted by commands
    pub fn contexts(&self) -> &LocalContexts {
        &self.contexts
    }

    /// Mutable local context registry
    pub fn contexts_mut(&mut self) -> &mut LocalContexts {
        &mut self.contexts
    }

    /// Install the watcher, replacing any previous one
    pub fn set_watcher(&mut self, watcher: impl Watcher + 'static) {
        self.watcher = Some(Box::new(watcher));
    }

    /// Remove and return the watcher
    pub fn take_watcher(&mut self) -> Option<Box<dyn Watcher>> {
        self.watcher.take()
    }

    /// Current configuration
    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Position index
    pub fn idx(&self) -> usize {
        self.idx
    }

    /// Number of top-level entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no top-level entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        self.idx > 0
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        self.idx < self.entries.len()
    }

    /// Whether the subject is at the last saved position
    pub fn is_clean(&self) -> bool {
        self.clean_idx == Some(self.idx)
    }

    /// Last saved position, `None` once it has been discarded
    pub fn clean_idx(&self) -> Option<usize> {
        self.clean_idx
    }

    /// Top-level entries
    pub fn entries(&self) -> &[Entry<C>] {
        &self.entries
    }

    /// Top-level entry at a position
    pub fn entry(&self, i: usize) -> Option<&Entry<C>> {
        self.entries.get(i)
    }

    /// The `n`-th top-level macro
    pub fn macro_at(&self, n: usize) -> Option<&Macro<C>> {
        self.entries.iter().filter_map(Entry::as_macro).nth(n)
    }

    /// Number of top-level macros
    pub fn macro_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_macro()).count()
    }

    /// Whether a macro is being built
    pub fn is_macro_open(&self) -> bool {
        !self.open_macros.is_empty()
    }

    /// Nesting depth of open macros
    pub fn macro_depth(&self) -> usize {
        self.open_macros.len()
    }

    /// Start building a macro; following pushes become its children
    pub fn begin_macro(&mut self, caption: impl Into<Caption>) {
        self.open_macros.push(Macro::new(caption));
        debug!(depth = self.open_macros.len(), "macro opened");
    }

    fn ensure_no_open_macro(&self, op: &'static str) -> Result<()> {
        if self.is_macro_open() {
            return Err(UndoError::MacroInProgress(op));
        }
        Ok(())
    }

    fn drop_oldest(&mut self) {
        let limit = self.config.undo_limit;
        if limit == 0 || self.entries.len() <= limit {
            return;
        }
        // Undone entries stay available for redo
        let excess = (self.entries.len() - limit).min(self.idx);
        if excess == 0 {
            return;
        }
        self.entries.drain(..excess);
        self.idx = self.idx.saturating_sub(excess);
        self.clean_idx = self.clean_idx.and_then(|c| c.checked_sub(excess));
        debug!(dropped = excess, limit, "undo limit reached");
    }
}

impl<S, C: Command<S>> Stack<S, C> {
    fn state(&self) -> Option<StackState> {
        self.watcher.as_ref()?;
        Some(StackState {
            idx: self.idx,
            clean: self.is_clean(),
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
            undo_caption: self.undo_caption(),
            redo_caption: self.redo_caption(),
        })
    }

    fn notify(&mut self, before: Option<StackState>) {
        let (Some(before), Some(after)) = (before, self.state()) else {
            return;
        };
        if let Some(watcher) = self.watcher.as_mut() {
            after.dispatch(&before, &mut **watcher);
        }
    }

    /// Apply a command and record it
    ///
    /// While a macro is open the command becomes a child of the innermost one.
    pub fn push(&mut self, command: C) -> Result<()> {
        self.push_entry(Entry::Command(command))
    }

    /// Replay a macro (built here or on another stack) and record it
    pub fn push_macro(&mut self, m: Macro<C>) -> Result<()> {
        self.push_entry(Entry::Macro(m))
    }

    /// Apply an entry and record it
    pub fn push_entry(&mut self, mut entry: Entry<C>) -> Result<()> {
        entry
            .apply(&mut self.subject, &self.contexts)
            .map_err(UndoError::Command)?;

        if let Some(open) = self.open_macros.last_mut() {
            open.push_child(entry);
            return Ok(());
        }

        self.record(entry);
        Ok(())
    }

    /// Close the innermost open macro
    ///
    /// Its children already ran as they were pushed; nothing is applied again.
    pub fn end_macro(&mut self) -> Result<()> {
        let finished = self
            .open_macros
            .pop()
            .ok_or_else(|| UndoError::unbalanced_macro("end_macro without begin_macro"))?;
        debug!(
            depth = self.open_macros.len(),
            children = finished.len(),
            "macro closed"
        );

        match self.open_macros.last_mut() {
            Some(outer) => outer.push_child(Entry::Macro(finished)),
            None => self.record(Entry::Macro(finished)),
        }
        Ok(())
    }

    /// Truncate the redo tail, then merge or append an already applied entry
    fn record(&mut self, entry: Entry<C>) {
        let before = self.state();

        if self.idx < self.entries.len() {
            if self.clean_idx.is_some_and(|c| c > self.idx) {
                self.clean_idx = None;
            }
            self.entries.truncate(self.idx);
        }

        if self.try_merge(&entry) {
            debug!(idx = self.idx, len = self.entries.len(), "entry merged");
            self.notify(before);
            return;
        }

        self.entries.push(entry);
        self.idx += 1;
        self.drop_oldest();
        debug!(idx = self.idx, len = self.entries.len(), "entry pushed");
        self.notify(before);
    }

    fn try_merge(&mut self, entry: &Entry<C>) -> bool {
        if !self.config.merge_enabled || self.idx == 0 || self.is_clean() {
            return false;
        }
        let Some(id) = Command::<S>::merge_id(entry) else {
            return false;
        };
        let prev = &mut self.entries[self.idx - 1];
        Command::<S>::merge_id(&*prev) == Some(id) && Command::<S>::try_merge_with(prev, entry)
    }

    /// Revert the entry before the position index
    ///
    /// A no-op when there is nothing to undo. A failing command leaves the
    /// index unchanged.
    pub fn undo(&mut self) -> Result<()> {
        self.ensure_no_open_macro("undo")?;
        if !self.can_undo() {
            return Ok(());
        }
        let before = self.state();
        self.entries[self.idx - 1]
            .revert(&mut self.subject, &self.contexts)
            .map_err(UndoError::Command)?;
        self.idx -= 1;
        debug!(idx = self.idx, len = self.entries.len(), "undo");
        self.notify(before);
        Ok(())
    }

    /// Re-apply the entry at the position index
    pub fn redo(&mut self) -> Result<()> {
        self.ensure_no_open_macro("redo")?;
        if !self.can_redo() {
            return Ok(());
        }
        let before = self.state();
        self.entries[self.idx]
            .apply(&mut self.subject, &self.contexts)
            .map_err(UndoError::Command)?;
        self.idx += 1;
        debug!(idx = self.idx, len = self.entries.len(), "redo");
        self.notify(before);
        Ok(())
    }

    /// Undo or redo until the position index reaches `target` (clamped to `len`)
    pub fn set_index(&mut self, target: usize) -> Result<()> {
        self.ensure_no_open_macro("set index")?;
        let target = target.min(self.entries.len());
        while self.idx > target {
            self.undo()?;
        }
        while self.idx < target {
            self.redo()?;
        }
        Ok(())
    }

    /// Mark the current position as saved
    pub fn set_clean(&mut self) -> Result<()> {
        self.ensure_no_open_macro("set clean")?;
        let before = self.state();
        self.clean_idx = Some(self.idx);
        self.notify(before);
        Ok(())
    }

    /// Drop all history; the subject keeps its current state
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_no_open_macro("clear")?;
        let before = self.state();
        self.entries.clear();
        self.idx = 0;
        self.clean_idx = Some(0);
        debug!("stack cleared");
        self.notify(before);
        Ok(())
    }

    /// Turn merging of consecutive same-group commands on or off
    pub fn set_merge_enabled(&mut self, enabled: bool) {
        self.config.merge_enabled = enabled;
    }

    /// Change the undo limit, dropping the oldest entries if needed
    pub fn set_undo_limit(&mut self, limit: usize) {
        let before = self.state();
        self.config.undo_limit = limit;
        self.drop_oldest();
        self.notify(before);
    }

    /// Caption of the entry at a position
    pub fn caption_at(&self, i: usize) -> Option<String> {
        self.entries
            .get(i)
            .map(|e| Command::<S>::caption(e, &self.contexts))
    }

    /// Caption of the entry the next undo would revert, or empty
    pub fn undo_caption(&self) -> String {
        self.idx
            .checked_sub(1)
            .and_then(|i| self.caption_at(i))
            .unwrap_or_default()
    }

    /// Caption of the entry the next redo would apply, or empty
    pub fn redo_caption(&self) -> String {
        self.caption_at(self.idx).unwrap_or_default()
    }
}

impl<S: Default, C> Default for Stack<S, C> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S: std::fmt::Debug, C: std::fmt::Debug> std::fmt::Debug for Stack<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("subject", &self.subject)
            .field("entries", &self.entries)
            .field("idx", &self.idx)
            .field("clean_idx", &self.clean_idx)
            .field("contexts", &self.contexts)
            .field("macro_depth", &self.open_macros.len())
            .field("config", &self.config)
            .finish()
    }
}
