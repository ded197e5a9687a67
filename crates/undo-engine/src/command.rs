//! Commands, macros and history entries

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::LocalContexts;
use crate::error::CommandError;

/// A single reversible operation against a subject of type `S`
///
/// Implementations resolve every collaborator they need (strings, callbacks,
/// widget handles) through the [`LocalContexts`] handed to them at run time
/// and must not hold on to it. A collaborator that is missing means the
/// effect is skipped, not that the command fails.
pub trait Command<S> {
    /// Perform the forward mutation
    fn apply(&mut self, subject: &mut S, ctx: &LocalContexts) -> Result<(), CommandError>;

    /// Perform the exact inverse of [`Command::apply`]
    fn revert(&mut self, subject: &mut S, ctx: &LocalContexts) -> Result<(), CommandError>;

    /// Human-readable caption; must not fail when context entries are missing
    fn caption(&self, ctx: &LocalContexts) -> String;

    /// Merge group; `None` never merges
    fn merge_id(&self) -> Option<u32> {
        None
    }

    /// Absorb `other`, which was pushed right after `self`
    ///
    /// Returning `true` discards `other`. Only called when both share the same
    /// merge group.
    fn try_merge_with(&mut self, _other: &Self) -> bool
    where
        Self: Sized,
    {
        false
    }
}

/// Caption that is either literal text or resolved through the resource provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Caption {
    /// Fixed text
    Text(String),
    /// Resource id looked up in the registry's resource provider
    Resource(u32),
}

impl Caption {
    /// Resolve to display text
    pub fn resolve(&self, ctx: &LocalContexts) -> String {
        match self {
            Caption::Text(text) => text.clone(),
            Caption::Resource(id) => ctx.string_or_placeholder(*id),
        }
    }
}

impl From<&str> for Caption {
    fn from(text: &str) -> Self {
        Caption::Text(text.to_string())
    }
}

impl From<String> for Caption {
    fn from(text: String) -> Self {
        Caption::Text(text)
    }
}

impl fmt::Display for Caption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Caption::Text(text) => write!(f, "{}", text),
            Caption::Resource(id) => write!(f, "#{}", id),
        }
    }
}

/// An element of a stack's history: a plain command or a macro of them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entry<C> {
    /// A single command
    Command(C),
    /// A group of entries applied and reverted as one
    Macro(Macro<C>),
}

impl<C> Entry<C> {
    /// Borrow the macro if this entry is one
    pub fn as_macro(&self) -> Option<&Macro<C>> {
        match self {
            Entry::Macro(m) => Some(m),
            Entry::Command(_) => None,
        }
    }

    /// Borrow the command if this entry is one
    pub fn as_command(&self) -> Option<&C> {
        match self {
            Entry::Command(c) => Some(c),
            Entry::Macro(_) => None,
        }
    }

    /// Whether this entry is a macro
    pub fn is_macro(&self) -> bool {
        matches!(self, Entry::Macro(_))
    }
}

impl<S, C: Command<S>> Command<S> for Entry<C> {
    fn apply(&mut self, subject: &mut S, ctx: &LocalContexts) -> Result<(), CommandError> {
        match self {
            Entry::Command(c) => c.apply(subject, ctx),
            Entry::Macro(m) => m.apply(subject, ctx),
        }
    }

    fn revert(&mut self, subject: &mut S, ctx: &LocalContexts) -> Result<(), CommandError> {
        match self {
            Entry::Command(c) => c.revert(subject, ctx),
            Entry::Macro(m) => m.revert(subject, ctx),
        }
    }

    fn caption(&self, ctx: &LocalContexts) -> String {
        match self {
            Entry::Command(c) => Command::<S>::caption(c, ctx),
            Entry::Macro(m) => Command::<S>::caption(m, ctx),
        }
    }

    fn merge_id(&self) -> Option<u32> {
        match self {
            Entry::Command(c) => Command::<S>::merge_id(c),
            Entry::Macro(_) => None,
        }
    }

    fn try_merge_with(&mut self, other: &Self) -> bool {
        match (self, other) {
            (Entry::Command(c), Entry::Command(o)) => Command::<S>::try_merge_with(c, o),
            _ => false,
        }
    }
}

/// Ordered, atomic group of entries
///
/// A macro keeps no reference to the stack that built it, so it can be pushed
/// onto any stack whose subject its commands understand. Macros belong to no
/// merge group and are always recorded as their own entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Macro<C> {
    caption: Caption,
    children: Vec<Entry<C>>,
}

impl<C> Macro<C> {
    /// Create an empty macro
    pub fn new(caption: impl Into<Caption>) -> Self {
        Self {
            caption: caption.into(),
            children: Vec::new(),
        }
    }

    /// Append a command without running it
    pub fn with_command(mut self, command: C) -> Self {
        self.children.push(Entry::Command(command));
        self
    }

    /// Raw caption
    pub fn raw_caption(&self) -> &Caption {
        &self.caption
    }

    /// Child entries in application order
    pub fn children(&self) -> &[Entry<C>] {
        &self.children
    }

    /// Number of direct children
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether the macro has no children
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub(crate) fn push_child(&mut self, entry: Entry<C>) {
        self.children.push(entry);
    }
}

impl<S, C: Command<S>> Command<S> for Macro<C> {
    fn apply(&mut self, subject: &mut S, ctx: &LocalContexts) -> Result<(), CommandError> {
        for child in self.children.iter_mut() {
            child.apply(subject, ctx)?;
        }
        Ok(())
    }

    fn revert(&mut self, subject: &mut S, ctx: &LocalContexts) -> Result<(), CommandError> {
        for child in self.children.iter_mut().rev() {
            child.revert(subject, ctx)?;
        }
        Ok(())
    }

    fn caption(&self, ctx: &LocalContexts) -> String {
        self.caption.resolve(ctx)
    }
}
