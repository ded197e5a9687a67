//! Local context registry
//!
//! Every [`Stack`](crate::Stack) owns a [`LocalContexts`] registry. Commands
//! never capture collaborators directly; they look them up here by key while
//! they run. Only keys are ever stored inside commands, so a restored stack can
//! be rebound to a new environment, such as another locale, by repopulating
//! the registry.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

/// Well-known key of the resource provider
pub const RESOURCES_KEY: &str = "res";

/// Placeholder text used when a caption cannot be resolved
pub const MISSING_CAPTION: &str = "???";

/// Provider of localized strings
pub trait Resources {
    /// Look up the string with the given resource id
    fn get_string(&self, id: u32) -> Option<String>;
}

/// Value-producing callback stored in the registry
pub type ContextFn = Rc<dyn Fn(i64) -> String>;

/// A [`Resources`] implementation backed by an ordered map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringTable {
    items: BTreeMap<u32, String>,
}

impl StringTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, id: u32, text: impl Into<String>) -> Self {
        self.items.insert(id, text.into());
        self
    }

    /// Insert or replace a string
    pub fn insert(&mut self, id: u32, text: impl Into<String>) -> Option<String> {
        self.items.insert(id, text.into())
    }

    /// Number of strings in the table
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Resources for StringTable {
    fn get_string(&self, id: u32) -> Option<String> {
        self.items.get(&id).cloned()
    }
}

impl<T: Into<String>> FromIterator<(u32, T)> for StringTable {
    fn from_iter<I: IntoIterator<Item = (u32, T)>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().map(|(id, s)| (id, s.into())).collect(),
        }
    }
}

/// A typed collaborator stored in the registry
#[derive(Clone)]
pub enum ContextValue {
    /// Localized string provider
    Resources(Rc<dyn Resources>),
    /// Named callback
    Function(ContextFn),
    /// Any other runtime handle (widgets, sibling registries, ...)
    Handle(Rc<dyn Any>),
}

impl ContextValue {
    fn kind(&self) -> &'static str {
        match self {
            ContextValue::Resources(_) => "resources",
            ContextValue::Function(_) => "function",
            ContextValue::Handle(_) => "handle",
        }
    }
}

impl fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextValue::{}", self.kind())
    }
}

/// String-keyed registry of runtime collaborators
///
/// Lookups never fail: a missing key, or a key bound to a value of another
/// kind, yields `None` so callers can degrade gracefully.
#[derive(Default, Clone)]
pub struct LocalContexts {
    entries: HashMap<String, ContextValue>,
}

impl LocalContexts {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value to a key, returning the previous value
    pub fn set(&mut self, key: impl Into<String>, value: ContextValue) -> Option<ContextValue> {
        self.entries.insert(key.into(), value)
    }

    /// Get the value bound to a key
    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.entries.get(key)
    }

    /// Remove a key, returning its value
    pub fn remove(&mut self, key: &str) -> Option<ContextValue> {
        self.entries.remove(key)
    }

    /// Whether a key is bound
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of bound keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bound keys, in no particular order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Remove every binding
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Bind the resource provider under [`RESOURCES_KEY`]
    pub fn set_resources(&mut self, resources: impl Resources + 'static) {
        self.set(RESOURCES_KEY, ContextValue::Resources(Rc::new(resources)));
    }

    /// Resource provider under [`RESOURCES_KEY`]
    pub fn resources(&self) -> Option<&dyn Resources> {
        self.resources_at(RESOURCES_KEY)
    }

    /// Resource provider under an arbitrary key
    pub fn resources_at(&self, key: &str) -> Option<&dyn Resources> {
        match self.get(key)? {
            ContextValue::Resources(res) => Some(res.as_ref()),
            _ => None,
        }
    }

    /// Localized string from the default resource provider
    pub fn string(&self, id: u32) -> Option<String> {
        self.resources()?.get_string(id)
    }

    /// Localized string, or [`MISSING_CAPTION`] when unavailable
    pub fn string_or_placeholder(&self, id: u32) -> String {
        self.string(id).unwrap_or_else(|| MISSING_CAPTION.to_string())
    }

    /// Bind a named callback
    pub fn set_function(&mut self, key: impl Into<String>, f: impl Fn(i64) -> String + 'static) {
        self.set(key, ContextValue::Function(Rc::new(f)));
    }

    /// Named callback
    pub fn function(&self, key: &str) -> Option<&ContextFn> {
        match self.get(key)? {
            ContextValue::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Invoke a named callback if it is bound
    pub fn call(&self, key: &str, arg: i64) -> Option<String> {
        self.function(key).map(|f| f(arg))
    }

    /// Bind a runtime handle
    pub fn set_handle<T: 'static>(&mut self, key: impl Into<String>, handle: Rc<T>) {
        self.set(key, ContextValue::Handle(handle));
    }

    /// Runtime handle of the requested type
    pub fn handle<T: 'static>(&self, key: &str) -> Option<Rc<T>> {
        match self.get(key)? {
            ContextValue::Handle(h) => Rc::clone(h).downcast::<T>().ok(),
            _ => None,
        }
    }
}

impl fmt::Debug for LocalContexts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}
