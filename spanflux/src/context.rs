// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! An immutable, copy-on-write map carried alongside a subscriber chain.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// An immutable, type-keyed map attached to a reactive subscriber chain.
///
/// A `FlowContext` travels with the logical pipeline, independent of which
/// thread executes it. Writing always produces a new map, so multiple
/// concurrent subscriptions sharing a common upstream never observe each
/// other's writes. There is no removal operation; absence is represented by
/// never having set a key.
///
/// Cloning is O(1): the entry spine is shared until the next write.
#[derive(Clone, Default)]
pub struct FlowContext {
    entries: Arc<Vec<Entry>>,
}

#[derive(Clone)]
struct Entry {
    key: TypeId,
    value: Arc<dyn Any + Send + Sync>,
}

impl FlowContext {
    /// Returns an empty context.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new context with `value` added, replacing any previous value
    /// of the same type. `self` is left untouched.
    pub fn with<T: Send + Sync + 'static>(&self, value: T) -> Self {
        let key = TypeId::of::<T>();
        let value: Arc<dyn Any + Send + Sync> = Arc::new(value);
        let mut entries: Vec<Entry> = (*self.entries).clone();
        if let Some(slot) = entries.iter_mut().find(|e| e.key == key) {
            slot.value = value;
        } else {
            entries.push(Entry { key, value });
        }
        Self { entries: Arc::new(entries) }
    }

    /// Gets the value of type `T`, if one was set. Never blocks and never
    /// fails for absent keys.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let key = TypeId::of::<T>();
        self.entries.iter().find(|e| e.key == key).and_then(|e| e.value.clone().downcast::<T>().ok())
    }

    /// Check whether a value of type `T` was set.
    #[inline]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        let key = TypeId::of::<T>();
        self.entries.iter().any(|e| e.key == key)
    }

    /// The number of entries in this context.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether this context has no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for FlowContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowContext").field("len", &self.entries.len()).finish()
    }
}
