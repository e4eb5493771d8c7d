//! File handle table for volume backends.
//!
//! Maps [`FileHandle`]s to whatever a backend keeps per open file. Handles
//! are assigned incrementally starting at 1 and are never reused for the
//! lifetime of the table.
//!
//! # Example
//!
//! ```
//! use oxvault_core::HandleTable;
//!
//! let table: HandleTable<String> = HandleTable::new();
//!
//! let h1 = table.insert("/a.txt".to_string());
//! let h2 = table.insert("/b.txt".to_string());
//! assert_ne!(h1, h2);
//!
//! assert_eq!(table.remove(h1), Some("/a.txt".to_string()));
//! assert_eq!(table.len(), 1);
//! ```

use dashmap::DashMap;
use dashmap::mapref::one::{Ref, RefMut};
use std::sync::atomic::{AtomicU64, Ordering};

use super::FileHandle;

/// Thread-safe table mapping handles to open-file state.
#[derive(Debug)]
pub struct HandleTable<V> {
    handles: DashMap<FileHandle, V>,
    /// Next handle value to assign (0 is reserved for "no handle").
    next_id: AtomicU64,
}

impl<V> Default for HandleTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> HandleTable<V> {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Insert an open file and return its handle.
    pub fn insert(&self, value: V) -> FileHandle {
        let handle = FileHandle::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handles.insert(handle, value);
        handle
    }

    pub fn get(&self, handle: FileHandle) -> Option<Ref<'_, FileHandle, V>> {
        self.handles.get(&handle)
    }

    pub fn get_mut(&self, handle: FileHandle) -> Option<RefMut<'_, FileHandle, V>> {
        self.handles.get_mut(&handle)
    }

    /// Remove a handle and return its state.
    pub fn remove(&self, handle: FileHandle) -> Option<V> {
        self.handles.remove(&handle).map(|(_, value)| value)
    }

    pub fn contains(&self, handle: FileHandle) -> bool {
        self.handles.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Drop every open file.
    pub fn clear(&self) {
        self.handles.clear();
    }
}
