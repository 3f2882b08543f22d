//! Ordered registry of live objects.
//!
//! Objects are kept in insertion order, which is also draw order: later
//! objects are drawn over earlier ones. Removal moves the last object into the
//! freed position, so order is only stable until something is removed.

use tracing::debug;

use crate::error::{RenderError, RenderResult};
use crate::object::ObjectId;

/// Anything stored in an [`ObjectRegistry`].
pub trait Keyed {
    fn id(&self) -> ObjectId;
}

/// Growable, insertion-ordered collection addressed by [`ObjectId`].
#[derive(Debug)]
pub struct ObjectRegistry<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T: Keyed> ObjectRegistry<T> {
    /// Creates an empty registry with room for `initial_capacity` objects.
    pub fn new(initial_capacity: usize) -> Self {
        let capacity = initial_capacity.max(1);
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `item`, doubling the capacity when full.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::DuplicateObject`] if an object with the same
    /// identity is already registered. The item is dropped in that case.
    pub fn insert(&mut self, item: T) -> RenderResult<()> {
        let id = item.id();
        if self.position(id).is_some() {
            return Err(RenderError::DuplicateObject(id));
        }

        if self.items.len() == self.capacity {
            self.capacity *= 2;
            self.items.reserve_exact(self.capacity - self.items.len());
            debug!("Object registry grown to {}", self.capacity);
        }

        self.items.push(item);
        Ok(())
    }

    /// Index of the object with `id`, searching from the most recent.
    pub fn position(&self, id: ObjectId) -> Option<usize> {
        self.items.iter().rposition(|item| item.id() == id)
    }

    pub fn find(&self, id: ObjectId) -> Option<&T> {
        self.position(id).map(|index| &self.items[index])
    }

    pub fn find_mut(&mut self, id: ObjectId) -> Option<&mut T> {
        self.position(id).map(move |index| &mut self.items[index])
    }

    /// Takes the object out, moving the last object into its place.
    pub fn remove(&mut self, id: ObjectId) -> Option<T> {
        self.position(id).map(|index| self.items.swap_remove(index))
    }

    /// Removes and drops the object with `id`, calling `wait_idle` first.
    ///
    /// Nothing is waited for when `id` is unknown. Returns whether an object
    /// was destroyed.
    pub fn destroy_after<W>(&mut self, id: ObjectId, wait_idle: W) -> RenderResult<bool>
    where
        W: FnOnce() -> RenderResult<()>,
    {
        if self.position(id).is_none() {
            return Ok(false);
        }
        wait_idle()?;
        Ok(self.remove(id).is_some())
    }

    /// Drops every object in insertion order, keeping the capacity.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Objects in draw order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Current logical capacity. Only grows, by doubling.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
