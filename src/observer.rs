//! Ordered observer lists with explicit removal tokens.
//!
//! Delivery is synchronous and follows registration order. Observers are
//! snapshotted before delivery, so an observer may unsubscribe itself (or
//! others) while a notification is in flight.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

struct Registry<F: ?Sized> {
    next_id: u64,
    entries: Vec<(u64, Rc<F>)>,
}

trait Detach {
    fn detach(&self, id: u64) -> bool;
    fn contains(&self, id: u64) -> bool;
}

impl<F: ?Sized> Detach for RefCell<Registry<F>> {
    fn detach(&self, id: u64) -> bool {
        let mut registry = self.borrow_mut();
        let before = registry.entries.len();
        registry.entries.retain(|(entry_id, _)| *entry_id != id);
        registry.entries.len() != before
    }

    fn contains(&self, id: u64) -> bool {
        self.borrow().entries.iter().any(|(entry_id, _)| *entry_id == id)
    }
}

pub struct ObserverList<F: ?Sized> {
    registry: Rc<RefCell<Registry<F>>>,
}

impl<F: ?Sized + 'static> ObserverList<F> {
    pub fn new() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub fn subscribe(&self, observer: Rc<F>) -> Subscription {
        let id = {
            let mut registry = self.registry.borrow_mut();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.entries.push((id, observer));
            id
        };
        let registry: Weak<RefCell<Registry<F>>> = Rc::downgrade(&self.registry);
        Subscription { registry, id }
    }

    /// Call `deliver` once per observer registered when delivery starts.
    pub fn for_each(&self, mut deliver: impl FnMut(&F)) {
        let observers: Vec<Rc<F>> = self
            .registry
            .borrow()
            .entries
            .iter()
            .map(|(_, observer)| Rc::clone(observer))
            .collect();
        for observer in &observers {
            deliver(observer);
        }
    }

    pub fn len(&self) -> usize {
        self.registry.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<F: ?Sized + 'static> Default for ObserverList<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> fmt::Debug for ObserverList<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverList")
            .field("observers", &self.registry.borrow().entries.len())
            .finish()
    }
}

/// Removal token for one registered observer.
///
/// Dropping the token leaves the observer registered; call `unsubscribe`.
pub struct Subscription {
    registry: Weak<dyn Detach>,
    id: u64,
}

impl Subscription {
    /// Remove the observer. Further calls are no-ops.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(self.id);
        }
    }

    /// Whether the observer is still registered
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.contains(self.id))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
