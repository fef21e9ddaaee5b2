//! Ordered, persisted set of to-do records.
//!
//! The collection owns its records, mirrors them one-to-one into the store
//! under a single `items` key, and republishes record changes as a coarse
//! add/update/remove/clear stream.
//!
//! Every mutating call (including `set` on a tracked record) writes the whole
//! sequence to the store before publishing, and both happen before the call
//! returns. A failed write is reported on the storage error channel; memory
//! keeps the mutation.

use indexmap::IndexMap;
use log::{debug, info, warn};
use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

use crate::models::{Status, TodoData, TodoPatch};
use crate::observer::{ObserverList, Subscription};
use crate::record::TodoItem;
use crate::schema::Field;
use crate::storage::{StoreAdapter, StoreError};

/// Logical store key holding the persisted item sequence
pub const ITEMS_KEY: &str = "items";

/// A record that failed validation; carries the first message per field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid todo: {}", describe(.errors))]
pub struct ValidationError {
    pub errors: BTreeMap<Field, String>,
}

fn describe(errors: &BTreeMap<Field, String>) -> String {
    errors
        .iter()
        .map(|(field, message)| format!("{field}: {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Add,
    Update,
    Remove,
    Clear,
}

#[derive(Debug, Clone)]
pub enum CollectionEvent {
    Add(Rc<TodoItem>),
    Update(Rc<TodoItem>),
    Remove(Rc<TodoItem>),
    Clear,
}

impl CollectionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            CollectionEvent::Add(_) => EventKind::Add,
            CollectionEvent::Update(_) => EventKind::Update,
            CollectionEvent::Remove(_) => EventKind::Remove,
            CollectionEvent::Clear => EventKind::Clear,
        }
    }

    /// Affected record; `None` for `Clear`.
    pub fn item(&self) -> Option<&Rc<TodoItem>> {
        match self {
            CollectionEvent::Add(item) | CollectionEvent::Update(item) | CollectionEvent::Remove(item) => {
                Some(item)
            }
            CollectionEvent::Clear => None,
        }
    }
}

pub type CollectionObserver = dyn Fn(&CollectionEvent);
pub type StorageErrorObserver = dyn Fn(&StoreError);

/// One status or a set of statuses to match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFilter(Vec<Status>);

impl StatusFilter {
    pub fn matches(&self, code: &str) -> bool {
        self.0.iter().any(|status| status.code() == code)
    }
}

impl From<Status> for StatusFilter {
    fn from(status: Status) -> Self {
        StatusFilter(vec![status])
    }
}

impl From<Vec<Status>> for StatusFilter {
    fn from(statuses: Vec<Status>) -> Self {
        StatusFilter(statuses)
    }
}

impl From<&[Status]> for StatusFilter {
    fn from(statuses: &[Status]) -> Self {
        StatusFilter(statuses.to_vec())
    }
}

impl<const N: usize> From<[Status; N]> for StatusFilter {
    fn from(statuses: [Status; N]) -> Self {
        StatusFilter(statuses.to_vec())
    }
}

struct Tracked {
    item: Rc<TodoItem>,
    subscription: Subscription,
}

struct CollectionState {
    store: StoreAdapter,
    items: RefCell<IndexMap<String, Tracked>>,
    observers: ObserverList<CollectionObserver>,
    storage_observers: ObserverList<StorageErrorObserver>,
    last_storage_error: RefCell<Option<String>>,
}

impl CollectionState {
    fn persist(&self) {
        let snapshot: Vec<TodoData> = self
            .items
            .borrow()
            .values()
            .map(|tracked| tracked.item.snapshot())
            .collect();
        let result = self.store.set(ITEMS_KEY, &snapshot);
        self.record_write(result);
    }

    fn record_write(&self, result: Result<(), StoreError>) {
        match result {
            Ok(()) => {
                self.last_storage_error.replace(None);
            }
            Err(err) => {
                warn!(
                    "event=persist_failed module=collection prefix={} error={}",
                    self.store.prefix(),
                    err
                );
                self.last_storage_error.replace(Some(err.to_string()));
                self.storage_observers.for_each(|observer| observer(&err));
            }
        }
    }

    fn publish(&self, event: &CollectionEvent) {
        self.observers.for_each(|observer| observer(event));
    }

    /// Subscribe the collection to `item`: persist and publish on every change.
    fn track(state: &Rc<CollectionState>, item: Rc<TodoItem>) -> Tracked {
        let weak_state = Rc::downgrade(state);
        let weak_item = Rc::downgrade(&item);
        let subscription = item.on_change(move |_, _| {
            let (Some(state), Some(item)) = (weak_state.upgrade(), weak_item.upgrade()) else {
                return;
            };
            state.persist();
            state.publish(&CollectionEvent::Update(item));
        });
        Tracked { item, subscription }
    }
}

/// Cloning yields another handle to the same collection.
#[derive(Clone)]
pub struct TodoCollection {
    state: Rc<CollectionState>,
}

impl TodoCollection {
    /// Load the persisted items, tracking each one like a freshly added item.
    pub fn new(store: StoreAdapter) -> Self {
        let raw = store.get(ITEMS_KEY, serde_json::Value::Array(Vec::new()));
        let state = Rc::new(CollectionState {
            store,
            items: RefCell::new(IndexMap::new()),
            observers: ObserverList::new(),
            storage_observers: ObserverList::new(),
            last_storage_error: RefCell::new(None),
        });

        match raw {
            serde_json::Value::Array(entries) => {
                for (index, entry) in entries.into_iter().enumerate() {
                    let patch = match TodoPatch::from_json(entry) {
                        Ok(patch) => patch,
                        Err(err) => {
                            warn!(
                                "event=load_item_skipped module=collection index={} error={}",
                                index, err
                            );
                            continue;
                        }
                    };
                    let item = Rc::new(TodoItem::new(patch));
                    let id = item.id();
                    let tracked = CollectionState::track(&state, item);
                    let replaced = state.items.borrow_mut().insert(id, tracked);
                    if let Some(replaced) = replaced {
                        replaced.subscription.unsubscribe();
                    }
                }
            }
            other => {
                warn!(
                    "event=load_items_malformed module=collection prefix={} found={}",
                    state.store.prefix(),
                    json_kind(&other)
                );
            }
        }

        info!(
            "event=collection_loaded module=collection prefix={} count={}",
            state.store.prefix(),
            state.items.borrow().len()
        );

        Self { state }
    }

    /// Validate and insert a new record.
    pub fn add(&self, data: TodoPatch) -> Result<Rc<TodoItem>, ValidationError> {
        let item = Rc::new(TodoItem::new(data));
        let id = item.id();

        let mut validation = item.validate();
        if self.state.items.borrow().contains_key(&id) {
            validation
                .errors
                .entry(Field::Id)
                .or_insert_with(|| "id must be unique".to_string());
        }
        if !validation.is_valid() {
            debug!(
                "event=add_rejected module=collection fields={}",
                validation
                    .errors
                    .keys()
                    .map(|field| field.name())
                    .collect::<Vec<_>>()
                    .join(",")
            );
            return Err(ValidationError {
                errors: validation.errors,
            });
        }

        let tracked = CollectionState::track(&self.state, Rc::clone(&item));
        self.state.items.borrow_mut().insert(id.clone(), tracked);
        debug!("event=item_added module=collection id={}", id);

        self.state.persist();
        self.state.publish(&CollectionEvent::Add(Rc::clone(&item)));
        Ok(item)
    }

    /// Remove by id; `false` when no such record exists.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.state.items.borrow_mut().shift_remove(id);
        let Some(tracked) = removed else {
            return false;
        };
        tracked.subscription.unsubscribe();
        debug!("event=item_removed module=collection id={}", id);

        self.state.persist();
        self.state.publish(&CollectionEvent::Remove(tracked.item));
        true
    }

    pub fn get(&self, id: &str) -> Option<Rc<TodoItem>> {
        self.state
            .items
            .borrow()
            .get(id)
            .map(|tracked| Rc::clone(&tracked.item))
    }

    /// All records in insertion order
    pub fn get_all(&self) -> Vec<Rc<TodoItem>> {
        self.state
            .items
            .borrow()
            .values()
            .map(|tracked| Rc::clone(&tracked.item))
            .collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.state.items.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn filter(&self, predicate: impl Fn(&TodoItem) -> bool) -> Vec<Rc<TodoItem>> {
        self.get_all()
            .into_iter()
            .filter(|item| predicate(item))
            .collect()
    }

    pub fn filter_by_status(&self, statuses: impl Into<StatusFilter>) -> Vec<Rc<TodoItem>> {
        let statuses = statuses.into();
        self.filter(|item| statuses.matches(&item.status_code()))
    }

    pub fn filter_by_owner(&self, owner: &str) -> Vec<Rc<TodoItem>> {
        self.filter(|item| item.owner() == owner)
    }

    /// Records in list order: open items first, newest first within each group.
    pub fn sorted_for_display(&self) -> Vec<Rc<TodoItem>> {
        let mut items = self.get_all();
        items.sort_by_cached_key(|item| {
            let data = item.snapshot();
            (data.is_terminal(), Reverse(data.added_at))
        });
        items
    }

    /// Records ordered by `sort_order`, insertion order breaking ties.
    pub fn sorted_by_order(&self) -> Vec<Rc<TodoItem>> {
        let mut items = self.get_all();
        items.sort_by(|a, b| a.sort_order().total_cmp(&b.sort_order()));
        items
    }

    /// One past the largest `sort_order` in use; zero when empty.
    pub fn next_sort_order(&self) -> f64 {
        self.get_all()
            .iter()
            .map(|item| item.sort_order())
            .reduce(f64::max)
            .map(|max| max.floor() + 1.0)
            .unwrap_or(0.0)
    }

    /// Records that are neither terminal nor archived
    pub fn open_count(&self) -> usize {
        self.filter(|item| !item.is_terminal() && !item.is_archived()).len()
    }

    /// Remove every terminal or archived record, one `remove` at a time.
    pub fn clear_archive(&self) -> usize {
        let doomed: Vec<String> = self
            .filter(|item| item.is_terminal() || item.is_archived())
            .iter()
            .map(|item| item.id())
            .collect();
        doomed.iter().filter(|id| self.remove(id)).count()
    }

    /// Drop every record and the persisted sequence.
    pub fn clear(&self) {
        let drained: Vec<Tracked> = self
            .state
            .items
            .borrow_mut()
            .drain(..)
            .map(|(_, tracked)| tracked)
            .collect();
        for tracked in &drained {
            tracked.subscription.unsubscribe();
        }
        info!(
            "event=collection_cleared module=collection prefix={} count={}",
            self.state.store.prefix(),
            drained.len()
        );

        let result = self.state.store.remove(ITEMS_KEY);
        self.state.record_write(result);
        self.state.publish(&CollectionEvent::Clear);
    }

    pub fn on_change<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&CollectionEvent) + 'static,
    {
        self.state.observers.subscribe(Rc::new(observer))
    }

    /// Warning channel for failed store writes.
    pub fn on_storage_error<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&StoreError) + 'static,
    {
        self.state.storage_observers.subscribe(Rc::new(observer))
    }

    /// Message of the most recent write failure, cleared by the next
    /// successful write.
    pub fn last_storage_error(&self) -> Option<String> {
        self.state.last_storage_error.borrow().clone()
    }

    pub fn store(&self) -> &StoreAdapter {
        &self.state.store
    }

    /// Plain snapshots of every record in insertion order.
    pub fn to_json(&self) -> Vec<serde_json::Value> {
        self.get_all().iter().map(|item| item.to_json()).collect()
    }
}

impl fmt::Debug for TodoCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TodoCollection")
            .field("store", &self.state.store)
            .field("len", &self.len())
            .finish()
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySubstrate;
    use std::cell::Cell;

    fn collection() -> TodoCollection {
        let substrate = Rc::new(MemorySubstrate::new());
        TodoCollection::new(StoreAdapter::new(substrate, "todo", 1))
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let todos = collection();
        let first = todos.add(TodoPatch::new().detail("a")).unwrap();
        let err = todos
            .add(TodoPatch::new().detail("b").id(first.id()))
            .expect_err("duplicate id");
        assert_eq!(err.errors.get(&Field::Id).map(String::as_str), Some("id must be unique"));
        assert_eq!(todos.len(), 1);
    }

    #[test]
    fn non_finite_sort_order_is_rejected() {
        let todos = collection();
        for bad in [f64::NAN, f64::INFINITY] {
            let err = todos
                .add(TodoPatch::new().detail("x").sort_order(bad))
                .expect_err("non-finite sort order");
            assert_eq!(
                err.errors.get(&Field::SortOrder).map(String::as_str),
                Some("sort_order has an invalid value")
            );
        }
        assert!(todos.is_empty());
        assert!(!todos.store().has(ITEMS_KEY));
    }

    #[test]
    fn validation_error_lists_fields() {
        let todos = collection();
        let err = todos.add(TodoPatch::new().status("NOPE")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("detail: detail is required"), "{message}");
        assert!(message.contains("status: status has an invalid value"), "{message}");
    }

    #[test]
    fn display_order_puts_open_items_first_newest_first() {
        let todos = collection();
        let old = todos
            .add(TodoPatch::new().detail("old").added_at("2026-01-01T00:00:00.000Z"))
            .unwrap();
        let done = todos
            .add(
                TodoPatch::new()
                    .detail("done")
                    .status("CMP")
                    .added_at("2026-03-01T00:00:00.000Z"),
            )
            .unwrap();
        let new = todos
            .add(TodoPatch::new().detail("new").added_at("2026-02-01T00:00:00.000Z"))
            .unwrap();

        let order: Vec<String> = todos.sorted_for_display().iter().map(|i| i.id()).collect();
        assert_eq!(order, vec![new.id(), old.id(), done.id()]);
    }

    #[test]
    fn sort_order_helpers() {
        let todos = collection();
        assert_eq!(todos.next_sort_order(), 0.0);
        let b = todos.add(TodoPatch::new().detail("b").sort_order(2.0)).unwrap();
        let a = todos.add(TodoPatch::new().detail("a").sort_order(1.0)).unwrap();
        let c = todos.add(TodoPatch::new().detail("c").sort_order(2.0)).unwrap();

        let order: Vec<String> = todos.sorted_by_order().iter().map(|i| i.id()).collect();
        assert_eq!(order, vec![a.id(), b.id(), c.id()]);
        assert_eq!(todos.next_sort_order(), 3.0);
    }

    #[test]
    fn open_count_skips_closed_and_archived() {
        let todos = collection();
        todos.add(TodoPatch::new().detail("open")).unwrap();
        todos.add(TodoPatch::new().detail("done").status("CAN")).unwrap();
        todos.add(TodoPatch::new().detail("shelved").archived(true)).unwrap();
        assert_eq!(todos.open_count(), 1);
    }

    #[test]
    fn observer_may_call_back_into_collection() {
        let todos = collection();
        let seen = Rc::new(Cell::new(0));
        let seen_in = Rc::clone(&seen);
        let handle = todos.clone();
        let _sub = todos.on_change(move |_| seen_in.set(handle.len()));

        let item = todos.add(TodoPatch::new().detail("x")).unwrap();
        assert_eq!(seen.get(), 1);
        item.set(TodoPatch::new().owner("me"));
        assert_eq!(seen.get(), 1);
        todos.remove(&item.id());
        assert_eq!(seen.get(), 0);
    }
}
