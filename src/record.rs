//! Single reactive to-do record.
//!
//! A `TodoItem` owns one item's field values and the observers interested in
//! them. Every `set` is one logical mutation: values are written, derived
//! timestamps are maintained, and observers are told about the change before
//! `set` returns.

use log::debug;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::models::{Priority, Status, TodoData, TodoPatch};
use crate::observer::{ObserverList, Subscription};
use crate::schema::{self, FIELD_COUNT, Field, FieldTypeError, FieldValue, Validation};
use crate::utils;

/// Observer of whole-record changes: `(current, previous)`.
pub type RecordObserver = dyn Fn(&TodoData, &TodoData);

/// Observer of a single field: `(new value, previous value)`.
pub type FieldObserver = dyn Fn(&FieldValue, &FieldValue);

/// Fields fixed at creation; `set` leaves them untouched.
const IMMUTABLE_FIELDS: [Field; 2] = [Field::Id, Field::AddedAt];

pub struct TodoItem {
    data: RefCell<TodoData>,
    observers: ObserverList<RecordObserver>,
    /// Indexed by `Field as usize`
    field_observers: [ObserverList<FieldObserver>; FIELD_COUNT],
}

impl TodoItem {
    /// Create a record; fields missing from `input` take schema defaults.
    pub fn new(input: TodoPatch) -> Self {
        Self {
            data: RefCell::new(TodoData::from_patch(&input)),
            observers: ObserverList::new(),
            field_observers: std::array::from_fn(|_| ObserverList::new()),
        }
    }

    pub fn get(&self, field: Field) -> FieldValue {
        self.data.borrow().get(field)
    }

    /// Owned copy of every field.
    pub fn snapshot(&self) -> TodoData {
        self.data.borrow().clone()
    }

    pub fn id(&self) -> String {
        self.data.borrow().id.clone()
    }

    pub fn owner(&self) -> String {
        self.data.borrow().owner.clone()
    }

    /// Raw status code as stored
    pub fn status_code(&self) -> String {
        self.data.borrow().status.clone()
    }

    pub fn status(&self) -> Option<Status> {
        self.data.borrow().status()
    }

    pub fn priority(&self) -> Option<Priority> {
        self.data.borrow().priority()
    }

    pub fn is_terminal(&self) -> bool {
        self.data.borrow().is_terminal()
    }

    pub fn is_archived(&self) -> bool {
        self.data.borrow().is_archived
    }

    pub fn sort_order(&self) -> f64 {
        self.data.borrow().sort_order
    }

    /// Open item whose due date has passed
    pub fn is_overdue(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        let data = self.data.borrow();
        !data.is_terminal()
            && data
                .due_at
                .as_deref()
                .and_then(utils::parse_due)
                .is_some_and(|due| due < now)
    }

    /// Apply a batch of updates as one mutation and notify observers.
    pub fn set(&self, patch: TodoPatch) {
        let (current, previous, touched) = {
            let mut data = self.data.borrow_mut();
            let previous = data.clone();

            let mut touched = patch.fields();
            touched.retain(|field| {
                let immutable = IMMUTABLE_FIELDS.contains(field);
                if immutable {
                    debug!(
                        "event=immutable_field_ignored module=record id={} field={}",
                        previous.id, field
                    );
                }
                !immutable
            });

            for field in &touched {
                if let Some(value) = patch.get(*field) {
                    data.store(*field, value);
                }
            }

            if !patch.contains(Field::AmendedAt) {
                data.amended_at = utils::advance_timestamp(&previous.amended_at);
            }

            if let Some(status) = patch.status.as_deref() {
                let was_terminal = Status::is_terminal_code(&previous.status);
                let is_terminal = Status::is_terminal_code(status);
                if is_terminal && !was_terminal {
                    data.completed_at = Some(utils::now_timestamp());
                } else if was_terminal && !is_terminal {
                    data.completed_at = None;
                }
            }

            (data.clone(), previous, touched)
        };

        debug!(
            "event=record_set module=record id={} fields={}",
            current.id,
            touched
                .iter()
                .map(|field| field.name())
                .collect::<Vec<_>>()
                .join(",")
        );

        self.observers
            .for_each(|observer| observer(&current, &previous));
        for field in &touched {
            let new_value = current.get(*field);
            let old_value = previous.get(*field);
            self.field_observers[*field as usize]
                .for_each(|observer| observer(&new_value, &old_value));
        }
    }

    /// Update one field from a dynamic value.
    pub fn set_field(&self, field: Field, value: impl Into<FieldValue>) -> Result<(), FieldTypeError> {
        let patch = TodoPatch::from_field(field, value)?;
        self.set(patch);
        Ok(())
    }

    pub fn validate(&self) -> Validation {
        schema::validate(&self.data.borrow())
    }

    pub fn on_change<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&TodoData, &TodoData) + 'static,
    {
        self.observers.subscribe(Rc::new(observer))
    }

    pub fn on_field_change<F>(&self, field: Field, observer: F) -> Subscription
    where
        F: Fn(&FieldValue, &FieldValue) + 'static,
    {
        self.field_observers[field as usize].subscribe(Rc::new(observer))
    }

    /// Plain JSON object of all fields, keyed by schema field name.
    pub fn to_json(&self) -> serde_json::Value {
        let data = self.data.borrow();
        let object = Field::ALL
            .into_iter()
            .map(|field| (field.name().to_string(), data.get(field).into()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(object)
    }
}

impl fmt::Debug for TodoItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TodoItem")
            .field("data", &*self.data.borrow())
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::cell::{Cell, RefCell};
    use std::thread::sleep;
    use std::time::Duration;

    fn item(detail: &str) -> TodoItem {
        TodoItem::new(TodoPatch::new().detail(detail))
    }

    #[test]
    fn construction_keeps_supplied_values() {
        let record = TodoItem::new(
            TodoPatch::new()
                .detail("Write report")
                .owner("sam")
                .status(Status::InProgress)
                .priority(Priority::High)
                .tags(["work"])
                .sort_order(3.0),
        );
        assert_eq!(record.get(Field::Detail), FieldValue::from("Write report"));
        assert_eq!(record.get(Field::Owner), FieldValue::from("sam"));
        assert_eq!(record.get(Field::Status), FieldValue::from("INP"));
        assert_eq!(record.get(Field::Priority), FieldValue::from("HIGH"));
        assert_eq!(record.get(Field::Tags), FieldValue::List(vec!["work".into()]));
        assert_eq!(record.get(Field::SortOrder), FieldValue::Number(3.0));
        assert_eq!(record.get(Field::IsArchived), FieldValue::Bool(false));
        assert_eq!(record.get(Field::DueAt), FieldValue::Null);
    }

    #[test]
    fn independent_records_get_distinct_ids() {
        assert_ne!(item("a").id(), item("b").id());
    }

    #[test]
    fn snapshot_is_a_copy() {
        let record = item("original");
        let mut copy = record.snapshot();
        copy.detail = Some("mutated".into());
        assert_eq!(record.get(Field::Detail), FieldValue::from("original"));
    }

    #[test]
    fn missing_detail_is_required() {
        let validation = TodoItem::new(TodoPatch::new()).validate();
        assert!(!validation.is_valid());
        assert_eq!(validation.error(Field::Detail), Some("detail is required"));
    }

    #[test]
    fn invalid_enum_values_are_reported_together() {
        let record = TodoItem::new(TodoPatch::new().detail("test").status("INVALID").priority("ULTRA"));
        let validation = record.validate();
        assert!(!validation.is_valid());
        assert_eq!(validation.error(Field::Status), Some("status has an invalid value"));
        assert_eq!(validation.error(Field::Priority), Some("priority has an invalid value"));
        assert_eq!(validation.errors.len(), 2);
    }

    #[test]
    fn valid_record_has_no_errors() {
        let record = TodoItem::new(TodoPatch::new().detail("Valid task").status("NYS").priority("MED"));
        assert_eq!(record.validate(), Validation::default());
    }

    #[test]
    fn set_advances_amended_at() {
        let record = item("test");
        let before = record.snapshot().amended_at;
        sleep(Duration::from_millis(5));
        record.set(TodoPatch::new().detail("updated"));
        let after = record.snapshot().amended_at;
        assert!(utils::parse_timestamp(&after) > utils::parse_timestamp(&before));
    }

    #[test]
    fn explicit_amended_at_is_kept() {
        let record = item("test");
        record.set(TodoPatch::new().detail("updated").amended_at("2020-01-01T00:00:00.000Z"));
        assert_eq!(record.snapshot().amended_at, "2020-01-01T00:00:00.000Z");
    }

    #[test]
    fn id_and_added_at_are_immutable() {
        let record = item("test");
        let before = record.snapshot();
        record.set(TodoPatch::new().id("other").added_at("2020-01-01T00:00:00.000Z"));
        let after = record.snapshot();
        assert_eq!(after.id, before.id);
        assert_eq!(after.added_at, before.added_at);
    }

    #[rstest]
    #[case("NYS", "CMP", true)]
    #[case("INP", "CAN", true)]
    #[case("BLK", "CMP", true)]
    #[case("CMP", "INP", false)]
    #[case("CAN", "NYS", false)]
    fn status_transitions_maintain_completed_at(
        #[case] from: &str,
        #[case] to: &str,
        #[case] completed: bool,
    ) {
        let record = item("test");
        record.set(TodoPatch::new().status(from));
        record.set(TodoPatch::new().status(to));
        assert_eq!(record.snapshot().completed_at.is_some(), completed);
    }

    #[test]
    fn terminal_to_terminal_keeps_completed_at() {
        let record = item("test");
        record.set(TodoPatch::new().status("CMP"));
        let stamp = record.snapshot().completed_at;
        assert!(stamp.is_some());
        sleep(Duration::from_millis(2));
        record.set(TodoPatch::new().status("CAN"));
        assert_eq!(record.snapshot().completed_at, stamp);
    }

    #[test]
    fn open_to_open_leaves_completed_at_untouched() {
        let record = item("test");
        record.set(TodoPatch::new().status("INP"));
        record.set(TodoPatch::new().status("BLK"));
        assert_eq!(record.snapshot().completed_at, None);
    }

    #[test]
    fn constructed_terminal_record_clears_on_reopen() {
        let record = TodoItem::new(TodoPatch::new().detail("test").status("CMP"));
        record.set(TodoPatch::new().status("INP"));
        assert_eq!(record.get(Field::CompletedAt), FieldValue::Null);
    }

    #[test]
    fn on_change_receives_current_and_previous() {
        let record = item("initial");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in = Rc::clone(&seen);
        let _sub = record.on_change(move |current, previous| {
            seen_in
                .borrow_mut()
                .push((current.detail.clone(), previous.detail.clone()));
        });

        record.set(TodoPatch::new().detail("updated"));

        assert_eq!(
            *seen.borrow(),
            vec![(Some("updated".to_string()), Some("initial".to_string()))]
        );
    }

    #[test]
    fn field_observers_fire_only_for_batch_fields() {
        let record = item("test");
        let detail_fired = Rc::new(Cell::new(0));
        let status_fired = Rc::new(Cell::new(0));
        let d = Rc::clone(&detail_fired);
        let s = Rc::clone(&status_fired);
        let _a = record.on_field_change(Field::Detail, move |_, _| d.set(d.get() + 1));
        let _b = record.on_field_change(Field::Status, move |_, _| s.set(s.get() + 1));

        record.set(TodoPatch::new().detail("new detail"));

        assert_eq!(detail_fired.get(), 1);
        assert_eq!(status_fired.get(), 0);
    }

    #[test]
    fn field_observer_sees_new_and_old_value() {
        let record = item("test");
        let seen = Rc::new(RefCell::new(None));
        let seen_in = Rc::clone(&seen);
        let _sub = record.on_field_change(Field::Status, move |new, old| {
            *seen_in.borrow_mut() = Some((new.clone(), old.clone()));
        });

        record.set_field(Field::Status, Status::Blocked).expect("status is text");

        assert_eq!(
            *seen.borrow(),
            Some((FieldValue::from("BLK"), FieldValue::from("NYS")))
        );
    }

    #[test]
    fn unsubscribe_stops_delivery_and_is_idempotent() {
        let record = item("test");
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));
        let f = Rc::clone(&first);
        let s = Rc::clone(&second);
        let first_sub = record.on_change(move |_, _| f.set(f.get() + 1));
        let _second_sub = record.on_change(move |_, _| s.set(s.get() + 1));

        record.set(TodoPatch::new().owner("a"));
        first_sub.unsubscribe();
        first_sub.unsubscribe();
        record.set(TodoPatch::new().owner("b"));

        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 2);
    }

    #[test]
    fn field_unsubscribe_stops_delivery_and_is_idempotent() {
        let record = item("test");
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));
        let f = Rc::clone(&first);
        let s = Rc::clone(&second);
        let first_sub = record.on_field_change(Field::Owner, move |_, _| f.set(f.get() + 1));
        let second_sub = record.on_field_change(Field::Owner, move |_, _| s.set(s.get() + 1));

        record.set(TodoPatch::new().owner("a"));
        first_sub.unsubscribe();
        first_sub.unsubscribe();
        record.set(TodoPatch::new().owner("b"));

        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 2);
        assert!(!first_sub.is_active());
        assert!(second_sub.is_active());
    }

    #[test]
    fn observers_may_read_the_record() {
        let record = Rc::new(item("test"));
        let weak = Rc::downgrade(&record);
        let seen = Rc::new(RefCell::new(String::new()));
        let seen_in = Rc::clone(&seen);
        let _sub = record.on_change(move |_, _| {
            if let Some(record) = weak.upgrade() {
                *seen_in.borrow_mut() = record.owner();
            }
        });

        record.set(TodoPatch::new().owner("kim"));

        assert_eq!(*seen.borrow(), "kim");
    }

    #[test]
    fn set_field_rejects_mismatched_kind() {
        let record = item("test");
        let err = record
            .set_field(Field::SortOrder, "first")
            .expect_err("text is not a number");
        assert_eq!(err.field, Field::SortOrder);
        assert_eq!(record.get(Field::SortOrder), FieldValue::Number(0.0));
    }

    #[test]
    fn overdue_ignores_closed_items() {
        let record = TodoItem::new(TodoPatch::new().detail("x").due_at(Some("2000-01-01".into())));
        let now = chrono::Utc::now();
        assert!(record.is_overdue(now));
        record.set(TodoPatch::new().status("CMP"));
        assert!(!record.is_overdue(now));
    }

    #[test]
    fn to_json_uses_schema_names() {
        let record = item("json");
        let json = record.to_json();
        for field in Field::ALL {
            assert!(json.get(field.name()).is_some(), "missing {}", field.name());
        }
        assert_eq!(json["detail"], "json");
        assert!(json["completed_at"].is_null());
    }
}
