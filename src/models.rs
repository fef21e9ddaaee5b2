use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::schema::{self, Field, FieldTypeError, FieldValue};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} code `{code}`")]
pub struct UnknownCodeError {
    pub kind: &'static str,
    pub code: String,
}

/// Lifecycle state of a to-do item. Serialized as its three-letter code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "NYS")]
    NotYetStarted,
    #[serde(rename = "INP")]
    InProgress,
    #[serde(rename = "INR")]
    InReview,
    #[serde(rename = "BLK")]
    Blocked,
    #[serde(rename = "CMP")]
    Complete,
    #[serde(rename = "CAN")]
    Cancelled,
    #[serde(rename = "DEF")]
    Deferred,
}

/// Statuses that close an item; entering one stamps `completed_at`.
pub const TERMINAL_STATUSES: [Status; 2] = [Status::Complete, Status::Cancelled];

impl Status {
    pub const ALL: [Status; 7] = [
        Status::NotYetStarted,
        Status::InProgress,
        Status::InReview,
        Status::Blocked,
        Status::Complete,
        Status::Cancelled,
        Status::Deferred,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Status::NotYetStarted => "NYS",
            Status::InProgress => "INP",
            Status::InReview => "INR",
            Status::Blocked => "BLK",
            Status::Complete => "CMP",
            Status::Cancelled => "CAN",
            Status::Deferred => "DEF",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::NotYetStarted => "Not Yet Started",
            Status::InProgress => "In Progress",
            Status::InReview => "In Review",
            Status::Blocked => "Blocked",
            Status::Complete => "Complete",
            Status::Cancelled => "Cancelled",
            Status::Deferred => "Deferred",
        }
    }

    pub fn colour(self) -> &'static str {
        match self {
            Status::NotYetStarted => "grey",
            Status::InProgress => "blue",
            Status::InReview => "amber",
            Status::Blocked => "red",
            Status::Complete => "green",
            Status::Cancelled => "muted",
            Status::Deferred => "purple",
        }
    }

    pub fn is_terminal(self) -> bool {
        TERMINAL_STATUSES.contains(&self)
    }

    /// Terminal check over a raw stored code; unknown codes are not terminal.
    pub fn is_terminal_code(code: &str) -> bool {
        code.parse::<Status>().is_ok_and(Status::is_terminal)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Status {
    type Err = UnknownCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.code() == s)
            .ok_or_else(|| UnknownCodeError {
                kind: "status",
                code: s.to_string(),
            })
    }
}

impl From<Status> for String {
    fn from(value: Status) -> Self {
        value.code().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MED")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "CRIT")]
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Critical,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MED",
            Priority::High => "HIGH",
            Priority::Critical => "CRIT",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Critical => "Critical",
        }
    }

    pub fn colour(self) -> &'static str {
        match self {
            Priority::Low => "slate",
            Priority::Medium => "sky",
            Priority::High => "orange",
            Priority::Critical => "red",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Priority {
    type Err = UnknownCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|priority| priority.code() == s)
            .ok_or_else(|| UnknownCodeError {
                kind: "priority",
                code: s.to_string(),
            })
    }
}

impl From<Priority> for String {
    fn from(value: Priority) -> Self {
        value.code().to_string()
    }
}

/// Plain snapshot of a to-do item. This is the persisted shape.
///
/// `status` and `priority` hold raw codes so that unvalidated input can be
/// carried to `validate()`; use `Status`/`Priority` parsing for typed access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoData {
    pub id: String,
    pub detail: Option<String>,
    pub owner: String,
    pub status: String,
    pub priority: String,
    pub due_at: Option<String>,
    pub tags: Vec<String>,
    pub sort_order: f64,
    pub is_archived: bool,
    pub added_at: String,
    pub amended_at: String,
    pub completed_at: Option<String>,
}

impl TodoData {
    /// Build a snapshot from partial input; absent fields take schema defaults.
    pub fn from_patch(patch: &TodoPatch) -> Self {
        let mut data = Self::blank();
        for spec in schema::SCHEMA.iter() {
            let value = patch.get(spec.field).unwrap_or_else(|| spec.default_value());
            data.store(spec.field, value);
        }
        data
    }

    fn blank() -> Self {
        Self {
            id: String::new(),
            detail: None,
            owner: String::new(),
            status: String::new(),
            priority: String::new(),
            due_at: None,
            tags: Vec::new(),
            sort_order: 0.0,
            is_archived: false,
            added_at: String::new(),
            amended_at: String::new(),
            completed_at: None,
        }
    }

    pub fn get(&self, field: Field) -> FieldValue {
        match field {
            Field::Id => FieldValue::Text(self.id.clone()),
            Field::Detail => self.detail.clone().into(),
            Field::Owner => FieldValue::Text(self.owner.clone()),
            Field::Status => FieldValue::Text(self.status.clone()),
            Field::Priority => FieldValue::Text(self.priority.clone()),
            Field::DueAt => self.due_at.clone().into(),
            Field::Tags => FieldValue::List(self.tags.clone()),
            Field::SortOrder => FieldValue::Number(self.sort_order),
            Field::IsArchived => FieldValue::Bool(self.is_archived),
            Field::AddedAt => FieldValue::Text(self.added_at.clone()),
            Field::AmendedAt => FieldValue::Text(self.amended_at.clone()),
            Field::CompletedAt => self.completed_at.clone().into(),
        }
    }

    /// Write one field. Values arrive pre-checked by `TodoPatch`, so a kind
    /// mismatch degrades to the field's empty value.
    pub(crate) fn store(&mut self, field: Field, value: FieldValue) {
        match field {
            Field::Id => self.id = text(value),
            Field::Detail => self.detail = optional_text(value),
            Field::Owner => self.owner = text(value),
            Field::Status => self.status = text(value),
            Field::Priority => self.priority = text(value),
            Field::DueAt => self.due_at = optional_text(value),
            Field::Tags => {
                self.tags = match value {
                    FieldValue::List(items) => items,
                    _ => Vec::new(),
                }
            }
            Field::SortOrder => self.sort_order = value.as_number().unwrap_or_default(),
            Field::IsArchived => self.is_archived = value.as_bool().unwrap_or_default(),
            Field::AddedAt => self.added_at = text(value),
            Field::AmendedAt => self.amended_at = text(value),
            Field::CompletedAt => self.completed_at = optional_text(value),
        }
    }

    pub fn status(&self) -> Option<Status> {
        self.status.parse().ok()
    }

    pub fn priority(&self) -> Option<Priority> {
        self.priority.parse().ok()
    }

    pub fn is_terminal(&self) -> bool {
        Status::is_terminal_code(&self.status)
    }
}

fn text(value: FieldValue) -> String {
    match value {
        FieldValue::Text(s) => s,
        _ => String::new(),
    }
}

fn optional_text(value: FieldValue) -> Option<String> {
    match value {
        FieldValue::Text(s) => Some(s),
        _ => None,
    }
}

/// Deserialize a present key as `Some`, so an explicit `null` becomes
/// `Some(None)` rather than being confused with an absent key.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Partial record data: construction input and batch updates alike.
///
/// `None` means "not part of this batch". Nullable fields use a nested
/// `Option` so a batch can explicitly clear them. Unknown keys are ignored
/// when deserializing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TodoPatch {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub detail: Option<Option<String>>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub due_at: Option<Option<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub sort_order: Option<f64>,
    #[serde(default)]
    pub is_archived: Option<bool>,
    #[serde(default)]
    pub added_at: Option<String>,
    #[serde(default)]
    pub amended_at: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub completed_at: Option<Option<String>>,
}

impl TodoPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-field patch from a dynamic value.
    pub fn from_field(field: Field, value: impl Into<FieldValue>) -> Result<Self, FieldTypeError> {
        let mut patch = Self::new();
        patch.put(field, value.into())?;
        Ok(patch)
    }

    /// Parse a patch from a JSON object; keys outside the schema are ignored.
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Add one dynamic value to the batch.
    pub fn put(&mut self, field: Field, value: FieldValue) -> Result<(), FieldTypeError> {
        if !schema::spec(field).accepts(&value) {
            return Err(FieldTypeError::new(field, &value));
        }
        match field {
            Field::Id => self.id = Some(text(value)),
            Field::Detail => self.detail = Some(optional_text(value)),
            Field::Owner => self.owner = Some(text(value)),
            Field::Status => self.status = Some(text(value)),
            Field::Priority => self.priority = Some(text(value)),
            Field::DueAt => self.due_at = Some(optional_text(value)),
            Field::Tags => self.tags = value.as_list().map(<[String]>::to_vec),
            Field::SortOrder => self.sort_order = value.as_number(),
            Field::IsArchived => self.is_archived = value.as_bool(),
            Field::AddedAt => self.added_at = Some(text(value)),
            Field::AmendedAt => self.amended_at = Some(text(value)),
            Field::CompletedAt => self.completed_at = Some(optional_text(value)),
        }
        Ok(())
    }

    /// Value carried for `field`, if the field is part of this batch.
    pub fn get(&self, field: Field) -> Option<FieldValue> {
        match field {
            Field::Id => self.id.clone().map(FieldValue::Text),
            Field::Detail => self.detail.clone().map(FieldValue::from),
            Field::Owner => self.owner.clone().map(FieldValue::Text),
            Field::Status => self.status.clone().map(FieldValue::Text),
            Field::Priority => self.priority.clone().map(FieldValue::Text),
            Field::DueAt => self.due_at.clone().map(FieldValue::from),
            Field::Tags => self.tags.clone().map(FieldValue::List),
            Field::SortOrder => self.sort_order.map(FieldValue::Number),
            Field::IsArchived => self.is_archived.map(FieldValue::Bool),
            Field::AddedAt => self.added_at.clone().map(FieldValue::Text),
            Field::AmendedAt => self.amended_at.clone().map(FieldValue::Text),
            Field::CompletedAt => self.completed_at.clone().map(FieldValue::from),
        }
    }

    pub fn contains(&self, field: Field) -> bool {
        match field {
            Field::Id => self.id.is_some(),
            Field::Detail => self.detail.is_some(),
            Field::Owner => self.owner.is_some(),
            Field::Status => self.status.is_some(),
            Field::Priority => self.priority.is_some(),
            Field::DueAt => self.due_at.is_some(),
            Field::Tags => self.tags.is_some(),
            Field::SortOrder => self.sort_order.is_some(),
            Field::IsArchived => self.is_archived.is_some(),
            Field::AddedAt => self.added_at.is_some(),
            Field::AmendedAt => self.amended_at.is_some(),
            Field::CompletedAt => self.completed_at.is_some(),
        }
    }

    /// Fields present in this batch, in schema order.
    pub fn fields(&self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|field| self.contains(*field))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(Some(detail.into()));
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn due_at(mut self, due_at: Option<String>) -> Self {
        self.due_at = Some(due_at);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn sort_order(mut self, sort_order: f64) -> Self {
        self.sort_order = Some(sort_order);
        self
    }

    pub fn archived(mut self, is_archived: bool) -> Self {
        self.is_archived = Some(is_archived);
        self
    }

    pub fn added_at(mut self, added_at: impl Into<String>) -> Self {
        self.added_at = Some(added_at.into());
        self
    }

    pub fn amended_at(mut self, amended_at: impl Into<String>) -> Self {
        self.amended_at = Some(amended_at.into());
        self
    }

    pub fn completed_at(mut self, completed_at: Option<String>) -> Self {
        self.completed_at = Some(completed_at);
        self
    }
}

impl From<TodoData> for TodoPatch {
    fn from(data: TodoData) -> Self {
        Self {
            id: Some(data.id),
            detail: Some(data.detail),
            owner: Some(data.owner),
            status: Some(data.status),
            priority: Some(data.priority),
            due_at: Some(data.due_at),
            tags: Some(data.tags),
            sort_order: Some(data.sort_order),
            is_archived: Some(data.is_archived),
            added_at: Some(data.added_at),
            amended_at: Some(data.amended_at),
            completed_at: Some(data.completed_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_codes_round_trip() {
        for status in Status::ALL {
            assert_eq!(status.code().parse::<Status>(), Ok(status));
        }
        assert!("nys".parse::<Status>().is_err());
    }

    #[test]
    fn only_complete_and_cancelled_are_terminal() {
        let terminal: Vec<Status> = Status::ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![Status::Complete, Status::Cancelled]);
        assert!(!Status::is_terminal_code("INVALID"));
    }

    #[test]
    fn status_serializes_as_code() {
        assert_eq!(serde_json::to_value(Status::InReview).unwrap(), json!("INR"));
        assert_eq!(serde_json::to_value(Priority::Critical).unwrap(), json!("CRIT"));
    }

    #[test]
    fn patch_from_json_ignores_unknown_keys() {
        let patch = TodoPatch::from_json(json!({
            "detail": "Buy milk",
            "colour": "blue",
            "due_at": null
        }))
        .expect("patch should parse");
        assert_eq!(patch.detail, Some(Some("Buy milk".to_string())));
        assert_eq!(patch.due_at, Some(None));
        assert_eq!(patch.fields(), vec![Field::Detail, Field::DueAt]);
    }

    #[test]
    fn patch_put_rejects_wrong_kinds() {
        let err = TodoPatch::from_field(Field::IsArchived, "yes").expect_err("text is not a bool");
        assert_eq!(err.field, Field::IsArchived);
        assert!(TodoPatch::from_field(Field::Owner, FieldValue::Null).is_err());
        assert!(TodoPatch::from_field(Field::DueAt, FieldValue::Null).is_ok());
    }

    #[test]
    fn from_patch_applies_defaults() {
        let data = TodoData::from_patch(&TodoPatch::new().detail("Buy milk"));
        assert_eq!(data.detail.as_deref(), Some("Buy milk"));
        assert_eq!(data.owner, "");
        assert_eq!(data.status, "NYS");
        assert_eq!(data.priority, "MED");
        assert_eq!(data.due_at, None);
        assert!(data.tags.is_empty());
        assert_eq!(data.sort_order, 0.0);
        assert!(!data.is_archived);
        assert!(!data.id.is_empty());
        assert!(data.amended_at >= data.added_at);
        assert_eq!(data.completed_at, None);
    }

    #[test]
    fn snapshot_round_trips_through_patch() {
        let data = TodoData::from_patch(&TodoPatch::new().detail("x").tags(["a", "b"]));
        let copy = TodoData::from_patch(&TodoPatch::from(data.clone()));
        assert_eq!(copy, data);
    }
}
