//! Static field table for to-do records.
//!
//! The table is the single description of every record field: its kind,
//! whether it is required, how its default is produced and which rules a
//! value must satisfy. Records consult it for construction defaults and for
//! validation; the presentation side can enumerate it for labels.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::models::{Priority, Status, TodoData};
use crate::utils;

/// Every field of a to-do record, in schema order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Id,
    Detail,
    Owner,
    Status,
    Priority,
    DueAt,
    Tags,
    SortOrder,
    IsArchived,
    AddedAt,
    AmendedAt,
    CompletedAt,
}

pub const FIELD_COUNT: usize = 12;

impl Field {
    pub const ALL: [Field; FIELD_COUNT] = [
        Field::Id,
        Field::Detail,
        Field::Owner,
        Field::Status,
        Field::Priority,
        Field::DueAt,
        Field::Tags,
        Field::SortOrder,
        Field::IsArchived,
        Field::AddedAt,
        Field::AmendedAt,
        Field::CompletedAt,
    ];

    /// Serialized field name
    pub fn name(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Detail => "detail",
            Field::Owner => "owner",
            Field::Status => "status",
            Field::Priority => "priority",
            Field::DueAt => "due_at",
            Field::Tags => "tags",
            Field::SortOrder => "sort_order",
            Field::IsArchived => "is_archived",
            Field::AddedAt => "added_at",
            Field::AmendedAt => "amended_at",
            Field::CompletedAt => "completed_at",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown field `{0}`")]
pub struct UnknownFieldError(pub String);

impl FromStr for Field {
    type Err = UnknownFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|field| field.name() == s)
            .ok_or_else(|| UnknownFieldError(s.to_string()))
    }
}

/// Runtime type tag of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Bool,
    List,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Bool => "boolean",
            FieldKind::List => "list",
        })
    }
}

/// A single field value crossing the dynamic boundary (field getters,
/// per-field observers, single-field updates).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Text(String),
    Number(f64),
    Bool(bool),
    List(Vec<String>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Null or the empty string; what a required field may not hold.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Kind of the carried value; `None` for null.
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            FieldValue::Null => None,
            FieldValue::Text(_) => Some(FieldKind::Text),
            FieldValue::Number(_) => Some(FieldKind::Number),
            FieldValue::Bool(_) => Some(FieldKind::Bool),
            FieldValue::List(_) => Some(FieldKind::List),
        }
    }

    fn describe(&self) -> String {
        self.kind()
            .map(|kind| kind.to_string())
            .unwrap_or_else(|| "null".to_string())
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map(FieldValue::Text).unwrap_or(FieldValue::Null)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::List(value)
    }
}

impl From<Status> for FieldValue {
    fn from(value: Status) -> Self {
        FieldValue::Text(value.code().to_string())
    }
}

impl From<Priority> for FieldValue {
    fn from(value: Priority) -> Self {
        FieldValue::Text(value.code().to_string())
    }
}

impl From<FieldValue> for serde_json::Value {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Text(s) => serde_json::Value::String(s),
            FieldValue::Number(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Bool(b) => serde_json::Value::Bool(b),
            FieldValue::List(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::String).collect())
            }
        }
    }
}

/// A value whose kind does not fit the field it was aimed at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} expects {expected}, got {found}")]
pub struct FieldTypeError {
    pub field: Field,
    pub expected: FieldKind,
    pub found: String,
}

impl FieldTypeError {
    pub(crate) fn new(field: Field, value: &FieldValue) -> Self {
        Self {
            field,
            expected: spec(field).kind,
            found: value.describe(),
        }
    }
}

/// How a field's default is produced for a new record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    Absent,
    Text(&'static str),
    Number(f64),
    Bool(bool),
    EmptyList,
    /// Fresh identifier per record
    NewId,
    /// Creation time per record
    Now,
}

impl DefaultValue {
    pub fn produce(&self) -> FieldValue {
        match self {
            DefaultValue::Absent => FieldValue::Null,
            DefaultValue::Text(s) => FieldValue::Text((*s).to_string()),
            DefaultValue::Number(n) => FieldValue::Number(*n),
            DefaultValue::Bool(b) => FieldValue::Bool(*b),
            DefaultValue::EmptyList => FieldValue::List(Vec::new()),
            DefaultValue::NewId => FieldValue::Text(utils::generate_id()),
            DefaultValue::Now => FieldValue::Text(utils::now_timestamp()),
        }
    }
}

pub type Predicate = fn(&FieldValue) -> bool;

/// One row of the schema table
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub field: Field,
    pub kind: FieldKind,
    /// Whether the field may hold null
    pub nullable: bool,
    pub required: bool,
    pub default: DefaultValue,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub predicate: Option<Predicate>,
    pub label: &'static str,
}

pub const DETAIL_MAX_LEN: usize = 500;

pub static SCHEMA: [FieldSpec; FIELD_COUNT] = [
    FieldSpec {
        field: Field::Id,
        kind: FieldKind::Text,
        nullable: false,
        required: true,
        default: DefaultValue::NewId,
        min_len: None,
        max_len: None,
        predicate: None,
        label: "ID",
    },
    FieldSpec {
        field: Field::Detail,
        kind: FieldKind::Text,
        nullable: true,
        required: true,
        default: DefaultValue::Absent,
        min_len: Some(1),
        max_len: Some(DETAIL_MAX_LEN),
        predicate: Some(valid_detail),
        label: "Detail",
    },
    FieldSpec {
        field: Field::Owner,
        kind: FieldKind::Text,
        nullable: false,
        required: false,
        default: DefaultValue::Text(""),
        min_len: None,
        max_len: None,
        predicate: None,
        label: "Owner",
    },
    FieldSpec {
        field: Field::Status,
        kind: FieldKind::Text,
        nullable: false,
        required: true,
        default: DefaultValue::Text("NYS"),
        min_len: None,
        max_len: None,
        predicate: Some(valid_status),
        label: "Status",
    },
    FieldSpec {
        field: Field::Priority,
        kind: FieldKind::Text,
        nullable: false,
        required: false,
        default: DefaultValue::Text("MED"),
        min_len: None,
        max_len: None,
        predicate: Some(valid_priority),
        label: "Priority",
    },
    FieldSpec {
        field: Field::DueAt,
        kind: FieldKind::Text,
        nullable: true,
        required: false,
        default: DefaultValue::Absent,
        min_len: None,
        max_len: None,
        predicate: Some(valid_due),
        label: "Due",
    },
    FieldSpec {
        field: Field::Tags,
        kind: FieldKind::List,
        nullable: false,
        required: false,
        default: DefaultValue::EmptyList,
        min_len: None,
        max_len: None,
        predicate: None,
        label: "Tags",
    },
    FieldSpec {
        field: Field::SortOrder,
        kind: FieldKind::Number,
        nullable: false,
        required: false,
        default: DefaultValue::Number(0.0),
        min_len: None,
        max_len: None,
        predicate: Some(valid_sort_order),
        label: "Order",
    },
    FieldSpec {
        field: Field::IsArchived,
        kind: FieldKind::Bool,
        nullable: false,
        required: false,
        default: DefaultValue::Bool(false),
        min_len: None,
        max_len: None,
        predicate: None,
        label: "Archived",
    },
    FieldSpec {
        field: Field::AddedAt,
        kind: FieldKind::Text,
        nullable: false,
        required: true,
        default: DefaultValue::Now,
        min_len: None,
        max_len: None,
        predicate: None,
        label: "Added",
    },
    FieldSpec {
        field: Field::AmendedAt,
        kind: FieldKind::Text,
        nullable: false,
        required: true,
        default: DefaultValue::Now,
        min_len: None,
        max_len: None,
        predicate: None,
        label: "Amended",
    },
    FieldSpec {
        field: Field::CompletedAt,
        kind: FieldKind::Text,
        nullable: true,
        required: false,
        default: DefaultValue::Absent,
        min_len: None,
        max_len: None,
        predicate: None,
        label: "Completed",
    },
];

/// Look up the schema row for `field`.
pub fn spec(field: Field) -> &'static FieldSpec {
    // SCHEMA is laid out in `Field` declaration order
    &SCHEMA[field as usize]
}

fn valid_detail(value: &FieldValue) -> bool {
    match value {
        FieldValue::Text(s) => !s.trim().is_empty() && s.chars().count() <= DETAIL_MAX_LEN,
        _ => false,
    }
}

fn valid_status(value: &FieldValue) -> bool {
    value.as_text().is_some_and(|code| code.parse::<Status>().is_ok())
}

fn valid_priority(value: &FieldValue) -> bool {
    value.as_text().is_some_and(|code| code.parse::<Priority>().is_ok())
}

// JSON has no NaN or infinity; such values would not survive a reload
fn valid_sort_order(value: &FieldValue) -> bool {
    value.as_number().is_some_and(f64::is_finite)
}

fn valid_due(value: &FieldValue) -> bool {
    match value {
        FieldValue::Null => true,
        FieldValue::Text(s) => utils::parse_due(s).is_some(),
        _ => false,
    }
}

impl FieldSpec {
    pub fn default_value(&self) -> FieldValue {
        self.default.produce()
    }

    /// Whether `value` has a shape this field can hold
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match value.kind() {
            None => self.nullable,
            Some(kind) => kind == self.kind,
        }
    }

    /// First rule `value` breaks, as a user-facing message.
    pub fn check(&self, value: &FieldValue) -> Option<String> {
        let name = self.field.name();

        if value.is_blank() {
            if self.required {
                return Some(format!("{name} is required"));
            }
            if value.is_null() {
                return None;
            }
        }

        if let FieldValue::Text(text) = value {
            let len = text.chars().count();
            if let Some(min) = self.min_len.filter(|min| len < *min) {
                return Some(format!("{name} must be at least {min} characters"));
            }
            if let Some(max) = self.max_len.filter(|max| len > *max) {
                return Some(format!("{name} must be at most {max} characters"));
            }
        }

        match self.predicate {
            Some(predicate) if !predicate(value) => Some(format!("{name} has an invalid value")),
            _ => None,
        }
    }
}

/// Outcome of validating a record: at most one message per field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    pub errors: BTreeMap<Field, String>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&self, field: Field) -> Option<&str> {
        self.errors.get(&field).map(String::as_str)
    }
}

/// Validate every field of `data` in schema order.
pub fn validate(data: &TodoData) -> Validation {
    let errors = SCHEMA
        .iter()
        .filter_map(|spec| spec.check(&data.get(spec.field)).map(|message| (spec.field, message)))
        .collect();
    Validation { errors }
}
