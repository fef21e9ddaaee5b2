pub mod cli;
pub mod collection;
pub mod config;
pub mod database;
pub mod logging;
pub mod models;
pub mod observer;
pub mod record;
pub mod schema;
pub mod storage;
pub mod utils;

pub use collection::{CollectionEvent, EventKind, StatusFilter, TodoCollection, ValidationError};
pub use config::Config;
pub use database::SqliteSubstrate;
pub use models::{Priority, Status, TodoData, TodoPatch};
pub use observer::Subscription;
pub use record::TodoItem;
pub use schema::{Field, FieldValue, SCHEMA};
pub use storage::{KvSubstrate, MemorySubstrate, StoreAdapter, StoreError};
pub use utils::Profile;
