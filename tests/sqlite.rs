use std::rc::Rc;

use tempfile::tempdir;
use todo_core::{KvSubstrate, SqliteSubstrate, StoreAdapter, TodoCollection, TodoPatch};

fn open_collection(path: &str) -> (Rc<SqliteSubstrate>, TodoCollection) {
    let db = Rc::new(SqliteSubstrate::open(path).expect("database should open"));
    let todos = TodoCollection::new(StoreAdapter::new(db.clone(), "todo", 1));
    (db, todos)
}

#[test]
fn collection_survives_reopening_the_database() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("data").join("todo.db");
    let path = path.to_str().expect("utf-8 path").to_string();

    let (id, added_at) = {
        let (_, todos) = open_collection(&path);
        let item = todos
            .add(TodoPatch::new().detail("Water plants").owner("alex").tags(["home"]))
            .expect("valid item");
        item.set(TodoPatch::new().status("INP"));
        (item.id(), item.snapshot().added_at)
    };

    let (db, todos) = open_collection(&path);
    let item = todos.get(&id).expect("item should reload");
    let data = item.snapshot();
    assert_eq!(data.detail.as_deref(), Some("Water plants"));
    assert_eq!(data.status, "INP");
    assert_eq!(data.tags, vec!["home".to_string()]);
    assert_eq!(data.added_at, added_at);
    assert_eq!(db.keys().unwrap(), vec!["todo:v1:items".to_string()]);
}

#[test]
fn clear_removes_only_this_namespace_row() {
    let db = Rc::new(SqliteSubstrate::open_in_memory().expect("in-memory db"));
    let other = StoreAdapter::new(db.clone(), "work", 1);
    other.set("items", &Vec::<String>::new()).unwrap();

    let todos = TodoCollection::new(StoreAdapter::new(db.clone(), "todo", 1));
    todos.add(TodoPatch::new().detail("a")).unwrap();
    assert_eq!(db.keys().unwrap().len(), 2);

    todos.clear();
    assert_eq!(db.keys().unwrap(), vec!["work:v1:items".to_string()]);
}

#[test]
fn corrupt_row_loads_as_empty_collection() {
    let db = Rc::new(SqliteSubstrate::open_in_memory().expect("in-memory db"));
    db.write("todo:v1:items", "[{broken").unwrap();

    let todos = TodoCollection::new(StoreAdapter::new(db.clone(), "todo", 1));
    assert!(todos.is_empty());

    todos.add(TodoPatch::new().detail("fresh start")).unwrap();
    let raw = db.read("todo:v1:items").unwrap().expect("row rewritten");
    assert!(raw.contains("fresh start"));
}
