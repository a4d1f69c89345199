use std::fs;
use std::path::Path;

use crate::models::{Priority, Task, TaskPatch, TodoList};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

const TASK_COLUMNS: &str = "id, todo_list_id, description, completed, priority, created_at, due_date";

/// Relational storage for todo lists and their tasks.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> StoreResult<Store> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.is_dir() {
                fs::create_dir_all(dir)?;
            }
        }
        let conn = Connection::open(path)?;
        Store::init(conn)
    }

    pub fn open_in_memory() -> StoreResult<Store> {
        Store::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Store> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS todo_lists (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                todo_list_id TEXT NOT NULL REFERENCES todo_lists(id),
                description TEXT NOT NULL DEFAULT '',
                completed BOOLEAN NOT NULL DEFAULT 0,
                priority TEXT NOT NULL DEFAULT 'LOW',
                created_at TEXT NOT NULL,
                due_date TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS tasks_by_list ON tasks(todo_list_id);",
        )?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    pub fn create_list(&self) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO todo_lists (id, created_at) VALUES (?1, ?2)",
            params![id, encode_time(&now())],
        )?;
        debug!(list_id = %id, "inserted todo list");
        Ok(id)
    }

    /// Removes the list row only; tasks are deleted separately.
    pub fn delete_list(&self, list_id: &str) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM todo_lists WHERE id = ?1", params![list_id])?;
        Ok(rows)
    }

    pub fn find_list(&self, list_id: &str) -> StoreResult<Option<TodoList>> {
        let conn = self.conn.lock();
        let exists = conn
            .query_row(
                "SELECT id FROM todo_lists WHERE id = ?1",
                params![list_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        let Some(id) = exists else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE todo_list_id = ?1 ORDER BY rowid",
            TASK_COLUMNS
        ))?;
        let tasks = stmt
            .query_map(params![list_id], task_from_row)?
            .collect::<rusqlite::Result<Vec<Task>>>()?;

        Ok(Some(TodoList { id, tasks }))
    }

    /// Inserts a task with default fields. Returns `None` if the list is missing.
    pub fn insert_task(&self, list_id: &str) -> StoreResult<Option<Task>> {
        let conn = self.conn.lock();
        let exists = conn
            .query_row(
                "SELECT 1 FROM todo_lists WHERE id = ?1",
                params![list_id],
                |_| Ok(()),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(None);
        }

        let created = now();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            description: String::new(),
            completed: false,
            priority: Priority::default(),
            created_at: created,
            due_date: created,
            todo_list_id: list_id.to_string(),
        };
        conn.execute(
            "INSERT INTO tasks (id, todo_list_id, description, completed, priority, created_at, due_date)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                task.id,
                task.todo_list_id,
                task.description,
                task.completed,
                task.priority.as_str(),
                encode_time(&task.created_at),
                encode_time(&task.due_date)
            ],
        )?;
        debug!(list_id, task_id = %task.id, "inserted task");
        Ok(Some(task))
    }

    /// Applies a partial update. Returns `None` if the task is missing.
    pub fn update_task(&self, task_id: &str, patch: &TaskPatch) -> StoreResult<Option<Task>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let current = tx
            .query_row(
                &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
                params![task_id],
                task_from_row,
            )
            .optional()?;
        let Some(mut task) = current else {
            return Ok(None);
        };
        if patch.is_empty() {
            return Ok(Some(task));
        }

        task.apply(patch);
        tx.execute(
            "UPDATE tasks SET
                description = ?2,
                completed = ?3,
                priority = ?4,
                due_date = ?5
            WHERE id = ?1",
            params![
                task.id,
                task.description,
                task.completed,
                task.priority.as_str(),
                encode_time(&task.due_date)
            ],
        )?;
        tx.commit()?;
        Ok(Some(task))
    }

    /// Removes a task, returning it. Returns `None` if it was already gone.
    pub fn delete_task(&self, task_id: &str) -> StoreResult<Option<Task>> {
        let conn = self.conn.lock();
        let current = conn
            .query_row(
                &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
                params![task_id],
                task_from_row,
            )
            .optional()?;
        if current.is_some() {
            conn.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
        }
        Ok(current)
    }

    pub fn delete_tasks_for_list(&self, list_id: &str) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let rows = conn.execute("DELETE FROM tasks WHERE todo_list_id = ?1", params![list_id])?;
        Ok(rows)
    }
}

// Millisecond precision so a task read back equals the task we returned.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

fn encode_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn decode_time(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    let priority: String = row.get(4)?;
    let priority = priority.parse::<Priority>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, Type::Text, e.into())
    })?;
    Ok(Task {
        id: row.get(0)?,
        todo_list_id: row.get(1)?,
        description: row.get(2)?,
        completed: row.get(3)?,
        priority,
        created_at: decode_time(5, row.get(5)?)?,
        due_date: decode_time(6, row.get(6)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_list_is_empty() {
        let store = Store::open_in_memory().unwrap();
        let id = store.create_list().unwrap();
        let list = store.find_list(&id).unwrap().unwrap();
        assert_eq!(list.id, id);
        assert!(list.tasks.is_empty());
    }

    #[test]
    fn test_insert_task_defaults() {
        let store = Store::open_in_memory().unwrap();
        let id = store.create_list().unwrap();
        let task = store.insert_task(&id).unwrap().unwrap();

        assert_eq!(task.description, "");
        assert!(!task.completed);
        assert_eq!(task.priority, Priority::Low);
        assert_eq!(task.created_at, task.due_date);

        let list = store.find_list(&id).unwrap().unwrap();
        assert_eq!(list.tasks, vec![task]);
    }

    #[test]
    fn test_insert_task_into_missing_list() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.insert_task("missing").unwrap().is_none());
    }

    #[test]
    fn test_tasks_keep_insertion_order() {
        let store = Store::open_in_memory().unwrap();
        let id = store.create_list().unwrap();
        let ids: Vec<String> = (0..4)
            .map(|_| store.insert_task(&id).unwrap().unwrap().id)
            .collect();
        let list = store.find_list(&id).unwrap().unwrap();
        let listed: Vec<String> = list.tasks.into_iter().map(|t| t.id).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn test_update_task_round_trips_fields() {
        let store = Store::open_in_memory().unwrap();
        let id = store.create_list().unwrap();
        let task = store.insert_task(&id).unwrap().unwrap();
        let due = task.due_date + Duration::days(3);

        let patch = TaskPatch {
            description: Some("water plants".to_string()),
            completed: Some(true),
            due_date: Some(due),
            priority: Some(Priority::High),
        };
        let updated = store.update_task(&task.id, &patch).unwrap().unwrap();

        let stored = &store.find_list(&id).unwrap().unwrap().tasks[0];
        assert_eq!(stored, &updated);
        assert_eq!(stored.description, "water plants");
        assert_eq!(stored.due_date, due);
        assert_eq!(stored.created_at, task.created_at);
    }

    #[test]
    fn test_empty_patch_changes_nothing() {
        let store = Store::open_in_memory().unwrap();
        let id = store.create_list().unwrap();
        let task = store.insert_task(&id).unwrap().unwrap();
        let same = store.update_task(&task.id, &TaskPatch::default()).unwrap();
        assert_eq!(same, Some(task));
    }

    #[test]
    fn test_update_missing_task() {
        let store = Store::open_in_memory().unwrap();
        let res = store.update_task("gone", &TaskPatch::completed(true)).unwrap();
        assert!(res.is_none());
    }

    #[test]
    fn test_delete_task_twice() {
        let store = Store::open_in_memory().unwrap();
        let id = store.create_list().unwrap();
        let task = store.insert_task(&id).unwrap().unwrap();

        assert_eq!(store.delete_task(&task.id).unwrap(), Some(task.clone()));
        assert_eq!(store.delete_task(&task.id).unwrap(), None);
    }

    #[test]
    fn test_list_delete_blocked_while_tasks_remain() {
        let store = Store::open_in_memory().unwrap();
        let id = store.create_list().unwrap();
        store.insert_task(&id).unwrap();

        assert!(store.delete_list(&id).is_err());
        assert_eq!(store.delete_tasks_for_list(&id).unwrap(), 1);
        assert_eq!(store.delete_list(&id).unwrap(), 1);
        assert!(store.find_list(&id).unwrap().is_none());
    }
}
