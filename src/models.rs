use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Priority rank, LOW < MEDIUM < HIGH
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }

    /// The next priority in the selector, wrapping HIGH back to LOW.
    pub fn cycle(&self) -> Priority {
        match self {
            Priority::Low => Priority::Medium,
            Priority::Medium => Priority::High,
            Priority::High => Priority::Low,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Priority::Low),
            "MEDIUM" => Ok(Priority::Medium),
            "HIGH" => Ok(Priority::High),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

// Task struct
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub description: String,
    pub completed: bool,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub todo_list_id: String,
}

impl Task {
    /// Merges every field present in `patch` into this task.
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
    }
}

// TodoList with its owned tasks, as returned by getTasks
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TodoList {
    pub id: String,
    pub tasks: Vec<Task>,
}

/// Partial update for a task. Absent fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl TaskPatch {
    pub fn description(description: impl Into<String>) -> Self {
        TaskPatch {
            description: Some(description.into()),
            ..Default::default()
        }
    }

    pub fn completed(completed: bool) -> Self {
        TaskPatch {
            completed: Some(completed),
            ..Default::default()
        }
    }

    pub fn due_date(due_date: DateTime<Utc>) -> Self {
        TaskPatch {
            due_date: Some(due_date),
            ..Default::default()
        }
    }

    pub fn priority(priority: Priority) -> Self {
        TaskPatch {
            priority: Some(priority),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.completed.is_none()
            && self.due_date.is_none()
            && self.priority.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreatedList {
    pub id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeletedCount {
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_priority_order() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert_eq!(Priority::High.cycle(), Priority::Low);
    }

    #[test]
    fn test_patch_rejects_unknown_fields() {
        let res = serde_json::from_value::<TaskPatch>(json!({ "title": "nope" }));
        assert!(res.is_err());
    }

    #[test]
    fn test_patch_rejects_bad_priority() {
        let res = serde_json::from_value::<TaskPatch>(json!({ "priority": "URGENT" }));
        assert!(res.is_err());
    }

    #[test]
    fn test_apply_only_touches_present_fields() {
        let now = Utc::now();
        let mut task = Task {
            id: "t1".to_string(),
            description: "write report".to_string(),
            completed: false,
            priority: Priority::Medium,
            created_at: now,
            due_date: now,
            todo_list_id: "l1".to_string(),
        };
        let before = task.clone();

        task.apply(&TaskPatch::completed(true));

        assert!(task.completed);
        assert_eq!(task.description, before.description);
        assert_eq!(task.priority, before.priority);
        assert_eq!(task.due_date, before.due_date);
    }

    #[test]
    fn test_task_wire_format_is_camel_case() {
        let now = Utc::now();
        let task = Task {
            id: "t1".to_string(),
            description: String::new(),
            completed: false,
            priority: Priority::High,
            created_at: now,
            due_date: now,
            todo_list_id: "l1".to_string(),
        };
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["priority"], "HIGH");
        assert!(value.get("createdAt").is_some());
        assert!(value.get("dueDate").is_some());
        assert!(value.get("todoListId").is_some());
    }
}
