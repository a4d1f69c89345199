use std::cmp::Ordering;

use crate::models::Task;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Unsorted,
    Priority,
    CreateDate,
    DueDate,
}

impl SortOrder {
    pub const ALL: [SortOrder; 4] = [
        SortOrder::Unsorted,
        SortOrder::Priority,
        SortOrder::CreateDate,
        SortOrder::DueDate,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SortOrder::Unsorted => "None",
            SortOrder::Priority => "Priority",
            SortOrder::CreateDate => "Creation date",
            SortOrder::DueDate => "Due date",
        }
    }

    pub fn comparator(&self) -> Option<fn(&Task, &Task) -> Ordering> {
        match self {
            SortOrder::Unsorted => None,
            SortOrder::Priority => Some(compare_priority),
            SortOrder::CreateDate => Some(compare_created),
            SortOrder::DueDate => Some(compare_due),
        }
    }
}

pub fn compare_priority(a: &Task, b: &Task) -> Ordering {
    a.priority.cmp(&b.priority)
}

pub fn compare_created(a: &Task, b: &Task) -> Ordering {
    a.created_at.timestamp_millis().cmp(&b.created_at.timestamp_millis())
}

pub fn compare_due(a: &Task, b: &Task) -> Ordering {
    a.due_date.timestamp_millis().cmp(&b.due_date.timestamp_millis())
}

/// Returns a sorted copy; ties keep their relative order.
pub fn sort_task_list(tasks: &[Task], order: SortOrder) -> Vec<Task> {
    let mut sorted = tasks.to_vec();
    if let Some(cmp) = order.comparator() {
        sorted.sort_by(cmp);
    }
    sorted
}

pub fn filter_completed(tasks: &[Task], hide_completed: bool) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| !(hide_completed && task.completed))
        .cloned()
        .collect()
}

/// The rows the list view shows: filtered first, then sorted.
pub fn visible_tasks(tasks: &[Task], order: SortOrder, hide_completed: bool) -> Vec<Task> {
    sort_task_list(&filter_completed(tasks, hide_completed), order)
}
