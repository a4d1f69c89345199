//! Chart-ready aggregates over a list's tasks. Pure; recomputed per render.

use chrono::{DateTime, Utc};

use crate::models::Task;

const MILLIS_PER_DAY: f64 = 1000.0 * 60.0 * 60.0 * 24.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DueBucket {
    Remaining,
    Overdue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DueBar {
    /// Position among the incomplete tasks, as shown on the x axis.
    pub name: String,
    pub days: i64,
    pub bucket: DueBucket,
    pub description: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompletionCounts {
    pub completed: usize,
    pub overdue: usize,
    pub pending: usize,
}

impl CompletionCounts {
    pub fn total(&self) -> usize {
        self.completed + self.overdue + self.pending
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Statistics {
    pub bars: Vec<DueBar>,
    pub counts: CompletionCounts,
}

/// Whole days from `now` until the due date, rounded to nearest.
pub fn days_until_due(task: &Task, now: DateTime<Utc>) -> i64 {
    let diff = (task.due_date - now).num_milliseconds() as f64;
    (diff / MILLIS_PER_DAY).round() as i64
}

pub fn due_bars(tasks: &[Task], now: DateTime<Utc>) -> Vec<DueBar> {
    tasks
        .iter()
        .filter(|task| !task.completed)
        .enumerate()
        .map(|(idx, task)| {
            let days = days_until_due(task, now);
            DueBar {
                name: idx.to_string(),
                days,
                bucket: if days >= 0 {
                    DueBucket::Remaining
                } else {
                    DueBucket::Overdue
                },
                description: task.description.clone(),
            }
        })
        .collect()
}

pub fn completion_counts(tasks: &[Task], now: DateTime<Utc>) -> CompletionCounts {
    let mut counts = CompletionCounts::default();
    for task in tasks {
        if task.completed {
            counts.completed += 1;
        } else if task.due_date < now {
            counts.overdue += 1;
        } else {
            counts.pending += 1;
        }
    }
    counts
}

impl Statistics {
    pub fn derive(tasks: &[Task], now: DateTime<Utc>) -> Statistics {
        Statistics {
            bars: due_bars(tasks, now),
            counts: completion_counts(tasks, now),
        }
    }
}
