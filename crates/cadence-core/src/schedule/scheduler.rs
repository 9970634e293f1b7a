use std::time::Duration;

use chrono::{DateTime, Local};

use crate::etl::{Cancelled, EtlTask, TaskRunner};
use crate::schedule::Recurrence;

struct ScheduledTask {
    task: Box<dyn EtlTask>,
    recurrence: Recurrence,
    next_due: DateTime<Local>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScheduleSummary {
    pub discovered: usize,
    pub scheduled: usize,
}

impl ScheduleSummary {
    pub fn manual_only(&self) -> usize {
        self.discovered - self.scheduled
    }
}

pub struct Scheduler {
    runner: TaskRunner,
    entries: Vec<ScheduledTask>,
}

impl Scheduler {
    pub fn new(runner: TaskRunner) -> Self {
        Self {
            runner,
            entries: Vec::new(),
        }
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    pub fn schedule_all(&mut self, tasks: Vec<Box<dyn EtlTask>>) -> ScheduleSummary {
        let now = self.runner.clock().now();
        let discovered = tasks.len();
        let already_scheduled = self.entries.len();
        for task in tasks {
            let recurrence = task.recurrence();
            let Some(next_due) = recurrence.next_after(&now) else {
                tracing::debug!(task = task.class_name(), "not scheduled; manual runs only");
                continue;
            };
            tracing::info!(
                task = task.class_name(),
                recurrence = ?recurrence,
                next_due = %next_due,
                "task scheduled"
            );
            self.entries.push(ScheduledTask {
                task,
                recurrence,
                next_due,
            });
        }

        let summary = ScheduleSummary {
            discovered,
            scheduled: self.entries.len() - already_scheduled,
        };
        tracing::info!(
            scheduled = summary.scheduled,
            manual_only = summary.manual_only(),
            "---- {} tasks scheduled ----",
            summary.discovered
        );
        summary
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn next_due(&self) -> Option<DateTime<Local>> {
        self.entries.iter().map(|entry| entry.next_due).min()
    }

    pub fn run_pending(&mut self) -> Result<usize, Cancelled> {
        let now = self.runner.clock().now();
        let mut due = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.next_due <= now)
            .map(|(index, entry)| (entry.next_due, index))
            .collect::<Vec<_>>();
        due.sort();

        for (_, index) in &due {
            let entry = &mut self.entries[*index];
            let outcome = self.runner.run(entry.task.as_mut())?;
            let finished = self.runner.clock().now();
            if let Some(next_due) = entry.recurrence.next_after(&finished) {
                entry.next_due = next_due;
            }
            tracing::debug!(
                task = entry.task.class_name(),
                completed = outcome.is_completed(),
                next_due = %entry.next_due,
                "scheduled run finished"
            );
        }
        Ok(due.len())
    }

    pub fn run_until_cancelled(&mut self, poll_interval: Duration) {
        let cancellation = self.runner.cancellation().clone();
        while !cancellation.is_cancelled() {
            if self.run_pending().is_err() {
                break;
            }
            if cancellation.wait_timeout(poll_interval) {
                break;
            }
        }
        tracing::info!("Schedule stopped");
    }
}
