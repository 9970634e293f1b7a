use crate::etl::{Cancelled, EtlTask, TaskRunner};
use crate::registry::{is_excluded, matches_prefix};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, completed: bool) {
        if completed {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
    }
}

pub fn run_all(
    runner: &TaskRunner,
    tasks: &mut [Box<dyn EtlTask>],
    exclude: &[String],
) -> Result<RunSummary, Cancelled> {
    let mut summary = RunSummary::default();
    for task in tasks.iter_mut() {
        if is_excluded(task.class_name(), exclude) {
            tracing::info!(task = task.class_name(), "excluded");
            continue;
        }
        let outcome = runner.run(task.as_mut())?;
        summary.record(outcome.is_completed());
    }

    tracing::info!(
        completed = summary.completed,
        failed = summary.failed,
        "---- All tasks run ----"
    );
    Ok(summary)
}

pub fn run_matching(
    runner: &TaskRunner,
    tasks: &mut [Box<dyn EtlTask>],
    prefixes: &[String],
    exclude: &[String],
) -> Result<RunSummary, Cancelled> {
    let mut summary = RunSummary::default();
    for prefix in prefixes {
        let mut matched = false;
        for task in tasks.iter_mut() {
            let class_name = task.class_name();
            if !matches_prefix(class_name, prefix) || is_excluded(class_name, exclude) {
                continue;
            }
            matched = true;
            let outcome = runner.run(task.as_mut())?;
            summary.record(outcome.is_completed());
        }
        if !matched {
            tracing::warn!(prefix = %prefix, "no task matches this name");
        }
    }
    Ok(summary)
}
