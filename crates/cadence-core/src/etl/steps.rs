use anyhow::Context;
use rayon::prelude::*;

use crate::etl::context::TaskContext;
use crate::etl::error::{Cancelled, TaskError, TaskResult};
use crate::etl::runner::RunOutcome;
use crate::etl::EtlStep;
use crate::models::TaskLogLevel;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepSummary {
    pub completed: Vec<String>,
    pub failed: Vec<String>,
}

impl StepSummary {
    pub fn all_completed(&self) -> bool {
        self.failed.is_empty()
    }
}

impl TaskContext<'_> {
    pub fn run_steps_parallel(
        &self,
        steps: Vec<Box<dyn EtlStep>>,
        workers: usize,
    ) -> TaskResult<StepSummary> {
        self.check_cancelled()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|index| format!("cadence-step-{index}"))
            .build()
            .context("could not start step worker pool")?;

        let runner = self.runner();
        let results: Vec<(String, Result<RunOutcome, Cancelled>)> = pool.install(|| {
            steps
                .into_par_iter()
                .map(|mut step| {
                    let name = step.name();
                    (name, runner.run(step.as_mut()))
                })
                .collect()
        });

        let mut summary = StepSummary::default();
        let mut interrupted = false;
        for (name, result) in results {
            match result {
                Ok(outcome) if outcome.is_completed() => summary.completed.push(name),
                Ok(_) => summary.failed.push(name),
                Err(Cancelled) => interrupted = true,
            }
        }
        if interrupted {
            return Err(TaskError::Cancelled);
        }

        if summary.all_completed() {
            self.log(format!("{} steps completed", summary.completed.len()));
        } else {
            self.log_with(
                TaskLogLevel::Warn,
                format!(
                    "{} steps completed, {} failed: {}",
                    summary.completed.len(),
                    summary.failed.len(),
                    summary.failed.join(", ")
                ),
                None,
            );
        }
        Ok(summary)
    }
}
