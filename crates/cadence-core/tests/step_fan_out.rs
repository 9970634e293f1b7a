use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use cadence_core::etl::{
    Cancelled, EtlStep, RunOutcome, StepSummary, TaskContext, TaskError, TaskResult, TaskRunner,
};
use cadence_core::models::{ExecutionStatus, TaskLogLevel};
use cadence_core::notify::{FailureNotifier, NotifyError};
use cadence_core::persistence::{ExecutionStore, InMemoryExecutionStore};

#[derive(Default)]
struct CountingNotifier {
    tasks: Mutex<Vec<String>>,
}

impl FailureNotifier for CountingNotifier {
    fn notify_failure(
        &self,
        task_name: &str,
        _error_text: &str,
        _screenshot: Option<&[u8]>,
    ) -> Result<(), NotifyError> {
        self.tasks.lock().unwrap().push(task_name.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct Concurrency {
    active: AtomicUsize,
    peak: AtomicUsize,
}

#[derive(Clone, Copy, PartialEq)]
enum StepResult {
    Succeed,
    Fail,
    Interrupt,
}

struct LakeTable {
    table: &'static str,
    result: StepResult,
    concurrency: Arc<Concurrency>,
}

impl EtlStep for LakeTable {
    fn class_name(&self) -> &'static str {
        self.table
    }

    fn do_etl(&mut self, ctx: &TaskContext<'_>) -> TaskResult {
        let active = self.concurrency.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.concurrency.peak.fetch_max(active, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        self.concurrency.active.fetch_sub(1, Ordering::SeqCst);

        ctx.log(format!("copied {}", self.table));
        match self.result {
            StepResult::Succeed => Ok(()),
            StepResult::Fail => Err(TaskError::failed(format!("{} query timed out", self.table))),
            StepResult::Interrupt => Err(Cancelled.into()),
        }
    }
}

struct DataLakeRefresh {
    tables: Vec<(&'static str, StepResult)>,
    concurrency: Arc<Concurrency>,
    summary: Option<StepSummary>,
}

impl EtlStep for DataLakeRefresh {
    fn do_etl(&mut self, ctx: &TaskContext<'_>) -> TaskResult {
        let steps = self
            .tables
            .iter()
            .map(|(table, result)| {
                Box::new(LakeTable {
                    table: *table,
                    result: *result,
                    concurrency: self.concurrency.clone(),
                }) as Box<dyn EtlStep>
            })
            .collect();
        self.summary = Some(ctx.run_steps_parallel(steps, 2)?);
        Ok(())
    }
}

fn refresh(tables: Vec<(&'static str, StepResult)>) -> DataLakeRefresh {
    DataLakeRefresh {
        tables,
        concurrency: Arc::default(),
        summary: None,
    }
}

#[test]
fn each_step_gets_its_own_record_and_failures_stay_isolated() {
    let store = Arc::new(InMemoryExecutionStore::new());
    let notifier = Arc::new(CountingNotifier::default());
    let runner = TaskRunner::new(store.clone(), notifier.clone());

    let mut parent = refresh(vec![
        ("Customers", StepResult::Succeed),
        ("Orders", StepResult::Fail),
        ("Products", StepResult::Succeed),
        ("Invoices", StepResult::Succeed),
    ]);
    let outcome = runner.run(&mut parent).unwrap();

    let RunOutcome::Completed(parent_record) = outcome else {
        panic!("parent should complete even when a step fails");
    };
    let summary = parent.summary.unwrap();
    assert_eq!(summary.failed, ["Orders"]);
    let mut completed = summary.completed.clone();
    completed.sort();
    assert_eq!(completed, ["Customers", "Invoices", "Products"]);

    let executions = store.executions().unwrap();
    assert_eq!(executions.len(), 5);
    let orders = executions.iter().find(|record| record.name == "Orders").unwrap();
    assert_eq!(orders.status, ExecutionStatus::Failed);
    assert_eq!(
        executions
            .iter()
            .filter(|record| record.status == ExecutionStatus::Completed)
            .count(),
        4
    );

    let parent_logs = store.list_logs(parent_record.id).unwrap();
    let warning = parent_logs
        .iter()
        .find(|log| log.level == TaskLogLevel::Warn)
        .unwrap();
    assert_eq!(warning.message, "3 steps completed, 1 failed: Orders");
    assert_eq!(*notifier.tasks.lock().unwrap(), ["Orders"]);
}

#[test]
fn worker_pool_bounds_concurrency() {
    let store = Arc::new(InMemoryExecutionStore::new());
    let runner = TaskRunner::new(store, Arc::new(CountingNotifier::default()));

    let mut parent = refresh(
        ["A", "B", "C", "D", "E", "F"]
            .into_iter()
            .map(|table| (table, StepResult::Succeed))
            .collect(),
    );
    runner.run(&mut parent).unwrap();

    let peak = parent.concurrency.peak.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak concurrency was {peak}");
    assert!(parent.summary.unwrap().all_completed());
}

#[test]
fn interrupted_step_cancels_the_parent_run() {
    let store = Arc::new(InMemoryExecutionStore::new());
    let notifier = Arc::new(CountingNotifier::default());
    let runner = TaskRunner::new(store.clone(), notifier.clone());

    let mut parent = refresh(vec![
        ("Customers", StepResult::Succeed),
        ("Orders", StepResult::Interrupt),
    ]);
    let result = runner.run(&mut parent);

    assert_eq!(result, Err(Cancelled));
    assert!(parent.summary.is_none());
    assert!(notifier.tasks.lock().unwrap().is_empty());

    let parent_record = store
        .executions()
        .unwrap()
        .into_iter()
        .find(|record| record.name == "Data Lake Refresh")
        .unwrap();
    assert_eq!(parent_record.ended_at, None);
}
