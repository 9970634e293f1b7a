use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};

use crate::cancel::CancellationToken;
use crate::clock::{Clock, SystemClock};
use crate::etl::browser::BrowserSessionProvider;
use crate::etl::context::TaskContext;
use crate::etl::duration::format_duration;
use crate::etl::error::{Cancelled, TaskError, TaskFailure};
use crate::etl::EtlStep;
use crate::models::{ExecutionRecord, ExecutionStatus, TaskLogLevel};
use crate::notify::FailureNotifier;
use crate::persistence::ExecutionStore;

/// How a single run ended, seen from the caller. Cancellation is not an
/// outcome; it comes back as `Err(Cancelled)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(ExecutionRecord),
    Failed {
        /// `None` when the execution record itself could not be created.
        execution: Option<ExecutionRecord>,
        error: String,
    },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn execution(&self) -> Option<&ExecutionRecord> {
        match self {
            Self::Completed(record) => Some(record),
            Self::Failed { execution, .. } => execution.as_ref(),
        }
    }
}

/// Drives one task through NotStarted -> Running -> Completed | Failed and
/// keeps a failing task from affecting whoever called it.
pub struct TaskRunner {
    store: Arc<dyn ExecutionStore>,
    notifier: Arc<dyn FailureNotifier>,
    clock: Arc<dyn Clock>,
    cancellation: CancellationToken,
    browser_sessions: Option<Arc<dyn BrowserSessionProvider>>,
}

impl TaskRunner {
    pub fn new(store: Arc<dyn ExecutionStore>, notifier: Arc<dyn FailureNotifier>) -> Self {
        Self {
            store,
            notifier,
            clock: Arc::new(SystemClock),
            cancellation: CancellationToken::new(),
            browser_sessions: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_browser_sessions(mut self, provider: Arc<dyn BrowserSessionProvider>) -> Self {
        self.browser_sessions = Some(provider);
        self
    }

    pub fn store(&self) -> &dyn ExecutionStore {
        self.store.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub(crate) fn browser_sessions(&self) -> Option<&dyn BrowserSessionProvider> {
        self.browser_sessions.as_deref()
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now().with_timezone(&Utc)
    }

    pub fn run<T: EtlStep + ?Sized>(&self, task: &mut T) -> Result<RunOutcome, Cancelled> {
        if self.cancellation.is_cancelled() {
            return Err(Cancelled);
        }

        let name = task.name();
        let started_at = self.now();
        let execution = match self.store.create_execution(&name, started_at) {
            Ok(execution) => execution,
            Err(error) => {
                let report = format!("could not create execution record: {error}");
                tracing::error!(task = %name, error = %error, "task skipped");
                self.notify(&name, &report, None);
                return Ok(RunOutcome::Failed {
                    execution: None,
                    error: report,
                });
            }
        };

        tracing::info!(task = %name, execution_id = execution.id.0, "task started");
        let ctx = TaskContext::new(self, execution.id, &name);
        install_panic_trace_hook();
        let mut panic_trace = None;
        let result = panic::catch_unwind(AssertUnwindSafe(|| task.do_etl(&ctx)))
            .unwrap_or_else(|payload| {
                panic_trace = PANIC_TRACE.with(|slot| slot.borrow_mut().take());
                Err(panic_failure(payload))
            });

        match result {
            Ok(()) => {
                let ended_at = self.now();
                ctx.log_at(
                    ended_at,
                    TaskLogLevel::Info,
                    format!("{name} ran in {}", format_duration(ended_at - started_at)),
                    None,
                );
                Ok(RunOutcome::Completed(self.finish(
                    &execution,
                    ExecutionStatus::Completed,
                    ended_at,
                )))
            }
            Err(TaskError::Cancelled) => {
                tracing::warn!(
                    task = %name,
                    execution_id = execution.id.0,
                    "task interrupted; execution left unfinished"
                );
                Err(Cancelled)
            }
            Err(TaskError::Failed(failure)) => {
                let ended_at = self.now();
                let TaskFailure { error, screenshot } = failure;
                let summary = format!("{error:#}");
                let report = match &panic_trace {
                    Some(trace) => format!("{error:?}\n\nstack backtrace:\n{trace}"),
                    None => format!("{error:?}"),
                };

                ctx.log_at(
                    ended_at,
                    TaskLogLevel::Error,
                    format!("{name} failed: {summary}"),
                    Some(report.clone()),
                );
                if let Some(png) = screenshot.as_deref() {
                    ctx.log_at(
                        ended_at,
                        TaskLogLevel::Error,
                        "screenshot at failure".to_string(),
                        Some(BASE64.encode(png)),
                    );
                }
                let record = self.finish(&execution, ExecutionStatus::Failed, ended_at);
                self.notify(&name, &report, screenshot.as_deref());

                Ok(RunOutcome::Failed {
                    execution: Some(record),
                    error: summary,
                })
            }
        }
    }

    fn finish(
        &self,
        execution: &ExecutionRecord,
        status: ExecutionStatus,
        ended_at: DateTime<Utc>,
    ) -> ExecutionRecord {
        match self.store.finish_execution(execution.id, status, ended_at) {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!(
                    task = %execution.name,
                    execution_id = execution.id.0,
                    error = %error,
                    "could not record execution end"
                );
                ExecutionRecord {
                    ended_at: Some(ended_at),
                    status,
                    ..execution.clone()
                }
            }
        }
    }

    fn notify(&self, task_name: &str, error_text: &str, screenshot: Option<&[u8]>) {
        if let Err(error) = self
            .notifier
            .notify_failure(task_name, error_text, screenshot)
        {
            tracing::error!(task = %task_name, error = %error, "failure notification was not sent");
        }
    }
}

thread_local! {
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

// Unwinding discards the panicking frames, so the trace is taken in the hook
// and picked up on the same thread once catch_unwind returns.
fn install_panic_trace_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

fn panic_failure(payload: Box<dyn Any + Send>) -> TaskError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    TaskError::failed(format!("task panicked: {message}"))
}
