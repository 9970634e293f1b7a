pub mod browser;
pub mod context;
pub mod duration;
pub mod error;
pub mod mirror;
pub mod runner;
pub mod steps;

pub use browser::{
    Browser, BrowserDriver, BrowserSession, BrowserSessionProvider, BrowserTask, ElementHandle,
    Locator,
};
pub use context::TaskContext;
pub use duration::format_duration;
pub use error::{Cancelled, TaskError, TaskFailure, TaskResult};
pub use mirror::{MirrorSummary, TableMirror};
pub use runner::{RunOutcome, TaskRunner};
pub use steps::StepSummary;

use crate::schedule::Recurrence;

pub trait EtlStep: Send {
    fn class_name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    fn name(&self) -> String {
        display_name(self.class_name())
    }

    fn do_etl(&mut self, ctx: &TaskContext<'_>) -> TaskResult;
}

pub trait EtlTask: EtlStep {
    fn recurrence(&self) -> Recurrence;
}

pub fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

pub fn display_name(class_name: &str) -> String {
    let mut display = String::with_capacity(class_name.len() + 4);
    let mut previous_lowercase = false;
    for ch in class_name.chars() {
        if previous_lowercase && ch.is_ascii_uppercase() {
            display.push(' ');
        }
        previous_lowercase = ch.is_ascii_lowercase();
        display.push(ch);
    }
    display
}
