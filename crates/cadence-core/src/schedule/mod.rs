pub mod recurrence;
pub mod scheduler;

pub use recurrence::Recurrence;
pub use scheduler::{ScheduleSummary, Scheduler};
