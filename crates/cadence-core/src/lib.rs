pub mod cancel;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod etl;
pub mod models;
pub mod notify;
pub mod persistence;
pub mod registry;
pub mod schedule;
pub mod sqlite;
