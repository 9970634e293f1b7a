use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::models::{CoreError, CoreErrorKind};
use crate::notify::SmtpSettings;

pub const DEFAULT_CONFIG_FILE: &str = "cadence.toml";

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub scheduler: SchedulerSettings,
    pub notify: NotifySettings,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSettings {
    pub path: PathBuf,
    pub reporting_path: Option<PathBuf>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cadence.sqlite3"),
            reporting_path: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSettings {
    pub poll_interval_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct NotifySettings {
    pub smtp_server: Option<String>,
    pub smtp_port: u16,
    pub from_address: Option<String>,
    pub recipient: Option<String>,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            smtp_server: None,
            smtp_port: 25,
            from_address: None,
            recipient: None,
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    pub fn load_with(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, CoreError> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None if default_path.exists() => Self::from_file(default_path)?,
            None => Self::default(),
        };
        settings.apply_overrides(lookup)?;
        Ok(settings)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CoreError> {
        toml::from_str(raw).map_err(|error| config_error(format!("invalid settings: {error}")))
    }

    fn from_file(path: &Path) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path).map_err(|error| {
            config_error(format!("could not read '{}': {error}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), CoreError> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = lookup("CADENCE_DATABASE_PATH") {
            self.database.path = PathBuf::from(value);
        }
        if let Some(value) = lookup("CADENCE_REPORTING_DATABASE_PATH") {
            self.database.reporting_path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("CADENCE_POLL_INTERVAL_SECS") {
            self.scheduler.poll_interval_secs = value.trim().parse().map_err(|_| {
                config_error(format!(
                    "CADENCE_POLL_INTERVAL_SECS must be a whole number of seconds, got '{value}'"
                ))
            })?;
        }
        if let Some(value) = lookup("CADENCE_SMTP_SERVER") {
            self.notify.smtp_server = Some(value);
        }
        if let Some(value) = lookup("CADENCE_EMAIL_FROM") {
            self.notify.from_address = Some(value);
        }
        if let Some(value) = lookup("CADENCE_DEFAULT_RECIPIENT") {
            self.notify.recipient = Some(value);
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.poll_interval_secs.max(1))
    }

    pub fn smtp(&self) -> Option<SmtpSettings> {
        let notify = &self.notify;
        Some(SmtpSettings {
            server: notify.smtp_server.clone()?,
            port: notify.smtp_port,
            from_address: notify.from_address.clone()?,
            recipient: notify.recipient.clone()?,
        })
    }
}

fn config_error(message: String) -> CoreError {
    CoreError::new(CoreErrorKind::Configuration, message)
}
