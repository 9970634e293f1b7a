use std::time::Duration;

use crate::etl::context::TaskContext;
use crate::etl::error::{TaskError, TaskResult};
use crate::etl::{EtlStep, EtlTask, display_name, short_type_name};
use crate::schedule::Recurrence;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Locator {
    Id(String),
    Css(String),
    XPath(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementHandle(pub String);

pub trait BrowserDriver: Send {
    fn navigate(&mut self, url: &str) -> anyhow::Result<()>;

    fn find_element(&mut self, locator: &Locator, wait: Duration)
    -> anyhow::Result<ElementHandle>;

    fn attribute(&mut self, element: &ElementHandle, name: &str)
    -> anyhow::Result<Option<String>>;

    fn text(&mut self, element: &ElementHandle) -> anyhow::Result<String>;

    fn screenshot(&mut self) -> anyhow::Result<Vec<u8>>;

    fn quit(&mut self) -> anyhow::Result<()>;
}

pub trait BrowserSessionProvider: Send + Sync {
    fn acquire(&self) -> anyhow::Result<Box<dyn BrowserDriver>>;
}

pub struct BrowserSession {
    driver: Box<dyn BrowserDriver>,
}

impl BrowserSession {
    pub fn new(driver: Box<dyn BrowserDriver>) -> Self {
        Self { driver }
    }

    pub fn driver(&mut self) -> &mut dyn BrowserDriver {
        &mut *self.driver
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Err(error) = self.driver.quit() {
            tracing::warn!(error = %error, "browser session did not shut down cleanly");
        }
    }
}

pub trait BrowserTask: Send {
    fn class_name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    fn name(&self) -> String {
        display_name(self.class_name())
    }

    fn recurrence(&self) -> Recurrence;

    fn do_browser_etl(&mut self, driver: &mut dyn BrowserDriver, ctx: &TaskContext<'_>)
    -> TaskResult;
}

#[derive(Debug, Default)]
pub struct Browser<T>(pub T);

impl<T: BrowserTask> EtlStep for Browser<T> {
    fn class_name(&self) -> &'static str {
        self.0.class_name()
    }

    fn name(&self) -> String {
        self.0.name()
    }

    fn do_etl(&mut self, ctx: &TaskContext<'_>) -> TaskResult {
        let mut session = ctx.browser_session()?;
        match self.0.do_browser_etl(session.driver(), ctx) {
            Err(TaskError::Failed(failure)) if failure.screenshot.is_none() => {
                let error = TaskError::Failed(failure);
                match session.driver().screenshot() {
                    Ok(png) => Err(error.with_screenshot(png)),
                    Err(capture_error) => {
                        tracing::warn!(
                            error = %capture_error,
                            "could not capture failure screenshot"
                        );
                        Err(error)
                    }
                }
            }
            other => other,
        }
    }
}

impl<T: BrowserTask> EtlTask for Browser<T> {
    fn recurrence(&self) -> Recurrence {
        self.0.recurrence()
    }
}
