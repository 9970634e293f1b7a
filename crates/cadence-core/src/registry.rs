use std::any::TypeId;
use std::collections::HashMap;

use crate::etl::EtlTask;
use crate::models::{CoreError, CoreErrorKind};

type TaskFactory = Box<dyn Fn() -> Box<dyn EtlTask> + Send + Sync>;

struct Registration {
    type_id: TypeId,
    type_name: &'static str,
    class_name: &'static str,
    factory: TaskFactory,
}

#[derive(Default)]
pub struct TaskRegistry {
    entries: Vec<Registration>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self) -> Result<&mut Self, CoreError>
    where
        T: EtlTask + Default + 'static,
    {
        self.register_with(T::default)
    }

    pub fn register_with<T, F>(&mut self, factory: F) -> Result<&mut Self, CoreError>
    where
        T: EtlTask + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<T>();
        let type_name = std::any::type_name::<T>();
        if self.entries.iter().any(|entry| entry.type_id == type_id) {
            return Err(CoreError::new(
                CoreErrorKind::DuplicateRegistration,
                format!("task type '{type_name}' is registered more than once"),
            ));
        }

        let class_name = factory().class_name();
        self.entries.push(Registration {
            type_id,
            type_name,
            class_name,
            factory: Box::new(move || Box::new(factory()) as Box<dyn EtlTask>),
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn class_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.class_name).collect()
    }

    pub fn instantiate(&self) -> Result<Vec<Box<dyn EtlTask>>, CoreError> {
        let mut seen: HashMap<String, &'static str> = HashMap::new();
        let mut tasks = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let task = (entry.factory)();
            let class_name = task.class_name();
            if let Some(previous) = seen.insert(class_name.to_lowercase(), entry.type_name) {
                return Err(CoreError::new(
                    CoreErrorKind::DuplicateRegistration,
                    format!(
                        "task class name '{class_name}' is used by both '{previous}' and '{}'",
                        entry.type_name
                    ),
                ));
            }
            tasks.push(task);
        }

        Ok(tasks)
    }
}

pub fn matches_prefix(class_name: &str, prefix: &str) -> bool {
    class_name
        .to_lowercase()
        .starts_with(&prefix.to_lowercase())
}

pub fn is_excluded(class_name: &str, exclude: &[String]) -> bool {
    exclude
        .iter()
        .any(|name| name.eq_ignore_ascii_case(class_name))
}
