//! Pipeline context: a JSON key/value bag, typed resources, and an error slot.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

use syllabus_utils::types::Fault;

/// Which interceptor function raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Enter,
    Leave,
    Error,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enter => write!(f, "enter"),
            Self::Leave => write!(f, "leave"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A failure captured while running a stack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{interceptor}.{stage}: {fault}")]
pub struct StackFault {
    /// Name of the interceptor whose function raised.
    pub interceptor: String,
    pub stage: Stage,
    pub fault: Fault,
}

impl StackFault {
    #[must_use]
    pub fn new(interceptor: impl Into<String>, stage: Stage, fault: Fault) -> Self {
        let interceptor = interceptor.into();
        let fault = fault.with_origin(interceptor.clone());
        Self {
            interceptor,
            stage,
            fault,
        }
    }
}

/// State threaded through a stack or middleware chain.
///
/// Plain data lives in a string-keyed JSON map so pipelines can add keys
/// without changing this type. Non-serializable resources (meters, handles)
/// are stored by type. The in-flight error has its own slot; its presence is
/// what switches a stack from `leave` to `error`.
#[derive(Default)]
pub struct Context {
    values: BTreeMap<String, Value>,
    resources: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    error: Option<StackFault>,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a serializable value under `key`.
    ///
    /// # Errors
    ///
    /// Returns an `Internal` fault if the value cannot be serialized.
    pub fn insert<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<(), Fault> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .map_err(|e| Fault::internal(format!("context key '{key}' is not serializable: {e}")))?;
        self.values.insert(key, value);
        Ok(())
    }

    pub fn insert_value(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    #[must_use]
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Read and decode the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns a `Permanent` fault if the key is missing and an `Internal`
    /// fault if it does not decode as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, Fault> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| Fault::permanent(format!("context key '{key}' is missing")))?;
        serde_json::from_value(value.clone())
            .map_err(|e| Fault::internal(format!("context key '{key}' has unexpected shape: {e}")))
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Attach a typed resource, replacing any previous one of the same type.
    pub fn provide<T: Any + Send + Sync>(&mut self, resource: T) {
        self.resources.insert(TypeId::of::<T>(), Box::new(resource));
    }

    #[must_use]
    pub fn resource<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.resources
            .get(&TypeId::of::<T>())
            .and_then(|r| r.downcast_ref::<T>())
    }

    pub fn resource_mut<T: Any + Send + Sync>(&mut self) -> Option<&mut T> {
        self.resources
            .get_mut(&TypeId::of::<T>())
            .and_then(|r| r.downcast_mut::<T>())
    }

    pub fn take_resource<T: Any + Send + Sync>(&mut self) -> Option<T> {
        self.resources
            .remove(&TypeId::of::<T>())
            .and_then(|r| r.downcast::<T>().ok())
            .map(|r| *r)
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    #[must_use]
    pub fn error(&self) -> Option<&StackFault> {
        self.error.as_ref()
    }

    pub fn set_error(&mut self, fault: StackFault) {
        self.error = Some(fault);
    }

    /// Mark the in-flight error as handled.
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn take_error(&mut self) -> Option<StackFault> {
        self.error.take()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("values", &self.values)
            .field("resources", &self.resources.len())
            .field("error", &self.error)
            .finish()
    }
}
