//! Values produced by executable units

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

/// Type-erased, shared value returned by a unit's code.
///
/// Cloning is cheap and keeps identity: every requester of a module receives a
/// clone of the same allocation, observable through [`Value::ptr_eq`].
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Value {
    /// Wrap a value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// Borrow the value as `T`, if it is one
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Name of the wrapped type
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether both values share one allocation
    pub fn ptr_eq(
        &self,
        other: &Value,
    ) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn into_inner(self) -> Arc<dyn Any + Send + Sync> {
        self.inner
    }
}

impl fmt::Debug for Value {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Value<{}>({:p})", self.type_name, Arc::as_ptr(&self.inner))
    }
}
