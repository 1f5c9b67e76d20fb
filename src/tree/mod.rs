//! Object tree handed to the engine by an external builder
//!
//! The engine never builds trees from packaged assets itself. It only needs:
//!
//! - a unique, stable handle per object ([`InstanceId`]) for registry keys
//! - the raw loadable code and the full path of each object
//! - a way to traverse every descendant of the root
//!
//! [`Instance`] is a cheap clonable handle. Two handles are equal only when they
//! point at the same object, never because their names match.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::warn;

/// Tree edit errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// The new parent is the object itself or one of its descendants
    #[error("Attempt to set parent of {child} to {parent} would result in circular reference")]
    CircularParent { child: String, parent: String },
}

/// Unique identifier of an object in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub u64);

impl InstanceId {
    /// Returns the inner value of the id.
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "InstanceId({})", self.0)
    }
}

/// Thread-safe generator for [`InstanceId`]s.
#[derive(Debug)]
pub struct InstanceIdGenerator {
    next_id: AtomicU64,
}

impl InstanceIdGenerator {
    /// Create a new generator starting at zero.
    #[inline]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
        }
    }

    /// Generate a new unique id.
    #[inline]
    pub fn generate(&self) -> InstanceId {
        InstanceId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for InstanceIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide id source, so ids stay unique across independently built trees.
static INSTANCE_IDS: Lazy<InstanceIdGenerator> = Lazy::new(InstanceIdGenerator::new);

/// Serializes reparenting so the ancestor check and the relink happen together.
static REPARENT: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// What kind of object an [`Instance`] is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassKind {
    /// Runnable entry point, never requirable
    Script,
    /// Requirable code unit producing a value
    Module,
    /// Anything else (folders, values, ...)
    Other(String),
}

impl ClassKind {
    /// Class name as shown in diagnostics.
    pub fn class_name(&self) -> &str {
        match self {
            ClassKind::Script => "LocalScript",
            ClassKind::Module => "ModuleScript",
            ClassKind::Other(name) => name,
        }
    }
}

struct InstanceData {
    id: InstanceId,
    name: String,
    class: ClassKind,
    source: RwLock<Option<String>>,
    parent: RwLock<Weak<InstanceData>>,
    children: RwLock<Vec<Instance>>,
}

/// Handle to one object of the tree.
#[derive(Clone)]
pub struct Instance(Arc<InstanceData>);

impl Instance {
    /// Create a detached object.
    pub fn new(
        name: impl Into<String>,
        class: ClassKind,
    ) -> Self {
        Self(Arc::new(InstanceData {
            id: INSTANCE_IDS.generate(),
            name: name.into(),
            class,
            source: RwLock::new(None),
            parent: RwLock::new(Weak::new()),
            children: RwLock::new(Vec::new()),
        }))
    }

    /// Create a script object with the given source.
    pub fn script(
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self::new(name, ClassKind::Script).with_source(source)
    }

    /// Create a module object with the given source.
    pub fn module(
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self::new(name, ClassKind::Module).with_source(source)
    }

    /// Create a plain container object.
    pub fn folder(name: impl Into<String>) -> Self {
        Self::new(name, ClassKind::Other("Folder".to_string()))
    }

    /// Set the raw loadable code and return the handle.
    pub fn with_source(
        self,
        source: impl Into<String>,
    ) -> Self {
        *self.0.source.write() = Some(source.into());
        self
    }

    pub fn id(&self) -> InstanceId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn class(&self) -> &ClassKind {
        &self.0.class
    }

    /// Raw loadable code, if any.
    pub fn source(&self) -> Option<String> {
        self.0.source.read().clone()
    }

    pub fn is_script(&self) -> bool {
        self.0.class == ClassKind::Script
    }

    pub fn is_module(&self) -> bool {
        self.0.class == ClassKind::Module
    }

    /// Whether the object holds code the engine can wrap.
    pub fn is_code(&self) -> bool {
        self.is_script() || self.is_module()
    }

    pub fn parent(&self) -> Option<Instance> {
        self.0.parent.read().upgrade().map(Instance)
    }

    /// Whether `ancestor` is a strict ancestor of this object.
    pub fn is_descendant_of(
        &self,
        ancestor: &Instance,
    ) -> bool {
        let mut current = self.parent();
        while let Some(parent) = current {
            if &parent == ancestor {
                return true;
            }
            current = parent.parent();
        }
        false
    }

    /// Move this object under `parent`, detaching it from its previous parent.
    ///
    /// Fails without changing the tree when `parent` is this object or one of
    /// its descendants.
    pub fn set_parent(
        &self,
        parent: Option<&Instance>,
    ) -> Result<(), TreeError> {
        let _guard = REPARENT.lock();

        if let Some(parent) = parent {
            if parent == self || parent.is_descendant_of(self) {
                return Err(TreeError::CircularParent {
                    child: self.full_name(),
                    parent: parent.full_name(),
                });
            }
        }

        if let Some(old) = self.parent() {
            old.0.children.write().retain(|child| child != self);
        }

        match parent {
            Some(parent) => {
                *self.0.parent.write() = Arc::downgrade(&parent.0);
                parent.0.children.write().push(self.clone());
            }
            None => *self.0.parent.write() = Weak::new(),
        }
        Ok(())
    }

    /// Append `child` and return `self` for chaining.
    ///
    /// A circular parenting attempt is logged and ignored.
    pub fn add_child(
        &self,
        child: Instance,
    ) -> &Self {
        if let Err(err) = child.set_parent(Some(self)) {
            warn!("{}", err);
        }
        self
    }

    pub fn children(&self) -> Vec<Instance> {
        self.0.children.read().clone()
    }

    /// Every descendant in pre-order, excluding `self`.
    pub fn descendants(&self) -> Vec<Instance> {
        let mut out = Vec::new();
        let mut stack: Vec<Instance> = self.children().into_iter().rev().collect();

        while let Some(current) = stack.pop() {
            stack.extend(current.children().into_iter().rev());
            out.push(current);
        }

        out
    }

    pub fn find_first_child(
        &self,
        name: &str,
    ) -> Option<Instance> {
        self.0
            .children
            .read()
            .iter()
            .find(|child| child.name() == name)
            .cloned()
    }

    /// Names of all ancestors and `self`, joined with `.`.
    pub fn full_name(&self) -> String {
        let mut parts = vec![self.name().to_string()];
        let mut current = self.parent();

        while let Some(ancestor) = current {
            parts.push(ancestor.name().to_string());
            current = ancestor.parent();
        }

        parts.reverse();
        parts.join(".")
    }
}

impl PartialEq for Instance {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Instance {}

impl Hash for Instance {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Instance {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.0.id.0)
            .field("name", &self.0.name)
            .field("class", &self.0.class.class_name())
            .finish()
    }
}

impl fmt::Display for Instance {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}
