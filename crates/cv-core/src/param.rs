//! Reactive parameters
//!
//! A [`Param`] is a shared cell holding a scalar or array value. Updating a
//! param notifies every subscriber synchronously, before `update` returns.
//! Listener lists are snapshotted under the lock and the lock is released
//! before callbacks run, so callbacks may subscribe or unsubscribe freely.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};

use crate::error::Result;
use crate::value::Value;

/// Identifier returned by `subscribe`, accepted by `unsubscribe`
pub type ListenerId = u64;

/// Stable identity of a param
pub type ParamId = u64;

type ParamListener = dyn Fn(&ParamValue) -> Result<()> + Send + Sync;

static NEXT_PARAM_ID: AtomicU64 = AtomicU64::new(1);

/// Current value of a param
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Scalar(Value),
    Array(Vec<Value>),
}

impl ParamValue {
    /// The scalar value, or `None` for arrays
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            ParamValue::Scalar(v) => Some(v),
            ParamValue::Array(_) => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            ParamValue::Scalar(_) => None,
            ParamValue::Array(values) => Some(values),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Scalar(v) => write!(f, "{}", v),
            ParamValue::Array(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<Value> for ParamValue {
    fn from(v: Value) -> Self {
        ParamValue::Scalar(v)
    }
}

impl From<Vec<Value>> for ParamValue {
    fn from(values: Vec<Value>) -> Self {
        ParamValue::Array(values)
    }
}

macro_rules! impl_scalar_param_value {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ParamValue {
                fn from(v: $t) -> Self {
                    ParamValue::Scalar(Value::from(v))
                }
            }
        )*
    }
}

impl_scalar_param_value!(i32, i64, u32, f64, bool, &str, String);

struct ParamInner {
    id: ParamId,
    value: RwLock<ParamValue>,
    listeners: Mutex<Vec<(ListenerId, Arc<ParamListener>)>>,
    next_listener: AtomicU64,
}

/// A reactive value cell. Cloning yields another handle to the same cell.
#[derive(Clone)]
pub struct Param {
    inner: Arc<ParamInner>,
}

impl Param {
    /// Create a scalar param
    pub fn new(value: impl Into<Value>) -> Self {
        Self::with_value(ParamValue::Scalar(value.into()))
    }

    /// Create an array param
    pub fn array(values: impl IntoIterator<Item = Value>) -> Self {
        Self::with_value(ParamValue::Array(values.into_iter().collect()))
    }

    fn with_value(value: ParamValue) -> Self {
        Self {
            inner: Arc::new(ParamInner {
                id: NEXT_PARAM_ID.fetch_add(1, Ordering::Relaxed),
                value: RwLock::new(value),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    pub fn id(&self) -> ParamId {
        self.inner.id
    }

    /// Current value
    pub fn value(&self) -> ParamValue {
        self.inner.value.read().clone()
    }

    /// Replace the value and notify subscribers.
    ///
    /// Returns `false` without notifying when the new value equals the
    /// current one.
    pub fn update(&self, value: impl Into<ParamValue>) -> bool {
        let value = value.into();
        {
            let mut current = self.inner.value.write();
            if *current == value {
                return false;
            }
            *current = value.clone();
        }

        tracing::trace!("Param {} updated to {}", self.inner.id, value);

        let snapshot: Vec<(ListenerId, Arc<ParamListener>)> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(id, cb)| (*id, Arc::clone(cb)))
            .collect();

        for (listener_id, cb) in snapshot {
            if let Err(e) = cb(&value) {
                tracing::error!("Param {} listener {} failed: {}", self.inner.id, listener_id, e);
            }
        }
        true
    }

    /// Register a callback invoked with every new value
    pub fn subscribe(
        &self,
        callback: impl Fn(&ParamValue) -> Result<()> + Send + Sync + 'static,
    ) -> ListenerId {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback; unknown ids are ignored
    pub fn unsubscribe(&self, id: ListenerId) {
        self.inner.listeners.lock().retain(|(lid, _)| *lid != id);
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    pub fn ptr_eq(&self, other: &Param) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .finish()
    }
}
