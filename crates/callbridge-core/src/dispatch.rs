//! Typed table of native callbacks.
//!
//! Native code hands the bridge an integer *callback index* instead of a
//! function pointer.  Each index is registered together with a [`Signature`],
//! and every invocation checks the arguments against it before the callback
//! runs, so a mismatched call is an error value rather than undefined
//! behaviour.
//!
//! Index 0 is the null callback.  Passing it means "no callback" and
//! [`DispatchTable::invoke`] reports [`DispatchError::NullCallback`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scalar types a callback can take or return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    I32,
    F32,
    F64,
    Void,
}

/// A typed scalar passed to or returned from a callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    F32(f32),
    F64(f64),
    Void,
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
            Value::Void => ValueType::Void,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }
}

/// Parameter and return types of a callback.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub params: Vec<ValueType>,
    pub ret: ValueType,
}

impl Signature {
    pub fn new(params: &[ValueType], ret: ValueType) -> Self {
        Self {
            params: params.to_vec(),
            ret,
        }
    }

    /// `(i32 handle, i32 event_code, i32 user_data) -> void`, used by every
    /// handle-table resource event.
    pub fn resource_event() -> Self {
        Self::new(&[ValueType::I32, ValueType::I32, ValueType::I32], ValueType::Void)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p:?}")?;
        }
        write!(f, ") -> {:?}", self.ret)
    }
}

/// Index of a registered callback.  `0` is the null callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackIndex(pub u32);

impl CallbackIndex {
    pub const NULL: CallbackIndex = CallbackIndex(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum DispatchError {
    #[error("null callback invoked")]
    NullCallback,

    #[error("no callback registered at index {0}")]
    UnknownIndex(u32),

    #[error("callback expects {expected} arguments, got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("argument {position} should be {expected:?}, got {actual:?}")]
    ArgumentType {
        position: usize,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("callback returned {actual:?}, signature says {expected:?}")]
    ReturnType { expected: ValueType, actual: ValueType },

    #[error("signature cannot take a Void parameter")]
    VoidParameter,
}

type CallbackFn = dyn Fn(&[Value]) -> Value + Send + Sync;

/// A registered callback with its signature.
///
/// Cheap to clone, so a caller holding the table behind a lock can take a
/// copy and invoke it after releasing the lock.
#[derive(Clone)]
pub struct TypedCallback {
    signature: Signature,
    func: Arc<CallbackFn>,
}

impl TypedCallback {
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Checks `args` against the signature, then runs the callback.
    pub fn call(&self, args: &[Value]) -> Result<Value, DispatchError> {
        if args.len() != self.signature.params.len() {
            return Err(DispatchError::Arity {
                expected: self.signature.params.len(),
                actual: args.len(),
            });
        }
        for (position, (arg, expected)) in args.iter().zip(&self.signature.params).enumerate() {
            if arg.value_type() != *expected {
                return Err(DispatchError::ArgumentType {
                    position,
                    expected: *expected,
                    actual: arg.value_type(),
                });
            }
        }
        let result = (self.func)(args);
        if result.value_type() != self.signature.ret {
            return Err(DispatchError::ReturnType {
                expected: self.signature.ret,
                actual: result.value_type(),
            });
        }
        Ok(result)
    }
}

impl fmt::Debug for TypedCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedCallback")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// Append-only table of typed callbacks.
#[derive(Debug, Default)]
pub struct DispatchTable {
    // Slot 0 of the index space is the null callback, so entry i lives at i - 1.
    entries: Vec<TypedCallback>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `func` under `signature` and returns its index (never 0).
    pub fn register<F>(&mut self, signature: Signature, func: F) -> Result<CallbackIndex, DispatchError>
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        if signature.params.contains(&ValueType::Void) {
            return Err(DispatchError::VoidParameter);
        }
        self.entries.push(TypedCallback {
            signature,
            func: Arc::new(func),
        });
        Ok(CallbackIndex(self.entries.len() as u32))
    }

    /// Registers a resource-event callback taking `(handle, event_code, user_data)`.
    pub fn register_resource_callback<F>(&mut self, func: F) -> CallbackIndex
    where
        F: Fn(i32, i32, i32) + Send + Sync + 'static,
    {
        self.entries.push(TypedCallback {
            signature: Signature::resource_event(),
            func: Arc::new(move |args: &[Value]| {
                if let [Value::I32(handle), Value::I32(code), Value::I32(user_data)] = args {
                    func(*handle, *code, *user_data);
                }
                Value::Void
            }),
        });
        CallbackIndex(self.entries.len() as u32)
    }

    /// Looks up the callback at `index`.
    pub fn get(&self, index: CallbackIndex) -> Result<TypedCallback, DispatchError> {
        if index.is_null() {
            return Err(DispatchError::NullCallback);
        }
        self.entries
            .get(index.0 as usize - 1)
            .cloned()
            .ok_or(DispatchError::UnknownIndex(index.0))
    }

    /// Type-checks `args` and invokes the callback at `index`.
    pub fn invoke(&self, index: CallbackIndex, args: &[Value]) -> Result<Value, DispatchError> {
        self.get(index)?.call(args)
    }

    /// Whether `index` refers to a callback with exactly `signature`.
    pub fn matches(&self, index: CallbackIndex, signature: &Signature) -> bool {
        self.get(index)
            .map(|cb| cb.signature == *signature)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
