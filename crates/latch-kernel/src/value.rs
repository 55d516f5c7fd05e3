//! Dynamic attribute values.
//!
//! Attribute storage is untyped: a host type may keep integers, strings,
//! collections, or arbitrary host objects behind the same accessor surface.
//! Scalars are immutable and can be handed out freely. Lists, maps, and
//! unfrozen host objects are mutable, so anything that must not be shared
//! across instances or subtypes goes through [`Value::duplicate`].
//!
//! Host objects opt into copying through [`HostObject::duplicate`]; there is
//! no implicit structural clone for them.

use serde_json::Value as Json;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Outcome of asking a host object for an independent copy.
#[derive(Debug, Clone)]
pub enum Duplicate {
    /// A fresh object that shares no mutable state with the original.
    Copied(Arc<dyn HostObject>),

    /// The object cannot be copied (frozen, identity-bearing, or a handle).
    /// Callers fall back to sharing the original reference.
    Unsupported,

    /// Copying was attempted and failed.
    Failed(String),
}

/// An opaque value owned by the host program.
pub trait HostObject: fmt::Debug + Send + Sync + 'static {
    /// Class name used in diagnostics and introspection.
    fn class_name(&self) -> &str;

    /// Produce an independent copy of this object.
    fn duplicate(&self) -> Duplicate;

    /// Frozen objects are treated like scalars: never copied.
    fn is_frozen(&self) -> bool {
        false
    }

    fn truthy(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any;
}

/// A runtime attribute value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Object(Arc<dyn HostObject>),
}

/// Result of [`Value::duplicate`].
#[derive(Debug, Clone)]
pub enum Duplicated {
    /// Structurally independent of the source.
    Copied(Value),

    /// The source (or part of it) could not be copied and is shared.
    Shared(Value),
}

impl Duplicated {
    pub fn into_value(self) -> Value {
        match self {
            Self::Copied(value) | Self::Shared(value) => value,
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }
}

impl Value {
    pub fn object(object: impl HostObject) -> Self {
        Self::Object(Arc::new(object))
    }

    /// Predicate coercion: only `Nil` and `false` are falsy.
    pub fn truthy(&self) -> bool {
        match self {
            Self::Nil => false,
            Self::Bool(flag) => *flag,
            Self::Object(object) => object.truthy(),
            _ => true,
        }
    }

    /// Whether handing this value to two owners would let one observe the
    /// other's mutations.
    pub fn is_mutable(&self) -> bool {
        match self {
            Self::List(_) | Self::Map(_) => true,
            Self::Object(object) => !object.is_frozen(),
            _ => false,
        }
    }

    /// Produce a copy that shares no mutable state with `self`.
    ///
    /// Lists and maps are rebuilt element by element. Host objects decide
    /// for themselves; an `Unsupported` object is shared by reference and
    /// the result is reported as [`Duplicated::Shared`]. A `Failed` object
    /// aborts the whole copy with its message.
    pub fn duplicate(&self) -> Result<Duplicated, DuplicateFailure> {
        match self {
            Self::List(items) => {
                let mut shared = false;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let copy = item.duplicate()?;
                    shared |= copy.is_shared();
                    out.push(copy.into_value());
                }
                Ok(wrap(Self::List(out), shared))
            }
            Self::Map(entries) => {
                let mut shared = false;
                let mut out = BTreeMap::new();
                for (key, item) in entries {
                    let copy = item.duplicate()?;
                    shared |= copy.is_shared();
                    out.insert(key.clone(), copy.into_value());
                }
                Ok(wrap(Self::Map(out), shared))
            }
            Self::Object(object) if object.is_frozen() => Ok(Duplicated::Shared(self.clone())),
            Self::Object(object) => match object.duplicate() {
                Duplicate::Copied(copy) => Ok(Duplicated::Copied(Self::Object(copy))),
                Duplicate::Unsupported => Ok(Duplicated::Shared(self.clone())),
                Duplicate::Failed(message) => Err(DuplicateFailure {
                    class: object.class_name().to_string(),
                    message,
                }),
            },
            scalar => Ok(Duplicated::Copied(scalar.clone())),
        }
    }

    pub fn class_name(&self) -> &str {
        match self {
            Self::Nil => "Nil",
            Self::Bool(_) => "Bool",
            Self::Int(_) => "Int",
            Self::Float(_) => "Float",
            Self::Str(_) => "Str",
            Self::List(_) => "List",
            Self::Map(_) => "Map",
            Self::Object(object) => object.class_name(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Downcast a host object to its concrete type.
    pub fn downcast_ref<T: HostObject>(&self) -> Option<&T> {
        match self {
            Self::Object(object) => object.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Render as JSON. Host objects become `"#<ClassName>"`.
    pub fn to_json(&self) -> Json {
        match self {
            Self::Nil => Json::Null,
            Self::Bool(flag) => Json::Bool(*flag),
            Self::Int(n) => Json::from(*n),
            Self::Float(x) => serde_json::Number::from_f64(*x)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Self::Str(s) => Json::String(s.clone()),
            Self::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Self::Map(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(key, item)| (key.clone(), item.to_json()))
                    .collect(),
            ),
            Self::Object(object) => Json::String(format!("#<{}>", object.class_name())),
        }
    }
}

fn wrap(value: Value, shared: bool) -> Duplicated {
    if shared {
        Duplicated::Shared(value)
    } else {
        Duplicated::Copied(value)
    }
}

/// A host object refused to be copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateFailure {
    pub class: String,
    pub message: String,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Self::Bool(flag)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self::Map(entries)
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Self::Nil,
            Json::Bool(flag) => Self::Bool(flag),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Self::Str(s),
            Json::Array(items) => Self::List(items.into_iter().map(Value::from).collect()),
            Json::Object(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(key, item)| (key, Value::from(item)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "nil"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Object(object) => write!(f, "#<{}>", object.class_name()),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

/// Arguments passed to a generated method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keywords: BTreeMap<String, Value>,
}

impl Args {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn one(value: impl Into<Value>) -> Self {
        Self {
            positional: vec![value.into()],
            keywords: BTreeMap::new(),
        }
    }

    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            keywords: BTreeMap::new(),
        }
    }

    pub fn keyword(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keywords.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.keywords.len()
    }
}
