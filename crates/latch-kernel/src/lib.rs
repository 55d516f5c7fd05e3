//! # Latch Kernel
//!
//! Attribute metadata for host types: each declared attribute becomes an
//! immutable [`AttributeSpec`], its value lives in a per-owner
//! [`ValueStore`], and access goes through generated reader, writer, and
//! predicate methods.
//!
//! This crate is **declaration-agnostic**: it does not prescribe a surface
//! syntax for declaring attributes. It only prescribes how declared
//! attributes behave under access, composition, and subtyping.
//!
//! ## Architecture
//!
//! ```text
//! AttributeSpec         ← Validated, immutable description of one attribute
//!     │
//! ValueStore            ← Per-instance / per-type storage with final locks
//!     │
//! DefinitionContext     ← Method table that remembers what it installed
//!     │
//! compiler              ← Spec → reader / writer / predicate closures
//!     │
//! Registry              ← Local + inherited specs per type or unit
//!     │
//! propagate             ← Subtype creation and instance copying
//! ```

pub mod compiler;
pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod propagate;
pub mod registry;
pub mod spec;
pub mod store;
pub mod value;

pub use config::{ConfigError, DuplicationPolicy, KernelConfig};
pub use context::{ContextId, DefinitionContext, Method, MethodBody, Operation};
pub use error::{AttrError, FinalViolation};
pub use host::{CallSite, Host, Instance, Owner, TypeDef, TypeId, UnitDef, UnitId};
pub use propagate::duplicate_value;
pub use registry::Registry;
pub use spec::{
    AttributeOptions, AttributeSpec, DefaultValue, Exposure, Scope, SpecKey, Transformer,
    Visibility,
};
pub use store::{Entry, ValueStore};
pub use value::{Args, Duplicate, Duplicated, HostObject, Value};
