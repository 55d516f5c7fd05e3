//! Accessor compilation.
//!
//! Turns an [`AttributeSpec`] into reader, writer, and predicate closures and
//! installs them through a [`DefinitionContext`]. The closures capture the
//! spec by `Arc`; they never reach back into the registry.
//!
//! Compilation runs in two steps. [`prepare`] checks method names and
//! computes any value that must exist at declaration time, touching
//! nothing. [`install`] then applies the result and cannot fail on names or
//! defaults, so callers compiling several specs can prepare them all before
//! installing any.

use crate::context::{DefinitionContext, MethodBody, Operation};
use crate::error::AttrError;
use crate::spec::{AttributeSpec, Exposure, Scope};
use crate::store::{Entry, ValueStore};
use crate::value::{Args, Value};
use std::sync::Arc;

/// A spec whose accessors have been checked but not installed.
#[derive(Debug, Clone)]
pub struct Prepared {
    spec: Arc<AttributeSpec>,
    plan: Vec<(Operation, String)>,
    eager: Option<Value>,
}

impl Prepared {
    pub fn spec(&self) -> &Arc<AttributeSpec> {
        &self.spec
    }
}

/// Compile `spec` into `context`.
///
/// `type_store` is the store of the type that owns `context`; it is only
/// touched for final type-scoped attributes, which are materialized and
/// locked at declaration time rather than at first read. Without a default
/// such an attribute is locked as `Nil`.
///
/// A failure leaves both the context and the store untouched. Returns the
/// installed method names.
pub fn compile(
    spec: &Arc<AttributeSpec>,
    context: &mut DefinitionContext,
    type_store: &mut ValueStore,
) -> Result<Vec<String>, AttrError> {
    let prepared = prepare(spec, context, type_store)?;
    install(prepared, context, type_store)
}

/// Check every method name and compute the eager value, if any.
pub fn prepare(
    spec: &Arc<AttributeSpec>,
    context: &DefinitionContext,
    type_store: &ValueStore,
) -> Result<Prepared, AttrError> {
    let plan = plan(spec);
    for (_, name) in &plan {
        context.check_available(name)?;
    }

    let eager = if spec.scope() == Scope::Type && spec.is_final() {
        match type_store.entry(spec.storage_key()) {
            Some(entry) if entry.locked => None,
            Some(entry) => Some(entry.value.clone()),
            None => Some(spec.materialize_default()?.unwrap_or_default()),
        }
    } else {
        None
    };

    Ok(Prepared {
        spec: Arc::clone(spec),
        plan,
        eager,
    })
}

/// Store the eager value and install the planned accessors.
pub fn install(
    prepared: Prepared,
    context: &mut DefinitionContext,
    type_store: &mut ValueStore,
) -> Result<Vec<String>, AttrError> {
    let Prepared { spec, plan, eager } = prepared;
    if let Some(value) = eager {
        let key = spec.storage_key();
        if !type_store.is_locked(key) {
            log::debug!("[compiler] `{}` materialized eagerly as {value}", spec.name());
            type_store.insert_entry(key, Entry { value, locked: true });
        }
    }

    if spec.exposure() == Exposure::None {
        log::debug!("[compiler] `{}` has no exposure; no accessors", spec.name());
        return Ok(Vec::new());
    }

    let mut installed = Vec::with_capacity(plan.len());
    for (operation, name) in plan {
        let body = match operation {
            Operation::Reader => reader(&spec),
            Operation::Writer => writer(&spec),
            Operation::Predicate => predicate(&spec),
        };
        context.define_method(&spec, operation, Some(name.clone()), body)?;
        installed.push(name);
    }
    Ok(installed)
}

/// The accessors `spec` calls for, with their method names.
///
/// A reader is always generated when anything is exposed; when exposure
/// omits read it is escalated rather than dropped.
pub fn plan(spec: &AttributeSpec) -> Vec<(Operation, String)> {
    if spec.exposure() == Exposure::None {
        return Vec::new();
    }
    let mut plan = vec![(Operation::Reader, spec.reader_name())];
    if spec.is_writable() {
        plan.push((Operation::Writer, spec.writer_name()));
    }
    if spec.has_predicate() {
        plan.push((Operation::Predicate, spec.predicate_name()));
    }
    plan
}

/// Reader semantics, shared by generated readers and internal fetches.
///
/// Without a stored value, the default is memoized (and locked if final).
/// A final attribute with neither a value nor a default cannot be read.
pub fn read(spec: &AttributeSpec, store: &mut ValueStore) -> Result<Value, AttrError> {
    let key = spec.storage_key();
    if let Some(value) = store.get(key) {
        return Ok(value.clone());
    }
    match spec.default_value() {
        Some(_) => store.memoize(key, spec.is_final(), || {
            spec.materialize_default().map(Option::unwrap_or_default)
        }),
        None if spec.is_final() => Err(AttrError::unassigned(spec.name())),
        None => Ok(Value::Nil),
    }
}

/// Writer semantics: validate writability, transform, store.
pub fn write(spec: &AttributeSpec, store: &mut ValueStore, args: Args) -> Result<Value, AttrError> {
    ensure_writable(spec)?;
    let value = spec.transform(args)?;
    assign(spec, store, value.clone())?;
    Ok(value)
}

/// Store `value` for `spec` without transforming it, honoring final locks.
pub fn assign(spec: &AttributeSpec, store: &mut ValueStore, value: Value) -> Result<(), AttrError> {
    if store.is_locked(spec.storage_key()) {
        return Err(AttrError::reassigned(spec.name()));
    }
    store.set(spec.storage_key(), value, spec.is_final())
}

/// Fail with the most specific error for a spec that rejects writes.
pub fn ensure_writable(spec: &AttributeSpec) -> Result<(), AttrError> {
    if spec.is_final() {
        return Err(AttrError::reassigned(spec.name()));
    }
    if !spec.exposure().includes_write() {
        return Err(AttrError::Readonly {
            name: spec.name().to_string(),
        });
    }
    Ok(())
}

fn expect_no_args(name: &str, args: &Args) -> Result<(), AttrError> {
    if args.is_empty() {
        return Ok(());
    }
    Err(AttrError::Arity {
        name: name.to_string(),
        given: args.len(),
        expected: 0,
    })
}

fn reader(spec: &Arc<AttributeSpec>) -> MethodBody {
    let spec = Arc::clone(spec);
    Arc::new(move |store: &mut ValueStore, args: Args| {
        expect_no_args(spec.name(), &args)?;
        read(&spec, store)
    })
}

fn writer(spec: &Arc<AttributeSpec>) -> MethodBody {
    let spec = Arc::clone(spec);
    Arc::new(move |store: &mut ValueStore, args: Args| write(&spec, store, args))
}

fn predicate(spec: &Arc<AttributeSpec>) -> MethodBody {
    let spec = Arc::clone(spec);
    Arc::new(move |store: &mut ValueStore, args: Args| {
        expect_no_args(&spec.predicate_name(), &args)?;
        Ok(Value::Bool(read(&spec, store)?.truthy()))
    })
}
