//! Inheritance propagation.
//!
//! Specs are immutable, so a subtype receives its parent's specs by
//! reference. Stored values are not: every value is copied independently
//! into the new type (or the new instance), so mutating the copy is never
//! observable from the parent or from siblings.
//!
//! A value that cannot be copied (frozen, or a host object reporting
//! `Unsupported`) is shared by reference. A copy that fails outright either
//! aborts propagation or falls back to sharing, per
//! [`DuplicationPolicy`](crate::config::DuplicationPolicy).

use crate::config::DuplicationPolicy;
use crate::error::AttrError;
use crate::host::{Host, Instance, Owner, TypeId};
use crate::spec::Scope;
use crate::store::{Entry, ValueStore};
use crate::value::{Duplicated, Value};
use std::collections::BTreeMap;

impl Host {
    /// Create a subtype of `parent`, carrying over its specs and
    /// independent copies of its type-level values.
    ///
    /// Runs to completion before the subtype id is handed out; on a
    /// duplication failure no type is created.
    pub fn define_subtype(&mut self, name: &str, parent: TypeId) -> Result<TypeId, AttrError> {
        let specs = self.lookup_all(Owner::Type(parent), true);
        let keys: BTreeMap<String, String> = specs
            .values()
            .filter(|spec| spec.scope() == Scope::Type)
            .map(|spec| (spec.storage_key().to_string(), spec.name().to_string()))
            .collect();
        let store = duplicate_store(
            &self.type_def(parent).store,
            &keys,
            self.config.propagation.on_duplication_failure,
        )?;

        let id = self.push_type(name, Some(parent));
        let ty = self.type_def_mut(id);
        for spec in specs.into_values() {
            ty.registry.inherit(spec);
        }
        ty.store = store;
        log::debug!(
            "[propagate] {name} inherits {} specs and {} stored values",
            ty.registry.len(),
            ty.store.len()
        );
        Ok(id)
    }

    /// Copy an instance, duplicating each of its stored values.
    pub fn duplicate_instance(&self, instance: &Instance) -> Result<Instance, AttrError> {
        let keys: BTreeMap<String, String> = self
            .lookup_all(Owner::Type(instance.type_id), true)
            .values()
            .filter(|spec| spec.scope() == Scope::Instance)
            .map(|spec| (spec.storage_key().to_string(), spec.name().to_string()))
            .collect();
        let store = duplicate_store(
            &instance.store,
            &keys,
            self.config.propagation.on_duplication_failure,
        )?;
        Ok(Instance {
            type_id: instance.type_id,
            store,
        })
    }
}

/// Copy the entries of `source` named in `keys` (storage key → attribute
/// name), preserving lock flags.
fn duplicate_store(
    source: &ValueStore,
    keys: &BTreeMap<String, String>,
    policy: DuplicationPolicy,
) -> Result<ValueStore, AttrError> {
    let mut out = ValueStore::new();
    for (key, name) in keys {
        let Some(entry) = source.entry(key) else {
            continue;
        };
        let value = duplicate_value(name, &entry.value, policy)?;
        out.insert_entry(
            key,
            Entry {
                value,
                locked: entry.locked,
            },
        );
    }
    Ok(out)
}

/// Independently copy one stored value for attribute `name`.
pub fn duplicate_value(
    name: &str,
    value: &Value,
    policy: DuplicationPolicy,
) -> Result<Value, AttrError> {
    match value.duplicate() {
        Ok(Duplicated::Copied(copy)) => Ok(copy),
        Ok(Duplicated::Shared(shared)) => {
            log::debug!("[propagate] `{name}` is not copyable; sharing the reference");
            Ok(shared)
        }
        Err(failure) => match policy {
            DuplicationPolicy::Fail => Err(AttrError::Duplication {
                name: name.to_string(),
                class: failure.class,
                message: failure.message,
            }),
            DuplicationPolicy::Share => {
                log::warn!(
                    "[propagate] duplicating `{name}` ({}) failed: {}; sharing the original",
                    failure.class,
                    failure.message
                );
                Ok(value.clone())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::spec::{AttributeOptions, AttributeSpec, DefaultValue};
    use crate::value::tests::Bag;
    use crate::value::{Duplicate, HostObject};
    use std::any::Any;

    #[derive(Debug)]
    struct Socket;

    impl HostObject for Socket {
        fn class_name(&self) -> &str {
            "Socket"
        }

        fn duplicate(&self) -> Duplicate {
            Duplicate::Failed("file descriptors cannot be copied".to_string())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn type_attr(name: &str, default: Option<DefaultValue>) -> AttributeSpec {
        AttributeSpec::construct(name, default, &AttributeOptions::new().scope(Scope::Type), None)
            .unwrap()
    }

    #[test]
    fn subtype_gets_an_independent_copy() {
        let mut host = Host::new();
        let parent = host.define_type("Parent");
        host.declare(parent, type_attr("bag", None)).unwrap();
        host.assign_type(parent, "bag", Value::object(Bag::default()))
            .unwrap();

        let child = host.define_subtype("Child", parent).unwrap();
        let child_bag = host.read_type(child, "bag").unwrap();
        child_bag.downcast_ref::<Bag>().unwrap().push(7);

        let parent_bag = host.read_type(parent, "bag").unwrap();
        assert!(parent_bag.downcast_ref::<Bag>().unwrap().snapshot().is_empty());
        assert_eq!(child_bag.downcast_ref::<Bag>().unwrap().snapshot(), vec![7]);
    }

    #[test]
    fn locks_survive_propagation() {
        let mut host = Host::new();
        let parent = host.define_type("Parent");
        let spec = AttributeSpec::construct(
            "version",
            Some(DefaultValue::value("1.0")),
            &AttributeOptions::new().scope(Scope::Type).final_(true),
            None,
        )
        .unwrap();
        host.declare(parent, spec).unwrap();
        let child = host.define_subtype("Child", parent).unwrap();
        assert!(host.type_def(child).store().is_locked("version"));
        assert!(host.assign_type(child, "version", "2.0").unwrap_err().is_final());
    }

    #[test]
    fn failing_copy_aborts_by_default() {
        let mut host = Host::new();
        let parent = host.define_type("Parent");
        host.declare(parent, type_attr("conn", None)).unwrap();
        host.assign_type(parent, "conn", Value::object(Socket)).unwrap();

        let err = host.define_subtype("Child", parent).unwrap_err();
        assert!(matches!(err, AttrError::Duplication { ref class, .. } if class == "Socket"));
        assert_eq!(host.types().count(), 1);
    }

    #[test]
    fn failing_copy_can_share_instead() {
        let mut config = KernelConfig::default();
        config.propagation.on_duplication_failure = DuplicationPolicy::Share;
        let mut host = Host::with_config(config);
        let parent = host.define_type("Parent");
        host.declare(parent, type_attr("conn", None)).unwrap();
        host.assign_type(parent, "conn", Value::object(Socket)).unwrap();

        let child = host.define_subtype("Child", parent).unwrap();
        assert_eq!(
            host.read_type(child, "conn").unwrap(),
            host.read_type(parent, "conn").unwrap()
        );
    }

    #[test]
    fn duplicated_instance_is_isolated() {
        let mut host = Host::new();
        let ty = host.define_type("Basket");
        let items = AttributeSpec::construct(
            "items",
            Some(DefaultValue::value(Value::List(vec![]))),
            &AttributeOptions::new(),
            None,
        )
        .unwrap();
        host.declare(ty, items).unwrap();
        let mut original = host.instantiate(ty);
        host.write(&mut original, "items", Value::List(vec![Value::Int(1)]))
            .unwrap();

        let mut copy = host.duplicate_instance(&original).unwrap();
        host.write(&mut copy, "items", Value::List(vec![])).unwrap();
        assert_eq!(
            host.read(&mut original, "items").unwrap(),
            Value::List(vec![Value::Int(1)])
        );
    }
}
