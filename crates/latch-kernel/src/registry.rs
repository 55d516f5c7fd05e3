//! Attribute registries and declaration.
//!
//! Every type and every composition unit owns a [`Registry`] with two layers:
//!
//! - **local**: what the owner itself declared, in declaration order. Names
//!   are unique per scope within this layer.
//! - **ancestors**: specs received from a parent type (at subtype creation)
//!   or from composed units (at attachment). Later arrivals take precedence
//!   over earlier ones; the local layer takes precedence over both.
//!
//! Declaring on a type compiles accessors immediately. Declaring on a unit
//! queues the spec; it is compiled into each type the unit is composed into
//! (and straight away into types it is already attached to).

use crate::compiler::{self, Prepared};
use crate::error::AttrError;
use crate::host::{Host, Owner, TypeId, UnitId};
use crate::spec::{AttributeSpec, Scope, SpecKey, Transformer};
use crate::store::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Registry {
    owner: String,
    local: BTreeMap<SpecKey, Arc<AttributeSpec>>,
    declared: Vec<SpecKey>,
    ancestors: BTreeMap<SpecKey, Arc<AttributeSpec>>,
}

impl Registry {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            local: BTreeMap::new(),
            declared: Vec::new(),
            ancestors: BTreeMap::new(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn is_local(&self, key: &SpecKey) -> bool {
        self.local.contains_key(key)
    }

    /// Fail if `key` is already declared locally.
    pub fn ensure_unique(&self, key: &SpecKey) -> Result<(), AttrError> {
        if self.is_local(key) {
            return Err(AttrError::AlreadyDefined {
                name: key.name.clone(),
                owner: self.owner.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn insert_local(&mut self, spec: Arc<AttributeSpec>) -> Result<(), AttrError> {
        let key = spec.key();
        self.ensure_unique(&key)?;
        self.local.insert(key.clone(), spec);
        self.declared.push(key);
        Ok(())
    }

    /// Swap a local spec for one with the same key.
    pub(crate) fn replace_local(
        &mut self,
        spec: Arc<AttributeSpec>,
    ) -> Option<Arc<AttributeSpec>> {
        let key = spec.key();
        if !self.is_local(&key) {
            return None;
        }
        self.local.insert(key, spec)
    }

    /// Record a spec received from an ancestor or a composed unit.
    pub(crate) fn inherit(&mut self, spec: Arc<AttributeSpec>) {
        self.ancestors.insert(spec.key(), spec);
    }

    pub fn local(&self, key: &SpecKey) -> Option<&Arc<AttributeSpec>> {
        self.local.get(key)
    }

    /// Local specs in declaration order.
    pub fn local_specs(&self) -> impl Iterator<Item = &Arc<AttributeSpec>> {
        self.declared.iter().filter_map(|key| self.local.get(key))
    }

    /// Find a spec, consulting the ancestor layer if asked to.
    pub fn lookup(&self, key: &SpecKey, include_ancestors: bool) -> Option<Arc<AttributeSpec>> {
        if let Some(spec) = self.local.get(key) {
            return Some(Arc::clone(spec));
        }
        if include_ancestors {
            return self.ancestors.get(key).cloned();
        }
        None
    }

    /// All visible specs; local entries shadow ancestor entries.
    pub fn merged(&self, include_ancestors: bool) -> BTreeMap<SpecKey, Arc<AttributeSpec>> {
        let mut out = if include_ancestors {
            self.ancestors.clone()
        } else {
            BTreeMap::new()
        };
        for (key, spec) in &self.local {
            out.insert(key.clone(), Arc::clone(spec));
        }
        out
    }

    pub fn len(&self) -> usize {
        self.merged(true).len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.ancestors.is_empty()
    }
}

impl Host {
    /// Register `spec` on `owner`.
    ///
    /// Fails on a duplicate local name. On a type, accessors are compiled
    /// before the spec is recorded, so a failed declaration leaves nothing
    /// behind. On a unit, compilation is deferred until attachment.
    pub fn declare(
        &mut self,
        owner: impl Into<Owner>,
        spec: AttributeSpec,
    ) -> Result<Arc<AttributeSpec>, AttrError> {
        let spec = Arc::new(spec);
        match owner.into() {
            Owner::Type(id) => self.declare_on_type(id, &spec)?,
            Owner::Unit(id) => self.declare_on_unit(id, &spec)?,
        }
        Ok(spec)
    }

    fn declare_on_type(&mut self, id: TypeId, spec: &Arc<AttributeSpec>) -> Result<(), AttrError> {
        self.type_def(id).registry.ensure_unique(&spec.key())?;
        let released = self.release_shadowed(id, spec);
        let installed = match self
            .prepare_for(id, spec)
            .and_then(|prepared| self.install_into(id, prepared))
        {
            Ok(installed) => installed,
            Err(err) => {
                if let Some(entry) = released {
                    self.type_def_mut(id).store.insert_entry(spec.storage_key(), entry);
                }
                return Err(err);
            }
        };
        self.type_def_mut(id).registry.insert_local(Arc::clone(spec))?;
        log::debug!(
            "[registry] {} declared `{}` ({}); installed {installed:?}",
            self.type_def(id).name(),
            spec.name(),
            spec.scope()
        );
        Ok(())
    }

    /// Drop a type-level entry that no local spec of `id` owns.
    ///
    /// Such an entry was copied from the parent or stored through an
    /// inherited or composed accessor; a local declaration starts from its
    /// own default instead.
    fn release_shadowed(&mut self, id: TypeId, spec: &AttributeSpec) -> Option<Entry> {
        if spec.scope() != Scope::Type {
            return None;
        }
        let key = spec.storage_key();
        let ty = self.type_def_mut(id);
        let owned = ty
            .registry
            .local_specs()
            .any(|local| local.scope() == Scope::Type && local.storage_key() == key);
        if owned {
            return None;
        }
        let released = ty.store.remove(key)?;
        log::debug!("[registry] {} releases inherited value for `{}`", ty.name, spec.name());
        Some(released)
    }

    fn declare_on_unit(&mut self, id: UnitId, spec: &Arc<AttributeSpec>) -> Result<(), AttrError> {
        let key = spec.key();
        self.unit_def(id).registry.ensure_unique(&key)?;

        let targets: Vec<TypeId> = self
            .unit_def(id)
            .attached
            .iter()
            .copied()
            .filter(|ty| !self.type_def(*ty).registry.is_local(&key))
            .collect();
        if targets.is_empty() {
            log::debug!(
                "[registry] {} deferred `{}` until attachment",
                self.unit_def(id).name(),
                spec.name()
            );
        }
        let prepared = targets
            .iter()
            .map(|ty| self.prepare_for(*ty, spec).map(|prepared| (*ty, prepared)))
            .collect::<Result<Vec<_>, AttrError>>()?;
        for (ty, prepared) in prepared {
            self.install_into(ty, prepared)?;
            self.type_def_mut(ty).registry.inherit(Arc::clone(spec));
        }
        self.unit_def_mut(id).registry.insert_local(Arc::clone(spec))
    }

    /// Attach `unit` to `id`, compiling its queued specs into the type.
    ///
    /// Specs the type declares locally are skipped. Attaching twice is a
    /// no-op. Every spec is prepared (names checked, eager values computed)
    /// before anything is installed.
    pub fn compose(&mut self, id: TypeId, unit: UnitId) -> Result<(), AttrError> {
        if self.type_def(id).units.contains(&unit) {
            return Ok(());
        }
        let prepared = self
            .unit_def(unit)
            .pending()
            .filter(|spec| !self.type_def(id).registry.is_local(&spec.key()))
            .map(|spec| self.prepare_for(id, spec))
            .collect::<Result<Vec<_>, AttrError>>()?;
        for prepared in prepared {
            let spec = Arc::clone(prepared.spec());
            self.install_into(id, prepared)?;
            self.type_def_mut(id).registry.inherit(spec);
        }
        self.type_def_mut(id).units.push(unit);
        self.unit_def_mut(unit).attached.push(id);
        log::debug!(
            "[registry] composed {} into {}",
            self.unit_def(unit).name(),
            self.type_def(id).name()
        );
        Ok(())
    }

    /// Look up a spec visible from `owner`.
    pub fn lookup(
        &self,
        owner: impl Into<Owner>,
        key: &SpecKey,
        include_ancestors: bool,
    ) -> Option<Arc<AttributeSpec>> {
        self.registry_of(owner.into()).lookup(key, include_ancestors)
    }

    /// Every spec visible from `owner`, keyed by scope and name.
    pub fn lookup_all(
        &self,
        owner: impl Into<Owner>,
        include_ancestors: bool,
    ) -> BTreeMap<SpecKey, Arc<AttributeSpec>> {
        self.registry_of(owner.into()).merged(include_ancestors)
    }

    pub fn registry_of(&self, owner: Owner) -> &Registry {
        match owner {
            Owner::Type(id) => &self.type_def(id).registry,
            Owner::Unit(id) => &self.unit_def(id).registry,
        }
    }

    /// Replace the transformer of a locally declared attribute.
    ///
    /// The type's own accessors for it are removed and recompiled; methods
    /// installed by anyone else are untouched.
    pub fn redefine_transformer(
        &mut self,
        id: TypeId,
        key: &SpecKey,
        transformer: Transformer,
    ) -> Result<Arc<AttributeSpec>, AttrError> {
        let ty = self.type_def_mut(id);
        let Some(current) = ty.registry.local(key) else {
            return Err(AttrError::NotDefined {
                name: key.name.clone(),
                owner: ty.name.clone(),
            });
        };
        let replaced = Arc::new(current.with_transformer(transformer));
        let (context, store) = ty.parts_mut(key.scope);
        for name in context.accessors_for(key) {
            context.undefine(&name);
        }
        compiler::compile(&replaced, context, store)?;
        ty.registry.replace_local(Arc::clone(&replaced));
        log::debug!("[registry] {} redefined `{}`", ty.name, key.name);
        Ok(replaced)
    }

    fn prepare_for(&self, id: TypeId, spec: &Arc<AttributeSpec>) -> Result<Prepared, AttrError> {
        let ty = self.type_def(id);
        compiler::prepare(spec, ty.context(spec.scope()), ty.store())
    }

    fn install_into(&mut self, id: TypeId, prepared: Prepared) -> Result<Vec<String>, AttrError> {
        let (context, store) = self.type_def_mut(id).parts_mut(prepared.spec().scope());
        compiler::install(prepared, context, store)
    }
}
