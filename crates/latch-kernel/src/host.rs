//! The host object model accessors are installed into.
//!
//! A [`Host`] is an arena of types and composition units. Instances are owned
//! by the caller and only carry their type id plus their own value store, so
//! two instances never share storage.
//!
//! Method dispatch walks the receiver's lineage (the type itself, then its
//! parents) and checks the found method's visibility against the
//! [`CallSite`].

use crate::compiler;
use crate::config::KernelConfig;
use crate::context::{ContextId, DefinitionContext, Method, MethodBody};
use crate::error::AttrError;
use crate::registry::Registry;
use crate::spec::{AttributeSpec, Scope, SpecKey, Visibility};
use crate::store::ValueStore;
use crate::value::{Args, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Handle to a type. Only meaningful for the [`Host`] that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeId(pub usize);

/// Handle to a composition unit. Only meaningful for the issuing [`Host`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(pub usize);

/// Who a declaration belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Owner {
    Type(TypeId),
    Unit(UnitId),
}

impl From<TypeId> for Owner {
    fn from(id: TypeId) -> Self {
        Self::Type(id)
    }
}

impl From<UnitId> for Owner {
    fn from(id: UnitId) -> Self {
        Self::Unit(id)
    }
}

/// Where a call comes from, for visibility checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSite {
    /// Outside code: public methods only.
    External,

    /// Code running on behalf of an object of the given type: public, plus
    /// protected methods whose owner is that type or one of its ancestors.
    Lineage(TypeId),

    /// The receiver calling itself: everything.
    SelfCall,
}

/// A concrete type: registry, type-level store, and two method tables.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub(crate) id: TypeId,
    pub(crate) name: String,
    pub(crate) parent: Option<TypeId>,
    pub(crate) units: Vec<UnitId>,
    pub(crate) registry: Registry,
    pub(crate) type_context: DefinitionContext,
    pub(crate) instance_context: DefinitionContext,
    pub(crate) store: ValueStore,
}

impl TypeDef {
    fn new(id: TypeId, name: &str, parent: Option<TypeId>) -> Self {
        Self {
            id,
            name: name.to_string(),
            parent,
            units: Vec::new(),
            registry: Registry::new(name),
            type_context: DefinitionContext::new(
                ContextId::new(format!("{}#{}:type", id.0, name)),
                name,
                Scope::Type,
            ),
            instance_context: DefinitionContext::new(
                ContextId::new(format!("{}#{}:instance", id.0, name)),
                format!("#<{name}>"),
                Scope::Instance,
            ),
            store: ValueStore::new(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<TypeId> {
        self.parent
    }

    /// Attached composition units, in attachment order.
    pub fn units(&self) -> &[UnitId] {
        &self.units
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The context installing methods for `scope`.
    pub fn context(&self, scope: Scope) -> &DefinitionContext {
        match scope {
            Scope::Type => &self.type_context,
            Scope::Instance => &self.instance_context,
        }
    }

    /// Type-level storage.
    pub fn store(&self) -> &ValueStore {
        &self.store
    }

    pub(crate) fn parts_mut(&mut self, scope: Scope) -> (&mut DefinitionContext, &mut ValueStore) {
        match scope {
            Scope::Type => (&mut self.type_context, &mut self.store),
            Scope::Instance => (&mut self.instance_context, &mut self.store),
        }
    }
}

/// A reusable bundle of declarations, attached to types on demand.
#[derive(Debug, Clone)]
pub struct UnitDef {
    pub(crate) id: UnitId,
    pub(crate) name: String,
    pub(crate) registry: Registry,
    pub(crate) attached: Vec<TypeId>,
}

impl UnitDef {
    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Types this unit has been composed into.
    pub fn attached(&self) -> &[TypeId] {
        &self.attached
    }

    /// Specs applied at every attachment, in declaration order.
    pub fn pending(&self) -> impl Iterator<Item = &Arc<AttributeSpec>> {
        self.registry.local_specs()
    }
}

/// An object of some host type, owning its own storage.
#[derive(Debug, Clone)]
pub struct Instance {
    pub(crate) type_id: TypeId,
    pub(crate) store: ValueStore,
}

impl Instance {
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn store(&self) -> &ValueStore {
        &self.store
    }
}

/// Arena of types and composition units.
#[derive(Debug, Clone, Default)]
pub struct Host {
    pub(crate) config: KernelConfig,
    pub(crate) types: Vec<TypeDef>,
    pub(crate) units: Vec<UnitDef>,
}

impl Host {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: KernelConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn define_type(&mut self, name: &str) -> TypeId {
        self.push_type(name, None)
    }

    pub(crate) fn push_type(&mut self, name: &str, parent: Option<TypeId>) -> TypeId {
        let id = TypeId(self.types.len());
        self.types.push(TypeDef::new(id, name, parent));
        log::debug!("[host] defined type {name} ({})", id.0);
        id
    }

    pub fn define_unit(&mut self, name: &str) -> UnitId {
        let id = UnitId(self.units.len());
        self.units.push(UnitDef {
            id,
            name: name.to_string(),
            registry: Registry::new(name),
            attached: Vec::new(),
        });
        log::debug!("[host] defined unit {name} ({})", id.0);
        id
    }

    pub fn type_def(&self, id: TypeId) -> &TypeDef {
        &self.types[id.0]
    }

    pub(crate) fn type_def_mut(&mut self, id: TypeId) -> &mut TypeDef {
        &mut self.types[id.0]
    }

    pub fn unit_def(&self, id: UnitId) -> &UnitDef {
        &self.units[id.0]
    }

    pub(crate) fn unit_def_mut(&mut self, id: UnitId) -> &mut UnitDef {
        &mut self.units[id.0]
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.iter()
    }

    pub fn owner_name(&self, owner: Owner) -> &str {
        match owner {
            Owner::Type(id) => self.type_def(id).name(),
            Owner::Unit(id) => self.unit_def(id).name(),
        }
    }

    /// `id` followed by its ancestors, nearest first.
    pub fn lineage(&self, id: TypeId) -> Vec<TypeId> {
        let mut out = vec![id];
        let mut current = self.type_def(id).parent;
        while let Some(parent) = current {
            out.push(parent);
            current = self.type_def(parent).parent;
        }
        out
    }

    /// Whether `sub` is `sup` or one of its descendants.
    pub fn is_a(&self, sub: TypeId, sup: TypeId) -> bool {
        self.lineage(sub).contains(&sup)
    }

    pub fn instantiate(&self, id: TypeId) -> Instance {
        Instance {
            type_id: id,
            store: ValueStore::new(),
        }
    }

    /// Define a method directly, as host code would.
    ///
    /// Accessor generation refuses to overwrite such methods.
    pub fn define_method(
        &mut self,
        id: TypeId,
        scope: Scope,
        name: &str,
        visibility: Visibility,
        body: MethodBody,
    ) {
        let (context, _) = self.type_def_mut(id).parts_mut(scope);
        context.define_host_method(name, visibility, body);
    }

    /// Find `name` in the method tables of `id`'s lineage.
    pub fn resolve(&self, id: TypeId, scope: Scope, name: &str) -> Option<(TypeId, &Method)> {
        self.lineage(id).into_iter().find_map(|owner| {
            self.type_def(owner)
                .context(scope)
                .method(name)
                .map(|method| (owner, method))
        })
    }

    fn dispatch(
        &self,
        id: TypeId,
        scope: Scope,
        name: &str,
        site: CallSite,
    ) -> Result<MethodBody, AttrError> {
        let target = self.type_def(id).context(scope).target().to_string();
        let Some((owner, method)) = self.resolve(id, scope, name) else {
            return Err(AttrError::NoMethod {
                name: name.to_string(),
                target,
            });
        };
        let allowed = match (method.visibility, site) {
            (Visibility::Public, _) | (_, CallSite::SelfCall) => true,
            (Visibility::Protected, CallSite::Lineage(caller)) => self.is_a(caller, owner),
            _ => false,
        };
        if !allowed {
            return Err(AttrError::NotVisible {
                name: name.to_string(),
                target,
                visibility: method.visibility,
            });
        }
        Ok(Arc::clone(&method.body))
    }

    /// Invoke an instance method.
    pub fn call(
        &self,
        instance: &mut Instance,
        name: &str,
        args: Args,
        site: CallSite,
    ) -> Result<Value, AttrError> {
        let body = self.dispatch(instance.type_id, Scope::Instance, name, site)?;
        body(&mut instance.store, args)
    }

    /// Invoke a type-level method against `id`'s own type store.
    pub fn call_type(
        &mut self,
        id: TypeId,
        name: &str,
        args: Args,
        site: CallSite,
    ) -> Result<Value, AttrError> {
        let body = self.dispatch(id, Scope::Type, name, site)?;
        body(&mut self.type_def_mut(id).store, args)
    }

    /// Public reader call.
    pub fn read(&self, instance: &mut Instance, name: &str) -> Result<Value, AttrError> {
        self.call(instance, name, Args::none(), CallSite::External)
    }

    /// Public predicate call.
    pub fn query(&self, instance: &mut Instance, name: &str) -> Result<bool, AttrError> {
        let spec_name = format!("{name}{}", crate::spec::PREDICATE_SUFFIX);
        self.call(instance, &spec_name, Args::none(), CallSite::External)
            .map(|value| value.truthy())
    }

    /// Public writer call.
    ///
    /// Attributes without a writer report why they cannot be written.
    pub fn write(
        &self,
        instance: &mut Instance,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<Value, AttrError> {
        let id = instance.type_id;
        let writer = format!("{name}{}", crate::spec::WRITER_SUFFIX);
        if self.resolve(id, Scope::Instance, &writer).is_none() {
            let spec = self.require_spec(id, Scope::Instance, name)?;
            compiler::ensure_writable(&spec)?;
        }
        self.call(instance, &writer, Args::one(value), CallSite::External)
    }

    pub fn read_type(&mut self, id: TypeId, name: &str) -> Result<Value, AttrError> {
        self.call_type(id, name, Args::none(), CallSite::External)
    }

    pub fn write_type(
        &mut self,
        id: TypeId,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<Value, AttrError> {
        let writer = format!("{name}{}", crate::spec::WRITER_SUFFIX);
        if self.resolve(id, Scope::Type, &writer).is_none() {
            let spec = self.require_spec(id, Scope::Type, name)?;
            compiler::ensure_writable(&spec)?;
        }
        self.call_type(id, &writer, Args::one(value), CallSite::External)
    }

    /// Internal write, bypassing accessors and transformers.
    ///
    /// Honors final locks: a final attribute accepts one assignment.
    pub fn assign(
        &self,
        instance: &mut Instance,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), AttrError> {
        let spec = self.require_spec(instance.type_id, Scope::Instance, name)?;
        compiler::assign(&spec, &mut instance.store, value.into())
    }

    /// Internal read with reader semantics (default memoization included).
    pub fn fetch(&self, instance: &mut Instance, name: &str) -> Result<Value, AttrError> {
        let spec = self.require_spec(instance.type_id, Scope::Instance, name)?;
        compiler::read(&spec, &mut instance.store)
    }

    pub fn assign_type(
        &mut self,
        id: TypeId,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), AttrError> {
        let spec = self.require_spec(id, Scope::Type, name)?;
        compiler::assign(&spec, &mut self.type_def_mut(id).store, value.into())
    }

    pub fn fetch_type(&mut self, id: TypeId, name: &str) -> Result<Value, AttrError> {
        let spec = self.require_spec(id, Scope::Type, name)?;
        compiler::read(&spec, &mut self.type_def_mut(id).store)
    }

    pub(crate) fn require_spec(
        &self,
        id: TypeId,
        scope: Scope,
        name: &str,
    ) -> Result<Arc<AttributeSpec>, AttrError> {
        self.lookup(Owner::Type(id), &SpecKey::new(scope, name), true)
            .ok_or_else(|| AttrError::NotDefined {
                name: name.to_string(),
                owner: self.type_def(id).name.clone(),
            })
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}
