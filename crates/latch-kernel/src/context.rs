//! Definition contexts: where generated accessors are installed.
//!
//! A context wraps one installation target, either the instance-method table
//! of a type or its type-level method table. It remembers every method it
//! installed itself, which gives two guarantees:
//!
//! 1. accessor generation never silently replaces a method the host defined
//!    (or another context installed);
//! 2. a context can remove exactly its own methods before a controlled
//!    redefinition.
//!
//! Contexts also decide the *effective* visibility of what they install.

use crate::error::AttrError;
use crate::spec::{AttributeSpec, Scope, SpecKey, Visibility};
use crate::store::ValueStore;
use crate::value::{Args, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Opaque identifier for a definition context.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextId(pub String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A method implementation. It sees only the store of its receiver.
pub type MethodBody = Arc<dyn Fn(&mut ValueStore, Args) -> Result<Value, AttrError> + Send + Sync>;

/// Which accessor a generated method implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Reader,
    Writer,
    Predicate,
}

/// One entry in a method table.
#[derive(Clone)]
pub struct Method {
    pub name: String,
    pub body: MethodBody,
    pub visibility: Visibility,

    /// `None` for methods the host defined directly.
    pub installed_by: Option<ContextId>,

    /// The attribute this accessor was generated for, if any.
    pub attribute: Option<(SpecKey, Operation)>,
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("visibility", &self.visibility)
            .field("installed_by", &self.installed_by)
            .field("attribute", &self.attribute)
            .finish()
    }
}

/// The visibility actually applied to an accessor.
///
/// An accessor for an operation the exposure does not grant is still
/// generated for internal use, but escalated: `Protected` on type-level
/// targets, `Private` on instance-level targets, whatever the declared
/// visibility. Otherwise the declared visibility stands.
pub fn effective_visibility(spec: &AttributeSpec, operation: Operation) -> Visibility {
    let granted = match operation {
        Operation::Reader | Operation::Predicate => spec.exposure().includes_read(),
        Operation::Writer => spec.exposure().includes_write(),
    };
    if granted {
        return spec.visibility();
    }
    match spec.scope() {
        Scope::Type => Visibility::Protected,
        Scope::Instance => Visibility::Private,
    }
}

/// An installation target plus the record of what this context put there.
#[derive(Debug, Clone)]
pub struct DefinitionContext {
    id: ContextId,
    target: String,
    scope: Scope,
    methods: BTreeMap<String, Method>,
    installed: BTreeSet<String>,
}

impl DefinitionContext {
    pub fn new(id: ContextId, target: impl Into<String>, scope: Scope) -> Self {
        Self {
            id,
            target: target.into(),
            scope,
            methods: BTreeMap::new(),
            installed: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> &ContextId {
        &self.id
    }

    /// Human-readable name of the target, used in error messages.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Names this context installed itself.
    pub fn installed_names(&self) -> &BTreeSet<String> {
        &self.installed
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.methods.values()
    }

    pub fn installed_by_self(&self, name: &str) -> bool {
        self.installed.contains(name)
    }

    /// Fail if `name` exists on the target and was not installed here.
    pub fn check_available(&self, name: &str) -> Result<(), AttrError> {
        if self.methods.contains_key(name) && !self.installed_by_self(name) {
            return Err(AttrError::MethodAlreadyDefined {
                name: name.to_string(),
                target: self.target.clone(),
            });
        }
        Ok(())
    }

    /// Install an accessor for `spec`, then apply its effective visibility.
    ///
    /// `name` defaults to the spec's method name for `operation`.
    pub fn define_method(
        &mut self,
        spec: &AttributeSpec,
        operation: Operation,
        name: Option<String>,
        body: MethodBody,
    ) -> Result<(), AttrError> {
        let name = name.unwrap_or_else(|| match operation {
            Operation::Reader => spec.reader_name(),
            Operation::Writer => spec.writer_name(),
            Operation::Predicate => spec.predicate_name(),
        });
        self.check_available(&name)?;
        log::debug!("[context] {} installs `{name}` ({operation:?})", self.id);
        self.methods.insert(
            name.clone(),
            Method {
                name: name.clone(),
                body,
                visibility: spec.visibility(),
                installed_by: Some(self.id.clone()),
                attribute: Some((spec.key(), operation)),
            },
        );
        self.installed.insert(name.clone());
        self.apply_visibility(&name, spec, operation);
        Ok(())
    }

    /// Set the effective visibility of an installed accessor.
    pub fn apply_visibility(&mut self, name: &str, spec: &AttributeSpec, operation: Operation) {
        let visibility = effective_visibility(spec, operation);
        if let Some(method) = self.methods.get_mut(name) {
            if visibility != spec.visibility() {
                log::debug!(
                    "[context] {} escalates `{name}` from {} to {visibility}",
                    self.id,
                    spec.visibility()
                );
            }
            method.visibility = visibility;
        }
    }

    /// Define a method on behalf of the host (not tracked by this context).
    ///
    /// Host definitions replace whatever was there, accessors included.
    pub fn define_host_method(&mut self, name: &str, visibility: Visibility, body: MethodBody) {
        self.installed.remove(name);
        self.methods.insert(
            name.to_string(),
            Method {
                name: name.to_string(),
                body,
                visibility,
                installed_by: None,
                attribute: None,
            },
        );
    }

    /// Remove a method this context installed. Foreign methods are left
    /// alone and `false` is returned.
    pub fn undefine(&mut self, name: &str) -> bool {
        if !self.installed.remove(name) {
            return false;
        }
        self.methods.remove(name);
        log::debug!("[context] {} removes `{name}`", self.id);
        true
    }

    /// Names of accessors this context installed for `key`.
    pub fn accessors_for(&self, key: &SpecKey) -> Vec<String> {
        self.methods
            .values()
            .filter(|method| {
                method.installed_by.as_ref() == Some(&self.id)
                    && method.attribute.as_ref().is_some_and(|(k, _)| k == key)
            })
            .map(|method| method.name.clone())
            .collect()
    }
}
