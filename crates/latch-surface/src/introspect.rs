//! Read-only introspection of registries and method tables.
//!
//! Nothing here invokes a reader or touches a store: defaults are reported
//! by kind, never materialized.

use latch_kernel::{AttributeSpec, DefaultValue, Exposure, Host, Owner, Scope, Visibility};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Local,
    Inherited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultKind {
    None,
    Value,
    Lazy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeView {
    pub name: String,
    pub scope: Scope,
    pub exposure: Exposure,
    pub visibility: Visibility,
    #[serde(rename = "final")]
    pub final_: bool,
    pub predicate: bool,
    pub storage_key: String,
    pub default: DefaultKind,
    pub transformer: bool,
    pub origin: Origin,
}

impl AttributeView {
    fn from_spec(spec: &AttributeSpec, origin: Origin) -> Self {
        let default = match spec.default_value() {
            None => DefaultKind::None,
            Some(DefaultValue::Lazy(_)) => DefaultKind::Lazy,
            Some(_) => DefaultKind::Value,
        };
        Self {
            name: spec.name().to_string(),
            scope: spec.scope(),
            exposure: spec.exposure(),
            visibility: spec.visibility(),
            final_: spec.is_final(),
            predicate: spec.has_predicate(),
            storage_key: spec.storage_key().to_string(),
            default,
            transformer: spec.has_transformer(),
            origin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodView {
    pub name: String,
    pub visibility: Visibility,
    pub generated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerView {
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Units composed into a type, or types a unit is attached to.
    pub composition: Vec<String>,
    pub attributes: Vec<AttributeView>,
    pub type_methods: Vec<MethodView>,
    pub instance_methods: Vec<MethodView>,
}

/// Describe everything visible from `owner`.
pub fn describe(host: &Host, owner: Owner) -> OwnerView {
    let registry = host.registry_of(owner);
    let attributes = host
        .lookup_all(owner, true)
        .values()
        .map(|spec| {
            let origin = if registry.is_local(&spec.key()) {
                Origin::Local
            } else {
                Origin::Inherited
            };
            AttributeView::from_spec(spec, origin)
        })
        .collect();

    match owner {
        Owner::Type(id) => {
            let ty = host.type_def(id);
            OwnerView {
                kind: "type".to_string(),
                name: ty.name().to_string(),
                parent: ty.parent().map(|parent| host.type_def(parent).name().to_string()),
                composition: ty
                    .units()
                    .iter()
                    .map(|unit| host.unit_def(*unit).name().to_string())
                    .collect(),
                attributes,
                type_methods: methods(host, id, Scope::Type),
                instance_methods: methods(host, id, Scope::Instance),
            }
        }
        Owner::Unit(id) => {
            let unit = host.unit_def(id);
            OwnerView {
                kind: "unit".to_string(),
                name: unit.name().to_string(),
                parent: None,
                composition: unit
                    .attached()
                    .iter()
                    .map(|ty| host.type_def(*ty).name().to_string())
                    .collect(),
                attributes,
                type_methods: Vec::new(),
                instance_methods: Vec::new(),
            }
        }
    }
}

fn methods(host: &Host, id: latch_kernel::TypeId, scope: Scope) -> Vec<MethodView> {
    let context = host.type_def(id).context(scope);
    context
        .methods()
        .map(|method| MethodView {
            name: method.name.clone(),
            visibility: method.visibility,
            generated: context.installed_by_self(&method.name),
        })
        .collect()
}

/// [`describe`] as a JSON document.
pub fn describe_owner(host: &Host, owner: Owner) -> Value {
    serde_json::to_value(describe(host, owner)).unwrap_or(Value::Null)
}

/// Names of accessors the owner's contexts generated, across both scopes.
pub fn installed_names(host: &Host, id: latch_kernel::TypeId) -> BTreeSet<String> {
    let ty = host.type_def(id);
    [Scope::Type, Scope::Instance]
        .into_iter()
        .flat_map(|scope| ty.context(scope).installed_names().iter().cloned())
        .collect()
}

/// SHA-256 over the canonical JSON of the merged registry.
///
/// Specs are keyed by scope and name, so the digest does not depend on
/// declaration order or on where a spec came from.
pub fn registry_fingerprint(host: &Host, owner: Owner) -> String {
    let specs: Vec<Value> = host
        .lookup_all(owner, true)
        .values()
        .map(|spec: &Arc<AttributeSpec>| {
            serde_json::to_value(AttributeView::from_spec(spec, Origin::Local))
                .unwrap_or(Value::Null)
        })
        .collect();
    let mut hasher = Sha256::new();
    hasher.update(Value::Array(specs).to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}
