//! Declaration surface.
//!
//! A [`TypeBody`] is what a type (or unit) definition runs against: it pairs
//! the host with the owner being defined and a [`VisibilityTracker`], and
//! hands out [`AttributeDecl`] builders that turn into registered specs.
//!
//! ```text
//! host.define_type_with("Account", |body| {
//!     body.accessor("balance")?;
//!     body.private();
//!     body.attribute("pin").final_(true).declare()?;
//!     Ok(())
//! })
//! ```

use crate::visibility::VisibilityTracker;
use latch_kernel::{
    AttrError, AttributeOptions, AttributeSpec, DefaultValue, Exposure, Host, Owner, Scope,
    Transformer, TypeId, UnitId, Value, Visibility,
};
use serde_json::Value as Json;
use std::sync::Arc;

pub struct TypeBody<'h> {
    host: &'h mut Host,
    owner: Owner,
    tracker: VisibilityTracker,
}

impl<'h> TypeBody<'h> {
    pub fn new(host: &'h mut Host, owner: impl Into<Owner>) -> Self {
        Self {
            host,
            owner: owner.into(),
            tracker: VisibilityTracker::new(),
        }
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn host(&self) -> &Host {
        &*self.host
    }

    pub fn public(&mut self) {
        self.tracker.public();
    }

    pub fn protected(&mut self) {
        self.tracker.protected();
    }

    pub fn private(&mut self) {
        self.tracker.private();
    }

    pub fn visibility(&self) -> Visibility {
        self.tracker.current()
    }

    /// Run `f` at `visibility`, then restore the previous level.
    pub fn with_visibility<R>(
        &mut self,
        visibility: Visibility,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let previous = self.tracker.replace(visibility);
        let out = f(self);
        self.tracker.replace(previous);
        out
    }

    /// Start declaring `name`.
    pub fn attribute(&mut self, name: &str) -> AttributeDecl<'_, 'h> {
        AttributeDecl {
            body: self,
            name: name.to_string(),
            default: None,
            options: AttributeOptions::new(),
            transformer: None,
            error: None,
        }
    }

    pub fn reader(&mut self, name: &str) -> Result<Arc<AttributeSpec>, AttrError> {
        self.attribute(name).exposure(Exposure::Read).declare()
    }

    pub fn writer(&mut self, name: &str) -> Result<Arc<AttributeSpec>, AttrError> {
        self.attribute(name).exposure(Exposure::Write).declare()
    }

    pub fn accessor(&mut self, name: &str) -> Result<Arc<AttributeSpec>, AttrError> {
        self.attribute(name).exposure(Exposure::ReadWrite).declare()
    }

    /// Storage only; no accessors are generated.
    pub fn hidden(&mut self, name: &str) -> Result<Arc<AttributeSpec>, AttrError> {
        self.attribute(name).exposure(Exposure::None).declare()
    }

    /// Attach a composition unit to the type being defined.
    pub fn include(&mut self, unit: UnitId) -> Result<(), AttrError> {
        let Owner::Type(id) = self.owner else {
            return Err(AttrError::validation(
                "composition units can only be included into types",
            ));
        };
        self.host.compose(id, unit)
    }
}

/// Builder for one attribute declaration.
///
/// Errors from option parsing are held until [`AttributeDecl::declare`].
pub struct AttributeDecl<'b, 'h> {
    body: &'b mut TypeBody<'h>,
    name: String,
    default: Option<DefaultValue>,
    options: AttributeOptions,
    transformer: Option<Transformer>,
    error: Option<AttrError>,
}

impl AttributeDecl<'_, '_> {
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::value(value));
        self
    }

    /// A default computed on every materialization.
    pub fn lazy_default(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(DefaultValue::lazy(f));
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.options = self.options.scope(scope);
        self
    }

    pub fn exposure(mut self, exposure: Exposure) -> Self {
        self.options = self.options.exposure(exposure);
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.options = self.options.visibility(visibility);
        self
    }

    pub fn final_(mut self, final_: bool) -> Self {
        self.options = self.options.final_(final_);
        self
    }

    pub fn predicate(mut self, predicate: bool) -> Self {
        self.options = self.options.predicate(predicate);
        self
    }

    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.options = self.options.storage_key(key);
        self
    }

    /// Merge untyped options. Keys present in `raw` override earlier calls.
    pub fn options_json(mut self, raw: &Json) -> Self {
        match AttributeOptions::from_json(raw) {
            Ok(parsed) => {
                let current = &mut self.options;
                current.scope = parsed.scope.or(current.scope);
                current.exposure = parsed.exposure.or(current.exposure);
                current.visibility = parsed.visibility.or(current.visibility);
                current.storage_key = parsed.storage_key.or(current.storage_key.take());
                let flags = raw.as_object();
                if flags.is_some_and(|obj| obj.contains_key("final")) {
                    current.final_ = parsed.final_;
                }
                if flags.is_some_and(|obj| obj.contains_key("predicate")) {
                    current.predicate = parsed.predicate;
                }
            }
            Err(err) => {
                if self.error.is_none() {
                    self.error = Some(err);
                }
            }
        }
        self
    }

    pub fn transform(
        mut self,
        f: impl Fn(latch_kernel::Args) -> Result<Value, AttrError> + Send + Sync + 'static,
    ) -> Self {
        self.transformer = Some(Arc::new(f));
        self
    }

    /// Build the spec and register it on the body's owner.
    ///
    /// Unset scope and exposure come from the host's declaration config;
    /// unset visibility comes from the body's tracker.
    pub fn declare(self) -> Result<Arc<AttributeSpec>, AttrError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let defaults = &self.body.host.config().declaration;
        let mut options = self
            .options
            .with_defaults(defaults.default_scope, defaults.default_exposure);
        if options.visibility.is_none() {
            options.visibility = Some(self.body.tracker.current());
        }

        let spec = AttributeSpec::construct(&self.name, self.default, &options, self.transformer)?;
        self.body.host.declare(self.body.owner, spec)
    }
}

/// Define types and units by running a body against them.
///
/// Each helper is all-or-nothing: if the body fails, the host is left
/// exactly as it was before the call.
pub trait DefineWith {
    fn define_type_with(
        &mut self,
        name: &str,
        body: impl FnOnce(&mut TypeBody<'_>) -> Result<(), AttrError>,
    ) -> Result<TypeId, AttrError>;

    fn define_subtype_with(
        &mut self,
        name: &str,
        parent: TypeId,
        body: impl FnOnce(&mut TypeBody<'_>) -> Result<(), AttrError>,
    ) -> Result<TypeId, AttrError>;

    fn define_unit_with(
        &mut self,
        name: &str,
        body: impl FnOnce(&mut TypeBody<'_>) -> Result<(), AttrError>,
    ) -> Result<UnitId, AttrError>;
}

impl DefineWith for Host {
    fn define_type_with(
        &mut self,
        name: &str,
        body: impl FnOnce(&mut TypeBody<'_>) -> Result<(), AttrError>,
    ) -> Result<TypeId, AttrError> {
        transactionally(self, |host| {
            let id = host.define_type(name);
            body(&mut TypeBody::new(host, id))?;
            Ok(id)
        })
    }

    fn define_subtype_with(
        &mut self,
        name: &str,
        parent: TypeId,
        body: impl FnOnce(&mut TypeBody<'_>) -> Result<(), AttrError>,
    ) -> Result<TypeId, AttrError> {
        transactionally(self, |host| {
            let id = host.define_subtype(name, parent)?;
            body(&mut TypeBody::new(host, id))?;
            Ok(id)
        })
    }

    fn define_unit_with(
        &mut self,
        name: &str,
        body: impl FnOnce(&mut TypeBody<'_>) -> Result<(), AttrError>,
    ) -> Result<UnitId, AttrError> {
        transactionally(self, |host| {
            let id = host.define_unit(name);
            body(&mut TypeBody::new(host, id))?;
            Ok(id)
        })
    }
}

fn transactionally<T>(
    host: &mut Host,
    f: impl FnOnce(&mut Host) -> Result<T, AttrError>,
) -> Result<T, AttrError> {
    let mut scratch = host.clone();
    match f(&mut scratch) {
        Ok(out) => {
            *host = scratch;
            Ok(out)
        }
        Err(err) => {
            log::debug!("[surface] definition aborted: {err}");
            Err(err)
        }
    }
}
