//! Attribute metadata.
//!
//! An [`AttributeSpec`] is built once at declaration time and never mutated
//! afterwards. Registries, contexts, and compiled accessors all hold it behind
//! an `Arc`; "changing" a spec means building a new one with the same
//! [`SpecKey`] and swapping it in.

use crate::error::AttrError;
use crate::value::{Args, Value};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Suffix reserved for generated predicate methods.
pub const PREDICATE_SUFFIX: &str = "?";

/// Suffix reserved for generated writer methods.
pub const WRITER_SUFFIX: &str = "=";

/// Where an attribute's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// One value per type, held by the type's own store.
    Type,

    /// One value per instance.
    Instance,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type => write!(f, "type"),
            Self::Instance => write!(f, "instance"),
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = AttrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "type" | "class" => Ok(Self::Type),
            "instance" => Ok(Self::Instance),
            _ => Err(AttrError::validation(format!("unknown scope: {s}"))),
        }
    }
}

/// Which accessors an attribute exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exposure {
    Read,
    Write,
    ReadWrite,
    /// Storage only: no accessor methods are generated.
    None,
}

impl Exposure {
    pub fn includes_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    pub fn includes_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

impl fmt::Display for Exposure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::ReadWrite => write!(f, "read_write"),
            Self::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for Exposure {
    type Err = AttrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read" | "reader" => Ok(Self::Read),
            "write" | "writer" => Ok(Self::Write),
            "read_write" | "readwrite" | "accessor" => Ok(Self::ReadWrite),
            "none" => Ok(Self::None),
            _ => Err(AttrError::validation(format!("unknown exposure: {s}"))),
        }
    }
}

/// Access level of a generated method.
///
/// Ordered from most to least permissive.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Protected => write!(f, "protected"),
            Self::Private => write!(f, "private"),
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = AttrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "protected" => Ok(Self::Protected),
            "private" => Ok(Self::Private),
            _ => Err(AttrError::validation(format!("unknown visibility: {s}"))),
        }
    }
}

/// Identity of a spec within one registry: names are unique per scope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpecKey {
    pub scope: Scope,
    pub name: String,
}

impl SpecKey {
    pub fn new(scope: Scope, name: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
        }
    }
}

impl fmt::Display for SpecKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.name)
    }
}

pub type Transformer = Arc<dyn Fn(Args) -> Result<Value, AttrError> + Send + Sync>;

pub type DefaultFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// How a default value is produced each time it is materialized.
#[derive(Clone)]
pub enum DefaultValue {
    /// Re-invoked on every materialization.
    Lazy(DefaultFn),

    /// Immutable value, handed out as-is.
    Constant(Value),

    /// Mutable value, structurally copied on every materialization so no
    /// two owners ever share it.
    Fresh(Value),
}

impl DefaultValue {
    /// Wrap a plain value, choosing `Constant` or `Fresh` by mutability.
    pub fn value(value: impl Into<Value>) -> Self {
        let value = value.into();
        if value.is_mutable() {
            Self::Fresh(value)
        } else {
            Self::Constant(value)
        }
    }

    pub fn lazy(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self::Lazy(Arc::new(f))
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self, Self::Lazy(_))
    }

    /// Produce the default for attribute `name`.
    pub fn materialize(&self, name: &str) -> Result<Value, AttrError> {
        match self {
            Self::Lazy(f) => Ok(f()),
            Self::Constant(value) => Ok(value.clone()),
            Self::Fresh(value) => value
                .duplicate()
                .map(|copy| copy.into_value())
                .map_err(|failure| AttrError::Duplication {
                    name: name.to_string(),
                    class: failure.class,
                    message: failure.message,
                }),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lazy(_) => write!(f, "Lazy(<fn>)"),
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Fresh(value) => f.debug_tuple("Fresh").field(value).finish(),
        }
    }
}

/// Declaration options, before defaults are resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeOptions {
    pub scope: Option<Scope>,
    pub exposure: Option<Exposure>,
    pub visibility: Option<Visibility>,
    pub final_: bool,
    pub predicate: bool,
    pub storage_key: Option<String>,
}

const OPTION_KEYS: &[&str] = &[
    "scope",
    "exposure",
    "visibility",
    "final",
    "predicate",
    "storage_key",
];

impl AttributeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn exposure(mut self, exposure: Exposure) -> Self {
        self.exposure = Some(exposure);
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn final_(mut self, final_: bool) -> Self {
        self.final_ = final_;
        self
    }

    pub fn predicate(mut self, predicate: bool) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = Some(key.into());
        self
    }

    /// Parse untyped options. Only `AttributeSpec` fields are accepted.
    pub fn from_json(raw: &Json) -> Result<Self, AttrError> {
        let Some(obj) = raw.as_object() else {
            return Err(AttrError::validation("options must be an object"));
        };
        let mut options = Self::default();
        for (key, value) in obj {
            match key.as_str() {
                "scope" => options.scope = Some(parse_enum(key, value)?),
                "exposure" => options.exposure = Some(parse_enum(key, value)?),
                "visibility" => options.visibility = Some(parse_enum(key, value)?),
                "final" => options.final_ = parse_flag(key, value)?,
                "predicate" => options.predicate = parse_flag(key, value)?,
                "storage_key" => {
                    let Some(storage_key) = value.as_str() else {
                        return Err(AttrError::validation("storage_key must be a string"));
                    };
                    options.storage_key = Some(storage_key.to_string());
                }
                other => {
                    return Err(AttrError::validation(format!(
                        "unknown option `{other}` (expected one of: {})",
                        OPTION_KEYS.join(", ")
                    )));
                }
            }
        }
        Ok(options)
    }

    /// Fill unset scope/exposure from declaration-wide defaults.
    pub fn with_defaults(mut self, scope: Scope, exposure: Exposure) -> Self {
        self.scope.get_or_insert(scope);
        self.exposure.get_or_insert(exposure);
        self
    }
}

fn parse_enum<T>(key: &str, value: &Json) -> Result<T, AttrError>
where
    T: std::str::FromStr<Err = AttrError>,
{
    value
        .as_str()
        .ok_or_else(|| AttrError::validation(format!("{key} must be a string")))?
        .parse()
}

fn parse_flag(key: &str, value: &Json) -> Result<bool, AttrError> {
    value
        .as_bool()
        .ok_or_else(|| AttrError::validation(format!("{key} must be a boolean")))
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex must compile")
    })
}

/// Immutable metadata for one attribute.
#[derive(Clone)]
pub struct AttributeSpec {
    name: String,
    storage_key: String,
    scope: Scope,
    exposure: Exposure,
    visibility: Visibility,
    final_: bool,
    predicate: bool,
    default: Option<DefaultValue>,
    transformer: Option<Transformer>,
}

impl AttributeSpec {
    /// Validate and build a spec.
    ///
    /// Unset scope and exposure fall back to `Instance` and `ReadWrite`;
    /// unset visibility falls back to `Public`.
    pub fn construct(
        name: &str,
        default: Option<DefaultValue>,
        options: &AttributeOptions,
        transformer: Option<Transformer>,
    ) -> Result<Self, AttrError> {
        if name.ends_with(PREDICATE_SUFFIX) {
            return Err(AttrError::validation(format!(
                "`{name}` ends in reserved suffix `{PREDICATE_SUFFIX}`; use the predicate option"
            )));
        }
        if name.ends_with(WRITER_SUFFIX) {
            return Err(AttrError::validation(format!(
                "`{name}` ends in reserved suffix `{WRITER_SUFFIX}`"
            )));
        }
        if !identifier_re().is_match(name) {
            return Err(AttrError::validation(format!(
                "`{name}` is not a valid attribute name"
            )));
        }
        let storage_key = match &options.storage_key {
            Some(key) if key.trim().is_empty() => {
                return Err(AttrError::validation("storage_key must be non-empty"));
            }
            Some(key) => key.clone(),
            None => name.to_string(),
        };

        Ok(Self {
            name: name.to_string(),
            storage_key,
            scope: options.scope.unwrap_or(Scope::Instance),
            exposure: options.exposure.unwrap_or(Exposure::ReadWrite),
            visibility: options.visibility.unwrap_or_default(),
            final_: options.final_,
            predicate: options.predicate,
            default,
            transformer,
        })
    }

    /// A copy of this spec with a different transformer and the same key.
    pub fn with_transformer(&self, transformer: Transformer) -> Self {
        Self {
            transformer: Some(transformer),
            ..self.clone()
        }
    }

    pub fn key(&self) -> SpecKey {
        SpecKey::new(self.scope, self.name.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn exposure(&self) -> Exposure {
        self.exposure
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_final(&self) -> bool {
        self.final_
    }

    pub fn has_predicate(&self) -> bool {
        self.predicate
    }

    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    pub fn has_transformer(&self) -> bool {
        self.transformer.is_some()
    }

    /// Writable iff exposure includes write and the attribute is not final.
    pub fn is_writable(&self) -> bool {
        self.exposure.includes_write() && !self.final_
    }

    pub fn reader_name(&self) -> String {
        self.name.clone()
    }

    pub fn writer_name(&self) -> String {
        format!("{}{WRITER_SUFFIX}", self.name)
    }

    pub fn predicate_name(&self) -> String {
        format!("{}{PREDICATE_SUFFIX}", self.name)
    }

    /// Materialize the default, or `None` when the spec has no default.
    pub fn materialize_default(&self) -> Result<Option<Value>, AttrError> {
        self.default
            .as_ref()
            .map(|default| default.materialize(&self.name))
            .transpose()
    }

    /// Apply the transformer to writer arguments.
    ///
    /// Without an explicit transformer: no positional arguments yield the
    /// keyword map, one yields it unwrapped, several yield a list.
    pub fn transform(&self, args: Args) -> Result<Value, AttrError> {
        if let Some(transformer) = &self.transformer {
            return transformer(args);
        }
        let Args {
            mut positional,
            keywords,
        } = args;
        Ok(match positional.len() {
            0 => Value::Map(keywords),
            1 => positional.remove(0),
            _ => Value::List(positional),
        })
    }
}

impl fmt::Debug for AttributeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeSpec")
            .field("name", &self.name)
            .field("storage_key", &self.storage_key)
            .field("scope", &self.scope)
            .field("exposure", &self.exposure)
            .field("visibility", &self.visibility)
            .field("final", &self.final_)
            .field("predicate", &self.predicate)
            .field("default", &self.default)
            .field("transformer", &self.transformer.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(name: &str, options: AttributeOptions) -> Result<AttributeSpec, AttrError> {
        AttributeSpec::construct(name, None, &options, None)
    }

    #[test]
    fn predicate_suffix_is_rejected() {
        let err = spec("ready?", AttributeOptions::new()).unwrap_err();
        assert!(matches!(err, AttrError::Validation(msg) if msg.contains("reserved suffix")));
        assert!(spec("size=", AttributeOptions::new()).is_err());
        assert!(spec("", AttributeOptions::new()).is_err());
        assert!(spec("9lives", AttributeOptions::new()).is_err());
    }

    #[test]
    fn options_resolve_to_defaults() {
        let spec = spec("count", AttributeOptions::new()).unwrap();
        assert_eq!(spec.scope(), Scope::Instance);
        assert_eq!(spec.exposure(), Exposure::ReadWrite);
        assert_eq!(spec.visibility(), Visibility::Public);
        assert_eq!(spec.storage_key(), "count");
        assert!(spec.is_writable());
        assert_eq!(spec.writer_name(), "count=");
        assert_eq!(spec.predicate_name(), "count?");
    }

    #[test]
    fn final_attributes_are_never_writable() {
        let spec = spec("id", AttributeOptions::new().final_(true)).unwrap();
        assert!(!spec.is_writable());
        let read_only = self::spec("id", AttributeOptions::new().exposure(Exposure::Read)).unwrap();
        assert!(!read_only.is_writable());
    }

    #[test]
    fn json_options_reject_unknown_keys_and_values() {
        let parsed = AttributeOptions::from_json(&json!({
            "scope": "type",
            "exposure": "read",
            "visibility": "protected",
            "final": true,
            "predicate": true,
            "storage_key": "_level"
        }))
        .unwrap();
        assert_eq!(parsed.scope, Some(Scope::Type));
        assert_eq!(parsed.exposure, Some(Exposure::Read));
        assert_eq!(parsed.visibility, Some(Visibility::Protected));
        assert!(parsed.final_ && parsed.predicate);
        assert_eq!(parsed.storage_key.as_deref(), Some("_level"));

        assert!(AttributeOptions::from_json(&json!({"scope": "global"})).is_err());
        assert!(AttributeOptions::from_json(&json!({"visibility": "secret"})).is_err());
        assert!(AttributeOptions::from_json(&json!({"final": "yes"})).is_err());
        let err = AttributeOptions::from_json(&json!({"colour": "red"})).unwrap_err();
        assert!(err.to_string().contains("unknown option `colour`"));
    }

    #[test]
    fn mutable_defaults_are_fresh_per_materialization() {
        let default = DefaultValue::value(Value::List(vec![]));
        assert!(matches!(default, DefaultValue::Fresh(_)));
        let mut first = default.materialize("items").unwrap();
        first.as_list_mut().unwrap().push(Value::Int(1));
        assert_eq!(default.materialize("items").unwrap(), Value::List(vec![]));

        assert!(matches!(DefaultValue::value(3), DefaultValue::Constant(_)));
    }

    #[test]
    fn lazy_defaults_are_reinvoked() {
        use std::sync::atomic::{AtomicI64, Ordering};
        let counter = Arc::new(AtomicI64::new(0));
        let seen = counter.clone();
        let default = DefaultValue::lazy(move || Value::Int(seen.fetch_add(1, Ordering::SeqCst)));
        assert_eq!(default.materialize("n").unwrap(), Value::Int(0));
        assert_eq!(default.materialize("n").unwrap(), Value::Int(1));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn default_transformer_follows_arity() {
        let spec = spec("point", AttributeOptions::new()).unwrap();
        assert_eq!(spec.transform(Args::one(5)).unwrap(), Value::Int(5));
        assert_eq!(
            spec.transform(Args::positional(vec![Value::Int(1), Value::Int(2)]))
                .unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
        let keywords = spec.transform(Args::none().keyword("x", 1)).unwrap();
        assert_eq!(keywords.to_json(), json!({"x": 1}));
    }

    #[test]
    fn with_transformer_leaves_original_untouched() {
        let original = spec("count", AttributeOptions::new()).unwrap();
        let replaced = original.with_transformer(Arc::new(|_: Args| Ok(Value::Int(42))));
        assert_eq!(original.key(), replaced.key());
        assert!(!original.has_transformer());
        assert_eq!(original.transform(Args::one(1)).unwrap(), Value::Int(1));
        assert_eq!(replaced.transform(Args::one(1)).unwrap(), Value::Int(42));
    }

    #[test]
    fn enumerations_parse_case_insensitively() {
        assert_eq!("TYPE".parse::<Scope>().unwrap(), Scope::Type);
        assert_eq!("accessor".parse::<Exposure>().unwrap(), Exposure::ReadWrite);
        assert_eq!("Private".parse::<Visibility>().unwrap(), Visibility::Private);
        assert!("hidden".parse::<Exposure>().is_err());
    }
}
