//! End-to-end attribute behavior across specs, registries, compilation, and
//! propagation.

use latch_kernel::{
    Args, AttrError, AttributeOptions, AttributeSpec, CallSite, DefaultValue, Duplicate, Exposure,
    FinalViolation, Host, HostObject, Scope, Transformer, Value, Visibility,
};
use std::any::Any;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Bag {
    items: Mutex<Vec<i64>>,
}

impl Bag {
    fn push(&self, n: i64) {
        self.items.lock().unwrap().push(n);
    }

    fn snapshot(&self) -> Vec<i64> {
        self.items.lock().unwrap().clone()
    }
}

impl HostObject for Bag {
    fn class_name(&self) -> &str {
        "Bag"
    }

    fn duplicate(&self) -> Duplicate {
        Duplicate::Copied(Arc::new(Bag {
            items: Mutex::new(self.snapshot()),
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn attr(name: &str, default: Option<DefaultValue>, options: AttributeOptions) -> AttributeSpec {
    AttributeSpec::construct(name, default, &options, None).unwrap()
}

fn bag_of(value: &Value) -> &Bag {
    value.downcast_ref::<Bag>().unwrap()
}

#[test]
fn counter_reads_default_then_written_value() {
    let mut host = Host::new();
    let ty = host.define_type("Counter");
    host.declare(ty, attr("count", Some(DefaultValue::value(0)), AttributeOptions::new()))
        .unwrap();

    let mut obj = host.instantiate(ty);
    assert_eq!(host.read(&mut obj, "count").unwrap(), Value::Int(0));
    host.write(&mut obj, "count", 5).unwrap();
    assert_eq!(host.read(&mut obj, "count").unwrap(), Value::Int(5));
}

#[test]
fn final_id_is_locked_by_first_read() {
    let mut host = Host::new();
    let ty = host.define_type("Record");
    let id = attr(
        "id",
        Some(DefaultValue::lazy(|| Value::from("uuid-1"))),
        AttributeOptions::new().final_(true),
    );
    host.declare(ty, id).unwrap();

    let mut obj = host.instantiate(ty);
    assert_eq!(host.read(&mut obj, "id").unwrap(), Value::from("uuid-1"));
    let err = host.write(&mut obj, "id", 5).unwrap_err();
    assert!(matches!(
        err,
        AttrError::Final {
            violation: FinalViolation::Reassigned,
            ..
        }
    ));
    assert!(host.assign(&mut obj, "id", 5).unwrap_err().is_final());
}

#[test]
fn final_instance_attribute_accepts_one_write() {
    let mut host = Host::new();
    let ty = host.define_type("Record");
    host.declare(ty, attr("token", None, AttributeOptions::new().final_(true)))
        .unwrap();

    let mut obj = host.instantiate(ty);
    let err = host.read(&mut obj, "token").unwrap_err();
    assert!(matches!(
        err,
        AttrError::Final {
            violation: FinalViolation::Unassigned,
            ..
        }
    ));

    host.assign(&mut obj, "token", "v1").unwrap();
    assert!(host.assign(&mut obj, "token", "v2").unwrap_err().is_final());
    assert_eq!(host.read(&mut obj, "token").unwrap(), Value::from("v1"));
}

#[test]
fn final_type_attribute_is_materialized_at_declaration() {
    let mut host = Host::new();
    let ty = host.define_type("Service");
    let version = attr(
        "version",
        Some(DefaultValue::value("1.0")),
        AttributeOptions::new().scope(Scope::Type).final_(true),
    );
    host.declare(ty, version).unwrap();

    assert!(host.type_def(ty).store().is_locked("version"));
    assert_eq!(host.read_type(ty, "version").unwrap(), Value::from("1.0"));
    assert!(host.write_type(ty, "version", "2.0").unwrap_err().is_final());
    assert!(host.assign_type(ty, "version", "2.0").unwrap_err().is_final());
}

#[test]
fn final_type_attribute_without_default_is_locked_at_declaration() {
    let mut host = Host::new();
    let ty = host.define_type("Service");
    host.declare(ty, attr("token", None, AttributeOptions::new().scope(Scope::Type).final_(true)))
        .unwrap();

    assert!(host.type_def(ty).store().is_locked("token"));
    assert_eq!(host.read_type(ty, "token").unwrap(), Value::Nil);
    assert!(host.assign_type(ty, "token", "x").unwrap_err().is_final());
}

#[test]
fn subtype_redeclaring_a_final_type_attribute_uses_its_own_default() {
    let mut host = Host::new();
    let parent = host.define_type("Service");
    let final_type = || AttributeOptions::new().scope(Scope::Type).final_(true);
    host.declare(parent, attr("version", Some(DefaultValue::value("1.0")), final_type()))
        .unwrap();

    let child = host.define_subtype("Upgraded", parent).unwrap();
    host.declare(child, attr("version", Some(DefaultValue::value("2.0")), final_type()))
        .unwrap();

    assert_eq!(host.read_type(child, "version").unwrap(), Value::from("2.0"));
    assert!(host.type_def(child).store().is_locked("version"));
    assert!(host.assign_type(child, "version", "3.0").unwrap_err().is_final());
    assert_eq!(host.read_type(parent, "version").unwrap(), Value::from("1.0"));
}

#[test]
fn subtype_redeclaring_a_type_attribute_drops_inherited_value() {
    let mut host = Host::new();
    let parent = host.define_type("Pool");
    let type_level = || AttributeOptions::new().scope(Scope::Type);
    host.declare(parent, attr("limit", Some(DefaultValue::value(1)), type_level()))
        .unwrap();
    assert_eq!(host.read_type(parent, "limit").unwrap(), Value::Int(1));

    let copied = host.define_subtype("Copied", parent).unwrap();
    host.declare(copied, attr("limit", Some(DefaultValue::value(9)), type_level()))
        .unwrap();
    assert_eq!(host.read_type(copied, "limit").unwrap(), Value::Int(9));

    let touched = host.define_subtype("Touched", parent).unwrap();
    host.write_type(touched, "limit", 5).unwrap();
    host.declare(touched, attr("limit", Some(DefaultValue::value(7)), type_level()))
        .unwrap();
    assert_eq!(host.read_type(touched, "limit").unwrap(), Value::Int(7));
    assert_eq!(host.read_type(parent, "limit").unwrap(), Value::Int(1));
}

#[test]
fn escalated_type_reader_is_protected_even_when_declared_private() {
    let mut host = Host::new();
    let ty = host.define_type("Vault");
    let options = AttributeOptions::new()
        .scope(Scope::Type)
        .exposure(Exposure::Write)
        .visibility(Visibility::Private);
    host.declare(ty, attr("combination", None, options)).unwrap();

    let context = host.type_def(ty).context(Scope::Type);
    assert_eq!(context.method("combination").unwrap().visibility, Visibility::Protected);
    assert_eq!(context.method("combination=").unwrap().visibility, Visibility::Private);
}

#[test]
fn subtypes_do_not_share_mutable_defaults() {
    let mut host = Host::new();
    let parent = host.define_type("P");
    let items = attr(
        "items",
        Some(DefaultValue::lazy(|| Value::object(Bag::default()))),
        AttributeOptions::new().scope(Scope::Type),
    );
    host.declare(parent, items).unwrap();
    let parent_items = host.read_type(parent, "items").unwrap();

    let a = host.define_subtype("A", parent).unwrap();
    let b = host.define_subtype("B", parent).unwrap();
    let a_items = host.read_type(a, "items").unwrap();
    bag_of(&a_items).push(1);

    assert_eq!(bag_of(&a_items).snapshot(), vec![1]);
    assert!(bag_of(&parent_items).snapshot().is_empty());
    assert!(bag_of(&host.read_type(b, "items").unwrap()).snapshot().is_empty());
}

#[test]
fn instances_get_fresh_copies_of_list_defaults() {
    let mut host = Host::new();
    let ty = host.define_type("Basket");
    host.declare(
        ty,
        attr("items", Some(DefaultValue::value(Value::List(vec![]))), AttributeOptions::new()),
    )
    .unwrap();

    let mut first = host.instantiate(ty);
    let mut second = host.instantiate(ty);
    let mut items = host.read(&mut first, "items").unwrap();
    items.as_list_mut().unwrap().push(Value::Int(3));
    host.write(&mut first, "items", items).unwrap();

    assert_eq!(host.read(&mut second, "items").unwrap(), Value::List(vec![]));
}

#[test]
fn unexposed_attributes_have_no_accessors() {
    let mut host = Host::new();
    let ty = host.define_type("Secretive");
    host.declare(
        ty,
        attr(
            "secret",
            Some(DefaultValue::value(42)),
            AttributeOptions::new().exposure(Exposure::None).predicate(true),
        ),
    )
    .unwrap();

    assert!(host.type_def(ty).context(Scope::Instance).installed_names().is_empty());
    let mut obj = host.instantiate(ty);
    for name in ["secret", "secret=", "secret?"] {
        let err = host
            .call(&mut obj, name, Args::none(), CallSite::SelfCall)
            .unwrap_err();
        assert!(matches!(err, AttrError::NoMethod { .. }));
    }
    assert_eq!(host.fetch(&mut obj, "secret").unwrap(), Value::Int(42));
}

#[test]
fn transformer_runs_on_write_only() {
    let mut host = Host::new();
    let ty = host.define_type("Parsed");
    let calls = Arc::new(Mutex::new(0usize));
    let seen = Arc::clone(&calls);
    let to_int: Transformer = Arc::new(move |args: Args| {
        *seen.lock().unwrap() += 1;
        let raw = args.positional.first().cloned().unwrap_or_default();
        match &raw {
            Value::Int(n) => Ok(Value::Int(*n)),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|err| AttrError::coercion("n", err.to_string())),
            other => Err(AttrError::coercion("n", format!("cannot convert {other}"))),
        }
    });
    let spec = AttributeSpec::construct("n", None, &AttributeOptions::new(), Some(to_int)).unwrap();
    host.declare(ty, spec).unwrap();

    let mut obj = host.instantiate(ty);
    host.write(&mut obj, "n", "5").unwrap();
    assert_eq!(host.read(&mut obj, "n").unwrap(), Value::Int(5));
    assert_eq!(host.read(&mut obj, "n").unwrap(), Value::Int(5));
    assert_eq!(*calls.lock().unwrap(), 1);

    let err = host.write(&mut obj, "n", "five").unwrap_err();
    assert!(matches!(err, AttrError::Coercion { .. }));
    assert_eq!(host.read(&mut obj, "n").unwrap(), Value::Int(5));
}

#[test]
fn write_only_reader_is_escalated() {
    let mut host = Host::new();
    let ty = host.define_type("Sink");
    host.declare(
        ty,
        attr(
            "password",
            None,
            AttributeOptions::new()
                .exposure(Exposure::Write)
                .visibility(Visibility::Public),
        ),
    )
    .unwrap();

    let mut obj = host.instantiate(ty);
    host.write(&mut obj, "password", "hunter2").unwrap();
    let err = host.read(&mut obj, "password").unwrap_err();
    assert!(matches!(
        err,
        AttrError::NotVisible {
            visibility: Visibility::Private,
            ..
        }
    ));
    assert_eq!(
        host.call(&mut obj, "password", Args::none(), CallSite::SelfCall)
            .unwrap(),
        Value::from("hunter2")
    );

    let ty_level = attr(
        "endpoint",
        None,
        AttributeOptions::new().scope(Scope::Type).exposure(Exposure::Write),
    );
    host.declare(ty, ty_level).unwrap();
    let reader = host.type_def(ty).context(Scope::Type).method("endpoint").unwrap();
    assert_eq!(reader.visibility, Visibility::Protected);
}

#[test]
fn read_only_attribute_reports_readonly_on_write() {
    let mut host = Host::new();
    let ty = host.define_type("Gauge");
    host.declare(
        ty,
        attr(
            "level",
            Some(DefaultValue::value(1)),
            AttributeOptions::new().exposure(Exposure::Read).predicate(true),
        ),
    )
    .unwrap();

    let mut obj = host.instantiate(ty);
    assert!(host.query(&mut obj, "level").unwrap());
    let err = host.write(&mut obj, "level", 2).unwrap_err();
    assert!(matches!(err, AttrError::Readonly { .. }));
}

#[test]
fn redeclaring_locally_fails_but_subtypes_may_shadow() {
    let mut host = Host::new();
    let parent = host.define_type("Base");
    host.declare(parent, attr("count", Some(DefaultValue::value(0)), AttributeOptions::new()))
        .unwrap();
    let err = host
        .declare(parent, attr("count", None, AttributeOptions::new()))
        .unwrap_err();
    assert!(matches!(err, AttrError::AlreadyDefined { .. }));

    let child = host.define_subtype("Derived", parent).unwrap();
    host.declare(child, attr("count", Some(DefaultValue::value(9)), AttributeOptions::new()))
        .unwrap();
    let mut obj = host.instantiate(child);
    assert_eq!(host.read(&mut obj, "count").unwrap(), Value::Int(9));
    let mut base = host.instantiate(parent);
    assert_eq!(host.read(&mut base, "count").unwrap(), Value::Int(0));
}

#[test]
fn unit_applies_to_each_attached_type() {
    let mut host = Host::new();
    let unit = host.define_unit("Timestamped");
    host.declare(
        unit,
        attr("created", Some(DefaultValue::value("now")), AttributeOptions::new()),
    )
    .unwrap();
    let first = host.define_type("First");
    let second = host.define_type("Second");
    host.compose(first, unit).unwrap();
    host.compose(second, unit).unwrap();

    let mut a = host.instantiate(first);
    let mut b = host.instantiate(second);
    host.write(&mut a, "created", "then").unwrap();
    assert_eq!(host.read(&mut b, "created").unwrap(), Value::from("now"));
    assert_eq!(host.unit_def(unit).attached(), &[first, second]);
}
