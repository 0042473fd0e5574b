use std::cell::Cell;

use reldoc::datatype::{array_of, map_of, StandardType};
use reldoc::dispatch::{
    chain, conditional, conditional_or_none, conditional_or_throw, constant, delegating, dispatch,
    first_some, handler_fn, map_context, map_result, TypeHandler, TypeKind,
};
use reldoc::error::ReldocError;
use reldoc::repository::Repository;
use reldoc::schema::TypeDefinitionBuilder;

fn kind_name() -> impl TypeHandler<(), Output = String> {
    handler_fn(|kind: &TypeKind<'_>, _: &()| Ok(kind.name().to_string()))
}

fn is_number() -> impl TypeHandler<(), Output = bool> {
    handler_fn(|kind: &TypeKind<'_>, _: &()| {
        Ok(matches!(kind, TypeKind::Long | TypeKind::Double | TypeKind::Decimal))
    })
}

#[test]
fn every_standard_type_dispatches_to_its_kind() {
    for standard in StandardType::ALL {
        let name = dispatch(&standard.descriptor(), &(), &kind_name()).expect("dispatch");
        assert_eq!(name, standard.identifier());
    }
}

#[test]
fn parametrized_kinds_carry_their_value_type() {
    let array = array_of(&StandardType::Long.descriptor());
    match TypeKind::of(&array) {
        TypeKind::Array(Some(element)) => assert_eq!(element.identifier(), "Long"),
        other => panic!("unexpected kind {:?}", other),
    }
    let map = map_of(&StandardType::String.descriptor());
    assert!(matches!(TypeKind::of(&map), TypeKind::Map(Some(_))));
    assert!(!TypeKind::of(&map).is_scalar());
    assert!(TypeKind::of(&StandardType::Date.descriptor()).is_scalar());
}

#[test]
fn defined_types_dispatch_by_shape() {
    let repository = Repository::in_memory().expect("repository");
    let color = TypeDefinitionBuilder::new("Color")
        .referencable()
        .field("name", StandardType::Name)
        .build(&repository)
        .expect("color");
    let localized = repository.localized_string().expect("localized string");
    let color_ref = color.reference_type().expect("companion").clone();

    assert!(matches!(TypeKind::of(color.descriptor()), TypeKind::Object(_)));
    assert!(matches!(TypeKind::of(localized.descriptor()), TypeKind::LocalizedString));
    match TypeKind::of(color_ref.descriptor()) {
        TypeKind::Reference(Some(target)) => assert_eq!(target.identifier(), "Color"),
        other => panic!("unexpected kind {:?}", other),
    }
    assert_eq!(
        dispatch(color.descriptor(), &(), &kind_name()).expect("dispatch"),
        "Color"
    );
}

#[test]
fn constant_ignores_the_kind() {
    let handler = constant::<(), i32>(7);
    assert_eq!(dispatch(&StandardType::Long.descriptor(), &(), &handler).expect("long"), 7);
    assert_eq!(dispatch(&StandardType::Null.descriptor(), &(), &handler).expect("null"), 7);
}

#[test]
fn chain_runs_both_handlers_once() {
    let counter = Cell::new(0u32);
    let first = handler_fn(|_: &TypeKind<'_>, counter: &Cell<u32>| {
        counter.set(counter.get() + 1);
        Ok(())
    });
    let second = handler_fn(|_: &TypeKind<'_>, counter: &Cell<u32>| {
        counter.set(counter.get() + 10);
        Ok(counter.get())
    });
    let result = dispatch(&StandardType::String.descriptor(), &counter, &chain(first, second)).expect("chain");
    assert_eq!(result, 11);
    assert_eq!(counter.get(), 11);
}

#[test]
fn chain_stops_when_the_first_handler_fails() {
    let counter = Cell::new(0u32);
    let first = handler_fn(|kind: &TypeKind<'_>, _: &Cell<u32>| kind.unsupported::<()>("no"));
    let second = handler_fn(|_: &TypeKind<'_>, counter: &Cell<u32>| {
        counter.set(1);
        Ok(())
    });
    assert!(dispatch(&StandardType::String.descriptor(), &counter, &chain(first, second)).is_err());
    assert_eq!(counter.get(), 0);
}

#[test]
fn conditional_picks_one_branch() {
    let handler = conditional(is_number(), constant::<(), &str>("number"), constant::<(), &str>("other"));
    assert_eq!(dispatch(&StandardType::Double.descriptor(), &(), &handler).expect("double"), "number");
    assert_eq!(dispatch(&StandardType::Name.descriptor(), &(), &handler).expect("name"), "other");
}

#[test]
fn conditional_or_throw_fails_with_unsupported_operation() {
    let handler = conditional_or_throw::<_, _, String>(is_number(), kind_name(), "numbers only");
    assert_eq!(dispatch(&StandardType::Long.descriptor(), &(), &handler).expect("long"), "Long");
    match dispatch(&StandardType::Boolean.descriptor(), &(), &handler) {
        Err(ReldocError::UnsupportedOperation { type_name, reason }) => {
            assert_eq!(type_name, "Boolean");
            assert_eq!(reason, "numbers only");
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn conditional_or_none_answers_none() {
    let handler = conditional_or_none::<(), _, _, String>(is_number(), kind_name());
    assert_eq!(
        dispatch(&StandardType::Decimal.descriptor(), &(), &handler).expect("decimal"),
        Some("Decimal".to_string())
    );
    assert_eq!(dispatch(&StandardType::Uri.descriptor(), &(), &handler).expect("uri"), None);
}

#[test]
fn map_result_transforms_the_output() {
    let handler = map_result(kind_name(), |name: String| name.len());
    assert_eq!(dispatch(&StandardType::Boolean.descriptor(), &(), &handler).expect("boolean"), 7);
}

#[test]
fn map_context_adapts_the_context() {
    let inner = handler_fn(|kind: &TypeKind<'_>, prefix: &String| Ok(format!("{}{}", prefix, kind.name())));
    let handler = map_context(inner, |depth: &usize| "-".repeat(*depth));
    assert_eq!(dispatch(&StandardType::Path.descriptor(), &3usize, &handler).expect("path"), "---Path");
}

#[test]
fn delegating_overrides_only_what_it_claims() {
    let handler = delegating(constant::<(), i32>(0), |kind: &TypeKind<'_>, _: &()| match kind {
        TypeKind::String => Some(Ok(1)),
        TypeKind::Binary => Some(kind.unsupported("binary")),
        _ => None,
    });
    assert_eq!(dispatch(&StandardType::String.descriptor(), &(), &handler).expect("string"), 1);
    assert_eq!(dispatch(&StandardType::Long.descriptor(), &(), &handler).expect("long"), 0);
    assert!(dispatch(&StandardType::Binary.descriptor(), &(), &handler).is_err());
}

#[test]
fn first_some_stops_at_the_first_answer() {
    let calls = Cell::new(0u32);
    let handlers: Vec<Box<dyn TypeHandler<Cell<u32>, Output = Option<&str>>>> = vec![
        Box::new(handler_fn(|kind: &TypeKind<'_>, calls: &Cell<u32>| {
            calls.set(calls.get() + 1);
            Ok(matches!(kind, TypeKind::Null).then_some("null"))
        })),
        Box::new(handler_fn(|kind: &TypeKind<'_>, calls: &Cell<u32>| {
            calls.set(calls.get() + 1);
            Ok(kind.is_scalar().then_some("scalar"))
        })),
    ];
    let handler = first_some(handlers);
    assert_eq!(dispatch(&StandardType::Null.descriptor(), &calls, &handler).expect("null"), Some("null"));
    assert_eq!(calls.get(), 1);
    assert_eq!(
        dispatch(&StandardType::Long.descriptor(), &calls, &handler).expect("long"),
        Some("scalar")
    );
    assert_eq!(calls.get(), 3);
    let array = array_of(&StandardType::Long.descriptor());
    assert_eq!(dispatch(&array, &calls, &handler).expect("array"), None);
}
