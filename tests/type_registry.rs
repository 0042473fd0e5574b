use std::sync::Arc;

use reldoc::datatype::{
    array_of, map_of, parse_parametrized, reference_of, weak_reference_of, Decimal, StandardType,
    TypeClass, Value,
};
use reldoc::error::ReldocError;

#[test]
fn codes_and_identifiers_are_bijective() {
    for standard in StandardType::ALL {
        assert_eq!(StandardType::from_code(standard.code()).expect("code"), standard);
        assert_eq!(
            StandardType::from_identifier(standard.identifier()).expect("identifier"),
            standard
        );
    }
}

#[test]
fn fixed_codes_are_kept() {
    assert_eq!(StandardType::Any.code(), 0);
    assert_eq!(StandardType::String.code(), 1);
    assert_eq!(StandardType::Decimal.code(), 12);
    assert_eq!(StandardType::TypeDef.code(), 16);
    assert_eq!(StandardType::Date.code(), 17);
    assert_eq!(StandardType::Map.code(), 19);
    assert_eq!(StandardType::Null.code(), 20);
}

#[test]
fn unknown_codes_and_names_fail() {
    assert!(matches!(StandardType::from_code(13), Err(ReldocError::UnknownType(_))));
    assert!(matches!(StandardType::from_code(-1), Err(ReldocError::UnknownType(_))));
    assert!(matches!(
        StandardType::from_identifier("Whatever"),
        Err(ReldocError::UnknownType(_))
    ));
}

#[test]
fn parametrized_descriptors_are_memoized() {
    let string = StandardType::String.descriptor();
    let first = array_of(&string);
    let second = array_of(&StandardType::String.descriptor());
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.identifier(), "Array<String>");
    assert_eq!(first.code(), StandardType::Array.code());
    assert_eq!(first.class(), TypeClass::Parametrized(StandardType::Array));
    assert_eq!(first.value_type().expect("value type").identifier(), "String");

    let map = map_of(&string);
    assert_ne!(*map, *first);
    assert_eq!(map.identifier(), "Map<String>");
    assert_eq!(reference_of(&string).identifier(), "Reference<String>");
    assert_eq!(weak_reference_of(&string).identifier(), "WeakReference<String>");
}

#[test]
fn nested_parametrized_identifiers_parse() {
    let long = StandardType::Long.descriptor();
    let nested = map_of(&array_of(&long));
    assert_eq!(nested.identifier(), "Map<Array<Long>>");
    assert_eq!(
        parse_parametrized(nested.identifier()),
        Some((StandardType::Map, "Array<Long>"))
    );
    assert_eq!(parse_parametrized("Color"), None);
    assert_eq!(parse_parametrized("Set<Color>"), None);
}

#[test]
fn standard_descriptors_have_no_fields() {
    let name = StandardType::Name.descriptor();
    assert!(name.fields().is_empty());
    assert!(!name.is_defined());
    assert!(matches!(
        name.field_or_err("anything"),
        Err(ReldocError::UnknownField { .. })
    ));
}

#[test]
fn values_convert_from_plain_types() {
    assert_eq!(Value::from("x"), Value::Text("x".to_string()));
    assert_eq!(Value::from(42i64), Value::Long(42));
    assert_eq!(Value::from(true), Value::Boolean(true));
    assert_eq!(Value::from(None::<i64>), Value::Null);
    assert_eq!(Value::from(Some(1.5)), Value::Double(1.5));
}

#[test]
fn decimals_keep_their_short_form() {
    assert_eq!(Decimal::from_double(0.1).expect("finite").to_string(), "0.1");
    assert!(Decimal::from_double(f64::NAN).is_none());
    assert!(Decimal::from_double(f64::INFINITY).is_none());
    assert_eq!(Decimal::from_long(-42).to_long(), Some(-42));
    assert!(Decimal::from_bool(true).is_one());
    assert!(!Decimal::from_bool(false).is_one());
    let parsed: Decimal = "12.50".parse().expect("decimal");
    assert_eq!(parsed.to_double(), Some(12.5));
    assert!("twelve".parse::<Decimal>().is_err());
}
