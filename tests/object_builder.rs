use reldoc::builder::ObjectBuilder;
use reldoc::datatype::{StandardType, Value};
use reldoc::error::{ReldocError, Result};
use reldoc::reader::TreeNode;
use reldoc::repository::Repository;
use reldoc::schema::{RelationalTypeDefinition, TypeDefinitionBuilder};

struct Catalogue {
    color: RelationalTypeDefinition,
    shape: RelationalTypeDefinition,
    point: RelationalTypeDefinition,
    brand: RelationalTypeDefinition,
}

fn setup() -> (Repository, Catalogue) {
    let repository = Repository::in_memory().expect("repository");
    let color = TypeDefinitionBuilder::new("Color")
        .referencable()
        .field("name", StandardType::Name)
        .field("displayName", repository.localized_string().expect("localized string"))
        .build(&repository)
        .expect("color");
    let shape = TypeDefinitionBuilder::new("Shape")
        .field("kind", StandardType::String)
        .mandatory()
        .reference("color", &color)
        .field("sides", StandardType::Long)
        .field("area", StandardType::Double)
        .build(&repository)
        .expect("shape");
    let point = TypeDefinitionBuilder::new("Point")
        .field("x", StandardType::Double)
        .field("y", StandardType::Double)
        .build(&repository)
        .expect("point");
    let brand = TypeDefinitionBuilder::new("Brand")
        .referencable()
        .field("name", StandardType::String)
        .limited_to(5)
        .field("logo", StandardType::Binary)
        .field("shape", &shape)
        .repeatable("corners", &point)
        .build(&repository)
        .expect("brand");
    ObjectBuilder::new(&color)
        .set("reference", "red")
        .and_then(|b| b.set("name", "red"))
        .and_then(|b| b.set_localized("displayName", "en", "Red"))
        .and_then(|b| b.build(&repository))
        .expect("red");
    (
        repository,
        Catalogue {
            color,
            shape,
            point,
            brand,
        },
    )
}

fn counts(repository: &Repository) -> (usize, usize) {
    let store = repository.store();
    (
        store.count_entities().expect("entities"),
        store.count_edges().expect("edges"),
    )
}

#[test]
fn referencable_instances_are_found_by_reference() -> Result<()> {
    let (repository, types) = setup();
    let blue = ObjectBuilder::new(&types.color)
        .set("reference", "blue")?
        .set("name", "blue")?
        .build(&repository)?;
    assert_eq!(blue.reference, "blue");
    assert_eq!(blue.type_code, types.color.descriptor().code());
    assert_eq!(repository.find("blue", types.color.descriptor())?, Some(blue));
    assert_eq!(repository.find("green", types.color.descriptor())?, None);
    Ok(())
}

#[test]
fn set_reference_names_the_instance() -> Result<()> {
    let (repository, types) = setup();
    let green = ObjectBuilder::new(&types.color)
        .set_reference("green")
        .build(&repository)?;
    assert_eq!(green.reference, "green");
    Ok(())
}

#[test]
fn referencable_instances_need_a_reference() -> Result<()> {
    let (repository, types) = setup();
    let before = counts(&repository);
    let result = ObjectBuilder::new(&types.color).set("name", "nameless")?.build(&repository);
    assert!(matches!(result, Err(ReldocError::Schema(_))));
    assert_eq!(counts(&repository), before);
    Ok(())
}

#[test]
fn other_instances_get_a_generated_reference() -> Result<()> {
    let (repository, types) = setup();
    let first = ObjectBuilder::new(&types.point).set("x", 1.0)?.build(&repository)?;
    let second = ObjectBuilder::new(&types.point).set("x", 2.0)?.build(&repository)?;
    assert!(first.reference.parse::<u32>().is_ok());
    assert_ne!(first.reference, second.reference);
    assert_eq!(repository.all_of(types.point.descriptor())?, vec![first, second]);
    Ok(())
}

#[test]
fn duplicate_references_are_rejected() -> Result<()> {
    let (repository, types) = setup();
    let before = counts(&repository);
    let result = ObjectBuilder::new(&types.color)
        .set("reference", "red")?
        .set("name", "other red")?
        .build(&repository);
    match result {
        Err(ReldocError::Duplicate { reference, type_name }) => {
            assert_eq!(reference, "red");
            assert_eq!(type_name, "Color");
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(counts(&repository), before);
    Ok(())
}

#[test]
fn mandatory_fields_must_be_set() -> Result<()> {
    let (repository, types) = setup();
    let before = counts(&repository);
    let result = ObjectBuilder::new(&types.shape).set("sides", 4i64)?.build(&repository);
    assert!(matches!(result, Err(ReldocError::Schema(_))));
    assert_eq!(counts(&repository), before);
    ObjectBuilder::new(&types.shape)
        .set("kind", "square")?
        .set("sides", 4i64)?
        .build(&repository)?;
    Ok(())
}

#[test]
fn limits_apply_to_text_and_locales() -> Result<()> {
    let (_repository, types) = setup();
    assert!(matches!(
        ObjectBuilder::new(&types.brand).set("name", "toolong"),
        Err(ReldocError::Schema(_))
    ));
    assert!(ObjectBuilder::new(&types.brand).set("name", "short").is_ok());
    assert!(matches!(
        ObjectBuilder::new(&types.color).set_localized("displayName", "en-GB-x", "Red"),
        Err(ReldocError::Schema(_))
    ));
    assert!(matches!(
        ObjectBuilder::new(&types.color).set_localized("name", "en", "Red"),
        Err(ReldocError::UnsupportedOperation { .. })
    ));
    Ok(())
}

#[test]
fn unknown_fields_are_reported() {
    let (_repository, types) = setup();
    match ObjectBuilder::new(&types.shape).set("colour", "red") {
        Err(ReldocError::UnknownField { field, type_name }) => {
            assert_eq!(field, "colour");
            assert_eq!(type_name, "Shape");
        }
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("unknown field accepted"),
    }
}

#[test]
fn values_must_match_the_declared_type() {
    let (_repository, types) = setup();
    assert!(matches!(
        ObjectBuilder::new(&types.shape).set("sides", "three"),
        Err(ReldocError::UnsupportedOperation { .. })
    ));
    assert!(matches!(
        ObjectBuilder::new(&types.shape).set("sides", 2.5),
        Err(ReldocError::UnsupportedOperation { .. })
    ));
    assert!(ObjectBuilder::new(&types.shape).set("area", 3i64).is_ok());
    assert!(ObjectBuilder::new(&types.shape).set("sides", Value::Null).is_ok());
    assert!(matches!(
        ObjectBuilder::new(&types.brand).set("logo", Value::Binary(vec![1, 2, 3])),
        Err(ReldocError::UnsupportedOperation { .. })
    ));
    assert!(matches!(
        ObjectBuilder::new(&types.shape).set("area", f64::NAN),
        Err(ReldocError::UnsupportedOperation { .. })
    ));
}

#[test]
fn unresolved_references_write_nothing() -> Result<()> {
    let (repository, types) = setup();
    let before = counts(&repository);
    let result = ObjectBuilder::new(&types.shape)
        .set("kind", "circle")?
        .set("color", "purple")?
        .build(&repository);
    match result {
        Err(ReldocError::ReferenceResolution { reference, type_name }) => {
            assert_eq!(reference, "purple");
            assert_eq!(type_name, "Color");
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(counts(&repository), before);
    Ok(())
}

#[test]
fn references_accept_entities_of_the_target_type() -> Result<()> {
    let (repository, types) = setup();
    let red = repository
        .find("red", types.color.descriptor())?
        .expect("red");
    ObjectBuilder::new(&types.shape)
        .set("kind", "circle")?
        .set("color", &red)?
        .build(&repository)?;
    let point = ObjectBuilder::new(&types.point).build(&repository)?;
    assert!(matches!(
        ObjectBuilder::new(&types.shape).set("color", &point),
        Err(ReldocError::Schema(_))
    ));
    Ok(())
}

#[test]
fn failing_nested_builders_roll_back_the_whole_tree() -> Result<()> {
    let (repository, types) = setup();
    let before = counts(&repository);
    let nested = ObjectBuilder::new(&types.shape)
        .set("kind", "triangle")?
        .set("color", "purple")?;
    let result = ObjectBuilder::new(&types.brand)
        .set("reference", "acme")?
        .set_object("shape", nested)?
        .add_object("corners", ObjectBuilder::new(&types.point).set("x", 0.0)?)?
        .build(&repository);
    assert!(matches!(result, Err(ReldocError::ReferenceResolution { .. })));
    assert_eq!(counts(&repository), before);
    assert_eq!(repository.find("acme", types.brand.descriptor())?, None);
    Ok(())
}

#[test]
fn nested_objects_must_have_the_field_type() -> Result<()> {
    let (_repository, types) = setup();
    assert!(matches!(
        ObjectBuilder::new(&types.brand).set_object("shape", ObjectBuilder::new(&types.point)),
        Err(ReldocError::Schema(_))
    ));
    assert!(matches!(
        ObjectBuilder::new(&types.brand).add_object("corners", ObjectBuilder::new(&types.shape)),
        Err(ReldocError::Schema(_))
    ));
    assert!(matches!(
        ObjectBuilder::new(&types.brand).add("name", "x"),
        Err(ReldocError::UnsupportedOperation { .. })
    ));
    Ok(())
}

#[test]
fn add_item_needs_exactly_one_matching_field() -> Result<()> {
    let (repository, types) = setup();
    let track = TypeDefinitionBuilder::new("Track")
        .repeatable("stops", &types.point)
        .repeatable("detours", &types.point)
        .field("outline", &types.shape)
        .build(&repository)?;
    assert!(matches!(
        ObjectBuilder::new(&track).add_item(ObjectBuilder::new(&types.point)),
        Err(ReldocError::Schema(_))
    ));
    assert!(matches!(
        ObjectBuilder::new(&track).add_item(ObjectBuilder::new(&types.color)),
        Err(ReldocError::Schema(_))
    ));
    ObjectBuilder::new(&track)
        .add_item(ObjectBuilder::new(&types.shape).set("kind", "loop")?)?
        .build(&repository)?;
    ObjectBuilder::new(&types.brand)
        .set("reference", "corner")?
        .add_item(ObjectBuilder::new(&types.point).set("x", 1.0)?)?
        .add_item(ObjectBuilder::new(&types.point).set("x", 2.0)?)?
        .build(&repository)?;
    Ok(())
}

#[test]
fn field_and_item_builders_follow_the_schema() -> Result<()> {
    let (_repository, types) = setup();
    let brand = ObjectBuilder::new(&types.brand);
    assert_eq!(
        brand.new_field_builder("shape")?.type_descriptor().identifier(),
        "Shape"
    );
    assert_eq!(
        brand.new_item_builder("corners")?.type_descriptor().identifier(),
        "Point"
    );
    assert!(matches!(
        brand.new_field_builder("name"),
        Err(ReldocError::UnsupportedOperation { .. })
    ));
    assert!(matches!(
        brand.new_item_builder("shape"),
        Err(ReldocError::UnsupportedOperation { .. })
    ));
    Ok(())
}

#[test]
fn abstract_types_cannot_be_instantiated() -> Result<()> {
    let (repository, _types) = setup();
    let vehicle = TypeDefinitionBuilder::new("Vehicle")
        .abstract_type()
        .field("wheels", StandardType::Long)
        .build(&repository)?;
    assert!(matches!(
        ObjectBuilder::new(&vehicle).set("wheels", 4i64)?.build(&repository),
        Err(ReldocError::Schema(_))
    ));
    Ok(())
}

#[test]
fn builds_nest_inside_an_outer_transaction() -> Result<()> {
    let (repository, types) = setup();
    let before = counts(&repository);
    let result: Result<()> = repository.transaction(|| {
        ObjectBuilder::new(&types.color)
            .set("reference", "blue")?
            .build(&repository)?;
        ObjectBuilder::new(&types.color)
            .set("reference", "red")?
            .build(&repository)?;
        Ok(())
    });
    assert!(matches!(result, Err(ReldocError::Duplicate { .. })));
    assert_eq!(counts(&repository), before);
    assert_eq!(repository.find("blue", types.color.descriptor())?, None);
    Ok(())
}

#[test]
fn references_may_spell_a_field_row() -> Result<()> {
    let (repository, types) = setup();
    // Article.brand is the row of a field whose type is Brand
    let article = TypeDefinitionBuilder::new("Article")
        .field("brand", &types.brand)
        .build(&repository)?;
    let shelf = TypeDefinitionBuilder::new("Shelf")
        .reference("featured", &types.brand)
        .build(&repository)?;
    assert!(article.field_by_name("brand")?.entity().is_some());

    let early = ObjectBuilder::new(&shelf)
        .set("featured", "Article.brand")?
        .build(&repository);
    assert!(matches!(early, Err(ReldocError::ReferenceResolution { .. })));

    let odd = ObjectBuilder::new(&types.brand)
        .set("reference", "Article.brand")?
        .set("name", "odd")?
        .build(&repository)?;
    assert_eq!(
        repository.find("Article.brand", types.brand.descriptor())?,
        Some(odd.clone())
    );
    assert_eq!(repository.all_of(types.brand.descriptor())?, vec![odd.clone()]);
    assert!(matches!(
        ObjectBuilder::new(&types.brand)
            .set("reference", "Article.brand")?
            .build(&repository),
        Err(ReldocError::Duplicate { .. })
    ));

    let stocked = ObjectBuilder::new(&shelf)
        .set("featured", "Article.brand")?
        .build(&repository)?;
    let featured = repository.reader(&stocked)?.get_field("featured")?.expect("featured");
    assert_eq!(featured.as_object().expect("brand").entity(), &odd);
    Ok(())
}
