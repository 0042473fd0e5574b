//! Demo: defines a small catalogue schema, fills it and prints it back by
//! walking the read views.
//!
//! `reldoc [config-path]` reads its settings from `reldoc.toml` (or the given file)
//! and from `RELDOC__...` environment variables.
use std::env;

use chrono::NaiveDate;
use tracing::info;
use tracing_subscriber::EnvFilter;

use reldoc::builder::ObjectBuilder;
use reldoc::config::Settings;
use reldoc::datatype::{Decimal, StandardType, Value};
use reldoc::error::Result;
use reldoc::reader::{Node, TreeNode};
use reldoc::repository::Repository;
use reldoc::schema::TypeDefinitionBuilder;

fn render(node: &Node<'_>, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);
    match node {
        Node::Scalar(_) => {
            let value = node.value().cloned().unwrap_or(Value::Null);
            println!("{}{}: {}", indent, node.name(), value);
        }
        Node::Object(object) => {
            println!("{}{} ({} '{}')", indent, node.name(), node.type_descriptor(), object.reference());
            for (_, item) in node.items()? {
                render(&item, depth + 1)?;
            }
        }
        Node::Array(_) => {
            println!("{}{} ({})", indent, node.name(), node.type_descriptor());
            for (_, item) in node.items()? {
                render(&item, depth + 1)?;
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let config_path = env::args().nth(1);
    let settings = Settings::load(config_path.as_deref())?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let repository = Repository::from_settings(&settings)?;
    info!("Repository opened in {:?} mode", settings.persistence_mode()?);

    // ------------- Schema -------------
    let color = TypeDefinitionBuilder::new("Color")
        .referencable()
        .field("name", StandardType::Name)
        .field("displayName", repository.localized_string()?)
        .build(&repository)?;
    let shape = TypeDefinitionBuilder::new("Shape")
        .field("kind", StandardType::String)
        .mandatory()
        .reference("color", &color)
        .field("sides", StandardType::Long)
        .field("area", StandardType::Double)
        .build(&repository)?;
    let brand = TypeDefinitionBuilder::new("Brand")
        .referencable()
        .field("name", StandardType::String)
        .limited_to(40)
        .field("website", StandardType::Uri)
        .build(&repository)?;
    let article = TypeDefinitionBuilder::new("Article")
        .referencable()
        .field("title", StandardType::String)
        .described("what the customer sees")
        .field("price", StandardType::Decimal)
        .field("released", StandardType::Date)
        .reference("brand", &brand)
        .field("shape", &shape)
        .repeatable("tags", StandardType::String)
        .build(&repository)?;
    let line = TypeDefinitionBuilder::new("BillOfMaterialLine")
        .reference("article", &article)
        .field("quantity", StandardType::Long)
        .build(&repository)?;
    let article = TypeDefinitionBuilder::extend(&article)
        .repeatable("bom", &line)
        .build(&repository)?;

    // ------------- Data -------------
    for (reference, english) in [("red", "Red"), ("blue", "Blue")] {
        ObjectBuilder::new(&color)
            .set("reference", reference)?
            .set("name", reference)?
            .set_localized("displayName", "en", english)?
            .build(&repository)?;
    }
    ObjectBuilder::new(&brand)
        .set("reference", "acme")?
        .set("name", "Acme Corporation")?
        .set("website", "https://acme.example")?
        .build(&repository)?;
    let screw = ObjectBuilder::new(&article)
        .set("reference", "screw")?
        .set("title", "Screw")?
        .set("price", "0.05".parse::<Decimal>()?)?
        .set("brand", "acme")?
        .add("tags", "hardware")?
        .build(&repository)?;
    let bracket = ObjectBuilder::new(&article)
        .set("reference", "bracket")?
        .set("title", "Bracket")?
        .set("released", NaiveDate::from_ymd_opt(2024, 3, 17))?
        .set("brand", "acme")?
        .set_object(
            "shape",
            ObjectBuilder::new(&shape)
                .set("kind", "triangle")?
                .set("color", "red")?
                .set("sides", 3i64)?
                .set("area", 12.5)?,
        )?
        .add("tags", "hardware")?
        .add("tags", "steel")?
        .add_item(
            ObjectBuilder::new(&line)
                .set("article", "screw")?
                .set("quantity", 4i64)?,
        )?
        .build(&repository)?;
    info!("Built {} and {}", screw, bracket);

    // ------------- Read back -------------
    for entity in repository.all_of(article.descriptor())? {
        render(&Node::Object(repository.reader(&entity)?), 0)?;
    }
    Ok(())
}
