//! Reldoc – a schema-driven document store on top of two relational tables.
//!
//! Every document, every type definition and every field definition is an
//! *entity* row; every field value and every nesting relation is an *edge* row
//! between two entities. Typed, immutable views are reconstructed from those rows
//! on demand.
//! * A [`datatype::TypeDescriptor`] names a standard type (String, Long, Date, ...),
//!   a parametrized container (`Array<T>`, `Map<T>`, `Reference<T>`,
//!   `WeakReference<T>`) or a defined type with an ordered set of fields.
//! * A [`store::Entity`] is an instance, a field definition or a type definition.
//!   Its reference string is unique within its type.
//! * A [`store::Edge`] links a parent to a child and carries a tagged
//!   [`store::Payload`]: a scalar value, or the name of the field an owned child fills.
//!
//! ## Modules
//! * [`datatype`] – The type registry, descriptors, values and decimals.
//! * [`dispatch`] – Routing a descriptor to exactly one handler, plus combinators.
//! * [`store`] – The relational store contract and transactions.
//! * [`persist`] – SQLite implementation of the store.
//! * [`memory`] – In-process implementation of the store.
//! * [`repository`] – Bootstrapping, the schema catalog, lookups and deletion.
//! * [`schema`] – Defining types as rows, and loading them back.
//! * [`builder`] – Staging and writing one instance with its nested instances.
//! * [`reader`] – Lazily evaluated read views implementing [`reader::TreeNode`].
//! * [`config`] – Layered settings.
//!
//! ## Quick Start
//! ```
//! use reldoc::builder::ObjectBuilder;
//! use reldoc::datatype::StandardType;
//! use reldoc::reader::TreeNode;
//! use reldoc::repository::Repository;
//! use reldoc::schema::TypeDefinitionBuilder;
//!
//! let repository = Repository::in_memory().unwrap();
//! let color = TypeDefinitionBuilder::new("Color")
//!     .referencable()
//!     .field("name", StandardType::Name)
//!     .field("displayName", repository.localized_string().unwrap())
//!     .build(&repository)
//!     .unwrap();
//! let red = ObjectBuilder::new(&color)
//!     .set("reference", "red").unwrap()
//!     .set("name", "red").unwrap()
//!     .set_localized("displayName", "en", "Red").unwrap()
//!     .build(&repository)
//!     .unwrap();
//! let view = repository.reader(&red).unwrap();
//! assert_eq!(view.get_localized("displayName", "en").unwrap().as_deref(), Some("Red"));
//! assert!(view.get_field("name").unwrap().is_some());
//! ```
//!
//! ## Transactions
//! Defining a type and building an instance each run inside a savepoint, so a
//! failure leaves no rows behind. Builders nest inside outer transactions opened
//! with [`repository::Repository::transaction`].

pub mod builder;
pub mod config;
pub mod datatype;
pub mod dispatch;
pub mod error;
pub mod memory;
pub mod persist;
pub mod reader;
pub mod repository;
pub mod schema;
pub mod store;
