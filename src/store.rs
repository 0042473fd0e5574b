//! The relational store contract: every object is an entity row, every field value
//! and every nesting relation is an edge row between two entities.
//!
//! Edges carry a tagged payload. Scalar edges point at the field descriptor entity
//! and hold the value in a text or decimal cell. Owning edges point at the nested
//! object and remember the field they fill, which keeps field membership unambiguous
//! when reading back.
use std::fmt;

use crate::datatype::{Decimal, TypeCode};
use crate::error::Result;

pub type EntityId = i64;
pub type EdgeId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entity {
    pub id: EntityId,
    pub type_code: TypeCode,
    pub reference: String,
}
impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{} '{}'", self.type_code, self.id, self.reference)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Payload {
    Null,
    Text(String),
    Decimal(Decimal),
    /// The child entity is the value of `field`.
    Child { field: String },
}

impl Payload {
    pub fn kind(&self) -> i64 {
        match self {
            Payload::Null => 0,
            Payload::Text(_) => 1,
            Payload::Decimal(_) => 2,
            Payload::Child { .. } => 3,
        }
    }
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Payload::Child { .. })
    }
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_decimal(&self) -> Option<&Decimal> {
        match self {
            Payload::Decimal(d) => Some(d),
            _ => None,
        }
    }
    /// Assembles a payload from the discriminator and the two value cells of a row.
    pub fn from_cells(kind: i64, text: Option<String>, decimal: Option<Decimal>) -> Payload {
        match (kind, text, decimal) {
            (1, Some(s), _) => Payload::Text(s),
            (2, _, Some(d)) => Payload::Decimal(d),
            (3, Some(field), _) => Payload::Child { field },
            _ => Payload::Null,
        }
    }
    pub fn text_cell(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            Payload::Child { field } => Some(field),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub id: EdgeId,
    pub parent: EntityId,
    pub child: EntityId,
    pub locale: Option<String>,
    pub payload: Payload,
}

pub trait RelationalStore: Send + Sync {
    fn insert_entity(&self, type_code: TypeCode, reference: &str) -> Result<EntityId>;
    /// Used when bootstrapping rows whose identity must equal a fixed code.
    fn insert_entity_with_id(&self, id: EntityId, type_code: TypeCode, reference: &str) -> Result<()>;
    fn find_entity_by_id(&self, id: EntityId) -> Result<Option<Entity>>;
    fn find_entity_by_reference(&self, reference: &str, type_code: TypeCode) -> Result<Option<Entity>>;
    fn find_entities_by_type(&self, type_code: TypeCode) -> Result<Vec<Entity>>;
    fn insert_edge(
        &self,
        parent: EntityId,
        child: EntityId,
        locale: Option<&str>,
        payload: &Payload,
    ) -> Result<EdgeId>;
    /// Edges in insertion order.
    fn find_edges_by_parent(&self, parent: EntityId) -> Result<Vec<Edge>>;
    /// Edges whose child entity has the given type, in insertion order.
    fn find_edges_by_parent_and_type(&self, parent: EntityId, type_code: TypeCode) -> Result<Vec<Edge>>;
    fn find_edges_between(&self, parent: EntityId, child: EntityId) -> Result<Vec<Edge>>;
    /// Removes the entity together with every edge touching it.
    fn delete_entity(&self, id: EntityId) -> Result<()>;
    fn delete_edge(&self, id: EdgeId) -> Result<()>;
    fn count_entities(&self) -> Result<usize>;
    fn count_edges(&self) -> Result<usize>;
    fn begin(&self) -> Result<()>;
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;
}

/// Runs `work` so that either all of its writes land or none do.
pub fn in_transaction<T>(store: &dyn RelationalStore, work: impl FnOnce() -> Result<T>) -> Result<T> {
    store.begin()?;
    match work() {
        Ok(result) => {
            store.commit()?;
            Ok(result)
        }
        Err(e) => {
            if let Err(rollback) = store.rollback() {
                tracing::error!("Rollback failed after '{}': {}", e, rollback);
            }
            Err(e)
        }
    }
}
