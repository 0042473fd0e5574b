use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

use crate::datatype::TypeCode;
use crate::error::{ReldocError, Result};
use crate::persist::FIRST_DATA_IDENTITY;
use crate::store::{Edge, EdgeId, Entity, EntityId, Payload, RelationalStore};

#[derive(Debug, Clone, Default)]
struct Tables {
    entities: BTreeMap<EntityId, Entity>,
    edges: BTreeMap<EdgeId, Edge>,
}

impl Tables {
    fn next_entity_id(&self) -> EntityId {
        self.entities
            .keys()
            .next_back()
            .map_or(FIRST_DATA_IDENTITY, |last| (*last + 1).max(FIRST_DATA_IDENTITY))
    }
    fn next_edge_id(&self) -> EdgeId {
        self.edges.keys().next_back().map_or(1, |last| *last + 1)
    }
    fn insert(&mut self, entity: Entity) -> Result<()> {
        if self.entities.contains_key(&entity.id) {
            return Err(ReldocError::Store(format!("entity {} already exists", entity.id)));
        }
        if self
            .entities
            .values()
            .any(|e| e.type_code == entity.type_code && e.reference == entity.reference)
        {
            return Err(ReldocError::Store(format!(
                "reference '{}' already taken for type {}",
                entity.reference, entity.type_code
            )));
        }
        self.entities.insert(entity.id, entity);
        Ok(())
    }
}

/// Relational store held entirely in memory.
///
/// Tables live behind a `RwLock`; transactions push a snapshot of both tables
/// and restore it on rollback.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    snapshots: Mutex<Vec<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            snapshots: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationalStore for MemoryStore {
    fn insert_entity(&self, type_code: TypeCode, reference: &str) -> Result<EntityId> {
        let mut tables = self.tables.write()?;
        let id = tables.next_entity_id();
        tables.insert(Entity {
            id,
            type_code,
            reference: reference.to_string(),
        })?;
        Ok(id)
    }
    fn insert_entity_with_id(&self, id: EntityId, type_code: TypeCode, reference: &str) -> Result<()> {
        let mut tables = self.tables.write()?;
        tables.insert(Entity {
            id,
            type_code,
            reference: reference.to_string(),
        })
    }
    fn find_entity_by_id(&self, id: EntityId) -> Result<Option<Entity>> {
        let tables = self.tables.read()?;
        Ok(tables.entities.get(&id).cloned())
    }
    fn find_entity_by_reference(&self, reference: &str, type_code: TypeCode) -> Result<Option<Entity>> {
        let tables = self.tables.read()?;
        Ok(tables
            .entities
            .values()
            .find(|e| e.type_code == type_code && e.reference == reference)
            .cloned())
    }
    fn find_entities_by_type(&self, type_code: TypeCode) -> Result<Vec<Entity>> {
        let tables = self.tables.read()?;
        Ok(tables
            .entities
            .values()
            .filter(|e| e.type_code == type_code)
            .cloned()
            .collect())
    }
    fn insert_edge(
        &self,
        parent: EntityId,
        child: EntityId,
        locale: Option<&str>,
        payload: &Payload,
    ) -> Result<EdgeId> {
        let mut tables = self.tables.write()?;
        for end in [parent, child] {
            if !tables.entities.contains_key(&end) {
                return Err(ReldocError::Store(format!("edge end {} does not exist", end)));
            }
        }
        let id = tables.next_edge_id();
        tables.edges.insert(
            id,
            Edge {
                id,
                parent,
                child,
                locale: locale.map(str::to_string),
                payload: payload.clone(),
            },
        );
        Ok(id)
    }
    fn find_edges_by_parent(&self, parent: EntityId) -> Result<Vec<Edge>> {
        let tables = self.tables.read()?;
        Ok(tables
            .edges
            .values()
            .filter(|e| e.parent == parent)
            .cloned()
            .collect())
    }
    fn find_edges_by_parent_and_type(&self, parent: EntityId, type_code: TypeCode) -> Result<Vec<Edge>> {
        let tables = self.tables.read()?;
        Ok(tables
            .edges
            .values()
            .filter(|e| {
                e.parent == parent
                    && tables
                        .entities
                        .get(&e.child)
                        .is_some_and(|c| c.type_code == type_code)
            })
            .cloned()
            .collect())
    }
    fn find_edges_between(&self, parent: EntityId, child: EntityId) -> Result<Vec<Edge>> {
        let tables = self.tables.read()?;
        Ok(tables
            .edges
            .values()
            .filter(|e| e.parent == parent && e.child == child)
            .cloned()
            .collect())
    }
    fn delete_entity(&self, id: EntityId) -> Result<()> {
        let mut tables = self.tables.write()?;
        tables.edges.retain(|_, e| e.parent != id && e.child != id);
        tables.entities.remove(&id);
        Ok(())
    }
    fn delete_edge(&self, id: EdgeId) -> Result<()> {
        let mut tables = self.tables.write()?;
        tables.edges.remove(&id);
        Ok(())
    }
    fn count_entities(&self) -> Result<usize> {
        Ok(self.tables.read()?.entities.len())
    }
    fn count_edges(&self) -> Result<usize> {
        Ok(self.tables.read()?.edges.len())
    }
    fn begin(&self) -> Result<()> {
        let snapshot = self.tables.read()?.clone();
        self.snapshots.lock()?.push(snapshot);
        Ok(())
    }
    fn commit(&self) -> Result<()> {
        self.snapshots
            .lock()?
            .pop()
            .map(|_| ())
            .ok_or_else(|| ReldocError::Store("commit without transaction".into()))
    }
    fn rollback(&self) -> Result<()> {
        let snapshot = self
            .snapshots
            .lock()?
            .pop()
            .ok_or_else(|| ReldocError::Store("rollback without transaction".into()))?;
        *self.tables.write()? = snapshot;
        Ok(())
    }
}
