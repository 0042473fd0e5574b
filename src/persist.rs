// used for persistence
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Mutex;
use tracing::{debug, trace};

use crate::datatype::{Decimal, TypeCode};
use crate::error::Result;
use crate::store::{Edge, EdgeId, Entity, EntityId, Payload, RelationalStore};

/// Identities below this are reserved for the standard type rows.
pub const FIRST_DATA_IDENTITY: EntityId = 100;

const SAVEPOINT: &str = "build";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}

pub struct SqliteStore {
    connection: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(mode: PersistenceMode) -> Result<SqliteStore> {
        let connection = match &mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => Connection::open(path)?,
        };
        debug!("Opened relational store {:?}", mode);
        SqliteStore::with_connection(connection)
    }
    pub fn with_connection(connection: Connection) -> Result<SqliteStore> {
        // The "STRICT" keyword introduced in 3.37.0 breaks JDBC connections, which makes
        // debugging using an external tool like DBeaver impossible
        connection.execute_batch(
            "
            create table if not exists Entity (
                Entity_Identity integer not null,
                Type_Identity integer not null,
                Reference text not null,
                constraint referenceable_Entity_Identity primary key (
                    Entity_Identity
                ),
                constraint unique_Reference_per_Type unique (
                    Type_Identity,
                    Reference
                )
            );-- STRICT;
            create table if not exists Edge (
                Edge_Identity integer not null,
                Parent_Identity integer not null,
                Child_Identity integer not null,
                Locale text null,
                PayloadKind integer not null,
                StringValue text null,
                DecimalValue text null,
                constraint Parent_is_Entity foreign key (
                    Parent_Identity
                ) references Entity(Entity_Identity),
                constraint Child_is_Entity foreign key (
                    Child_Identity
                ) references Entity(Entity_Identity),
                constraint referenceable_Edge_Identity primary key (
                    Edge_Identity
                )
            );-- STRICT;
            create index if not exists Edge_by_Parent on Edge (
                Parent_Identity,
                Edge_Identity
            );
            create index if not exists Edge_by_Child on Edge (
                Child_Identity
            );
            ",
        )?;
        Ok(SqliteStore {
            connection: Mutex::new(connection),
        })
    }
}

fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<Entity> {
    Ok(Entity {
        id: row.get(0)?,
        type_code: row.get(1)?,
        reference: row.get(2)?,
    })
}

fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<Edge> {
    let kind: i64 = row.get(4)?;
    let text: Option<String> = row.get(5)?;
    let decimal: Option<Decimal> = row.get(6)?;
    Ok(Edge {
        id: row.get(0)?,
        parent: row.get(1)?,
        child: row.get(2)?,
        locale: row.get(3)?,
        payload: Payload::from_cells(kind, text, decimal),
    })
}

impl RelationalStore for SqliteStore {
    fn insert_entity(&self, type_code: TypeCode, reference: &str) -> Result<EntityId> {
        let connection = self.connection.lock()?;
        let id: EntityId = connection.query_row(
            "
            select max(coalesce(max(Entity_Identity), 0), ?) + 1
                from Entity
            ",
            params![FIRST_DATA_IDENTITY - 1],
            |r| r.get(0),
        )?;
        connection
            .prepare_cached(
                "
                insert into Entity (
                    Entity_Identity,
                    Type_Identity,
                    Reference
                ) values (?, ?, ?)
                ",
            )?
            .execute(params![id, type_code, reference])?;
        trace!("Inserted entity {} of type {} '{}'", id, type_code, reference);
        Ok(id)
    }
    fn insert_entity_with_id(&self, id: EntityId, type_code: TypeCode, reference: &str) -> Result<()> {
        let connection = self.connection.lock()?;
        connection
            .prepare_cached(
                "
                insert into Entity (
                    Entity_Identity,
                    Type_Identity,
                    Reference
                ) values (?, ?, ?)
                ",
            )?
            .execute(params![id, type_code, reference])?;
        Ok(())
    }
    fn find_entity_by_id(&self, id: EntityId) -> Result<Option<Entity>> {
        let connection = self.connection.lock()?;
        let entity = connection
            .prepare_cached(
                "
                select Entity_Identity, Type_Identity, Reference
                    from Entity
                    where Entity_Identity = ?
                ",
            )?
            .query_row(params![id], entity_from_row)
            .optional()?;
        Ok(entity)
    }
    fn find_entity_by_reference(&self, reference: &str, type_code: TypeCode) -> Result<Option<Entity>> {
        let connection = self.connection.lock()?;
        let entity = connection
            .prepare_cached(
                "
                select Entity_Identity, Type_Identity, Reference
                    from Entity
                    where Reference = ?
                    and Type_Identity = ?
                ",
            )?
            .query_row(params![reference, type_code], entity_from_row)
            .optional()?;
        Ok(entity)
    }
    fn find_entities_by_type(&self, type_code: TypeCode) -> Result<Vec<Entity>> {
        let connection = self.connection.lock()?;
        let mut statement = connection.prepare_cached(
            "
            select Entity_Identity, Type_Identity, Reference
                from Entity
                where Type_Identity = ?
                order by Entity_Identity
            ",
        )?;
        let entities = statement
            .query_map(params![type_code], entity_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entities)
    }
    fn insert_edge(
        &self,
        parent: EntityId,
        child: EntityId,
        locale: Option<&str>,
        payload: &Payload,
    ) -> Result<EdgeId> {
        let connection = self.connection.lock()?;
        let id: EdgeId = connection.query_row(
            "
            select coalesce(max(Edge_Identity), 0) + 1
                from Edge
            ",
            [],
            |r| r.get(0),
        )?;
        connection
            .prepare_cached(
                "
                insert into Edge (
                    Edge_Identity,
                    Parent_Identity,
                    Child_Identity,
                    Locale,
                    PayloadKind,
                    StringValue,
                    DecimalValue
                ) values (?, ?, ?, ?, ?, ?, ?)
                ",
            )?
            .execute(params![
                id,
                parent,
                child,
                locale,
                payload.kind(),
                payload.text_cell(),
                payload.as_decimal()
            ])?;
        trace!("Inserted edge {} from {} to {}", id, parent, child);
        Ok(id)
    }
    fn find_edges_by_parent(&self, parent: EntityId) -> Result<Vec<Edge>> {
        let connection = self.connection.lock()?;
        let mut statement = connection.prepare_cached(
            "
            select Edge_Identity, Parent_Identity, Child_Identity, Locale,
                    PayloadKind, StringValue, DecimalValue
                from Edge
                where Parent_Identity = ?
                order by Edge_Identity
            ",
        )?;
        let edges = statement
            .query_map(params![parent], edge_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(edges)
    }
    fn find_edges_by_parent_and_type(&self, parent: EntityId, type_code: TypeCode) -> Result<Vec<Edge>> {
        let connection = self.connection.lock()?;
        let mut statement = connection.prepare_cached(
            "
            select e.Edge_Identity, e.Parent_Identity, e.Child_Identity, e.Locale,
                    e.PayloadKind, e.StringValue, e.DecimalValue
                from Edge e
                join Entity c
                on c.Entity_Identity = e.Child_Identity
                where e.Parent_Identity = ?
                and c.Type_Identity = ?
                order by e.Edge_Identity
            ",
        )?;
        let edges = statement
            .query_map(params![parent, type_code], edge_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(edges)
    }
    fn find_edges_between(&self, parent: EntityId, child: EntityId) -> Result<Vec<Edge>> {
        let connection = self.connection.lock()?;
        let mut statement = connection.prepare_cached(
            "
            select Edge_Identity, Parent_Identity, Child_Identity, Locale,
                    PayloadKind, StringValue, DecimalValue
                from Edge
                where Parent_Identity = ?
                and Child_Identity = ?
                order by Edge_Identity
            ",
        )?;
        let edges = statement
            .query_map(params![parent, child], edge_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(edges)
    }
    fn delete_entity(&self, id: EntityId) -> Result<()> {
        let connection = self.connection.lock()?;
        connection.execute(
            "delete from Edge where Parent_Identity = ? or Child_Identity = ?",
            params![id, id],
        )?;
        connection.execute("delete from Entity where Entity_Identity = ?", params![id])?;
        Ok(())
    }
    fn delete_edge(&self, id: EdgeId) -> Result<()> {
        let connection = self.connection.lock()?;
        connection.execute("delete from Edge where Edge_Identity = ?", params![id])?;
        Ok(())
    }
    fn count_entities(&self) -> Result<usize> {
        let connection = self.connection.lock()?;
        let count: i64 = connection.query_row("select count(*) from Entity", [], |r| r.get(0))?;
        Ok(count as usize)
    }
    fn count_edges(&self) -> Result<usize> {
        let connection = self.connection.lock()?;
        let count: i64 = connection.query_row("select count(*) from Edge", [], |r| r.get(0))?;
        Ok(count as usize)
    }
    // savepoints nest, so a build may run inside another build
    fn begin(&self) -> Result<()> {
        let connection = self.connection.lock()?;
        connection.execute_batch(&format!("savepoint {SAVEPOINT};"))?;
        Ok(())
    }
    fn commit(&self) -> Result<()> {
        let connection = self.connection.lock()?;
        connection.execute_batch(&format!("release {SAVEPOINT};"))?;
        Ok(())
    }
    fn rollback(&self) -> Result<()> {
        let connection = self.connection.lock()?;
        connection.execute_batch(&format!("rollback to {SAVEPOINT}; release {SAVEPOINT};"))?;
        Ok(())
    }
}
